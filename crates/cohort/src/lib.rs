//! `cohort` - Participant registry for training and coaching programs
//!
//! This library provides the participant document model, its `SQLite`
//! storage, the REST backend that serves it, a client that falls back to an
//! offline copy when the backend is unreachable, and a sequential endpoint
//! diagnostic.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod cli;
pub mod client;
pub mod config;
pub mod diagnostic;
mod editor;
pub mod error;
pub mod logging;
pub mod model;
pub mod registry;
pub mod server;
pub mod storage;

pub use client::{ApiClient, OfflineStore, ParticipantService, Source, SyncReport};
pub use config::Config;
pub use diagnostic::{Diagnostic, DiagnosticReport, EndpointCheck};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use model::{NewParticipant, Participant, ParticipantStatus};
pub use registry::Registry;
pub use storage::{Storage, StorageStats};
