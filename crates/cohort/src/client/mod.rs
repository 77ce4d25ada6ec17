//! Client side of the registry: HTTP access plus an offline copy.

mod api;
mod offline;
mod service;

pub use api::{ApiClient, RemoteParticipants};
pub use offline::OfflineStore;
pub use service::{ParticipantService, Source, Sourced, SyncReport};

use crate::config::Config;
use crate::error::Result;

/// Build a [`ParticipantService`] from configuration.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built or the offline store
/// cannot be read.
pub fn service_from_config(config: &Config) -> Result<ParticipantService<ApiClient>> {
    let api = ApiClient::from_config(&config.client)?;
    let offline = OfflineStore::open(config.offline_path())?;
    Ok(ParticipantService::new(
        api,
        offline,
        config.client.offline_fallback,
    ))
}
