//! Document types for the participant registry.
//!
//! A [`Participant`] is stored and exchanged as one JSON document that embeds
//! all of its nested collections. Field names are camelCase on the wire.

mod nested;

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use nested::ensure_unique;
pub use nested::{
    CoachingResource, Course, CoursePatch, Formation, FormationPatch, FormationStatus, LinkKind,
    Notification, NotificationLevel, Project, ProjectPatch, ProjectStatus, ResourceKind,
    ResourcePatch, Session, SessionLink, SessionPatch,
};

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
});

/// Generate a fresh record identifier.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Enrollment state of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantStatus {
    /// Currently enrolled.
    #[default]
    Active,
    /// Enrollment paused or withdrawn.
    Inactive,
    /// All assigned formations finished.
    Completed,
}

impl std::fmt::Display for ParticipantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

impl std::str::FromStr for ParticipantStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "completed" => Ok(Self::Completed),
            other => Err(Error::validation(
                "status",
                format!("unknown participant status '{other}'"),
            )),
        }
    }
}

/// A learner and everything attached to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    /// Record identifier.
    pub id: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email, unique across participants.
    pub email: String,
    /// Contact phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Employer or sponsoring organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Enrollment state.
    #[serde(default)]
    pub status: ParticipantStatus,
    /// Assigned training programs.
    #[serde(default)]
    pub formations: Vec<Formation>,
    /// Projects carried by the participant.
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Coaching material shared with the participant.
    #[serde(default)]
    pub coaching_resources: Vec<CoachingResource>,
    /// Messages addressed to the participant.
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParticipant {
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Contact email.
    pub email: String,
    /// Contact phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Employer or sponsoring organization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Initial enrollment state.
    #[serde(default)]
    pub status: ParticipantStatus,
}

/// Partial update of a participant's own fields.
///
/// `None` leaves a field untouched. For the optional contact fields an empty
/// string clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParticipantPatch {
    /// New given name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// New family name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// New email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New phone; empty clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// New company; empty clears.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// New enrollment state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ParticipantStatus>,
}

/// Completion summary across all formations of a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    /// Number of formations.
    pub formations: usize,
    /// Number of courses across formations.
    pub courses: usize,
    /// Number of sessions across courses.
    pub sessions: usize,
    /// Sessions marked completed.
    pub completed_sessions: usize,
    /// Completed share of sessions, 0-100, rounded down.
    pub percent: u8,
}

impl Participant {
    /// Build a new participant from creation input.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the input is invalid.
    pub fn create(input: NewParticipant) -> Result<Self> {
        let now = Utc::now();
        let participant = Self {
            id: new_id(),
            first_name: input.first_name.trim().to_string(),
            last_name: input.last_name.trim().to_string(),
            email: input.email.trim().to_lowercase(),
            phone: non_empty(input.phone),
            company: non_empty(input.company),
            status: input.status,
            formations: Vec::new(),
            projects: Vec::new(),
            coaching_resources: Vec::new(),
            notifications: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        participant.validate()?;
        Ok(participant)
    }

    /// Display name, "First Last".
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Apply a partial update. The participant is left untouched on error.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the patched document is invalid.
    pub fn apply_patch(&mut self, patch: ParticipantPatch) -> Result<()> {
        let mut next = self.clone();
        if let Some(first_name) = patch.first_name {
            next.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = patch.last_name {
            next.last_name = last_name.trim().to_string();
        }
        if let Some(email) = patch.email {
            next.email = email.trim().to_lowercase();
        }
        if let Some(phone) = patch.phone {
            next.phone = non_empty(Some(phone));
        }
        if let Some(company) = patch.company {
            next.company = non_empty(Some(company));
        }
        if let Some(status) = patch.status {
            next.status = status;
        }
        next.validate()?;
        next.touch();
        *self = next;
        Ok(())
    }

    /// Validate the whole document, nested collections included.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        require_text("firstName", &self.first_name)?;
        require_text("lastName", &self.last_name)?;
        validate_email(&self.email)?;
        if self.updated_at < self.created_at {
            return Err(Error::validation(
                "updatedAt",
                "cannot be earlier than createdAt",
            ));
        }
        ensure_unique("formation", self.formations.iter().map(|f| f.id.as_str()))?;
        ensure_unique("project", self.projects.iter().map(|p| p.id.as_str()))?;
        ensure_unique(
            "resource",
            self.coaching_resources.iter().map(|r| r.id.as_str()),
        )?;
        ensure_unique(
            "notification",
            self.notifications.iter().map(|n| n.id.as_str()),
        )?;
        for formation in &self.formations {
            formation.validate()?;
        }
        for project in &self.projects {
            project.validate()?;
        }
        for resource in &self.coaching_resources {
            resource.validate()?;
        }
        for notification in &self.notifications {
            notification.validate()?;
        }
        Ok(())
    }

    /// Mark the document as modified now.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now < self.created_at {
            self.created_at
        } else {
            now
        };
    }

    /// Completion summary across formations.
    #[must_use]
    pub fn progress(&self) -> Progress {
        let courses = self.formations.iter().flat_map(|f| &f.courses);
        let sessions: Vec<&Session> = courses.clone().flat_map(|c| &c.sessions).collect();
        let completed_sessions = sessions.iter().filter(|s| s.completed).count();
        let percent = if sessions.is_empty() {
            0
        } else {
            u8::try_from(completed_sessions * 100 / sessions.len()).unwrap_or(100)
        };
        Progress {
            formations: self.formations.len(),
            courses: courses.count(),
            sessions: sessions.len(),
            completed_sessions,
            percent,
        }
    }

    /// Number of notifications not yet read.
    #[must_use]
    pub fn unread_notifications(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// BLAKE3 digest of the serialized document.
    ///
    /// Two documents with the same revision are identical in every field.
    #[must_use]
    pub fn revision(&self) -> String {
        let bytes = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&bytes).to_hex().to_string()
    }
}

/// A diagnostic domain offered on the public site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticDomain {
    /// Record identifier.
    #[serde(default)]
    pub id: String,
    /// Display name, unique.
    pub name: String,
    /// Short description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sort position, ascending.
    #[serde(default)]
    pub position: u32,
}

impl DiagnosticDomain {
    /// Validate the domain.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the name is blank.
    pub fn validate(&self) -> Result<()> {
        require_text("name", &self.name)
    }
}

pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "must not be empty"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<()> {
    if EMAIL_RE.is_match(email) {
        Ok(())
    } else {
        Err(Error::validation(
            "email",
            format!("'{email}' is not a valid address"),
        ))
    }
}

pub(crate) fn validate_url(field: &str, url: &str) -> Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(Error::validation(
            field,
            format!("'{url}' must start with http:// or https://"),
        ))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
