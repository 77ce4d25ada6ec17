//! Collections embedded in a participant document.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{require_text, validate_url};
use crate::error::{Error, Result};

/// Progress state of a formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationStatus {
    /// Scheduled, not started.
    #[default]
    Planned,
    /// Underway.
    InProgress,
    /// Finished.
    Completed,
}

/// What a session link points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Session summary or minutes.
    Summary,
    /// Support material (slides, handouts).
    Support,
    /// Recording or video.
    Video,
    /// Practice exercise.
    Exercise,
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Summary => write!(f, "summary"),
            Self::Support => write!(f, "support"),
            Self::Video => write!(f, "video"),
            Self::Exercise => write!(f, "exercise"),
        }
    }
}

/// Delivery state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Being scoped.
    #[default]
    Draft,
    /// In progress.
    Active,
    /// Handed over.
    Delivered,
}

/// Format of a coaching resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Downloadable document.
    Document,
    /// Video content.
    Video,
    /// Web article.
    Article,
    /// Reusable template.
    Template,
}

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    /// Informational.
    #[default]
    Info,
    /// Something went well.
    Success,
    /// Needs attention.
    Warning,
    /// Something failed.
    Error,
}

/// A training program assigned to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Formation {
    /// Identifier, unique within the participant.
    #[serde(default)]
    pub id: String,
    /// Program title.
    pub title: String,
    /// Program description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Progress state.
    #[serde(default)]
    pub status: FormationStatus,
    /// First day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Last day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Courses in delivery order.
    #[serde(default)]
    pub courses: Vec<Course>,
}

/// A course inside a formation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    /// Identifier, unique within the formation.
    #[serde(default)]
    pub id: String,
    /// Course title.
    pub title: String,
    /// Course description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Sessions in delivery order.
    #[serde(default)]
    pub sessions: Vec<Session>,
}

/// One meeting of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Identifier, unique within the course.
    #[serde(default)]
    pub id: String,
    /// Session title.
    pub title: String,
    /// Scheduled day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    /// Planned length.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
    /// Whether the participant attended and completed it.
    #[serde(default)]
    pub completed: bool,
    /// Attached resources.
    #[serde(default)]
    pub links: Vec<SessionLink>,
}

/// A URL attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionLink {
    /// Identifier, unique within the session.
    #[serde(default)]
    pub id: String,
    /// What the link points at.
    pub kind: LinkKind,
    /// Label shown to the participant.
    pub title: String,
    /// Absolute http(s) URL.
    pub url: String,
}

/// A project carried by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Identifier, unique within the participant.
    #[serde(default)]
    pub id: String,
    /// Project title.
    pub title: String,
    /// Project description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Delivery state.
    #[serde(default)]
    pub status: ProjectStatus,
    /// Expected delivery day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

/// Coaching material shared with a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoachingResource {
    /// Identifier, unique within the participant.
    #[serde(default)]
    pub id: String,
    /// Resource title.
    pub title: String,
    /// Resource format.
    pub kind: ResourceKind,
    /// Absolute http(s) URL.
    pub url: String,
}

/// A message addressed to a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Identifier, unique within the participant.
    #[serde(default)]
    pub id: String,
    /// Short title.
    pub title: String,
    /// Body text.
    pub message: String,
    /// Severity.
    #[serde(default)]
    pub level: NotificationLevel,
    /// Whether the participant has seen it.
    #[serde(default)]
    pub read: bool,
    /// When it was sent.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Formation {
    /// A planned formation with no courses.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: None,
            status: FormationStatus::Planned,
            start_date: None,
            end_date: None,
            courses: Vec::new(),
        }
    }

    /// Validate the formation and everything under it.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        require_text("formation.title", &self.title)?;
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(Error::validation(
                    "formation.endDate",
                    format!("{end} is before start date {start}"),
                ));
            }
        }
        ensure_unique("course", self.courses.iter().map(|c| c.id.as_str()))?;
        self.courses.iter().try_for_each(Course::validate)
    }
}

impl Course {
    /// A course with no sessions.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: None,
            sessions: Vec::new(),
        }
    }

    /// Validate the course and its sessions.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        require_text("course.title", &self.title)?;
        ensure_unique("session", self.sessions.iter().map(|s| s.id.as_str()))?;
        self.sessions.iter().try_for_each(Session::validate)
    }
}

impl Session {
    /// An uncompleted session with no links.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            date: None,
            duration_minutes: None,
            completed: false,
            links: Vec::new(),
        }
    }

    /// Validate the session and its links.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure found.
    pub fn validate(&self) -> Result<()> {
        require_text("session.title", &self.title)?;
        if self.duration_minutes == Some(0) {
            return Err(Error::validation(
                "session.durationMinutes",
                "must be greater than 0",
            ));
        }
        ensure_unique("link", self.links.iter().map(|l| l.id.as_str()))?;
        self.links.iter().try_for_each(SessionLink::validate)
    }
}

impl SessionLink {
    /// A link of the given kind.
    #[must_use]
    pub fn new(kind: LinkKind, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            kind,
            title: title.into(),
            url: url.into(),
        }
    }

    /// Validate the link.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title or a non-http(s) URL.
    pub fn validate(&self) -> Result<()> {
        require_text("link.title", &self.title)?;
        validate_url("link.url", &self.url)
    }
}

impl Project {
    /// A draft project.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            description: None,
            status: ProjectStatus::Draft,
            due_date: None,
        }
    }

    /// Validate the project.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title.
    pub fn validate(&self) -> Result<()> {
        require_text("project.title", &self.title)
    }
}

impl CoachingResource {
    /// A resource of the given kind.
    #[must_use]
    pub fn new(kind: ResourceKind, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            kind,
            url: url.into(),
        }
    }

    /// Validate the resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title or a non-http(s) URL.
    pub fn validate(&self) -> Result<()> {
        require_text("resource.title", &self.title)?;
        validate_url("resource.url", &self.url)
    }
}

impl Notification {
    /// An unread notification sent now.
    #[must_use]
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: String::new(),
            title: title.into(),
            message: message.into(),
            level,
            read: false,
            created_at: Utc::now(),
        }
    }

    /// Validate the notification.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank title.
    pub fn validate(&self) -> Result<()> {
        require_text("notification.title", &self.title)
    }
}

/// Partial update of a formation. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormationPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<FormationStatus>,
    /// New start date.
    pub start_date: Option<NaiveDate>,
    /// New end date.
    pub end_date: Option<NaiveDate>,
}

impl FormationPatch {
    pub(crate) fn apply(self, formation: &mut Formation) {
        if let Some(title) = self.title {
            formation.title = title;
        }
        if let Some(description) = self.description {
            formation.description = Some(description);
        }
        if let Some(status) = self.status {
            formation.status = status;
        }
        if let Some(start) = self.start_date {
            formation.start_date = Some(start);
        }
        if let Some(end) = self.end_date {
            formation.end_date = Some(end);
        }
    }
}

/// Partial update of a course.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoursePatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
}

impl CoursePatch {
    pub(crate) fn apply(self, course: &mut Course) {
        if let Some(title) = self.title {
            course.title = title;
        }
        if let Some(description) = self.description {
            course.description = Some(description);
        }
    }
}

/// Partial update of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionPatch {
    /// New title.
    pub title: Option<String>,
    /// New date.
    pub date: Option<NaiveDate>,
    /// New duration.
    pub duration_minutes: Option<u32>,
    /// New completion flag.
    pub completed: Option<bool>,
}

impl SessionPatch {
    pub(crate) fn apply(self, session: &mut Session) {
        if let Some(title) = self.title {
            session.title = title;
        }
        if let Some(date) = self.date {
            session.date = Some(date);
        }
        if let Some(minutes) = self.duration_minutes {
            session.duration_minutes = Some(minutes);
        }
        if let Some(completed) = self.completed {
            session.completed = completed;
        }
    }
}

/// Partial update of a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<ProjectStatus>,
    /// New due date.
    pub due_date: Option<NaiveDate>,
}

impl ProjectPatch {
    pub(crate) fn apply(self, project: &mut Project) {
        if let Some(title) = self.title {
            project.title = title;
        }
        if let Some(description) = self.description {
            project.description = Some(description);
        }
        if let Some(status) = self.status {
            project.status = status;
        }
        if let Some(due) = self.due_date {
            project.due_date = Some(due);
        }
    }
}

/// Partial update of a coaching resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourcePatch {
    /// New title.
    pub title: Option<String>,
    /// New kind.
    pub kind: Option<ResourceKind>,
    /// New URL.
    pub url: Option<String>,
}

impl ResourcePatch {
    pub(crate) fn apply(self, resource: &mut CoachingResource) {
        if let Some(title) = self.title {
            resource.title = title;
        }
        if let Some(kind) = self.kind {
            resource.kind = kind;
        }
        if let Some(url) = self.url {
            resource.url = url;
        }
    }
}

/// Reject empty or repeated identifiers within one collection.
pub(crate) fn ensure_unique<'a>(what: &str, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if id.is_empty() {
            return Err(Error::validation(format!("{what}.id"), "must not be empty"));
        }
        if !seen.insert(id) {
            return Err(Error::validation(
                format!("{what}.id"),
                format!("'{id}' appears more than once"),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_id<T>(mut item: T, set: impl FnOnce(&mut T)) -> T {
        set(&mut item);
        item
    }

    #[test]
    fn test_formation_date_order() {
        let mut formation = Formation::new("Management");
        formation.start_date = NaiveDate::from_ymd_opt(2024, 3, 10);
        formation.end_date = NaiveDate::from_ymd_opt(2024, 3, 1);
        let err = formation.validate().unwrap_err();
        assert!(err.to_string().contains("endDate"));

        formation.end_date = NaiveDate::from_ymd_opt(2024, 3, 10);
        assert!(formation.validate().is_ok());
    }

    #[test]
    fn test_course_rejects_duplicate_session_ids() {
        let mut course = Course::new("Negotiation");
        let s1 = with_id(Session::new("One"), |s| s.id = "s1".to_string());
        let s2 = with_id(Session::new("Two"), |s| s.id = "s1".to_string());
        course.sessions = vec![s1, s2];
        let err = course.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_session_rejects_zero_duration() {
        let mut session = Session::new("Intro");
        session.duration_minutes = Some(0);
        assert!(session.validate().is_err());
    }

    #[test]
    fn test_link_rejects_relative_url() {
        let link = with_id(
            SessionLink::new(LinkKind::Video, "Recording", "/files/rec.mp4"),
            |l| l.id = "l1".to_string(),
        );
        assert!(link.validate().is_err());
    }

    #[test]
    fn test_nested_validation_reaches_links() {
        let link = with_id(SessionLink::new(LinkKind::Summary, "", "https://x.org"), |l| {
            l.id = "l1".to_string();
        });
        let session = with_id(Session::new("S"), |s| {
            s.id = "s1".to_string();
            s.links = vec![link];
        });
        let course = with_id(Course::new("C"), |c| {
            c.id = "c1".to_string();
            c.sessions = vec![session];
        });
        let formation = with_id(Formation::new("F"), |f| f.courses = vec![course]);
        let err = formation.validate().unwrap_err();
        assert!(err.to_string().contains("link.title"));
    }

    #[test]
    fn test_formation_patch_apply() {
        let mut formation = Formation::new("Old");
        FormationPatch {
            title: Some("New".to_string()),
            status: Some(FormationStatus::InProgress),
            ..FormationPatch::default()
        }
        .apply(&mut formation);
        assert_eq!(formation.title, "New");
        assert_eq!(formation.status, FormationStatus::InProgress);
        assert!(formation.description.is_none());
    }

    #[test]
    fn test_notification_defaults_when_deserialized() {
        let json = r#"{"title": "Welcome", "message": "Your space is ready"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert!(!n.read);
        assert_eq!(n.level, NotificationLevel::Info);
        assert!(n.id.is_empty());
    }

    #[test]
    fn test_link_kind_wire_names() {
        let json = serde_json::to_string(&LinkKind::Exercise).unwrap();
        assert_eq!(json, "\"exercise\"");
        assert_eq!(LinkKind::Support.to_string(), "support");
    }

    #[test]
    fn test_ensure_unique_rejects_empty() {
        assert!(ensure_unique("course", ["a", ""].into_iter()).is_err());
        assert!(ensure_unique("course", ["a", "b"].into_iter()).is_ok());
    }
}
