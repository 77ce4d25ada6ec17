//! Nested collection editing on a participant document.
//!
//! Every operation here edits one child collection and mirrors the change into
//! the owning [`Participant`]: new children get fresh ids, the edited subtree
//! is validated before it replaces the old one, and `updated_at` is bumped.
//! A failed operation leaves the document exactly as it was.

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{
    new_id, CoachingResource, Course, CoursePatch, Formation, FormationPatch, Notification,
    Participant, Project, ProjectPatch, ResourcePatch, Session, SessionLink, SessionPatch,
};

impl Formation {
    fn assign_ids(&mut self) {
        self.id = new_id();
        for course in &mut self.courses {
            course.assign_ids();
        }
    }
}

impl Course {
    fn assign_ids(&mut self) {
        self.id = new_id();
        for session in &mut self.sessions {
            session.assign_ids();
        }
    }
}

impl Session {
    fn assign_ids(&mut self) {
        self.id = new_id();
        for link in &mut self.links {
            link.id = new_id();
        }
    }
}

fn formation_path(fid: &str) -> String {
    format!("formation {fid}")
}

fn course_path(fid: &str, cid: &str) -> String {
    format!("formation {fid} / course {cid}")
}

fn session_path(fid: &str, cid: &str, sid: &str) -> String {
    format!("formation {fid} / course {cid} / session {sid}")
}

fn position<T>(items: &[T], id: &str, key: impl Fn(&T) -> &str) -> Option<usize> {
    items.iter().position(|item| key(item) == id)
}

impl Participant {
    // === Formations ===

    /// Look up a formation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no formation has this id.
    pub fn formation(&self, fid: &str) -> Result<&Formation> {
        self.formations
            .iter()
            .find(|f| f.id == fid)
            .ok_or_else(|| Error::not_found(formation_path(fid)))
    }

    fn formation_mut(&mut self, fid: &str) -> Result<&mut Formation> {
        self.formations
            .iter_mut()
            .find(|f| f.id == fid)
            .ok_or_else(|| Error::not_found(formation_path(fid)))
    }

    /// Append a formation; it and all its children get fresh ids.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the formation is invalid.
    pub fn add_formation(&mut self, mut formation: Formation) -> Result<&Formation> {
        formation.assign_ids();
        formation.validate()?;
        debug!(participant = %self.id, formation = %formation.id, "adding formation");
        let index = self.formations.len();
        self.formations.push(formation);
        self.touch();
        Ok(&self.formations[index])
    }

    /// Update a formation's own fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn update_formation(&mut self, fid: &str, patch: FormationPatch) -> Result<&Formation> {
        let formation = self.formation_mut(fid)?;
        let mut next = formation.clone();
        patch.apply(&mut next);
        next.validate()?;
        *formation = next;
        self.touch();
        self.formation(fid)
    }

    /// Remove a formation and everything under it.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no formation has this id.
    pub fn remove_formation(&mut self, fid: &str) -> Result<Formation> {
        let index = position(&self.formations, fid, |f| f.id.as_str())
            .ok_or_else(|| Error::not_found(formation_path(fid)))?;
        let removed = self.formations.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Courses ===

    /// Look up a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn course(&self, fid: &str, cid: &str) -> Result<&Course> {
        self.formation(fid)?
            .courses
            .iter()
            .find(|c| c.id == cid)
            .ok_or_else(|| Error::not_found(course_path(fid, cid)))
    }

    fn course_mut(&mut self, fid: &str, cid: &str) -> Result<&mut Course> {
        self.formation_mut(fid)?
            .courses
            .iter_mut()
            .find(|c| c.id == cid)
            .ok_or_else(|| Error::not_found(course_path(fid, cid)))
    }

    /// Append a course to a formation.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn add_course(&mut self, fid: &str, mut course: Course) -> Result<&Course> {
        course.assign_ids();
        course.validate()?;
        let cid = course.id.clone();
        self.formation_mut(fid)?.courses.push(course);
        self.touch();
        self.course(fid, &cid)
    }

    /// Update a course's own fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn update_course(&mut self, fid: &str, cid: &str, patch: CoursePatch) -> Result<&Course> {
        let course = self.course_mut(fid, cid)?;
        let mut next = course.clone();
        patch.apply(&mut next);
        next.validate()?;
        *course = next;
        self.touch();
        self.course(fid, cid)
    }

    /// Remove a course and its sessions.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn remove_course(&mut self, fid: &str, cid: &str) -> Result<Course> {
        let courses = &mut self.formation_mut(fid)?.courses;
        let index = position(courses, cid, |c| c.id.as_str())
            .ok_or_else(|| Error::not_found(course_path(fid, cid)))?;
        let removed = courses.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Sessions ===

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn session(&self, fid: &str, cid: &str, sid: &str) -> Result<&Session> {
        self.course(fid, cid)?
            .sessions
            .iter()
            .find(|s| s.id == sid)
            .ok_or_else(|| Error::not_found(session_path(fid, cid, sid)))
    }

    fn session_mut(&mut self, fid: &str, cid: &str, sid: &str) -> Result<&mut Session> {
        self.course_mut(fid, cid)?
            .sessions
            .iter_mut()
            .find(|s| s.id == sid)
            .ok_or_else(|| Error::not_found(session_path(fid, cid, sid)))
    }

    /// Append a session to a course.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn add_session(&mut self, fid: &str, cid: &str, mut session: Session) -> Result<&Session> {
        session.assign_ids();
        session.validate()?;
        let sid = session.id.clone();
        self.course_mut(fid, cid)?.sessions.push(session);
        self.touch();
        self.session(fid, cid, &sid)
    }

    /// Update a session's own fields.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn update_session(
        &mut self,
        fid: &str,
        cid: &str,
        sid: &str,
        patch: SessionPatch,
    ) -> Result<&Session> {
        let session = self.session_mut(fid, cid, sid)?;
        let mut next = session.clone();
        patch.apply(&mut next);
        next.validate()?;
        *session = next;
        self.touch();
        self.session(fid, cid, sid)
    }

    /// Flip a session's completion flag.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn set_session_completed(
        &mut self,
        fid: &str,
        cid: &str,
        sid: &str,
        completed: bool,
    ) -> Result<&Session> {
        self.update_session(
            fid,
            cid,
            sid,
            SessionPatch {
                completed: Some(completed),
                ..SessionPatch::default()
            },
        )
    }

    /// Remove a session and its links.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn remove_session(&mut self, fid: &str, cid: &str, sid: &str) -> Result<Session> {
        let sessions = &mut self.course_mut(fid, cid)?.sessions;
        let index = position(sessions, sid, |s| s.id.as_str())
            .ok_or_else(|| Error::not_found(session_path(fid, cid, sid)))?;
        let removed = sessions.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Links ===

    /// Attach a link to a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn add_link(
        &mut self,
        fid: &str,
        cid: &str,
        sid: &str,
        mut link: SessionLink,
    ) -> Result<&SessionLink> {
        link.id = new_id();
        link.validate()?;
        let lid = link.id.clone();
        self.session_mut(fid, cid, sid)?.links.push(link);
        self.touch();
        self.session(fid, cid, sid)?
            .links
            .iter()
            .find(|l| l.id == lid)
            .ok_or_else(|| Error::internal("link vanished after insert"))
    }

    /// Detach a link from a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` naming the missing level.
    pub fn remove_link(&mut self, fid: &str, cid: &str, sid: &str, lid: &str) -> Result<SessionLink> {
        let links = &mut self.session_mut(fid, cid, sid)?.links;
        let index = position(links, lid, |l| l.id.as_str()).ok_or_else(|| {
            Error::not_found(format!("{} / link {lid}", session_path(fid, cid, sid)))
        })?;
        let removed = links.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Projects ===

    /// Append a project.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the project is invalid.
    pub fn add_project(&mut self, mut project: Project) -> Result<&Project> {
        project.id = new_id();
        project.validate()?;
        let index = self.projects.len();
        self.projects.push(project);
        self.touch();
        Ok(&self.projects[index])
    }

    /// Update a project.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn update_project(&mut self, pid: &str, patch: ProjectPatch) -> Result<&Project> {
        let index = position(&self.projects, pid, |p| p.id.as_str())
            .ok_or_else(|| Error::not_found(format!("project {pid}")))?;
        let mut next = self.projects[index].clone();
        patch.apply(&mut next);
        next.validate()?;
        self.projects[index] = next;
        self.touch();
        Ok(&self.projects[index])
    }

    /// Remove a project.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no project has this id.
    pub fn remove_project(&mut self, pid: &str) -> Result<Project> {
        let index = position(&self.projects, pid, |p| p.id.as_str())
            .ok_or_else(|| Error::not_found(format!("project {pid}")))?;
        let removed = self.projects.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Coaching resources ===

    /// Share a coaching resource.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the resource is invalid.
    pub fn add_resource(&mut self, mut resource: CoachingResource) -> Result<&CoachingResource> {
        resource.id = new_id();
        resource.validate()?;
        let index = self.coaching_resources.len();
        self.coaching_resources.push(resource);
        self.touch();
        Ok(&self.coaching_resources[index])
    }

    /// Update a coaching resource.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` or a validation error.
    pub fn update_resource(&mut self, rid: &str, patch: ResourcePatch) -> Result<&CoachingResource> {
        let index = position(&self.coaching_resources, rid, |r| r.id.as_str())
            .ok_or_else(|| Error::not_found(format!("resource {rid}")))?;
        let mut next = self.coaching_resources[index].clone();
        patch.apply(&mut next);
        next.validate()?;
        self.coaching_resources[index] = next;
        self.touch();
        Ok(&self.coaching_resources[index])
    }

    /// Withdraw a coaching resource.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no resource has this id.
    pub fn remove_resource(&mut self, rid: &str) -> Result<CoachingResource> {
        let index = position(&self.coaching_resources, rid, |r| r.id.as_str())
            .ok_or_else(|| Error::not_found(format!("resource {rid}")))?;
        let removed = self.coaching_resources.remove(index);
        self.touch();
        Ok(removed)
    }

    // === Notifications ===

    /// Send a notification. It is stored unread.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the notification is invalid.
    pub fn push_notification(&mut self, mut notification: Notification) -> Result<&Notification> {
        notification.id = new_id();
        notification.read = false;
        notification.validate()?;
        let index = self.notifications.len();
        self.notifications.push(notification);
        self.touch();
        Ok(&self.notifications[index])
    }

    /// Mark one notification as read. Already-read notifications are left as is.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no notification has this id.
    pub fn mark_notification_read(&mut self, nid: &str) -> Result<&Notification> {
        let index = position(&self.notifications, nid, |n| n.id.as_str())
            .ok_or_else(|| Error::not_found(format!("notification {nid}")))?;
        if !self.notifications[index].read {
            self.notifications[index].read = true;
            self.touch();
        }
        Ok(&self.notifications[index])
    }

    /// Mark every notification as read, returning how many changed.
    pub fn mark_all_notifications_read(&mut self) -> usize {
        let mut changed = 0;
        for notification in self.notifications.iter_mut().filter(|n| !n.read) {
            notification.read = true;
            changed += 1;
        }
        if changed > 0 {
            self.touch();
        }
        changed
    }

    /// Delete a notification.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no notification has this id.
    pub fn remove_notification(&mut self, nid: &str) -> Result<Notification> {
        let index = position(&self.notifications, nid, |n| n.id.as_str())
            .ok_or_else(|| Error::not_found(format!("notification {nid}")))?;
        let removed = self.notifications.remove(index);
        self.touch();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        FormationStatus, LinkKind, NewParticipant, NotificationLevel, ParticipantStatus,
        ProjectStatus, ResourceKind,
    };

    fn participant() -> Participant {
        Participant::create(NewParticipant {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.org".to_string(),
            phone: None,
            company: None,
            status: ParticipantStatus::Active,
        })
        .unwrap()
    }

    /// Participant with one formation holding one course holding one session.
    fn seeded() -> (Participant, String, String, String) {
        let mut p = participant();
        let fid = p.add_formation(Formation::new("Leadership")).unwrap().id.clone();
        let cid = p.add_course(&fid, Course::new("Feedback")).unwrap().id.clone();
        let sid = p
            .add_session(&fid, &cid, Session::new("Kickoff"))
            .unwrap()
            .id
            .clone();
        (p, fid, cid, sid)
    }

    #[test]
    fn test_add_formation_assigns_nested_ids() {
        let mut p = participant();
        let mut formation = Formation::new("Management");
        let mut course = Course::new("Planning");
        let mut session = Session::new("Goals");
        session.links.push(SessionLink::new(
            LinkKind::Support,
            "Slides",
            "https://cdn.example.org/slides.pdf",
        ));
        course.sessions.push(session);
        formation.courses.push(course);

        let added = p.add_formation(formation).unwrap();
        let course = &added.courses[0];
        let session = &course.sessions[0];
        assert!(!added.id.is_empty());
        assert!(!course.id.is_empty());
        assert!(!session.id.is_empty());
        assert!(!session.links[0].id.is_empty());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_add_formation_ignores_client_ids() {
        let mut p = participant();
        let mut formation = Formation::new("Management");
        formation.id = "chosen-by-client".to_string();
        let id = p.add_formation(formation).unwrap().id.clone();
        assert_ne!(id, "chosen-by-client");
    }

    #[test]
    fn test_add_invalid_formation_leaves_document() {
        let mut p = participant();
        let before = p.clone();
        assert!(p.add_formation(Formation::new("  ")).is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn test_update_formation() {
        let (mut p, fid, _, _) = seeded();
        let updated = p
            .update_formation(
                &fid,
                FormationPatch {
                    status: Some(FormationStatus::InProgress),
                    ..FormationPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.status, FormationStatus::InProgress);
        assert_eq!(updated.courses.len(), 1);
    }

    #[test]
    fn test_update_formation_invalid_dates_rejected() {
        let (mut p, fid, _, _) = seeded();
        let before = p.clone();
        let result = p.update_formation(
            &fid,
            FormationPatch {
                start_date: chrono::NaiveDate::from_ymd_opt(2024, 6, 1),
                end_date: chrono::NaiveDate::from_ymd_opt(2024, 5, 1),
                ..FormationPatch::default()
            },
        );
        assert!(result.is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn test_remove_formation() {
        let (mut p, fid, _, _) = seeded();
        let removed = p.remove_formation(&fid).unwrap();
        assert_eq!(removed.title, "Leadership");
        assert!(p.formations.is_empty());
        assert!(p.remove_formation(&fid).unwrap_err().is_not_found());
    }

    #[test]
    fn test_course_not_found_names_path() {
        let (mut p, fid, _, _) = seeded();
        let err = p.remove_course(&fid, "missing").unwrap_err();
        assert_eq!(
            err.to_string(),
            format!("formation {fid} / course missing not found")
        );
    }

    #[test]
    fn test_add_course_to_unknown_formation() {
        let mut p = participant();
        let err = p.add_course("nope", Course::new("C")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_update_course() {
        let (mut p, fid, cid, _) = seeded();
        let course = p
            .update_course(
                &fid,
                &cid,
                CoursePatch {
                    description: Some("Giving and receiving".to_string()),
                    ..CoursePatch::default()
                },
            )
            .unwrap();
        assert_eq!(course.description.as_deref(), Some("Giving and receiving"));
    }

    #[test]
    fn test_remove_keeps_sibling_order() {
        let (mut p, fid, cid, s1) = seeded();
        let s2 = p
            .add_session(&fid, &cid, Session::new("Practice"))
            .unwrap()
            .id
            .clone();
        let s3 = p
            .add_session(&fid, &cid, Session::new("Review"))
            .unwrap()
            .id
            .clone();

        p.remove_session(&fid, &cid, &s2).unwrap();
        let ids: Vec<&str> = p.course(&fid, &cid).unwrap().sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![s1.as_str(), s3.as_str()]);
    }

    #[test]
    fn test_set_session_completed_updates_progress() {
        let (mut p, fid, cid, sid) = seeded();
        assert_eq!(p.progress().percent, 0);
        p.set_session_completed(&fid, &cid, &sid, true).unwrap();
        assert_eq!(p.progress().percent, 100);
    }

    #[test]
    fn test_links() {
        let (mut p, fid, cid, sid) = seeded();
        let lid = p
            .add_link(
                &fid,
                &cid,
                &sid,
                SessionLink::new(LinkKind::Video, "Recording", "https://video.example.org/1"),
            )
            .unwrap()
            .id
            .clone();
        assert_eq!(p.session(&fid, &cid, &sid).unwrap().links.len(), 1);

        let bad = p.add_link(
            &fid,
            &cid,
            &sid,
            SessionLink::new(LinkKind::Exercise, "Quiz", "quiz.html"),
        );
        assert!(bad.is_err());

        let removed = p.remove_link(&fid, &cid, &sid, &lid).unwrap();
        assert_eq!(removed.kind, LinkKind::Video);
        assert!(p.remove_link(&fid, &cid, &sid, &lid).unwrap_err().is_not_found());
    }

    #[test]
    fn test_projects() {
        let mut p = participant();
        let pid = p.add_project(Project::new("Onboarding kit")).unwrap().id.clone();
        let project = p
            .update_project(
                &pid,
                ProjectPatch {
                    status: Some(ProjectStatus::Delivered),
                    ..ProjectPatch::default()
                },
            )
            .unwrap();
        assert_eq!(project.status, ProjectStatus::Delivered);
        p.remove_project(&pid).unwrap();
        assert!(p.projects.is_empty());
    }

    #[test]
    fn test_resources() {
        let mut p = participant();
        let rid = p
            .add_resource(CoachingResource::new(
                ResourceKind::Template,
                "Weekly review",
                "https://docs.example.org/review",
            ))
            .unwrap()
            .id
            .clone();
        let err = p
            .update_resource(
                &rid,
                ResourcePatch {
                    url: Some("not-a-url".to_string()),
                    ..ResourcePatch::default()
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("resource.url"));
        assert_eq!(p.coaching_resources[0].url, "https://docs.example.org/review");
        p.remove_resource(&rid).unwrap();
    }

    #[test]
    fn test_notifications() {
        let mut p = participant();
        let mut incoming = Notification::new(NotificationLevel::Info, "Welcome", "Hello");
        incoming.read = true;
        let n1 = p.push_notification(incoming).unwrap().id.clone();
        p.push_notification(Notification::new(
            NotificationLevel::Warning,
            "Deadline",
            "Project due Friday",
        ))
        .unwrap();
        assert_eq!(p.unread_notifications(), 2);

        assert!(p.mark_notification_read(&n1).unwrap().read);
        assert_eq!(p.unread_notifications(), 1);
        assert_eq!(p.mark_all_notifications_read(), 1);
        assert_eq!(p.mark_all_notifications_read(), 0);

        p.remove_notification(&n1).unwrap();
        assert_eq!(p.notifications.len(), 1);
    }

    #[test]
    fn test_edits_bump_updated_at() {
        let mut p = participant();
        let before = p.updated_at;
        p.add_project(Project::new("X")).unwrap();
        assert!(p.updated_at >= before);
        assert!(p.updated_at >= p.created_at);
    }
}
