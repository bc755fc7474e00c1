//! Teacher aggregation workflow.
//!
//! A teacher sets up a one-time profile, creates class groups, and links
//! students into the active group by subject lookup code. Each link stores a
//! frozen [`StudentPerformance`] snapshot; later student progress does not
//! update it.

use serde::Serialize;
use tracing::{info, warn};

use crate::error::{EduError, Result};
use crate::model::{ClassGroup, StudentPerformance, TeacherProfile};
use crate::scoring::SubjectCode;
use crate::session::Services;

/// Insight text shown while no group is selected.
pub const NO_GROUP_INSIGHT: &str = "Select a group to see its analysis.";

/// Insight text shown for a group without students.
pub const EMPTY_GROUP_INSIGHT: &str = "Add students to this group to get recommendations.";

/// Serializable view of a teacher session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherSnapshot {
    /// Session owner.
    pub username: String,
    /// The teacher's profile, once set up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<TeacherProfile>,
    /// All of the teacher's groups.
    pub groups: Vec<ClassGroup>,
    /// Id of the selected group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_group_id: Option<String>,
}

/// One teacher's session state.
#[derive(Debug, Clone)]
pub struct TeacherFlow {
    username: String,
    profile: Option<TeacherProfile>,
    groups: Vec<ClassGroup>,
    active_group: Option<String>,
}

impl TeacherFlow {
    /// Loads the teacher's profile and groups.
    pub fn start(services: &Services, username: &str) -> Result<Self> {
        let profile = services.records.teacher_profile(username)?;
        let groups = services.records.groups(username)?;
        info!(
            username,
            has_profile = profile.is_some(),
            groups = groups.len(),
            "Teacher session started"
        );
        Ok(Self {
            username: username.to_string(),
            profile,
            groups,
            active_group: None,
        })
    }

    /// The teacher's profile, once set up.
    #[must_use]
    pub const fn profile(&self) -> Option<&TeacherProfile> {
        self.profile.as_ref()
    }

    /// All of the teacher's groups, in creation order.
    #[must_use]
    pub fn groups(&self) -> &[ClassGroup] {
        &self.groups
    }

    /// The selected group.
    #[must_use]
    pub fn active_group(&self) -> Option<&ClassGroup> {
        let id = self.active_group.as_deref()?;
        self.groups.iter().find(|g| g.id == id)
    }

    fn require_profile(&self) -> Result<()> {
        if self.profile.is_none() {
            return Err(EduError::profile_not_found("teacher", &self.username));
        }
        Ok(())
    }

    /// Creates the one-time profile.
    pub fn setup_profile(
        &mut self,
        services: &Services,
        first_name: &str,
        last_name: &str,
        specialization: &str,
    ) -> Result<&TeacherProfile> {
        if self.profile.is_some() {
            return Err(EduError::already_configured("Teacher profile"));
        }
        let profile = TeacherProfile {
            username: self.username.clone(),
            first_name: first_name.trim().to_string(),
            last_name: last_name.trim().to_string(),
            specialization: specialization.trim().to_string(),
        };
        profile.validate()?;
        services.records.save_teacher_profile(&profile)?;

        info!(username = %self.username, "Teacher profile created");
        Ok(&*self.profile.insert(profile))
    }

    /// Creates a group and makes it the active selection.
    pub fn create_group(
        &mut self,
        services: &Services,
        school: &str,
        grade: &str,
        division: &str,
    ) -> Result<&ClassGroup> {
        self.require_profile()?;
        let group = ClassGroup::new(school.trim(), grade.trim(), division.trim())?;

        let mut groups = self.groups.clone();
        groups.push(group.clone());
        services.records.save_groups(&self.username, &groups)?;

        info!(username = %self.username, group = %group.label(), "Group created");
        self.groups = groups;
        self.active_group = Some(group.id);
        self.active_group().ok_or_else(|| EduError::group_not_found(""))
    }

    /// Makes an existing group the active selection.
    pub fn select_group(&mut self, id: &str) -> Result<&ClassGroup> {
        if !self.groups.iter().any(|g| g.id == id) {
            return Err(EduError::group_not_found(id));
        }
        self.active_group = Some(id.to_string());
        self.active_group().ok_or_else(|| EduError::group_not_found(id))
    }

    /// Clears the active selection.
    pub fn clear_selection(&mut self) {
        self.active_group = None;
    }

    fn performance_for(&self, services: &Services, code: &str) -> Result<StudentPerformance> {
        let demo = &services.config.demo;
        let is_demo =
            demo.enabled && SubjectCode::normalize(code) == SubjectCode::normalize(&demo.code);
        if !is_demo && !SubjectCode::is_well_formed(code) {
            return Err(EduError::validation(
                "code",
                format!("'{}' is not a lookup code like ALG-4921", code.trim()),
            ));
        }

        if let Some((profile, subject)) = services.records.resolve_code(code)? {
            return Ok(StudentPerformance::snapshot(&profile, &subject));
        }

        if is_demo {
            info!(username = %self.username, "Demo code linked");
            return Ok(StudentPerformance::demo());
        }

        warn!(username = %self.username, code, "Lookup code not found");
        Err(EduError::invalid_code(code.trim()))
    }

    /// Links the student-subject pair owning `code` into the active group.
    ///
    /// The code is compared case-insensitively. The reserved demo code is
    /// honoured only when enabled and no real subject owns it.
    pub fn link_student(&mut self, services: &Services, code: &str) -> Result<StudentPerformance> {
        self.require_profile()?;
        require_code(code)?;
        let group_id = self
            .active_group
            .clone()
            .ok_or_else(|| EduError::validation("group", "select or create a group first"))?;

        let performance = self.performance_for(services, code)?;

        let mut groups = self.groups.clone();
        let group = groups
            .iter_mut()
            .find(|g| g.id == group_id)
            .ok_or_else(|| EduError::group_not_found(&group_id))?;
        group.students.push(performance.clone());
        let students = group.students.len();
        services.records.save_groups(&self.username, &groups)?;

        info!(
            username = %self.username,
            student = %performance.student_name,
            students,
            "Student linked"
        );
        self.groups = groups;
        Ok(performance)
    }

    /// A pedagogical recommendation for the active group.
    pub async fn insight(&self, services: &Services) -> String {
        match self.active_group() {
            None => NO_GROUP_INSIGHT.to_string(),
            Some(group) if group.students.is_empty() => EMPTY_GROUP_INSIGHT.to_string(),
            Some(group) => services.content.insight(&group.students).await,
        }
    }

    /// A serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> TeacherSnapshot {
        TeacherSnapshot {
            username: self.username.clone(),
            profile: self.profile.clone(),
            groups: self.groups.clone(),
            active_group_id: self.active_group.clone(),
        }
    }
}

fn require_code(code: &str) -> Result<()> {
    if code.trim().is_empty() {
        return Err(EduError::required("code"));
    }
    Ok(())
}
