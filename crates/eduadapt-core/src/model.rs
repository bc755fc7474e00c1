//! Record and content types shared by the EduAdapt workflows.
//!
//! Persisted records (credentials, profiles, class groups) serialize to the
//! camelCase JSON layout stored in the record store. Generated content
//! (assessment items, lessons, feedback) uses the same layout so provider
//! responses deserialize directly into these types.

use serde::{Deserialize, Serialize};

use crate::error::{EduError, Result};

// ============================================================================
// Roles and credentials
// ============================================================================

/// The role a credential was registered under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// A learner following the progression workflow.
    Student,
    /// A teacher aggregating linked students.
    Teacher,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Student => write!(f, "student"),
            Self::Teacher => write!(f, "teacher"),
        }
    }
}

/// A stored login credential.
///
/// The password is compared by plain equality. This is the authentication
/// baseline only and is not suitable for a real deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Globally unique login name.
    pub username: String,
    /// Plaintext password.
    pub password: String,
    /// Role fixed at registration.
    pub role: Role,
}

// ============================================================================
// Student profile
// ============================================================================

/// Self-reported preferred way of learning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LearningStyle {
    /// Diagrams and graphical descriptions.
    #[default]
    Visual,
    /// Conversational explanations.
    Auditory,
    /// Hands-on, practical explanations.
    Kinesthetic,
    /// Text-first explanations.
    #[serde(rename = "Reading/Writing")]
    ReadingWriting,
}

impl LearningStyle {
    /// All styles, in the order they are offered.
    pub const ALL: [Self; 4] = [
        Self::Visual,
        Self::Auditory,
        Self::Kinesthetic,
        Self::ReadingWriting,
    ];

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Visual => "Visual",
            Self::Auditory => "Auditory",
            Self::Kinesthetic => "Kinesthetic",
            Self::ReadingWriting => "Reading/Writing",
        }
    }
}

impl std::fmt::Display for LearningStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Proficiency derived from the diagnostic score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProficiencyLevel {
    /// Score below 40.
    Beginner,
    /// Score from 40 to 80 inclusive, and every fallback.
    #[default]
    Intermediate,
    /// Score above 80.
    Advanced,
}

impl std::fmt::Display for ProficiencyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Beginner => write!(f, "Beginner"),
            Self::Intermediate => write!(f, "Intermediate"),
            Self::Advanced => write!(f, "Advanced"),
        }
    }
}

/// The four basic fields collected at student registration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicInfo {
    /// Full name.
    pub name: String,
    /// School name.
    pub school: String,
    /// Grade or year.
    pub grade: String,
    /// Division within the grade.
    pub division: String,
}

impl BasicInfo {
    /// Checks that every field is non-empty after trimming.
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("school", &self.school)?;
        require("grade", &self.grade)?;
        require("division", &self.division)
    }
}

/// Status of a tracked subject.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubjectStatus {
    /// Being studied.
    #[default]
    Active,
    /// Finished. Never set by the lesson loop.
    Completed,
}

/// A student's individually tracked course of study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectInstance {
    /// Stable identifier for the subject's lifetime.
    pub id: String,
    /// Display name, as entered.
    pub name: String,
    /// Teacher lookup code.
    pub code: String,
    /// Percentage progress, clamped to 0..=100.
    pub progress: u8,
    /// Lessons answered correctly. Never decreases.
    pub topics_completed: u32,
    /// Current status.
    pub status: SubjectStatus,
}

impl SubjectInstance {
    /// Creates a fresh, active subject with zero progress.
    #[must_use]
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            code: code.into(),
            progress: 0,
            topics_completed: 0,
            status: SubjectStatus::Active,
        }
    }

    /// Credits one correctly answered lesson.
    pub fn record_correct_answer(&mut self, step: u8) {
        self.progress = self.progress.saturating_add(step).min(100);
        self.topics_completed = self.topics_completed.saturating_add(1);
    }

    /// The topic requested when the learner enters this subject.
    #[must_use]
    pub fn entry_topic(&self) -> String {
        if self.topics_completed == 0 {
            format!("Introduction to {}", self.name)
        } else {
            format!("Continuation of {}", self.name)
        }
    }
}

/// The student's own persisted profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    /// Owning username.
    pub username: String,
    /// Full name.
    pub name: String,
    /// School name.
    pub school: String,
    /// Grade or year.
    pub grade: String,
    /// Division within the grade.
    pub division: String,
    /// Preferred learning style.
    pub learning_style: LearningStyle,
    /// Level derived from the diagnostic.
    pub current_level: ProficiencyLevel,
    /// Declared weak areas, in input order.
    pub weak_areas: Vec<String>,
    /// Starting interests from enrichment, or the weak areas on fallback.
    pub interests: Vec<String>,
    /// Tracked subjects.
    pub subjects: Vec<SubjectInstance>,
}

impl StudentProfile {
    /// Looks up a subject by id.
    #[must_use]
    pub fn subject(&self, id: &str) -> Option<&SubjectInstance> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Looks up a subject by id for mutation.
    pub fn subject_mut(&mut self, id: &str) -> Option<&mut SubjectInstance> {
        self.subjects.iter_mut().find(|s| s.id == id)
    }

    /// The first declared weak area, used as the struggling topic.
    #[must_use]
    pub fn primary_weak_area(&self) -> Option<&str> {
        self.weak_areas.first().map(String::as_str)
    }
}

// ============================================================================
// Generated content
// ============================================================================

/// A multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question identifier.
    pub id: String,
    /// Prompt text.
    pub text: String,
    /// Options, in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
}

impl Question {
    /// Returns `true` if `selected` is the correct option.
    #[must_use]
    pub const fn is_correct(&self, selected: usize) -> bool {
        selected == self.correct_index
    }

    /// Checks that the question can be answered.
    pub fn validate(&self) -> Result<()> {
        validate_options(&self.id, &self.options, self.correct_index)
    }
}

/// A diagnostic assessment item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentQuestion {
    /// Question identifier.
    pub id: String,
    /// Subject area the item covers.
    pub subject: String,
    /// Prompt text.
    pub text: String,
    /// Options, in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_index: usize,
}

impl AssessmentQuestion {
    /// Grades a selection into an answer record.
    #[must_use]
    pub fn answer(&self, selected: usize) -> AssessmentAnswer {
        AssessmentAnswer {
            question_id: self.id.clone(),
            correct: selected == self.correct_index,
            subject: self.subject.clone(),
        }
    }

    /// Checks that the item can be answered.
    pub fn validate(&self) -> Result<()> {
        validate_options(&self.id, &self.options, self.correct_index)
    }
}

/// One graded diagnostic answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentAnswer {
    /// The answered item.
    pub question_id: String,
    /// Whether the selected option was correct.
    pub correct: bool,
    /// Subject area of the item.
    pub subject: String,
}

/// A recommended video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoLink {
    /// Video title.
    pub title: String,
    /// Video or search URL.
    pub url: String,
}

/// A generated micro-lesson with its validation question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonContent {
    /// Lesson topic.
    pub topic: String,
    /// Explanation adapted to the learning style.
    pub explanation: String,
    /// Presentation format, e.g. "Diagram".
    pub format: String,
    /// The question closing the lesson.
    pub question: Question,
    /// Optional video recommendations.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub video_links: Vec<VideoLink>,
}

/// Directive returned after grading a lesson answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NextAction {
    /// Move on to a new topic.
    Advance,
    /// Strengthen the current topic.
    Reinforce,
    /// Review the current topic again.
    Retry,
}

/// Feedback on a submitted lesson answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackResponse {
    /// Whether the answer was correct.
    pub is_correct: bool,
    /// Short feedback for the learner.
    pub feedback_text: String,
    /// What the loop does next.
    pub next_action: NextAction,
    /// Suggested topic for the next lesson.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_next_topic: Option<String>,
}

// ============================================================================
// Teacher records
// ============================================================================

/// A teacher's one-time profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfile {
    /// Owning username.
    pub username: String,
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Subject specialization.
    pub specialization: String,
}

impl TeacherProfile {
    /// Checks that every field is non-empty after trimming.
    pub fn validate(&self) -> Result<()> {
        require("firstName", &self.first_name)?;
        require("lastName", &self.last_name)?;
        require("specialization", &self.specialization)
    }
}

/// Coarse engagement bucket derived from progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngagementLevel {
    /// Progress above 70.
    High,
    /// Progress above 30.
    Medium,
    /// Progress of 30 or less.
    Low,
}

impl std::fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

/// Teacher-facing snapshot of one student-subject pair.
///
/// Frozen at link time: later student progress does not update it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentPerformance {
    /// Student's full name.
    pub student_name: String,
    /// Student's school, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school: Option<String>,
    /// Student's grade, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<String>,
    /// The subject's progress at link time.
    pub average_score: u8,
    /// The subject's completed topics at link time.
    pub completed_modules: u32,
    /// First weak area, or "not reported".
    pub struggling_topic: String,
    /// Engagement bucket at link time.
    pub engagement_level: EngagementLevel,
}

impl StudentPerformance {
    /// Projects a subject and its owning profile into a snapshot.
    #[must_use]
    pub fn snapshot(profile: &StudentProfile, subject: &SubjectInstance) -> Self {
        Self {
            student_name: profile.name.clone(),
            school: Some(profile.school.clone()),
            grade: Some(profile.grade.clone()),
            average_score: subject.progress,
            completed_modules: subject.topics_completed,
            struggling_topic: profile
                .primary_weak_area()
                .unwrap_or("not reported")
                .to_string(),
            engagement_level: EngagementLevel::from_progress(subject.progress),
        }
    }

    /// Canned payload returned for the reserved demo code.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            student_name: "Demo Student".to_string(),
            school: None,
            grade: None,
            average_score: 85,
            completed_modules: 3,
            struggling_topic: "Simulated diagnostic".to_string(),
            engagement_level: EngagementLevel::High,
        }
    }
}

/// A teacher's class group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    /// Group identifier.
    pub id: String,
    /// School name.
    pub school: String,
    /// Grade or year.
    pub grade: String,
    /// Division within the grade.
    pub division: String,
    /// Linked student snapshots, in link order.
    pub students: Vec<StudentPerformance>,
}

impl ClassGroup {
    /// Creates an empty group after validating its fields.
    pub fn new(
        school: impl Into<String>,
        grade: impl Into<String>,
        division: impl Into<String>,
    ) -> Result<Self> {
        let group = Self {
            id: uuid::Uuid::new_v4().to_string(),
            school: school.into(),
            grade: grade.into(),
            division: division.into(),
            students: Vec::new(),
        };
        require("school", &group.school)?;
        require("grade", &group.grade)?;
        require("division", &group.division)?;
        Ok(group)
    }

    /// A short label such as "5th B - X".
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {} - {}", self.grade, self.division, self.school)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Rejects empty or whitespace-only values.
pub(crate) fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EduError::required(field));
    }
    Ok(())
}

fn validate_options(id: &str, options: &[String], correct_index: usize) -> Result<()> {
    if options.len() < 2 {
        return Err(EduError::malformed(format!(
            "question '{id}' has {} options, expected at least 2",
            options.len()
        )));
    }
    if correct_index >= options.len() {
        return Err(EduError::malformed(format!(
            "question '{id}' has correctIndex {correct_index} outside {} options",
            options.len()
        )));
    }
    Ok(())
}
