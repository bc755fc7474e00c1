//! Student progression state machine.
//!
//! A student session walks forward through these steps:
//! - `Registration` -> `WeakAreas` -> `Assessment` -> `Analysis` -> `DashboardHub`
//! - `DashboardHub` <-> `Lesson` (the lesson loop repeats until the learner
//!   returns to the hub)
//!
//! A student whose profile already exists starts at `DashboardHub`.
//! Generated content always arrives, since [`ContentService`] substitutes
//! fallbacks, so no step can stall on the provider.
//!
//! [`ContentService`]: crate::generator::ContentService

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EduError, Result};
use crate::model::{
    require, AssessmentAnswer, AssessmentQuestion, BasicInfo, FeedbackResponse, LearningStyle,
    LessonContent, NextAction, ProficiencyLevel, Question, StudentProfile, SubjectInstance,
    VideoLink,
};
use crate::scoring::diagnostic_score;
use crate::session::Services;

/// Topic used when the evaluation suggests nothing.
const NEXT_MODULE_TOPIC: &str = "Next module";

// ============================================================================
// ProgressionStep
// ============================================================================

/// Current step of the student workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressionStep {
    /// Collecting name, school, grade and division.
    #[default]
    Registration,
    /// Collecting weak areas and learning style.
    WeakAreas,
    /// Answering diagnostic items one at a time.
    Assessment,
    /// All items answered; the profile is being synthesized.
    Analysis,
    /// Listing subjects.
    DashboardHub,
    /// Inside the lesson loop for one subject.
    Lesson,
}

impl std::fmt::Display for ProgressionStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => write!(f, "registration"),
            Self::WeakAreas => write!(f, "weak_areas"),
            Self::Assessment => write!(f, "assessment"),
            Self::Analysis => write!(f, "analysis"),
            Self::DashboardHub => write!(f, "dashboard_hub"),
            Self::Lesson => write!(f, "lesson"),
        }
    }
}

// ============================================================================
// Views
// ============================================================================

/// A question as shown to the learner, without its answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    /// Question identifier.
    pub id: String,
    /// Subject area, for diagnostic items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Prompt text.
    pub text: String,
    /// Options, in display order.
    pub options: Vec<String>,
}

impl From<&AssessmentQuestion> for QuestionView {
    fn from(q: &AssessmentQuestion) -> Self {
        Self {
            id: q.id.clone(),
            subject: Some(q.subject.clone()),
            text: q.text.clone(),
            options: q.options.clone(),
        }
    }
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id.clone(),
            subject: None,
            text: q.text.clone(),
            options: q.options.clone(),
        }
    }
}

/// The lesson currently on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    /// Lesson topic.
    pub topic: String,
    /// Explanation text.
    pub explanation: String,
    /// Presentation format.
    pub format: String,
    /// The closing question.
    pub question: QuestionView,
    /// Video recommendations.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub video_links: Vec<VideoLink>,
}

impl From<&LessonContent> for LessonView {
    fn from(lesson: &LessonContent) -> Self {
        Self {
            topic: lesson.topic.clone(),
            explanation: lesson.explanation.clone(),
            format: lesson.format.clone(),
            question: QuestionView::from(&lesson.question),
            video_links: lesson.video_links.clone(),
        }
    }
}

/// Serializable view of a student session.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSnapshot {
    /// Session owner.
    pub username: String,
    /// Current step.
    pub step: ProgressionStep,
    /// Zero-based index of the current diagnostic item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    /// Total diagnostic items.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question_count: Option<usize>,
    /// The current diagnostic item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub question: Option<QuestionView>,
    /// The persisted profile, once onboarding is done.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<StudentProfile>,
    /// The subject being studied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_subject: Option<SubjectInstance>,
    /// The lesson on screen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lesson: Option<LessonView>,
    /// The selected lesson option.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<usize>,
    /// Feedback on the submitted answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackResponse>,
}

// ============================================================================
// StudentFlow
// ============================================================================

#[derive(Debug, Clone)]
struct LessonState {
    subject_id: String,
    content: LessonContent,
    selected: Option<usize>,
    feedback: Option<FeedbackResponse>,
}

/// One student's progress through onboarding and the lesson loop.
#[derive(Debug, Clone)]
pub struct StudentFlow {
    username: String,
    step: ProgressionStep,
    basic_info: Option<BasicInfo>,
    weak_areas: Vec<String>,
    learning_style: LearningStyle,
    questions: Vec<AssessmentQuestion>,
    answers: Vec<AssessmentAnswer>,
    profile: Option<StudentProfile>,
    lesson: Option<LessonState>,
}

impl StudentFlow {
    /// Starts a session, skipping onboarding if the profile already exists.
    pub fn start(services: &Services, username: &str) -> Result<Self> {
        let profile = services.records.student_profile(username)?;
        let step = if profile.is_some() {
            ProgressionStep::DashboardHub
        } else {
            ProgressionStep::Registration
        };
        info!(username, %step, "Student session started");

        Ok(Self {
            username: username.to_string(),
            step,
            basic_info: None,
            weak_areas: Vec::new(),
            learning_style: LearningStyle::default(),
            questions: Vec::new(),
            answers: Vec::new(),
            profile,
            lesson: None,
        })
    }

    /// The session owner.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The current step.
    #[must_use]
    pub const fn step(&self) -> ProgressionStep {
        self.step
    }

    /// The persisted profile, once onboarding is done.
    #[must_use]
    pub const fn profile(&self) -> Option<&StudentProfile> {
        self.profile.as_ref()
    }

    /// The lesson on screen, in the `Lesson` step.
    #[must_use]
    pub fn lesson(&self) -> Option<&LessonContent> {
        self.lesson.as_ref().map(|l| &l.content)
    }

    fn expect_step(&self, expected: ProgressionStep, action: &str) -> Result<()> {
        if self.step == expected {
            Ok(())
        } else {
            Err(EduError::invalid_transition(self.step, action))
        }
    }

    fn transition(&mut self, to: ProgressionStep) {
        info!(username = %self.username, from = %self.step, to = %to, "Student step changed");
        self.step = to;
    }

    fn require_profile(&self) -> Result<&StudentProfile> {
        self.profile
            .as_ref()
            .ok_or_else(|| EduError::profile_not_found("student", &self.username))
    }

    // ------------------------------------------------------------------------
    // Onboarding
    // ------------------------------------------------------------------------

    /// Records the basic fields and moves to weak-area intake.
    pub fn submit_registration(&mut self, info: BasicInfo) -> Result<()> {
        self.expect_step(ProgressionStep::Registration, "submit registration")?;
        info.validate()?;

        self.basic_info = Some(BasicInfo {
            name: info.name.trim().to_string(),
            school: info.school.trim().to_string(),
            grade: info.grade.trim().to_string(),
            division: info.division.trim().to_string(),
        });
        self.transition(ProgressionStep::WeakAreas);
        Ok(())
    }

    /// Records weak areas and style, then generates the diagnostic.
    ///
    /// Accepts up to `onboarding.weakAreaSlots` entries, at least one of them
    /// non-empty. Blank entries are kept in place.
    pub async fn submit_weak_areas(
        &mut self,
        services: &Services,
        weak_areas: Vec<String>,
        learning_style: LearningStyle,
    ) -> Result<()> {
        self.expect_step(ProgressionStep::WeakAreas, "submit weak areas")?;

        let onboarding = &services.config.onboarding;
        if weak_areas.len() > onboarding.weak_area_slots {
            return Err(EduError::validation(
                "weakAreas",
                format!("at most {} entries are allowed", onboarding.weak_area_slots),
            ));
        }
        if weak_areas.iter().all(|w| w.trim().is_empty()) {
            return Err(EduError::validation(
                "weakAreas",
                "enter at least one weak area",
            ));
        }

        let grade = self
            .basic_info
            .as_ref()
            .map(|b| b.grade.clone())
            .unwrap_or_default();
        let questions = services
            .content
            .assessment(
                &grade,
                onboarding.assessment_length,
                &onboarding.assessment_subjects,
            )
            .await;
        debug!(username = %self.username, items = questions.len(), "Diagnostic ready");

        self.weak_areas = weak_areas;
        self.learning_style = learning_style;
        self.questions = questions;
        self.answers.clear();
        self.transition(ProgressionStep::Assessment);
        Ok(())
    }

    /// The diagnostic item awaiting an answer.
    #[must_use]
    pub fn current_question(&self) -> Option<&AssessmentQuestion> {
        if self.step == ProgressionStep::Assessment {
            self.questions.get(self.answers.len())
        } else {
            None
        }
    }

    /// Grades the current item and advances.
    ///
    /// Returns `true` once the last item is answered; the flow is then in
    /// `Analysis` and [`StudentFlow::run_analysis`] must follow.
    pub fn answer_question(&mut self, selected: usize) -> Result<bool> {
        self.expect_step(ProgressionStep::Assessment, "answer question")?;
        let question = self
            .current_question()
            .ok_or_else(|| EduError::invalid_transition(self.step, "answer question"))?;
        if selected >= question.options.len() {
            return Err(EduError::validation(
                "selectedOption",
                format!(
                    "option {selected} does not exist; choose 0 to {}",
                    question.options.len().saturating_sub(1)
                ),
            ));
        }

        let answer = question.answer(selected);
        self.answers.push(answer);

        if self.answers.len() == self.questions.len() {
            self.transition(ProgressionStep::Analysis);
            return Ok(true);
        }
        Ok(false)
    }

    /// Scores the diagnostic, synthesizes and persists the profile.
    ///
    /// Enrichment failure keeps the weak areas as interests and forces the
    /// level to `Intermediate`.
    pub async fn run_analysis(&mut self, services: &Services) -> Result<&StudentProfile> {
        self.expect_step(ProgressionStep::Analysis, "run analysis")?;
        let info = self
            .basic_info
            .clone()
            .ok_or_else(|| EduError::invalid_transition(self.step, "run analysis"))?;

        let weak_areas: Vec<String> = self
            .weak_areas
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(ToString::to_string)
            .collect();

        let score = diagnostic_score(&self.answers);
        let scored_level = ProficiencyLevel::from_optional_score(score);
        let onboarding = &services.config.onboarding;

        let enrichment = services
            .content
            .interests(
                &info.grade,
                &weak_areas,
                score,
                self.learning_style,
                onboarding.interests_count,
            )
            .await;
        let (current_level, interests) = match enrichment {
            Some(interests) => (scored_level, interests),
            None => (ProficiencyLevel::Intermediate, weak_areas.clone()),
        };

        let mut subjects = Vec::new();
        for area in &weak_areas {
            match services.records.new_subject(&self.username, area) {
                Ok(subject) => subjects.push(subject),
                Err(e) => {
                    services.records.release_codes(&subjects);
                    return Err(e);
                }
            }
        }

        let profile = StudentProfile {
            username: self.username.clone(),
            name: info.name,
            school: info.school,
            grade: info.grade,
            division: info.division,
            learning_style: self.learning_style,
            current_level,
            weak_areas,
            interests,
            subjects,
        };
        if let Err(e) = services.records.save_student_profile(&profile) {
            services.records.release_codes(&profile.subjects);
            return Err(e);
        }
        info!(
            username = %self.username,
            score = ?score,
            level = %profile.current_level,
            subjects = profile.subjects.len(),
            "Student profile created"
        );

        self.questions.clear();
        self.answers.clear();
        self.transition(ProgressionStep::DashboardHub);
        Ok(&*self.profile.insert(profile))
    }

    // ------------------------------------------------------------------------
    // Hub
    // ------------------------------------------------------------------------

    /// Adds a subject with a freshly minted code.
    pub fn add_subject(&mut self, services: &Services, name: &str) -> Result<SubjectInstance> {
        self.expect_step(ProgressionStep::DashboardHub, "add subject")?;
        require("name", name)?;

        let mut profile = self.require_profile()?.clone();
        let subject = services.records.new_subject(&self.username, name)?;
        profile.subjects.push(subject.clone());
        if let Err(e) = services.records.save_student_profile(&profile) {
            services.records.release_codes(std::slice::from_ref(&subject));
            return Err(e);
        }
        self.profile = Some(profile);

        info!(username = %self.username, subject = %subject.name, code = %subject.code, "Subject added");
        Ok(subject)
    }

    /// Enters the lesson loop for a subject and loads its first lesson.
    pub async fn enter_subject(&mut self, services: &Services, subject_id: &str) -> Result<()> {
        self.expect_step(ProgressionStep::DashboardHub, "enter subject")?;
        let subject = self
            .require_profile()?
            .subject(subject_id)
            .ok_or_else(|| EduError::subject_not_found(subject_id))?
            .clone();

        let topic = subject.entry_topic();
        let content = self.load_lesson(services, &topic, &subject.name).await?;
        self.lesson = Some(LessonState {
            subject_id: subject.id,
            content,
            selected: None,
            feedback: None,
        });
        self.transition(ProgressionStep::Lesson);
        Ok(())
    }

    /// Leaves the lesson loop.
    pub fn return_to_hub(&mut self) -> Result<()> {
        if !matches!(
            self.step,
            ProgressionStep::Lesson | ProgressionStep::DashboardHub
        ) {
            return Err(EduError::invalid_transition(self.step, "return to hub"));
        }
        self.lesson = None;
        if self.step != ProgressionStep::DashboardHub {
            self.transition(ProgressionStep::DashboardHub);
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lesson loop
    // ------------------------------------------------------------------------

    async fn load_lesson(
        &self,
        services: &Services,
        topic: &str,
        subject_name: &str,
    ) -> Result<LessonContent> {
        let profile = self.require_profile()?;
        let lesson = services
            .content
            .lesson(
                topic,
                subject_name,
                profile.current_level,
                &profile.grade,
                profile.learning_style,
                services.config.lesson.video_links,
            )
            .await;
        debug!(username = %self.username, topic = %lesson.topic, "Lesson loaded");
        Ok(lesson)
    }

    fn lesson_state(&mut self) -> Result<&mut LessonState> {
        self.expect_step(ProgressionStep::Lesson, "answer lesson")?;
        let step = self.step;
        self.lesson
            .as_mut()
            .ok_or_else(|| EduError::invalid_transition(step, "answer lesson"))
    }

    /// Selects an option. The selection can change until the answer is submitted.
    pub fn select_option(&mut self, index: usize) -> Result<()> {
        let state = self.lesson_state()?;
        if state.feedback.is_some() {
            return Err(EduError::AnswerLocked);
        }
        let options = state.content.question.options.len();
        if index >= options {
            return Err(EduError::validation(
                "selectedOption",
                format!("option {index} does not exist; choose 0 to {}", options.saturating_sub(1)),
            ));
        }
        state.selected = Some(index);
        Ok(())
    }

    /// Submits the selected option for evaluation.
    ///
    /// A correct answer credits the active subject and persists the profile
    /// immediately.
    pub async fn submit_answer(&mut self, services: &Services) -> Result<FeedbackResponse> {
        let state = self.lesson_state()?;
        if state.feedback.is_some() {
            return Err(EduError::AnswerLocked);
        }
        let selected = state
            .selected
            .ok_or_else(|| EduError::validation("selectedOption", "select an option first"))?;
        let content = state.content.clone();
        let subject_id = state.subject_id.clone();

        let level = self.require_profile()?.current_level;
        let feedback = services.content.evaluate(level, &content, selected).await;

        if feedback.is_correct {
            let step = services.config.lesson.progress_step;
            let profile = self
                .profile
                .as_mut()
                .ok_or_else(|| EduError::profile_not_found("student", &self.username))?;
            let subject = profile
                .subject_mut(&subject_id)
                .ok_or_else(|| EduError::subject_not_found(&subject_id))?;
            subject.record_correct_answer(step);
            info!(
                username = %self.username,
                subject = %subject.name,
                progress = subject.progress,
                topics_completed = subject.topics_completed,
                "Subject progress updated"
            );
            services.records.save_student_profile(profile)?;
        }

        if let Some(state) = self.lesson.as_mut() {
            state.feedback = Some(feedback.clone());
        }
        Ok(feedback)
    }

    /// Loads the lesson that follows the evaluated answer.
    ///
    /// `RETRY` reviews the current topic; otherwise the suggested topic is
    /// used, or a generic next-module topic.
    pub async fn next_lesson(&mut self, services: &Services) -> Result<()> {
        let state = self.lesson_state()?;
        let feedback = state
            .feedback
            .clone()
            .ok_or_else(|| EduError::invalid_transition(ProgressionStep::Lesson, "next lesson"))?;
        let subject_id = state.subject_id.clone();
        let current_topic = state.content.topic.clone();

        let topic = next_topic(&feedback, &current_topic);
        let subject_name = self
            .require_profile()?
            .subject(&subject_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| EduError::subject_not_found(&subject_id))?;

        let content = self.load_lesson(services, &topic, &subject_name).await?;
        self.lesson = Some(LessonState {
            subject_id,
            content,
            selected: None,
            feedback: None,
        });
        Ok(())
    }

    /// A serializable view of the session.
    #[must_use]
    pub fn snapshot(&self) -> StudentSnapshot {
        let in_assessment = self.step == ProgressionStep::Assessment;
        let active_subject = self.lesson.as_ref().and_then(|l| {
            self.profile
                .as_ref()
                .and_then(|p| p.subject(&l.subject_id))
                .cloned()
        });

        StudentSnapshot {
            username: self.username.clone(),
            step: self.step,
            question_index: in_assessment.then_some(self.answers.len()),
            question_count: in_assessment.then_some(self.questions.len()),
            question: self.current_question().map(QuestionView::from),
            profile: self.profile.clone(),
            active_subject,
            lesson: self.lesson.as_ref().map(|l| LessonView::from(&l.content)),
            selected_option: self.lesson.as_ref().and_then(|l| l.selected),
            feedback: self.lesson.as_ref().and_then(|l| l.feedback.clone()),
        }
    }
}

/// The topic of the lesson following `feedback`.
#[must_use]
pub fn next_topic(feedback: &FeedbackResponse, current_topic: &str) -> String {
    if feedback.next_action == NextAction::Retry {
        return format!("Review: {current_topic}");
    }
    feedback
        .suggested_next_topic
        .clone()
        .unwrap_or_else(|| NEXT_MODULE_TOPIC.to_string())
}
