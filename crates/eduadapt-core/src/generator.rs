//! Content generation capability.
//!
//! Every piece of generated content (diagnostic items, interests, lessons,
//! answer evaluations, teacher insights) goes through a [`ContentGenerator`].
//! Workflows never call a generator directly: they use [`ContentService`],
//! which bounds each call with a timeout, validates the response shape, and
//! substitutes deterministic [`FallbackContent`] on any failure. Generation
//! errors therefore never reach the end user.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::config::{GeneratorConfig, GeneratorProvider};
use crate::error::{EduError, GenerationErrorKind, Result};
use crate::gemini::GeminiGenerator;
use crate::model::{
    AssessmentQuestion, FeedbackResponse, LearningStyle, LessonContent, NextAction,
    ProficiencyLevel, Question, StudentPerformance,
};

// ============================================================================
// Requests
// ============================================================================

/// The kind of content a request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestKind {
    /// Diagnostic assessment items.
    Assessment,
    /// Starting interests from onboarding data.
    Interests,
    /// A micro-lesson with its question.
    Lesson,
    /// Evaluation of a lesson answer.
    Evaluation,
    /// Pedagogical recommendation for a class group.
    Insight,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Assessment => write!(f, "assessment"),
            Self::Interests => write!(f, "interests"),
            Self::Lesson => write!(f, "lesson"),
            Self::Evaluation => write!(f, "evaluation"),
            Self::Insight => write!(f, "insight"),
        }
    }
}

/// Expected shape of a generator response.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputShape {
    /// A JSON document matching the given schema.
    Json(Value),
    /// Free text.
    Text,
}

/// A structured request to the content generator.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    /// Diagnostic assessment for a grade.
    Assessment {
        /// Student's grade.
        grade: String,
        /// Number of items to generate.
        count: usize,
        /// Subject mix the items span.
        subjects: Vec<String>,
    },
    /// Starting interests for a newly assessed student.
    Interests {
        /// Student's grade.
        grade: String,
        /// Declared weak areas.
        weak_areas: Vec<String>,
        /// Diagnostic score, if any items were answered.
        score: Option<f64>,
        /// Preferred learning style.
        learning_style: LearningStyle,
        /// Number of interests wanted.
        count: usize,
    },
    /// A micro-lesson on a topic.
    Lesson {
        /// Lesson topic.
        topic: String,
        /// Subject the topic belongs to.
        subject: String,
        /// Student's level.
        level: ProficiencyLevel,
        /// Student's grade.
        grade: String,
        /// Preferred learning style.
        learning_style: LearningStyle,
        /// Number of video recommendations wanted.
        video_links: usize,
    },
    /// Evaluation of a selected option.
    Evaluation {
        /// Student's level.
        level: ProficiencyLevel,
        /// The question answered.
        question: Question,
        /// The selected option index.
        selected: usize,
    },
    /// Recommendation over a group's snapshots.
    Insight {
        /// Linked student snapshots.
        students: Vec<StudentPerformance>,
    },
}

impl GenerationRequest {
    /// The kind of content requested.
    #[must_use]
    pub const fn kind(&self) -> RequestKind {
        match self {
            Self::Assessment { .. } => RequestKind::Assessment,
            Self::Interests { .. } => RequestKind::Interests,
            Self::Lesson { .. } => RequestKind::Lesson,
            Self::Evaluation { .. } => RequestKind::Evaluation,
            Self::Insight { .. } => RequestKind::Insight,
        }
    }

    /// Renders the prompt text.
    #[must_use]
    pub fn prompt(&self) -> String {
        match self {
            Self::Assessment {
                grade,
                count,
                subjects,
            } => format!(
                "Generate a diagnostic quiz of exactly {count} questions for a student in grade \"{grade}\".\n\
                 Requirements:\n\
                 1. Cover a varied general-knowledge mix: {}.\n\
                 2. Multiple choice with 3 or 4 options.\n\
                 3. Academic level matching the grade.",
                subjects.join(", ")
            ),
            Self::Interests {
                grade,
                weak_areas,
                score,
                learning_style,
                count,
            } => {
                let score = score.map_or_else(|| "not available".to_string(), |s| format!("{s:.0}% correct"));
                format!(
                    "Analyze a student's profile:\n\
                     - Grade: {grade}\n\
                     - Reported weak areas: {}\n\
                     - Diagnostic result: {score}\n\
                     - Preferred style: {learning_style}\n\
                     List {count} key interests or topics to start their learning path.",
                    weak_areas.join(", ")
                )
            }
            Self::Lesson {
                topic,
                subject,
                level,
                grade,
                learning_style,
                video_links,
            } => format!(
                "Write a short educational micro-lesson on \"{topic}\" for a {level} student ({grade}).\n\
                 Subject: {subject}.\n\
                 Learning style: {learning_style}.\n\
                 Rules:\n\
                 1. Adapt the explanation to the style (Visual: graphical descriptions; Auditory: conversational; Kinesthetic: practical; Reading/Writing: structured text).\n\
                 2. Include one validation question.\n\
                 3. Recommend {video_links} educational videos (title and a search URL)."
            ),
            Self::Evaluation {
                level,
                question,
                selected,
            } => {
                let answer = question
                    .options
                    .get(*selected)
                    .map_or("<no option>", String::as_str);
                format!(
                    "A {level} student answered \"{answer}\" to: \"{}\".\n\
                     The correct option index is {}.\n\
                     1. Give short, encouraging feedback.\n\
                     2. Choose an action: ADVANCE, REINFORCE or RETRY.\n\
                     3. Suggest the next topic.",
                    question.text, question.correct_index
                )
            }
            Self::Insight { students } => format!(
                "Analyze this student data and give a brief pedagogical recommendation: {}",
                serde_json::to_string(students).unwrap_or_default()
            ),
        }
    }

    /// The shape the response must have.
    #[must_use]
    pub fn output_shape(&self) -> OutputShape {
        match self {
            Self::Assessment { .. } => OutputShape::Json(json!({
                "type": "OBJECT",
                "properties": {
                    "questions": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "id": { "type": "STRING" },
                                "subject": { "type": "STRING" },
                                "text": { "type": "STRING" },
                                "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "correctIndex": { "type": "INTEGER" }
                            }
                        }
                    }
                }
            })),
            Self::Interests { .. } => OutputShape::Json(json!({
                "type": "OBJECT",
                "properties": {
                    "interests": { "type": "ARRAY", "items": { "type": "STRING" } }
                }
            })),
            Self::Lesson { .. } => OutputShape::Json(json!({
                "type": "OBJECT",
                "properties": {
                    "topic": { "type": "STRING" },
                    "explanation": { "type": "STRING" },
                    "format": { "type": "STRING" },
                    "videoLinks": {
                        "type": "ARRAY",
                        "items": {
                            "type": "OBJECT",
                            "properties": {
                                "title": { "type": "STRING" },
                                "url": { "type": "STRING" }
                            }
                        }
                    },
                    "question": {
                        "type": "OBJECT",
                        "properties": {
                            "id": { "type": "STRING" },
                            "text": { "type": "STRING" },
                            "options": { "type": "ARRAY", "items": { "type": "STRING" } },
                            "correctIndex": { "type": "INTEGER" }
                        }
                    }
                }
            })),
            Self::Evaluation { .. } => OutputShape::Json(json!({
                "type": "OBJECT",
                "properties": {
                    "isCorrect": { "type": "BOOLEAN" },
                    "feedbackText": { "type": "STRING" },
                    "nextAction": { "type": "STRING", "enum": ["ADVANCE", "REINFORCE", "RETRY"] },
                    "suggestedNextTopic": { "type": "STRING" }
                }
            })),
            Self::Insight { .. } => OutputShape::Text,
        }
    }
}

// ============================================================================
// ContentGenerator
// ============================================================================

/// A source of generated content.
///
/// Implementations return a JSON document for [`OutputShape::Json`] requests
/// and a JSON string for [`OutputShape::Text`] requests. They may fail and
/// have no latency bound of their own.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generates content for a request.
    async fn generate(&self, request: &GenerationRequest) -> Result<Value>;
}

/// A generator with no provider behind it. Every request fails as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineGenerator;

#[async_trait]
impl ContentGenerator for OfflineGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
        Err(EduError::generation(
            GenerationErrorKind::Unavailable,
            format!("no content provider configured for {} request", request.kind()),
        ))
    }
}

/// Builds the generator selected by configuration.
///
/// A Gemini provider without an API key degrades to [`OfflineGenerator`]
/// with a warning, so the service still runs on fallback content.
pub fn from_config(config: &GeneratorConfig) -> Result<Arc<dyn ContentGenerator>> {
    match config.provider {
        GeneratorProvider::Offline => {
            info!("Using offline content generator");
            Ok(Arc::new(OfflineGenerator))
        }
        GeneratorProvider::Gemini => match config.api_key() {
            Some(key) => {
                info!(model = %config.model, "Using Gemini content generator");
                Ok(Arc::new(GeminiGenerator::new(config, key)?))
            }
            None => {
                warn!(
                    env = %config.api_key_env,
                    "No API key set; all content will come from fallbacks"
                );
                Ok(Arc::new(OfflineGenerator))
            }
        },
    }
}

// ============================================================================
// Fallbacks
// ============================================================================

/// Deterministic content used when generation fails.
pub trait FallbackContent: Send + Sync {
    /// Placeholder diagnostic items. Must be answerable.
    fn assessment(&self, count: usize) -> Vec<AssessmentQuestion>;

    /// Placeholder lesson for a topic.
    fn lesson(&self, topic: &str) -> LessonContent;

    /// Local grading of a lesson answer.
    fn evaluation(&self, lesson: &LessonContent, selected: usize) -> FeedbackResponse;

    /// Static insight text.
    fn insight(&self) -> String;
}

/// The standard fallback content.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFallback;

impl FallbackContent for DefaultFallback {
    fn assessment(&self, count: usize) -> Vec<AssessmentQuestion> {
        (0..count.max(1))
            .map(|i| AssessmentQuestion {
                id: format!("mock_{i}"),
                subject: "General".to_string(),
                text: format!("Diagnostic question {} (offline placeholder)", i + 1),
                options: vec![
                    "Option A".to_string(),
                    "Option B".to_string(),
                    "Option C".to_string(),
                ],
                correct_index: 0,
            })
            .collect()
    }

    fn lesson(&self, topic: &str) -> LessonContent {
        LessonContent {
            topic: topic.to_string(),
            explanation: "The lesson could not be generated right now. Please try again."
                .to_string(),
            format: "Standard text".to_string(),
            question: Question {
                id: "err_1".to_string(),
                text: "Try again?".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
                correct_index: 0,
            },
            video_links: Vec::new(),
        }
    }

    fn evaluation(&self, lesson: &LessonContent, selected: usize) -> FeedbackResponse {
        FeedbackResponse {
            is_correct: lesson.question.is_correct(selected),
            feedback_text: "Answer recorded.".to_string(),
            next_action: NextAction::Advance,
            suggested_next_topic: None,
        }
    }

    fn insight(&self) -> String {
        "Analysis unavailable.".to_string()
    }
}

// ============================================================================
// ContentService
// ============================================================================

/// Timeout-bounded, shape-checked access to a generator with fallbacks.
#[derive(Clone)]
pub struct ContentService {
    generator: Arc<dyn ContentGenerator>,
    fallback: Arc<dyn FallbackContent>,
    timeout: Duration,
}

impl std::fmt::Debug for ContentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ContentService {
    /// Wraps a generator with the default fallbacks.
    #[must_use]
    pub fn new(generator: Arc<dyn ContentGenerator>, timeout: Duration) -> Self {
        Self {
            generator,
            fallback: Arc::new(DefaultFallback),
            timeout,
        }
    }

    /// A service that always falls back.
    #[must_use]
    pub fn offline() -> Self {
        Self::new(Arc::new(OfflineGenerator), Duration::from_secs(1))
    }

    /// Replaces the fallback strategy.
    #[must_use]
    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackContent>) -> Self {
        self.fallback = fallback;
        self
    }

    async fn call(&self, request: &GenerationRequest) -> Result<Value> {
        debug!(kind = %request.kind(), "Requesting generated content");
        match tokio::time::timeout(self.timeout, self.generator.generate(request)).await {
            Ok(result) => result,
            Err(_) => Err(EduError::generation(
                GenerationErrorKind::Timeout,
                format!("no response within {}s", self.timeout.as_secs_f32()),
            )),
        }
    }

    async fn call_as<T: DeserializeOwned>(&self, request: &GenerationRequest) -> Result<T> {
        let value = self.call(request).await?;
        serde_json::from_value(value).map_err(|e| EduError::malformed(e.to_string()))
    }

    /// Diagnostic items, or placeholders on failure.
    pub async fn assessment(
        &self,
        grade: &str,
        count: usize,
        subjects: &[String],
    ) -> Vec<AssessmentQuestion> {
        let request = GenerationRequest::Assessment {
            grade: grade.to_string(),
            count,
            subjects: subjects.to_vec(),
        };
        let result = self
            .call_as::<AssessmentPayload>(&request)
            .await
            .and_then(|payload| {
                if payload.questions.is_empty() {
                    return Err(EduError::malformed("assessment has no questions"));
                }
                for question in &payload.questions {
                    question.validate()?;
                }
                Ok(payload.questions)
            });

        result.unwrap_or_else(|e| {
            warn!(kind = "assessment", error = %e, "Using fallback content");
            self.fallback.assessment(count)
        })
    }

    /// Starting interests, or `None` on failure so the caller can apply its own rule.
    pub async fn interests(
        &self,
        grade: &str,
        weak_areas: &[String],
        score: Option<f64>,
        learning_style: LearningStyle,
        count: usize,
    ) -> Option<Vec<String>> {
        let request = GenerationRequest::Interests {
            grade: grade.to_string(),
            weak_areas: weak_areas.to_vec(),
            score,
            learning_style,
            count,
        };
        let result = self
            .call_as::<InterestsPayload>(&request)
            .await
            .and_then(|payload| {
                let interests: Vec<String> = payload
                    .interests
                    .into_iter()
                    .map(|i| i.trim().to_string())
                    .filter(|i| !i.is_empty())
                    .collect();
                if interests.is_empty() {
                    return Err(EduError::malformed("no interests returned"));
                }
                Ok(interests)
            });

        match result {
            Ok(interests) => Some(interests),
            Err(e) => {
                warn!(kind = "interests", error = %e, "Enrichment failed");
                None
            }
        }
    }

    /// A lesson on `topic`, or a placeholder on failure.
    pub async fn lesson(
        &self,
        topic: &str,
        subject: &str,
        level: ProficiencyLevel,
        grade: &str,
        learning_style: LearningStyle,
        video_links: usize,
    ) -> LessonContent {
        let request = GenerationRequest::Lesson {
            topic: topic.to_string(),
            subject: subject.to_string(),
            level,
            grade: grade.to_string(),
            learning_style,
            video_links,
        };
        let result = self
            .call_as::<LessonContent>(&request)
            .await
            .and_then(|mut lesson| {
                lesson.question.validate()?;
                if lesson.topic.trim().is_empty() {
                    lesson.topic = topic.to_string();
                }
                Ok(lesson)
            });

        result.unwrap_or_else(|e| {
            warn!(kind = "lesson", topic, error = %e, "Using fallback content");
            self.fallback.lesson(topic)
        })
    }

    /// Evaluation of `selected`, or local grading on failure.
    pub async fn evaluate(
        &self,
        level: ProficiencyLevel,
        lesson: &LessonContent,
        selected: usize,
    ) -> FeedbackResponse {
        let request = GenerationRequest::Evaluation {
            level,
            question: lesson.question.clone(),
            selected,
        };
        let result = self.call_as::<FeedbackResponse>(&request).await.map(|mut f| {
            f.suggested_next_topic = f
                .suggested_next_topic
                .filter(|t| !t.trim().is_empty());
            f
        });

        result.unwrap_or_else(|e| {
            warn!(kind = "evaluation", error = %e, "Using fallback content");
            self.fallback.evaluation(lesson, selected)
        })
    }

    /// A recommendation over the snapshots, or the static text on failure.
    pub async fn insight(&self, students: &[StudentPerformance]) -> String {
        let request = GenerationRequest::Insight {
            students: students.to_vec(),
        };
        let result = self.call(&request).await.and_then(|value| match value {
            Value::String(text) if !text.trim().is_empty() => Ok(text.trim().to_string()),
            _ => Err(EduError::malformed("insight is not a non-empty string")),
        });

        result.unwrap_or_else(|e| {
            warn!(kind = "insight", error = %e, "Using fallback content");
            self.fallback.insight()
        })
    }
}

#[derive(serde::Deserialize)]
struct AssessmentPayload {
    questions: Vec<AssessmentQuestion>,
}

#[derive(serde::Deserialize)]
struct InterestsPayload {
    interests: Vec<String>,
}

// ============================================================================
// Fake generator
// ============================================================================

/// A scriptable generator for tests.
pub mod fake {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Mutex, PoisonError};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::{ContentGenerator, GenerationRequest, RequestKind};
    use crate::error::{EduError, GenerationErrorKind, Result};

    /// One scripted reaction to a request.
    #[derive(Debug, Clone)]
    pub enum Step {
        /// Answer with this document.
        Respond(Value),
        /// Fail with this kind of error.
        Fail(GenerationErrorKind),
        /// Wait, then answer with this document.
        Delay(Duration, Value),
    }

    /// Replays queued steps per request kind.
    ///
    /// A request whose queue is empty fails as unavailable, so an unscripted
    /// call exercises the fallback path.
    #[derive(Debug, Default)]
    pub struct ScriptedGenerator {
        script: Mutex<HashMap<RequestKind, VecDeque<Step>>>,
        calls: Mutex<Vec<GenerationRequest>>,
    }

    impl ScriptedGenerator {
        /// Creates a generator with an empty script.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queues a step for the given kind.
        #[must_use]
        pub fn on(self, kind: RequestKind, step: Step) -> Self {
            self.push(kind, step);
            self
        }

        /// Queues a successful response for the given kind.
        #[must_use]
        pub fn respond(self, kind: RequestKind, value: Value) -> Self {
            self.on(kind, Step::Respond(value))
        }

        /// Queues a step on a shared generator.
        pub fn push(&self, kind: RequestKind, step: Step) {
            self.script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(kind)
                .or_default()
                .push_back(step);
        }

        /// Every request received so far, in order.
        pub fn calls(&self) -> Vec<GenerationRequest> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        /// Number of requests received for one kind.
        pub fn count(&self, kind: RequestKind) -> usize {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|r| r.kind() == kind)
                .count()
        }
    }

    #[async_trait]
    impl ContentGenerator for ScriptedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(request.clone());

            let step = self
                .script
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get_mut(&request.kind())
                .and_then(VecDeque::pop_front);

            match step {
                Some(Step::Respond(value)) => Ok(value),
                Some(Step::Fail(kind)) => Err(EduError::generation(kind, "scripted failure")),
                Some(Step::Delay(delay, value)) => {
                    tokio::time::sleep(delay).await;
                    Ok(value)
                }
                None => Err(EduError::generation(
                    GenerationErrorKind::Unavailable,
                    format!("no scripted {} response", request.kind()),
                )),
            }
        }
    }
}
