//! EduAdapt core
//!
//! Student progression, teacher aggregation, content generation with
//! fallbacks, the record store, sessions and the HTTP API.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generator;
pub mod model;
pub mod progression;
pub mod scoring;
pub mod session;
pub mod store;
pub mod teacher;

pub use api::{
    create_router, status_for, AddSubjectRequest, AppState, CreateGroupRequest,
    CredentialsRequest, ErrorResponse, InsightResponse, LinkStudentRequest, LoginResponse,
    SelectRequest, TeacherProfileRequest, WeakAreasRequest, SESSION_HEADER,
};
pub use config::{
    Config, DemoConfig, GeneratorConfig, GeneratorProvider, LessonConfig, OnboardingConfig,
    SessionConfig,
};
pub use error::{EduError, ErrorCategory, GenerationErrorKind, Result};
pub use gemini::GeminiGenerator;
pub use generator::{
    ContentGenerator, ContentService, DefaultFallback, FallbackContent, GenerationRequest,
    OfflineGenerator, OutputShape, RequestKind,
};
pub use model::{
    AssessmentAnswer, AssessmentQuestion, BasicInfo, ClassGroup, Credential, EngagementLevel,
    FeedbackResponse, LearningStyle, LessonContent, NextAction, ProficiencyLevel, Question, Role,
    StudentPerformance, StudentProfile, SubjectInstance, SubjectStatus, TeacherProfile, VideoLink,
};
pub use progression::{next_topic, ProgressionStep, StudentFlow, StudentSnapshot};
pub use scoring::{diagnostic_score, SubjectCode};
pub use session::{Services, Session, SessionManager, SessionSlot, Workflow};
pub use store::{Collection, JsonFileStore, MemoryStore, RecordStore, Records};
pub use teacher::{TeacherFlow, TeacherSnapshot};
