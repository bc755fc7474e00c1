//! HTTP API for the EduAdapt workflows.
//!
//! JSON bodies use camelCase. Every endpoint except register and login needs
//! the session id returned by login in the `x-session-id` header.
//!
//! # Endpoints
//!
//! - `POST /api/auth/register` - Register a credential
//! - `POST /api/auth/login` - Open a session
//! - `POST /api/auth/logout` - Close the session
//! - `GET /api/student/state` - Student flow snapshot
//! - `POST /api/student/registration` - Submit basic info
//! - `POST /api/student/weak-areas` - Submit weak areas and style
//! - `POST /api/student/assessment/answer` - Answer the current diagnostic item
//! - `POST /api/student/assessment/analyze` - Retry a failed analysis
//! - `POST /api/student/subjects` - Add a subject
//! - `POST /api/student/subjects/:id/enter` - Enter the lesson loop
//! - `POST /api/student/lesson/select` - Select a lesson option
//! - `POST /api/student/lesson/submit` - Submit the selected option
//! - `POST /api/student/lesson/next` - Load the next lesson
//! - `POST /api/student/hub` - Return to the hub
//! - `GET /api/teacher/state` - Teacher snapshot
//! - `POST /api/teacher/profile` - One-time profile setup
//! - `POST /api/teacher/groups` - Create a group
//! - `POST /api/teacher/groups/:id/select` - Select a group
//! - `POST /api/teacher/students` - Link a student by code
//! - `GET /api/teacher/insight` - Recommendation for the active group
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use eduadapt_core::{create_router, AppState, Config, OfflineGenerator, Services};
//!
//! # async fn example() {
//! let services = Services::in_memory(Config::default(), Arc::new(OfflineGenerator));
//! let router = create_router(AppState::new(services));
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//! axum::serve(listener, router).await.unwrap();
//! # }
//! ```

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

use crate::auth;
use crate::error::{EduError, ErrorCategory};
use crate::model::{
    BasicInfo, ClassGroup, FeedbackResponse, LearningStyle, Role, StudentPerformance,
    SubjectInstance, TeacherProfile,
};
use crate::progression::{StudentFlow, StudentSnapshot};
use crate::session::{SessionManager, SessionSlot, Services, Workflow};
use crate::teacher::{TeacherFlow, TeacherSnapshot};

/// Header carrying the session id.
pub const SESSION_HEADER: &str = "x-session-id";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for register and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsRequest {
    /// Login name.
    pub username: String,
    /// Password.
    pub password: String,
    /// `STUDENT` or `TEACHER`.
    pub role: Role,
}

/// Response body for login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Session id for the `x-session-id` header.
    pub session_id: String,
    /// Authenticated username.
    pub username: String,
    /// Role of the session.
    pub role: Role,
}

/// Request body for weak-area intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakAreasRequest {
    /// Weak areas, in input order.
    pub weak_areas: Vec<String>,
    /// Preferred learning style.
    pub learning_style: LearningStyle,
}

/// Request body carrying a selected option.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    /// Zero-based option index.
    pub selected_option: usize,
}

/// Request body for adding a subject.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddSubjectRequest {
    /// Subject name.
    pub name: String,
}

/// Request body for teacher profile setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherProfileRequest {
    /// First name.
    pub first_name: String,
    /// Last name.
    pub last_name: String,
    /// Subject specialization.
    pub specialization: String,
}

/// Request body for group creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGroupRequest {
    /// School name.
    pub school: String,
    /// Grade or year.
    pub grade: String,
    /// Division within the grade.
    pub division: String,
}

/// Request body for linking a student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStudentRequest {
    /// Subject lookup code.
    pub code: String,
}

/// Response body for the insight endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightResponse {
    /// Recommendation text.
    pub insight: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Records, content and configuration.
    pub services: Services,
    /// Live sessions.
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    /// Creates a new `AppState` with no sessions, expiring idle ones per config.
    #[must_use]
    pub fn new(services: Services) -> Self {
        let idle_timeout = services.config.session.idle_timeout();
        Self {
            services,
            sessions: Arc::new(SessionManager::with_idle_timeout(idle_timeout)),
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Error type for API handlers.
#[derive(Debug)]
pub struct ApiError(EduError);

impl From<EduError> for ApiError {
    fn from(err: EduError) -> Self {
        Self(err)
    }
}

/// HTTP status for a workflow error.
#[must_use]
pub fn status_for(err: &EduError) -> StatusCode {
    match err {
        EduError::UserExists { .. } | EduError::AlreadyConfigured { .. } => StatusCode::CONFLICT,
        EduError::UserNotFound { .. } => StatusCode::NOT_FOUND,
        EduError::WrongPassword | EduError::SessionNotFound => StatusCode::UNAUTHORIZED,
        EduError::WrongRole { .. } => StatusCode::FORBIDDEN,
        _ => match err.category() {
            ErrorCategory::Validation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCategory::Lookup => StatusCode::NOT_FOUND,
            ErrorCategory::State => StatusCode::CONFLICT,
            ErrorCategory::Auth => StatusCode::UNAUTHORIZED,
            ErrorCategory::Generation | ErrorCategory::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (status, body).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// The router carries permissive CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/auth/register", post(handle_register))
        .route("/auth/login", post(handle_login))
        .route("/auth/logout", post(handle_logout))
        .route("/student/state", get(handle_student_state))
        .route("/student/registration", post(handle_registration))
        .route("/student/weak-areas", post(handle_weak_areas))
        .route("/student/assessment/answer", post(handle_assessment_answer))
        .route("/student/assessment/analyze", post(handle_assessment_analyze))
        .route("/student/subjects", post(handle_add_subject))
        .route("/student/subjects/:id/enter", post(handle_enter_subject))
        .route("/student/lesson/select", post(handle_lesson_select))
        .route("/student/lesson/submit", post(handle_lesson_submit))
        .route("/student/lesson/next", post(handle_lesson_next))
        .route("/student/hub", post(handle_return_to_hub))
        .route("/teacher/state", get(handle_teacher_state))
        .route("/teacher/profile", post(handle_teacher_profile))
        .route("/teacher/groups", post(handle_create_group))
        .route("/teacher/groups/:id/select", post(handle_select_group))
        .route("/teacher/students", post(handle_link_student))
        .route("/teacher/insight", get(handle_insight));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Session helpers
// ============================================================================

fn session_slot(state: &AppState, headers: &HeaderMap, role: Role) -> ApiResult<Arc<SessionSlot>> {
    let id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(EduError::SessionNotFound)?;
    let slot = state.sessions.get(id)?;
    if slot.session.role != role {
        return Err(EduError::WrongRole { expected: role }.into());
    }
    Ok(slot)
}

fn student(workflow: &mut Workflow) -> ApiResult<&mut StudentFlow> {
    match workflow {
        Workflow::Student(flow) => Ok(flow),
        Workflow::Teacher(_) => Err(EduError::WrongRole {
            expected: Role::Student,
        }
        .into()),
    }
}

fn teacher(workflow: &mut Workflow) -> ApiResult<&mut TeacherFlow> {
    match workflow {
        Workflow::Teacher(flow) => Ok(flow),
        Workflow::Student(_) => Err(EduError::WrongRole {
            expected: Role::Teacher,
        }
        .into()),
    }
}

// ============================================================================
// Auth handlers
// ============================================================================

/// Handler for `POST /api/auth/register`.
async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<StatusCode> {
    auth::register(
        &state.services.records,
        &request.username,
        &request.password,
        request.role,
    )?;
    Ok(StatusCode::CREATED)
}

/// Handler for `POST /api/auth/login`.
async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CredentialsRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let slot = state.sessions.login(
        &state.services,
        &request.username,
        &request.password,
        request.role,
    )?;
    Ok(Json(LoginResponse {
        session_id: slot.session.id.clone(),
        username: slot.session.username.clone(),
        role: slot.session.role,
    }))
}

/// Handler for `POST /api/auth/logout`.
async fn handle_logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(EduError::SessionNotFound)?;
    state.sessions.logout(id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Student handlers
// ============================================================================

/// Handler for `GET /api/student/state`.
async fn handle_student_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let mut workflow = slot.workflow.lock().await;
    Ok(Json(student(&mut workflow)?.snapshot()))
}

/// Handler for `POST /api/student/registration`.
async fn handle_registration(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<BasicInfo>,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.submit_registration(request)?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/weak-areas`.
///
/// Generates the diagnostic before responding.
async fn handle_weak_areas(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<WeakAreasRequest>,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.submit_weak_areas(&state.services, request.weak_areas, request.learning_style)
        .await?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/assessment/answer`.
///
/// Answering the last item runs the analysis and lands on the hub.
async fn handle_assessment_answer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    if flow.answer_question(request.selected_option)? {
        flow.run_analysis(&state.services).await?;
    }
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/assessment/analyze`.
///
/// Retries the analysis after a failed final answer.
async fn handle_assessment_analyze(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.run_analysis(&state.services).await?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/subjects`.
async fn handle_add_subject(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<AddSubjectRequest>,
) -> ApiResult<(StatusCode, Json<SubjectInstance>)> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let subject = student(&mut workflow)?.add_subject(&state.services, &request.name)?;
    Ok((StatusCode::CREATED, Json(subject)))
}

/// Handler for `POST /api/student/subjects/:id/enter`.
async fn handle_enter_subject(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.enter_subject(&state.services, &id).await?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/lesson/select`.
async fn handle_lesson_select(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<SelectRequest>,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.select_option(request.selected_option)?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/lesson/submit`.
async fn handle_lesson_submit(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<FeedbackResponse>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let feedback = student(&mut workflow)?
        .submit_answer(&state.services)
        .await?;
    info!(
        username = %slot.session.username,
        correct = feedback.is_correct,
        next_action = ?feedback.next_action,
        "Lesson answer evaluated"
    );
    Ok(Json(feedback))
}

/// Handler for `POST /api/student/lesson/next`.
async fn handle_lesson_next(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.next_lesson(&state.services).await?;
    Ok(Json(flow.snapshot()))
}

/// Handler for `POST /api/student/hub`.
async fn handle_return_to_hub(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<StudentSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Student)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let flow = student(&mut workflow)?;
    flow.return_to_hub()?;
    Ok(Json(flow.snapshot()))
}

// ============================================================================
// Teacher handlers
// ============================================================================

/// Handler for `GET /api/teacher/state`.
async fn handle_teacher_state(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<TeacherSnapshot>> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let mut workflow = slot.workflow.lock().await;
    Ok(Json(teacher(&mut workflow)?.snapshot()))
}

/// Handler for `POST /api/teacher/profile`.
async fn handle_teacher_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<TeacherProfileRequest>,
) -> ApiResult<(StatusCode, Json<TeacherProfile>)> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let mut workflow = slot.workflow.lock().await;
    let profile = teacher(&mut workflow)?
        .setup_profile(
            &state.services,
            &request.first_name,
            &request.last_name,
            &request.specialization,
        )?
        .clone();
    Ok((StatusCode::CREATED, Json(profile)))
}

/// Handler for `POST /api/teacher/groups`.
async fn handle_create_group(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<ClassGroup>)> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let mut workflow = slot.workflow.lock().await;
    let group = teacher(&mut workflow)?
        .create_group(
            &state.services,
            &request.school,
            &request.grade,
            &request.division,
        )?
        .clone();
    Ok((StatusCode::CREATED, Json(group)))
}

/// Handler for `POST /api/teacher/groups/:id/select`.
async fn handle_select_group(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<ClassGroup>> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let mut workflow = slot.workflow.lock().await;
    let group = teacher(&mut workflow)?.select_group(&id)?.clone();
    Ok(Json(group))
}

/// Handler for `POST /api/teacher/students`.
async fn handle_link_student(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<LinkStudentRequest>,
) -> ApiResult<(StatusCode, Json<StudentPerformance>)> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let mut workflow = slot.workflow.lock().await;
    let performance = teacher(&mut workflow)?.link_student(&state.services, &request.code)?;
    Ok((StatusCode::CREATED, Json(performance)))
}

/// Handler for `GET /api/teacher/insight`.
async fn handle_insight(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> ApiResult<Json<InsightResponse>> {
    let slot = session_slot(&state, &headers, Role::Teacher)?;
    let _busy = slot.in_flight.try_acquire()?;
    let mut workflow = slot.workflow.lock().await;
    let insight = teacher(&mut workflow)?.insight(&state.services).await;
    Ok(Json(InsightResponse { insight }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::generator::fake::{ScriptedGenerator, Step};
    use crate::generator::{ContentService, RequestKind};
    use crate::store::testing::FlakyStore;
    use crate::store::Records;

    fn test_router() -> Router {
        router_with(ScriptedGenerator::new())
    }

    fn router_with(generator: ScriptedGenerator) -> Router {
        let services = Services::in_memory(Config::default(), Arc::new(generator));
        create_router(AppState::new(services))
    }

    async fn send(
        router: &Router,
        method: Method,
        uri: &str,
        session: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(id) = session {
            builder = builder.header(SESSION_HEADER, id);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    async fn login(router: &Router, username: &str, role: &str) -> String {
        let creds = json!({"username": username, "password": "pw", "role": role});
        let (status, _) = send(router, Method::POST, "/api/auth/register", None, Some(creds.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send(router, Method::POST, "/api/auth/login", None, Some(creds)).await;
        assert_eq!(status, StatusCode::OK);
        body["sessionId"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&EduError::required("name")), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(&EduError::user_exists("a")), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&EduError::already_configured("Teacher profile")),
            StatusCode::CONFLICT
        );
        assert_eq!(status_for(&EduError::user_not_found("a")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&EduError::WrongPassword), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&EduError::SessionNotFound), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&EduError::WrongRole {
                expected: Role::Teacher
            }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status_for(&EduError::invalid_code("X")), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&EduError::RequestInFlight), StatusCode::CONFLICT);
        assert_eq!(
            status_for(&EduError::store_corrupted("x", "y")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_returns_409() {
        let router = test_router();
        login(&router, "alice", "STUDENT").await;

        let creds = json!({"username": "alice", "password": "x", "role": "TEACHER"});
        let (status, body) = send(&router, Method::POST, "/api/auth/register", None, Some(creds)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].as_str().unwrap().contains("already exists"));
    }

    #[tokio::test]
    async fn test_login_errors() {
        let router = test_router();
        login(&router, "alice", "STUDENT").await;

        let wrong_role = json!({"username": "alice", "password": "pw", "role": "TEACHER"});
        let (status, _) = send(&router, Method::POST, "/api/auth/login", None, Some(wrong_role)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let wrong_pw = json!({"username": "alice", "password": "nope", "role": "STUDENT"});
        let (status, _) = send(&router, Method::POST, "/api/auth/login", None, Some(wrong_pw)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let unknown = json!({"username": "ghost", "password": "pw", "role": "STUDENT"});
        let (status, _) = send(&router, Method::POST, "/api/auth/login", None, Some(unknown)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_missing_session_returns_401() {
        let router = test_router();
        let (status, body) = send(&router, Method::GET, "/api/student/state", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = send(&router, Method::GET, "/api/student/state", Some("bogus"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_student_routes_reject_teacher_session() {
        let router = test_router();
        let session = login(&router, "tina", "TEACHER").await;
        let (status, _) = send(&router, Method::GET, "/api/student/state", Some(&session), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_student_onboarding_over_http() {
        let router = test_router();
        let session = login(&router, "alice", "STUDENT").await;
        let s = Some(session.as_str());

        let (status, body) = send(&router, Method::GET, "/api/student/state", s, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "registration");

        let info = json!({"name": "Alice", "school": "North", "grade": "", "division": "B"});
        let (status, _) = send(&router, Method::POST, "/api/student/registration", s, Some(info)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let info = json!({"name": "Alice", "school": "North", "grade": "5th", "division": "B"});
        let (status, body) = send(&router, Method::POST, "/api/student/registration", s, Some(info)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "weak_areas");

        let areas = json!({"weakAreas": ["Algebra", "History"], "learningStyle": "Visual"});
        let (status, body) = send(&router, Method::POST, "/api/student/weak-areas", s, Some(areas)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "assessment");
        let total = body["questionCount"].as_u64().unwrap();

        let mut last = Value::Null;
        for _ in 0..total {
            let (status, body) = send(
                &router,
                Method::POST,
                "/api/student/assessment/answer",
                s,
                Some(json!({"selectedOption": 0})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
            last = body;
        }
        assert_eq!(last["step"], "dashboard_hub");
        assert_eq!(last["profile"]["subjects"].as_array().unwrap().len(), 2);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/student/subjects",
            s,
            Some(json!({"name": "Chemistry"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["code"].as_str().unwrap().starts_with("CHE-"));
    }

    #[tokio::test]
    async fn test_failed_analysis_can_be_retried() {
        let store = Arc::new(FlakyStore::default());
        let records = Arc::new(Records::open(store.clone()).unwrap());
        let services = Services::new(records, ContentService::offline(), Config::default());
        let router = create_router(AppState::new(services));
        let session = login(&router, "alice", "STUDENT").await;
        let s = Some(session.as_str());

        let info = json!({"name": "Alice", "school": "North", "grade": "5th", "division": "B"});
        send(&router, Method::POST, "/api/student/registration", s, Some(info)).await;
        let areas = json!({"weakAreas": ["Algebra"], "learningStyle": "Visual"});
        let (_, body) = send(&router, Method::POST, "/api/student/weak-areas", s, Some(areas)).await;
        let total = body["questionCount"].as_u64().unwrap();

        let (status, _) = send(&router, Method::POST, "/api/student/assessment/analyze", s, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        store.set_failing(true);
        let mut last = StatusCode::OK;
        for _ in 0..total {
            let answer = Some(json!({"selectedOption": 0}));
            (last, _) = send(&router, Method::POST, "/api/student/assessment/answer", s, answer).await;
        }
        assert_eq!(last, StatusCode::INTERNAL_SERVER_ERROR);

        let (_, body) = send(&router, Method::GET, "/api/student/state", s, None).await;
        assert_eq!(body["step"], "analysis");

        store.set_failing(false);
        let (status, body) = send(&router, Method::POST, "/api/student/assessment/analyze", s, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["step"], "dashboard_hub");
        assert_eq!(body["profile"]["subjects"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_teacher_flow_over_http() {
        let router = test_router();
        let session = login(&router, "tina", "TEACHER").await;
        let s = Some(session.as_str());

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/teacher/groups",
            s,
            Some(json!({"school": "X", "grade": "5th", "division": "B"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let profile = json!({"firstName": "Tina", "lastName": "Moreno", "specialization": "Math"});
        let (status, _) = send(&router, Method::POST, "/api/teacher/profile", s, Some(profile.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&router, Method::POST, "/api/teacher/profile", s, Some(profile)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, group) = send(
            &router,
            Method::POST,
            "/api/teacher/groups",
            s,
            Some(json!({"school": "X", "grade": "5th", "division": "B"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let group_id = group["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/teacher/students",
            s,
            Some(json!({"code": "NOP-0000"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &router,
            Method::POST,
            "/api/teacher/students",
            s,
            Some(json!({"code": "NOP0000"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) = send(
            &router,
            Method::POST,
            "/api/teacher/students",
            s,
            Some(json!({"code": "demo-1234"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["averageScore"], 85);
        assert_eq!(body["engagementLevel"], "High");

        let uri = format!("/api/teacher/groups/{group_id}/select");
        let (status, body) = send(&router, Method::POST, &uri, s, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["students"].as_array().unwrap().len(), 1);

        let (status, body) = send(&router, Method::GET, "/api/teacher/insight", s, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["insight"], "Analysis unavailable.");

        let (status, body) = send(&router, Method::GET, "/api/teacher/state", s, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activeGroupId"], group_id);
    }

    #[tokio::test]
    async fn test_logout_invalidates_session() {
        let router = test_router();
        let session = login(&router, "alice", "STUDENT").await;
        let s = Some(session.as_str());

        let (status, _) = send(&router, Method::POST, "/api/auth/logout", s, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&router, Method::GET, "/api/student/state", s, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_json_returns_client_error() {
        let router = test_router();
        let response = router
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri("/api/auth/register")
                    .header("content-type", "application/json")
                    .body(Body::from("{ not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn test_duplicate_request_while_generating_returns_409() {
        let router = router_with(ScriptedGenerator::new().on(
            RequestKind::Insight,
            Step::Delay(
                std::time::Duration::from_millis(300),
                json!("Focus on fractions."),
            ),
        ));
        let session = login(&router, "tina", "TEACHER").await;
        let s = Some(session.as_str());
        let profile = json!({"firstName": "Tina", "lastName": "Moreno", "specialization": "Math"});
        send(&router, Method::POST, "/api/teacher/profile", s, Some(profile)).await;
        send(
            &router,
            Method::POST,
            "/api/teacher/groups",
            s,
            Some(json!({"school": "X", "grade": "5th", "division": "B"})),
        )
        .await;
        send(
            &router,
            Method::POST,
            "/api/teacher/students",
            s,
            Some(json!({"code": "DEMO-1234"})),
        )
        .await;

        let first = {
            let router = router.clone();
            let session = session.clone();
            tokio::spawn(async move {
                send(&router, Method::GET, "/api/teacher/insight", Some(&session), None).await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (status, _) = send(&router, Method::GET, "/api/teacher/insight", s, None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = first.await.unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["insight"], "Focus on fractions.");
    }
}
