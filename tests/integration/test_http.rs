//! HTTP walk-through against a server bound to an ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;

use eduadapt_core::generator::fake::ScriptedGenerator;
use eduadapt_core::{create_router, AppState, Config, RequestKind, Services, SESSION_HEADER};
use serde_json::{json, Value};
use tokio::net::TcpListener;

/// Starts the API on 127.0.0.1:0 and returns its address.
async fn spawn_server(generator: ScriptedGenerator) -> SocketAddr {
    let services = Services::in_memory(Config::default(), Arc::new(generator));
    let router = create_router(AppState::new(services));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server");
    });
    addr
}

struct Client {
    http: reqwest::Client,
    base: String,
    session: Option<String>,
}

impl Client {
    fn new(addr: SocketAddr) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: format!("http://{addr}/api"),
            session: None,
        }
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let mut request = self.http.post(format!("{}{path}", self.base)).json(&body);
        if let Some(id) = &self.session {
            request = request.header(SESSION_HEADER, id);
        }
        Self::read(request.send().await.expect("request")).await
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let mut request = self.http.get(format!("{}{path}", self.base));
        if let Some(id) = &self.session {
            request = request.header(SESSION_HEADER, id);
        }
        Self::read(request.send().await.expect("request")).await
    }

    async fn read(response: reqwest::Response) -> (u16, Value) {
        let status = response.status().as_u16();
        let text = response.text().await.expect("body");
        let value = serde_json::from_str(&text).unwrap_or(Value::Null);
        (status, value)
    }

    async fn login(&mut self, username: &str, role: &str) {
        let creds = json!({"username": username, "password": "pw", "role": role});
        let (status, _) = self.post("/auth/register", creds.clone()).await;
        assert_eq!(status, 201);
        let (status, body) = self.post("/auth/login", creds).await;
        assert_eq!(status, 200);
        self.session = body["sessionId"].as_str().map(ToString::to_string);
    }
}

#[tokio::test]
async fn test_student_and_teacher_walkthrough() {
    let addr = spawn_server(ScriptedGenerator::new().respond(
        RequestKind::Interests,
        json!({"interests": ["Equations", "Ancient Rome"]}),
    ))
    .await;

    // Student onboarding
    let mut student = Client::new(addr);
    student.login("alice", "STUDENT").await;

    let (status, _) = student
        .post(
            "/student/registration",
            json!({"name": "Alice Doe", "school": "North School", "grade": "5th", "division": "B"}),
        )
        .await;
    assert_eq!(status, 200);

    let (status, body) = student
        .post(
            "/student/weak-areas",
            json!({"weakAreas": ["Algebra", "History"], "learningStyle": "Visual"}),
        )
        .await;
    assert_eq!(status, 200);
    assert!(body["question"].get("correctIndex").is_none());
    let total = body["questionCount"].as_u64().expect("count");

    let mut body = Value::Null;
    for i in 0..total {
        let selected = u64::from(i == total - 1);
        let (status, next) = student
            .post("/student/assessment/answer", json!({"selectedOption": selected}))
            .await;
        assert_eq!(status, 200);
        body = next;
    }
    assert_eq!(body["step"], "dashboard_hub");
    assert_eq!(body["profile"]["currentLevel"], "Advanced");

    let algebra = body["profile"]["subjects"]
        .as_array()
        .and_then(|s| s.iter().find(|s| s["name"] == "Algebra"))
        .cloned()
        .expect("algebra");
    let algebra_id = algebra["id"].as_str().expect("id");
    let algebra_code = algebra["code"].as_str().expect("code").to_string();

    // Three correct lessons
    let (status, body) = student
        .post(&format!("/student/subjects/{algebra_id}/enter"), json!({}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["step"], "lesson");

    for _ in 0..3 {
        let (status, _) = student
            .post("/student/lesson/select", json!({"selectedOption": 0}))
            .await;
        assert_eq!(status, 200);
        let (status, feedback) = student.post("/student/lesson/submit", json!({})).await;
        assert_eq!(status, 200);
        assert_eq!(feedback["isCorrect"], true);

        let (status, _) = student.post("/student/lesson/submit", json!({})).await;
        assert_eq!(status, 409);

        let (status, _) = student.post("/student/lesson/next", json!({})).await;
        assert_eq!(status, 200);
    }

    let (_, state) = student.get("/student/state").await;
    assert_eq!(state["activeSubject"]["progress"], 30);
    assert_eq!(state["activeSubject"]["topicsCompleted"], 3);

    // Teacher links the Algebra code
    let mut teacher = Client::new(addr);
    teacher.login("tina", "TEACHER").await;

    let (status, _) = teacher
        .post(
            "/teacher/profile",
            json!({"firstName": "Tina", "lastName": "Moreno", "specialization": "Math"}),
        )
        .await;
    assert_eq!(status, 201);
    let (status, _) = teacher
        .post(
            "/teacher/groups",
            json!({"school": "X", "grade": "5th", "division": "B"}),
        )
        .await;
    assert_eq!(status, 201);

    let (status, body) = teacher
        .post("/teacher/students", json!({"code": algebra_code}))
        .await;
    assert_eq!(status, 201);
    assert_eq!(body["averageScore"], 30);
    assert_eq!(body["engagementLevel"], "Low");

    let (status, body) = teacher
        .post("/teacher/students", json!({"code": "QQQ-1111"}))
        .await;
    assert_eq!(status, 404);
    assert!(body["error"].as_str().expect("error").contains("QQQ-1111"));

    let (_, state) = teacher.get("/teacher/state").await;
    assert_eq!(state["groups"][0]["students"].as_array().map(Vec::len), Some(1));

    // Sessions are role-bound
    let (status, _) = teacher.get("/student/state").await;
    assert_eq!(status, 403);
}
