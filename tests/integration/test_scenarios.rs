//! End-to-end scenarios for the student and teacher workflows.
//!
//! Content comes from a `ScriptedGenerator`; anything left unscripted takes
//! the fallback path, which makes assessment and lesson answers predictable
//! (option 0 is always correct).

use std::sync::Arc;

use eduadapt_core::generator::fake::ScriptedGenerator;
use eduadapt_core::{
    auth, Config, EduError, EngagementLevel, JsonFileStore, LearningStyle, ProficiencyLevel,
    ProgressionStep, Records, RequestKind, Role, Services, SessionManager, StudentFlow,
    SubjectStatus, TeacherFlow, Workflow,
};
use eduadapt_report::{EngagementBand, GroupReport, StudentRow};

fn services(generator: ScriptedGenerator) -> Services {
    Services::in_memory(Config::default(), Arc::new(generator))
}

fn basic_info() -> eduadapt_core::BasicInfo {
    eduadapt_core::BasicInfo {
        name: "Alice Doe".to_string(),
        school: "North School".to_string(),
        grade: "5th".to_string(),
        division: "B".to_string(),
    }
}

/// Registers alice and runs onboarding, answering `correct` of ten
/// fallback diagnostic items correctly.
async fn onboard_alice(services: &Services, correct: usize) -> StudentFlow {
    auth::register(&services.records, "alice", "pw1", Role::Student).expect("register alice");
    auth::login(&services.records, "alice", "pw1", Role::Student).expect("login alice");

    let mut flow = StudentFlow::start(services, "alice").expect("start flow");
    flow.submit_registration(basic_info()).expect("registration");
    flow.submit_weak_areas(
        services,
        vec!["Algebra".to_string(), "History".to_string()],
        LearningStyle::Visual,
    )
    .await
    .expect("weak areas");

    let total = flow.snapshot().question_count.expect("question count");
    assert_eq!(total, 10);
    let mut finished = false;
    for i in 0..total {
        let selected = usize::from(i >= correct);
        finished = flow.answer_question(selected).expect("answer");
    }
    assert!(finished);
    flow.run_analysis(services).await.expect("analysis");
    flow
}

/// Answers `n` lessons correctly on the named subject.
async fn study(services: &Services, flow: &mut StudentFlow, subject: &str, n: usize) {
    let id = flow
        .profile()
        .and_then(|p| p.subjects.iter().find(|s| s.name == subject))
        .map(|s| s.id.clone())
        .expect("subject exists");
    flow.enter_subject(services, &id).await.expect("enter subject");

    for _ in 0..n {
        flow.select_option(0).expect("select");
        let feedback = flow.submit_answer(services).await.expect("submit");
        assert!(feedback.is_correct);
        flow.next_lesson(services).await.expect("next lesson");
    }
}

#[tokio::test]
async fn test_onboarding_scenario() {
    let services = services(ScriptedGenerator::new().respond(
        RequestKind::Interests,
        serde_json::json!({"interests": ["Equations", "Ancient Rome"]}),
    ));
    let flow = onboard_alice(&services, 9).await;

    assert_eq!(flow.step(), ProgressionStep::DashboardHub);
    let profile = flow.profile().expect("profile");
    assert_eq!(profile.current_level, ProficiencyLevel::Advanced);
    let names: Vec<&str> = profile.subjects.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Algebra", "History"]);
    for subject in &profile.subjects {
        assert_eq!(subject.status, SubjectStatus::Active);
        assert_eq!(subject.progress, 0);
    }
}

#[tokio::test]
async fn test_full_student_and_teacher_scenario() {
    let services = services(ScriptedGenerator::new().respond(
        RequestKind::Interests,
        serde_json::json!({"interests": ["Equations"]}),
    ));
    let mut flow = onboard_alice(&services, 9).await;
    study(&services, &mut flow, "Algebra", 3).await;

    let algebra = flow
        .profile()
        .and_then(|p| p.subjects.iter().find(|s| s.name == "Algebra"))
        .cloned()
        .expect("algebra");
    assert_eq!(algebra.progress, 30);
    assert_eq!(algebra.topics_completed, 3);

    auth::register(&services.records, "tina", "pw2", Role::Teacher).expect("register tina");
    let mut teacher = TeacherFlow::start(&services, "tina").expect("start teacher");
    teacher
        .setup_profile(&services, "Tina", "Moreno", "Math")
        .expect("profile");
    teacher
        .create_group(&services, "X", "5th", "B")
        .expect("group");

    let performance = teacher
        .link_student(&services, &algebra.code.to_lowercase())
        .expect("link");
    assert_eq!(performance.average_score, 30);
    assert_eq!(performance.completed_modules, 3);
    assert_eq!(performance.engagement_level, EngagementLevel::Low);
    assert_eq!(performance.struggling_topic, "Algebra");
    assert_eq!(teacher.active_group().expect("active").students.len(), 1);

    // Later progress does not touch the linked snapshot.
    flow.return_to_hub().expect("hub");
    study(&services, &mut flow, "Algebra", 1).await;
    let groups = services.records.groups("tina").expect("groups");
    assert_eq!(groups[0].students[0].average_score, 30);
}

#[tokio::test]
async fn test_unknown_code_and_demo_code() {
    let services = services(ScriptedGenerator::new());
    auth::register(&services.records, "tina", "pw2", Role::Teacher).expect("register");
    let mut teacher = TeacherFlow::start(&services, "tina").expect("start");
    teacher
        .setup_profile(&services, "Tina", "Moreno", "Math")
        .expect("profile");
    teacher
        .create_group(&services, "X", "5th", "B")
        .expect("group");

    let err = teacher.link_student(&services, "ZZZ-0000").unwrap_err();
    assert!(matches!(err, EduError::InvalidCode { .. }));

    let demo = teacher.link_student(&services, "demo-1234").expect("demo");
    assert_eq!(demo.engagement_level, EngagementLevel::High);
    assert_eq!(teacher.active_group().expect("active").students.len(), 1);
}

#[tokio::test]
async fn test_demo_code_disabled() {
    let mut config = Config::default();
    config.demo.enabled = false;
    let services = Services::in_memory(config, Arc::new(ScriptedGenerator::new()));
    auth::register(&services.records, "tina", "pw2", Role::Teacher).expect("register");
    let mut teacher = TeacherFlow::start(&services, "tina").expect("start");
    teacher
        .setup_profile(&services, "Tina", "Moreno", "Math")
        .expect("profile");
    teacher
        .create_group(&services, "X", "5th", "B")
        .expect("group");

    let err = teacher.link_student(&services, "DEMO-1234").unwrap_err();
    assert!(matches!(err, EduError::InvalidCode { .. }));
}

#[test]
fn test_register_login_properties() {
    let services = services(ScriptedGenerator::new());
    let records = &services.records;

    for (user, role) in [("s1", Role::Student), ("t1", Role::Teacher)] {
        auth::register(records, user, "secret", role).expect("register");
        auth::login(records, user, "secret", role).expect("login");
    }

    assert!(matches!(
        auth::register(records, "s1", "other", Role::Teacher),
        Err(EduError::UserExists { .. })
    ));
    assert!(matches!(
        auth::login(records, "s1", "secret", Role::Teacher),
        Err(EduError::WrongRole { .. })
    ));
    assert!(matches!(
        auth::login(records, "s1", "wrong", Role::Student),
        Err(EduError::WrongPassword)
    ));
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let code = {
        let store = JsonFileStore::open(dir.path()).expect("open store");
        let records = Arc::new(Records::open(Arc::new(store)).expect("records"));
        let services = Services::new(
            records,
            eduadapt_core::ContentService::offline(),
            Config::default(),
        );
        let flow = onboard_alice(&services, 10).await;
        flow.profile().expect("profile").subjects[0].code.clone()
    };

    let store = JsonFileStore::open(dir.path()).expect("reopen store");
    let records = Arc::new(Records::open(Arc::new(store)).expect("records"));
    let services = Services::new(
        records,
        eduadapt_core::ContentService::offline(),
        Config::default(),
    );

    let owner = services.records.code_owner(&code).expect("code indexed");
    assert_eq!(owner.username, "alice");

    let manager = SessionManager::new();
    let slot = manager
        .login(&services, "alice", "pw1", Role::Student)
        .expect("login");
    let workflow = slot.workflow.lock().await;
    assert!(matches!(
        &*workflow,
        Workflow::Student(flow) if flow.step() == ProgressionStep::DashboardHub
    ));
}

#[tokio::test]
async fn test_group_report_from_linked_snapshots() {
    let services = services(ScriptedGenerator::new());
    let mut flow = onboard_alice(&services, 9).await;
    study(&services, &mut flow, "History", 8).await;
    let history = flow
        .profile()
        .and_then(|p| p.subjects.iter().find(|s| s.name == "History"))
        .cloned()
        .expect("history");

    auth::register(&services.records, "tina", "pw2", Role::Teacher).expect("register");
    let mut teacher = TeacherFlow::start(&services, "tina").expect("start");
    teacher
        .setup_profile(&services, "Tina", "Moreno", "Math")
        .expect("profile");
    let group_id = teacher
        .create_group(&services, "X", "5th", "B")
        .expect("group")
        .id
        .clone();
    teacher.link_student(&services, &history.code).expect("link");

    let group = teacher.active_group().expect("active").clone();
    let rows: Vec<StudentRow> = group
        .students
        .iter()
        .map(|p| StudentRow {
            student_name: p.student_name.clone(),
            school: p.school.clone(),
            grade: p.grade.clone(),
            average_score: p.average_score,
            completed_modules: p.completed_modules,
            struggling_topic: p.struggling_topic.clone(),
            engagement_level: match p.engagement_level {
                EngagementLevel::High => EngagementBand::High,
                EngagementLevel::Medium => EngagementBand::Medium,
                EngagementLevel::Low => EngagementBand::Low,
            },
        })
        .collect();

    let report = GroupReport::builder()
        .teacher("tina")
        .group_id(&group_id)
        .group_label(group.label())
        .students(rows)
        .build()
        .expect("report");

    assert_eq!(report.summary.students, 1);
    assert_eq!(report.summary.mean_score, Some(80.0));
    assert_eq!(report.summary.total_completed_modules, 8);
    assert_eq!(report.summary.engagement.high, 1);

    let dir = tempfile::tempdir().expect("tempdir");
    let files = report.write_to_dir(dir.path()).expect("write");
    assert!(files.markdown.ends_with(format!("group-report-{group_id}.md")));
    assert!(files.json.exists());
}
