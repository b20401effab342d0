use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use leavedesk_agent::calendar::RecordingCalendarGateway;
use leavedesk_agent::directory::InMemoryEmployeeDirectory;
use leavedesk_agent::handlers::{
    EmployeeRecordsHandler, GeneralHrHandler, HandlerRegistry, LeaveHandler,
};
use leavedesk_agent::lifecycle::DecisionOutcome;
use leavedesk_agent::llm::ScriptedLlmClient;
use leavedesk_agent::{
    Category, GatewayError, IntentClassifier, LeaveEngine, Orchestrator, RoutingPolicy,
};
use leavedesk_core::clock::FixedClock;
use leavedesk_core::domain::conversation::{ConversationContext, ConversationTurn};
use leavedesk_core::domain::leave::{
    LeaveKind, LeaveRequest, LeaveRequestId, LeaveStatus, LeaveWindow, NewLeaveRequest,
};
use leavedesk_core::domain::user::{Role, User, UserId, UserProfile};
use leavedesk_core::selector::LeaveSelector;
use leavedesk_db::repositories::{
    ConversationRepository, InMemoryConversationRepository, InMemoryLeaveRequestRepository,
    InMemoryUserRepository, LeaveRequestRepository, RepositoryError, SqlLeaveRequestRepository,
    SqlUserRepository, UserRepository,
};
use leavedesk_db::{connect_with_settings, migrations};

const CLASSIFIER: &str = "As an HR intent classifier";
const LEAVE_INTENT: &str = "As a leave management classifier";
const SUBMIT_EXTRACTION: &str = "Extract the following leave request details";
const APPROVAL_EXTRACTION: &str = "Extract leave approval details";
const CANCEL_EXTRACTION: &str = "Extract leave cancellation details";
const GENERAL_ANSWER: &str = "CURRENT QUERY";
const EVALUATOR: &str = "As an HRMS response evaluator";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
}

fn user(id: &str, name: &str, role: Role, manager: Option<&str>) -> User {
    User {
        id: UserId(id.to_string()),
        username: name.to_string(),
        email: format!("{}@example.com", id.to_lowercase()),
        phone: None,
        role,
        manager_id: manager.map(|m| UserId(m.to_string())),
    }
}

fn leave(id: i64, owner: &str, start: &str, end: &str, status: LeaveStatus) -> LeaveRequest {
    let now = Utc::now();
    LeaveRequest {
        id: LeaveRequestId(id),
        employee_id: UserId(owner.to_string()),
        kind: LeaveKind::Annual,
        window: LeaveWindow::parse(start, end).expect("window"),
        half_day: false,
        reason: "trip".to_string(),
        status,
        approved_by: None,
        approved_at: None,
        comment: None,
        created_at: now,
        updated_at: now,
    }
}

fn profile(id: &str, name: &str, role: Role) -> UserProfile {
    UserProfile {
        user_id: UserId(id.to_string()),
        display_name: name.to_string(),
        email: None,
        role,
    }
}

struct Desk {
    orchestrator: Orchestrator,
    engine: Arc<LeaveEngine>,
    leaves: Arc<InMemoryLeaveRequestRepository>,
    conversations: Arc<InMemoryConversationRepository>,
    llm: Arc<ScriptedLlmClient>,
}

async fn desk(llm: ScriptedLlmClient, calendar: RecordingCalendarGateway) -> Desk {
    let users = Arc::new(InMemoryUserRepository::with_users([
        user("U-hr", "Hannah Hughes", Role::Hr, None),
        user("U-mgr", "Marcus Miller", Role::Manager, None),
        user("U-1", "John Smith", Role::Employee, Some("U-mgr")),
        user("U-2", "John Doe", Role::Employee, Some("U-mgr")),
        user("U-3", "Priya Patel", Role::Employee, Some("U-mgr")),
    ]));
    let leaves = Arc::new(InMemoryLeaveRequestRepository::new(users.clone()));
    leaves.seed(leave(1, "U-1", "2024-06-03", "2024-06-07", LeaveStatus::Pending)).await;
    leaves.seed(leave(2, "U-2", "2024-06-10", "2024-06-11", LeaveStatus::Pending)).await;
    leaves.seed(leave(3, "U-1", "2024-05-20", "2024-05-21", LeaveStatus::Rejected)).await;
    leaves.seed(leave(4, "U-3", "2024-02-05", "2024-02-09", LeaveStatus::Approved)).await;

    let llm = Arc::new(llm);
    let clock = Arc::new(FixedClock::on(today()));
    let engine = Arc::new(
        LeaveEngine::new(users, leaves.clone(), Arc::new(calendar)).with_clock(clock.clone()),
    );
    let directory = Arc::new(InMemoryEmployeeDirectory::new(
        ["Name", "Phone"],
        [["Priya Patel", "+15550009999"]],
    ));
    let registry = HandlerRegistry::new()
        .register(Arc::new(LeaveHandler::new(llm.clone(), engine.clone())))
        .register(Arc::new(EmployeeRecordsHandler::new(llm.clone(), directory)))
        .register(Arc::new(GeneralHrHandler::new(llm.clone())));
    let conversations = Arc::new(InMemoryConversationRepository::default());
    let orchestrator = Orchestrator::new(
        IntentClassifier::new(llm.clone()),
        registry,
        conversations.clone(),
        llm.clone(),
        clock,
    );
    Desk { orchestrator, engine, leaves, conversations, llm }
}

#[tokio::test]
async fn complete_request_is_stored_pending_with_inclusive_duration() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "request")
        .reply_when(
            SUBMIT_EXTRACTION,
            r#"{"leave_type": "annual", "start_date": "2024-05-15", "end_date": "2024-05-18",
                "reason": "family trip", "half_day": false, "employee_name": null}"#,
        );
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk
        .orchestrator
        .route(
            "I want annual leave from May 15 to May 18 for a family trip",
            &priya,
            ConversationContext::new(),
        )
        .await;

    assert_eq!(outcome.category, Category::LeaveManager);
    assert!(!outcome.arbitrated);
    assert!(outcome.response.contains("- Request ID: 5"), "{}", outcome.response);
    assert!(outcome.response.contains("- Duration: 4 day(s)"));
    assert!(outcome.response.contains("- Status: Pending"));
    // Fourteen days of notice meets the policy, so no advisory note is appended.
    assert!(!outcome.response.contains("Note:"));

    let stored = desk.leaves.find_by_id(LeaveRequestId(5)).await.expect("lookup").expect("created");
    assert_eq!(stored.request.status, LeaveStatus::Pending);
    assert_eq!(stored.request.employee_id, UserId("U-3".to_string()));
    assert_eq!(stored.request.reason, "family trip");
}

#[tokio::test]
async fn missing_fields_are_requested_without_creating_a_record() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "request")
        .reply_when(
            SUBMIT_EXTRACTION,
            r#"{"leave_type": null, "start_date": "2024-05-15", "end_date": null, "reason": null, "half_day": false}"#,
        );
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome =
        desk.orchestrator.route("I need some time off", &priya, ConversationContext::new()).await;

    assert!(outcome.response.contains("Could you please provide the leave type, end date?"));
    assert!(desk.leaves.find_by_id(LeaveRequestId(5)).await.expect("lookup").is_none());
}

#[tokio::test]
async fn short_notice_submission_carries_an_advisory_note() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "request")
        .reply_when(
            SUBMIT_EXTRACTION,
            r#"{"leave_type": "annual", "start_date": "2024-05-06", "end_date": "2024-05-07", "reason": null, "half_day": false}"#,
        );
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk
        .orchestrator
        .route("Annual leave next Monday and Tuesday", &priya, ConversationContext::new())
        .await;

    assert!(outcome.response.contains("- Duration: 2 day(s)"));
    assert!(outcome.response.ends_with(
        "Note: Leave requested with only 5 days notice. Company policy recommends 14 days notice."
    ));
    let stored = desk.leaves.find_by_id(LeaveRequestId(5)).await.expect("lookup").expect("created");
    assert_eq!(stored.request.reason, "Not specified");
}

#[tokio::test]
async fn ambiguous_approval_lists_candidates_and_changes_nothing() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "approval")
        .reply_when(
            APPROVAL_EXTRACTION,
            r#"{"request_id": null, "employee_name": "john", "decision": "approve", "comment": null}"#,
        );
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let hr = profile("U-hr", "Hannah Hughes", Role::Hr);

    let outcome =
        desk.orchestrator.route("Approve John's leave", &hr, ConversationContext::new()).await;

    assert!(outcome.response.contains("ID: 1 - John Smith"), "{}", outcome.response);
    assert!(outcome.response.contains("ID: 2 - John Doe"));
    for id in [1, 2] {
        let record =
            desk.leaves.find_by_id(LeaveRequestId(id)).await.expect("lookup").expect("row");
        assert_eq!(record.request.status, LeaveStatus::Pending);
    }
}

#[tokio::test]
async fn employees_cannot_approve_and_no_extraction_is_attempted() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "approval");
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let john = profile("U-1", "John Smith", Role::Employee);

    let outcome = desk
        .orchestrator
        .route("Approve leave request #2", &john, ConversationContext::new())
        .await;

    assert!(
        outcome.response.starts_with("You don't have permission to approve leave requests."),
        "{}",
        outcome.response
    );
    assert_eq!(desk.llm.prompts_containing(APPROVAL_EXTRACTION), 0);
    let record = desk.leaves.find_by_id(LeaveRequestId(2)).await.expect("lookup").expect("row");
    assert_eq!(record.request.status, LeaveStatus::Pending);
}

#[tokio::test]
async fn cancelling_a_rejected_request_reports_nothing_to_cancel() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "cancel")
        .reply_when(
            CANCEL_EXTRACTION,
            r#"{"request_id": 3, "start_date": null, "end_date": null}"#,
        );
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let john = profile("U-1", "John Smith", Role::Employee);

    let outcome =
        desk.orchestrator.route("Cancel leave request #3", &john, ConversationContext::new()).await;

    let nothing_to_cancel =
        "I couldn't find any active leave requests that match your cancellation criteria.";
    assert!(outcome.response.starts_with(nothing_to_cancel));
    let record = desk.leaves.find_by_id(LeaveRequestId(3)).await.expect("lookup").expect("row");
    assert_eq!(record.request.status, LeaveStatus::Rejected);
}

#[tokio::test]
async fn balance_subtracts_approved_days_from_the_allotment() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "balance");
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk
        .orchestrator
        .route("How many leave days do I have left?", &priya, ConversationContext::new())
        .await;

    assert!(
        outcome.response.contains("Annual Leave: 15 days remaining (used 5 of 20)"),
        "{}",
        outcome.response
    );
    assert!(outcome.response.contains("Sick Leave: 10 days remaining (used 0 of 10)"));
}

#[tokio::test]
async fn default_category_answers_are_never_arbitrated() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "something else entirely")
        .reply_when(GENERAL_ANSWER, "Happy to help with that.")
        .reply_when(EVALUATOR, "backup");
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk
        .orchestrator
        .route("Who organises the team lunch?", &priya, ConversationContext::new())
        .await;

    assert_eq!(outcome.category, Category::GeneralHr);
    assert_eq!(outcome.confidence, 0.5);
    assert!(!outcome.arbitrated);
    assert_eq!(outcome.response, "Happy to help with that.");
    assert_eq!(desk.llm.prompts_containing(EVALUATOR), 0);
}

#[tokio::test]
async fn hr_override_routes_to_leave_management_without_arbitration() {
    // The classifier has no scripted answer, so it fails with low confidence.
    let llm = ScriptedLlmClient::new()
        .reply_when(LEAVE_INTENT, "balance")
        .reply_when(EVALUATOR, "backup");
    let desk = desk(llm, RecordingCalendarGateway::default()).await;
    let hr = profile("U-hr", "Hannah Hughes", Role::Hr);

    let outcome = desk
        .orchestrator
        .route("Admin action: show my leave balance", &hr, ConversationContext::new())
        .await;

    assert!(outcome.overridden);
    assert_eq!(outcome.category, Category::LeaveManager);
    assert_eq!(outcome.confidence, 0.3);
    assert!(!outcome.arbitrated);
    assert!(outcome.response.starts_with("Here's your current leave balance for 2024"));
    assert_eq!(desk.llm.prompts_containing(EVALUATOR), 0);
}

#[tokio::test]
async fn low_confidence_answers_are_arbitrated_but_the_log_keeps_the_primary() {
    let llm = ScriptedLlmClient::new()
        .reply_when(EVALUATOR, "Backup.")
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "balance")
        .reply_when(GENERAL_ANSWER, "Please check the HR portal.");
    let mut desk = desk(llm, RecordingCalendarGateway::default()).await;
    desk.orchestrator = desk
        .orchestrator
        .with_policy(RoutingPolicy { confidence_threshold: 0.95, ..RoutingPolicy::default() });
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk.orchestrator.route("leave?", &priya, ConversationContext::new()).await;

    assert!(outcome.arbitrated);
    assert_eq!(outcome.response, "Please check the HR portal.");
    let logged = desk.conversations.recent_turns(&priya.user_id, 10).await.expect("turns");
    assert_eq!(logged.len(), 2);
    assert!(logged[1].content.starts_with("Here's your current leave balance"));
    assert_eq!(outcome.context.turns()[1].content, "Please check the HR portal.");
}

#[tokio::test]
async fn unreadable_arbitration_keeps_the_primary_answer() {
    let llm = ScriptedLlmClient::new()
        .reply_when(EVALUATOR, "both are fine")
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "balance")
        .reply_when(GENERAL_ANSWER, "Please check the HR portal.");
    let mut desk = desk(llm, RecordingCalendarGateway::default()).await;
    desk.orchestrator = desk
        .orchestrator
        .with_policy(RoutingPolicy { confidence_threshold: 0.95, ..RoutingPolicy::default() });
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk.orchestrator.route("leave?", &priya, ConversationContext::new()).await;

    assert!(outcome.arbitrated);
    assert!(outcome.response.starts_with("Here's your current leave balance"));
}

#[tokio::test]
async fn returned_context_is_bounded_by_the_policy() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "general_hr")
        .reply_when(GENERAL_ANSWER, "Noted.");
    let mut desk = desk(llm, RecordingCalendarGateway::default()).await;
    let policy = RoutingPolicy { context_turns: 2, ..RoutingPolicy::default() };
    desk.orchestrator = desk.orchestrator.with_policy(policy);
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let first = desk.orchestrator.route("first", &priya, ConversationContext::new()).await;
    let second = desk.orchestrator.route("second", &priya, first.context).await;

    assert_eq!(second.context.len(), 2);
    assert_eq!(second.context.turns()[0].content, "second");
    let logged = desk.conversations.recent_turns(&priya.user_id, 10).await.expect("turns");
    assert_eq!(logged.len(), 4);
}

fn lost_the_race(outcome: &DecisionOutcome) -> bool {
    matches!(outcome, DecisionOutcome::NotFound | DecisionOutcome::NoLongerEligible(_))
}

#[tokio::test]
async fn concurrent_approvals_have_exactly_one_winner() {
    let desk = desk(ScriptedLlmClient::new(), RecordingCalendarGateway::default()).await;
    let hr = profile("U-hr", "Hannah Hughes", Role::Hr);
    let manager = profile("U-mgr", "Marcus Miller", Role::Manager);
    let selector = LeaveSelector::by_id(LeaveRequestId(2));

    let (first, second) = tokio::join!(
        desk.engine.approve(&selector, &hr, None, "req-a"),
        desk.engine.approve(&selector, &manager, None, "req-b"),
    );
    let outcomes = [first.expect("first"), second.expect("second")];

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_applied()).count(), 1);
    assert_eq!(outcomes.iter().filter(|outcome| lost_the_race(outcome)).count(), 1);
    let record = desk.leaves.find_by_id(LeaveRequestId(2)).await.expect("lookup").expect("row");
    assert_eq!(record.request.status, LeaveStatus::Approved);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_approvals_against_sqlite_leave_one_winner_and_clean_losers() {
    let dir = tempfile::tempdir().expect("temp dir");
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("desk.db").display());
    let pool = connect_with_settings(&url, 4, 30).await.expect("connect");
    migrations::run_pending(&pool).await.expect("migrations");

    let users = Arc::new(SqlUserRepository::new(pool.clone()));
    for person in [
        user("U-hr", "Hannah Hughes", Role::Hr, None),
        user("U-1", "John Smith", Role::Employee, None),
    ] {
        users.save(person).await.expect("save user");
    }
    let leaves = Arc::new(SqlLeaveRequestRepository::new(pool));
    let created = leaves
        .insert(
            NewLeaveRequest {
                employee_id: UserId("U-1".to_string()),
                kind: LeaveKind::Annual,
                window: LeaveWindow::parse("2024-06-03", "2024-06-07").expect("window"),
                half_day: false,
                reason: "trip".to_string(),
            },
            Utc::now(),
        )
        .await
        .expect("insert");
    let engine = Arc::new(
        LeaveEngine::new(users, leaves.clone(), Arc::new(RecordingCalendarGateway::default()))
            .with_clock(Arc::new(FixedClock::on(today()))),
    );

    let id = created.id;
    let mut attempts = tokio::task::JoinSet::new();
    for attempt in 0..4 {
        let engine = engine.clone();
        attempts.spawn(async move {
            let hr = profile("U-hr", "Hannah Hughes", Role::Hr);
            engine
                .approve(&LeaveSelector::by_id(id), &hr, None, &format!("req-{attempt}"))
                .await
        });
    }
    let mut outcomes = Vec::new();
    while let Some(joined) = attempts.join_next().await {
        outcomes.push(joined.expect("task").expect("losers get an outcome, not an error"));
    }

    assert_eq!(outcomes.iter().filter(|outcome| outcome.is_applied()).count(), 1);
    assert_eq!(outcomes.iter().filter(|outcome| lost_the_race(outcome)).count(), 3);
    let record = leaves.find_by_id(id).await.expect("lookup").expect("row");
    assert_eq!(record.request.status, LeaveStatus::Approved);
}

struct UnwritableLog;

#[async_trait]
impl ConversationRepository for UnwritableLog {
    async fn append_exchange(
        &self,
        _user_id: &UserId,
        _message: &str,
        _response: &str,
        _at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Decode("chat log is read-only".to_string()))
    }

    async fn recent_turns(
        &self,
        _user_id: &UserId,
        _limit: usize,
    ) -> Result<Vec<ConversationTurn>, RepositoryError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn a_failed_log_write_still_returns_the_answer() {
    let llm = Arc::new(
        ScriptedLlmClient::new()
            .reply_when(CLASSIFIER, "general_hr")
            .reply_when(GENERAL_ANSWER, "Payday is the last Friday of the month."),
    );
    let orchestrator = Orchestrator::new(
        IntentClassifier::new(llm.clone()),
        HandlerRegistry::new().register(Arc::new(GeneralHrHandler::new(llm.clone()))),
        Arc::new(UnwritableLog),
        llm.clone(),
        Arc::new(FixedClock::on(today())),
    );
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = orchestrator.route("when is payday?", &priya, ConversationContext::new()).await;

    assert_eq!(outcome.category, Category::GeneralHr);
    assert_eq!(outcome.response, "Payday is the last Friday of the month.");
    assert_eq!(outcome.context.len(), 2);
}

#[tokio::test]
async fn arbitration_gateway_errors_keep_the_primary_answer() {
    let llm = ScriptedLlmClient::new()
        .fail_when(EVALUATOR, GatewayError::Transport("connection reset".to_string()))
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "balance")
        .reply_when(GENERAL_ANSWER, "Please check the HR portal.");
    let mut desk = desk(llm, RecordingCalendarGateway::default()).await;
    desk.orchestrator = desk
        .orchestrator
        .with_policy(RoutingPolicy { confidence_threshold: 0.95, ..RoutingPolicy::default() });
    let priya = profile("U-3", "Priya Patel", Role::Employee);

    let outcome = desk.orchestrator.route("leave?", &priya, ConversationContext::new()).await;

    assert!(outcome.arbitrated);
    assert_eq!(desk.llm.prompts_containing(EVALUATOR), 1);
    assert!(outcome.response.starts_with("Here's your current leave balance"));
}

#[tokio::test]
async fn calendar_failures_do_not_block_approval() {
    let llm = ScriptedLlmClient::new()
        .reply_when(CLASSIFIER, "leave_manager")
        .reply_when(LEAVE_INTENT, "approval")
        .reply_when(
            APPROVAL_EXTRACTION,
            r##"{"request_id": "#2", "employee_name": null, "decision": "approved", "comment": "Enjoy"}"##,
        );
    let desk = desk(llm, RecordingCalendarGateway::failing()).await;
    let manager = profile("U-mgr", "Marcus Miller", Role::Manager);

    let outcome = desk
        .orchestrator
        .route("Approve leave request #2", &manager, ConversationContext::new())
        .await;

    assert!(outcome
        .response
        .starts_with("Leave request #2 for John Doe has been approved successfully."));
    let record = desk.leaves.find_by_id(LeaveRequestId(2)).await.expect("lookup").expect("row");
    assert_eq!(record.request.status, LeaveStatus::Approved);
    assert_eq!(record.request.comment.as_deref(), Some("Enjoy"));
    assert_eq!(record.request.approved_by, Some(UserId("U-mgr".to_string())));
}
