//! Integration tests: repair loop, improve, and save against fake
//! collaborators.

use duet_core::*;
use duet_editor::*;
use pretty_assertions::assert_eq;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const DANGLING: &str = include_str!("fixtures/dangling_rel.mmd");
const BANKING: &str = include_str!("fixtures/banking.mmd");

const FIXED: &str = "\
C4Context
    title Payments
    Person(payer, \"Payer\")
    System(gateway, \"Payment Gateway\", \"Routes card payments\")
    System_Ext(acquirer, \"Acquirer\")
    Rel(payer, gateway, \"Pays with\")
    Rel(gateway, acquirer, \"Forwards to\", \"ISO 8583\")
";

// ─── Fakes ──────────────────────────────────────────────────────────────

/// Replays scripted replies and records every request it receives.
struct ScriptedService {
    replies: Mutex<VecDeque<Result<CorrectionResponse, CollaboratorError>>>,
    requests: Mutex<Vec<CorrectionRequest>>,
}

impl ScriptedService {
    fn new(replies: Vec<Result<CorrectionResponse, CollaboratorError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<CorrectionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl CorrectionService for ScriptedService {
    async fn correct(
        &self,
        request: CorrectionRequest,
    ) -> Result<CorrectionResponse, CollaboratorError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::Unavailable("script exhausted".into())))
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<Vec<SaveRequest>>,
    fail: bool,
}

impl Persistence for MemoryStore {
    async fn save(&self, request: SaveRequest) -> Result<(), CollaboratorError> {
        if self.fail {
            return Err(CollaboratorError::Unavailable("connection reset".into()));
        }
        self.saved.lock().unwrap().push(request);
        Ok(())
    }
}

fn config() -> EditorConfig {
    EditorConfig {
        repair_delay: Duration::ZERO,
        ..EditorConfig::default()
    }
}

/// A controller whose text editor holds the dangling diagram.
fn broken_controller() -> SyncController {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut c = SyncController::from_text(DiagramCategory::C4, FIXED, config()).unwrap();
    let err = c.set_text(DANGLING).unwrap_err();
    assert_eq!(err.cause(), FailureCause::NotParseable);
    c
}

fn still_dangling(missing: &str) -> String {
    DANGLING.replace("acquirer", missing)
}

// ─── Repair ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn repair_gives_up_after_three_invalid_candidates() {
    let mut c = broken_controller();
    let graph_before = c.graph().clone();
    let service = ScriptedService::new(vec![
        Ok(CorrectionResponse::improved(still_dangling("bank"))),
        Ok(CorrectionResponse::improved(still_dangling("ledger"))),
        Ok(CorrectionResponse::improved(still_dangling("clearing"))),
        Ok(CorrectionResponse::improved(FIXED)),
    ]);

    let state = repair(&mut c, &service, &AdapterValidator).await.unwrap();

    let RepairState::Exhausted {
        attempts,
        last_error,
    } = state
    else {
        panic!("expected exhaustion, got {state:?}");
    };
    assert_eq!(attempts, MAX_REPAIR_ATTEMPTS);
    assert!(last_error.contains("clearing"), "last error: {last_error}");
    assert_eq!(c.last_error(), Some(last_error.as_str()));

    assert_eq!(c.text(), DANGLING, "text must stay as it was before the loop");
    assert_eq!(c.graph(), &graph_before);
    assert!(!c.is_busy());

    let requests = service.requests();
    assert_eq!(requests.len(), 3, "the fourth reply must never be requested");
    assert_eq!(requests[0].content, DANGLING);
    assert!(requests[0].error_message.as_deref().unwrap().contains("acquirer"));
    assert_eq!(requests[1].content, still_dangling("bank"));
    assert!(requests[1].error_message.as_deref().unwrap().contains("bank"));
    assert_eq!(requests[2].content, still_dangling("ledger"));
    assert!(requests.iter().all(|r| r.category == DiagramCategory::C4));
}

#[tokio::test]
async fn repair_adopts_first_valid_candidate() {
    let mut c = broken_controller();
    let service = ScriptedService::new(vec![
        Ok(CorrectionResponse::improved(still_dangling("bank"))),
        Ok(CorrectionResponse::improved(FIXED)),
    ]);

    let mut repair_loop = RepairLoop::for_controller(&c);
    let state = repair_loop
        .run(&mut c, &service, &AdapterValidator)
        .await
        .unwrap();

    assert_eq!(state, RepairState::Succeeded { attempts: 2 });
    assert_eq!(
        repair_loop.history(),
        [
            RepairState::Idle,
            RepairState::Attempting(1),
            RepairState::Attempting(2),
            RepairState::Succeeded { attempts: 2 },
        ]
    );
    assert_eq!(c.text(), FIXED);
    assert_eq!(c.graph().nodes.len(), 3);
    assert_eq!(c.last_error(), None);
    assert!(!c.is_fixing());
}

#[tokio::test]
async fn transport_failure_counts_as_an_attempt() {
    let mut c = broken_controller();
    let service = ScriptedService::new(vec![
        Err(CollaboratorError::Unavailable("timeout".into())),
        Ok(CorrectionResponse::failed("model overloaded")),
        Ok(CorrectionResponse::improved(FIXED)),
    ]);

    let state = repair(&mut c, &service, &AdapterValidator).await.unwrap();
    assert_eq!(state, RepairState::Succeeded { attempts: 3 });

    let requests = service.requests();
    assert_eq!(requests[1].content, DANGLING, "no candidate yet, resend the original");
    assert!(requests[1].error_message.as_deref().unwrap().contains("timeout"));
    assert_eq!(
        requests[2].error_message.as_deref(),
        Some("model overloaded")
    );
}

#[tokio::test]
async fn repair_refuses_to_start_while_busy() {
    let mut c = broken_controller();
    c.begin_repair().unwrap();
    let service = ScriptedService::new(vec![Ok(CorrectionResponse::improved(FIXED))]);

    let err = repair(&mut c, &service, &AdapterValidator).await.unwrap_err();
    assert_eq!(err, SyncError::Busy);
    assert!(service.requests().is_empty());
}

// ─── Improve ────────────────────────────────────────────────────────────

#[tokio::test]
async fn improve_adopts_valid_reply() {
    let mut c = SyncController::from_text(DiagramCategory::C4, BANKING, config()).unwrap();
    let improved = BANKING.replace("title Internet Banking", "title Internet Banking (v2)");
    let service = ScriptedService::new(vec![Ok(CorrectionResponse::improved(improved.clone()))]);

    improve(&mut c, &service, &AdapterValidator).await.unwrap();

    assert_eq!(c.text(), improved);
    let requests = service.requests();
    let request = &requests[0];
    assert_eq!(request.content, BANKING);
    assert_eq!(request.error_message, None);
}

#[tokio::test]
async fn improve_keeps_diagram_on_invalid_reply() {
    let mut c = SyncController::from_text(DiagramCategory::C4, BANKING, config()).unwrap();
    let service = ScriptedService::new(vec![Ok(CorrectionResponse::improved(DANGLING))]);

    let err = improve(&mut c, &service, &AdapterValidator).await.unwrap_err();
    assert_eq!(err.cause(), FailureCause::NotRenderable);
    assert_eq!(c.text(), BANKING);
    assert!(!c.is_busy());
}

#[tokio::test]
async fn improve_reports_rejection() {
    let mut c = SyncController::from_text(DiagramCategory::C4, BANKING, config()).unwrap();
    let service = ScriptedService::new(vec![Ok(CorrectionResponse::failed("quota exceeded"))]);

    let err = improve(&mut c, &service, &AdapterValidator).await.unwrap_err();
    assert_eq!(err.cause(), FailureCause::Rejected);
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(c.text(), BANKING);
}

// ─── Save ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn save_sends_current_text() {
    let mut c = SyncController::from_text(DiagramCategory::C4, BANKING, config()).unwrap();
    c.apply_mutation(CanvasMutation::RelabelNode {
        id: NodeId::intern("mail"),
        label: "Mail".into(),
    })
    .unwrap();
    let store = MemoryStore::default();

    c.save(&store, "artifact-42").await.unwrap();

    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].artifact_id, "artifact-42");
    assert_eq!(saved[0].content, c.text());
    assert!(!c.is_syncing());
}

#[tokio::test]
async fn failed_save_is_reported_and_clears_busy() {
    let mut c = SyncController::from_text(DiagramCategory::C4, BANKING, config()).unwrap();
    let store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };

    let err = c.save(&store, "artifact-42").await.unwrap_err();
    assert_eq!(err.cause(), FailureCause::ServiceUnavailable);
    assert!(!c.is_busy());
    assert_eq!(c.text(), BANKING);
}

#[tokio::test]
async fn save_prefers_canvas_over_unparsed_text() {
    let mut c = broken_controller();
    let store = MemoryStore::default();

    c.save(&store, "payments").await.unwrap();

    let saved = store.saved.lock().unwrap();
    assert_eq!(saved[0].content, FIXED);
    assert_eq!(c.text(), FIXED);
}

#[tokio::test]
async fn failed_save_keeps_typed_text() {
    let mut c = broken_controller();
    let canvas = c.graph().clone();
    let store = MemoryStore {
        fail: true,
        ..MemoryStore::default()
    };

    let err = c.save(&store, "payments").await.unwrap_err();
    assert_eq!(err.cause(), FailureCause::ServiceUnavailable);
    assert_eq!(c.text(), DANGLING);
    assert_eq!(c.graph(), &canvas);
    assert!(c.last_error().is_some(), "the parse error is still pending");
    assert!(!c.is_busy());
}
