use agentdeck::api::{Decision, EngineError, ExecutionId, ExecutionSnapshot, ExecutionStatus, ToolCall};
use agentdeck::sync::{SyncAction, SyncCoordinator, SyncMode};
use std::collections::BTreeMap;

fn exec_id(raw: &str) -> ExecutionId {
    ExecutionId::parse(raw).unwrap()
}

fn interrupted_snapshot(saved_at: i64) -> ExecutionSnapshot {
    ExecutionSnapshot {
        execution_id: exec_id("exec-1"),
        status: ExecutionStatus::Interrupted,
        message_history: Vec::new(),
        context: BTreeMap::new(),
        node_execution_log: BTreeMap::new(),
        saved_at,
        current_node: "ToolDecision".to_string(),
        pending_tool_calls: vec![ToolCall {
            id: "t1".to_string(),
            name: "search".to_string(),
            args: r#"{"q":"weather"}"#.to_string(),
        }],
        result: None,
        error: None,
    }
}

fn fetch_generation(actions: &[SyncAction]) -> u64 {
    actions
        .iter()
        .find_map(|action| match action {
            SyncAction::FetchSnapshot { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("expected a snapshot fetch")
}

fn submissions(actions: &[SyncAction]) -> Vec<&SyncAction> {
    actions
        .iter()
        .filter(|action| matches!(action, SyncAction::Submit { .. }))
        .collect()
}

fn coordinator_with_pending_call() -> SyncCoordinator {
    let mut coordinator = SyncCoordinator::new();
    let actions = coordinator.select(Some(exec_id("exec-1")));
    let generation = fetch_generation(&actions);
    coordinator.apply_snapshot(generation, Ok(interrupted_snapshot(1)));
    coordinator
}

#[test]
fn edited_arguments_submit_as_a_rejection_with_the_replacement() {
    let mut coordinator = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    coordinator.update_edit(0, r#"{"q":"forecast"}"#.to_string());

    let actions = coordinator.submit(0);
    let submitted = submissions(&actions);
    assert_eq!(submitted.len(), 1);
    match submitted[0] {
        SyncAction::Submit {
            execution_id,
            call_index,
            decision,
        } => {
            assert_eq!(execution_id.as_str(), "exec-1");
            assert_eq!(*call_index, 0);
            assert_eq!(
                decision,
                &Decision::RejectWithArgs(r#"{"q":"forecast"}"#.to_string())
            );
        }
        other => panic!("unexpected action: {other:?}"),
    }
    assert_eq!(coordinator.mode(), SyncMode::Suspended);
}

#[test]
fn submission_is_sent_exactly_once_per_resolved_call() {
    let mut coordinator = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    coordinator.update_edit(0, r#"{"q":"forecast"}"#.to_string());

    let first = coordinator.submit(0);
    assert_eq!(submissions(&first).len(), 1);

    // While the submission is in flight nothing else may go out.
    assert!(coordinator.submit(0).is_empty());
    assert!(coordinator.poll_tick().is_empty());

    // Terminal outcome resumes polling with one forced fetch and clears the
    // edit session.
    let resumed = coordinator.apply_submit_outcome(Ok(()));
    assert_eq!(coordinator.mode(), SyncMode::Polling);
    assert!(!coordinator.is_editing());
    let generation = fetch_generation(&resumed);
    assert!(resumed.contains(&SyncAction::FetchRoster));

    // The forced fetch returns the same snapshot version; the decided call
    // cannot be submitted again through any flow.
    coordinator.apply_snapshot(generation, Ok(interrupted_snapshot(1)));
    assert!(coordinator.submit(0).is_empty());

    // A newer snapshot version unblocks submission for a genuinely new
    // pending decision.
    coordinator.apply_snapshot(generation, Ok(interrupted_snapshot(2)));
    assert_eq!(submissions(&coordinator.submit(0)).len(), 1);
}

#[test]
fn confirm_as_is_suspends_until_the_outcome_then_resumes() {
    let mut coordinator = coordinator_with_pending_call();
    assert_eq!(coordinator.mode(), SyncMode::PushAttached);

    let actions = coordinator.submit(0);
    assert!(actions.contains(&SyncAction::CloseChannel));
    match submissions(&actions)[0] {
        SyncAction::Submit { decision, .. } => assert_eq!(decision, &Decision::Confirm),
        other => panic!("unexpected action: {other:?}"),
    }
    assert_eq!(coordinator.mode(), SyncMode::Suspended);

    let resumed = coordinator.apply_submit_outcome(Ok(()));
    assert_eq!(coordinator.mode(), SyncMode::Polling);
    assert!(matches!(resumed[0], SyncAction::FetchSnapshot { .. }));
}

#[test]
fn failed_submission_is_terminal_for_the_attempt() {
    let mut coordinator = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    coordinator.update_edit(0, "{broken".to_string());
    coordinator.submit(0);

    let resumed =
        coordinator.apply_submit_outcome(Err(EngineError::Invalid("bad new_args".to_string())));
    assert_eq!(coordinator.mode(), SyncMode::Polling);
    assert!(!coordinator.is_editing());
    assert!(coordinator.last_error().unwrap().contains("bad new_args"));
    assert!(!resumed.is_empty());

    // Retry requires the operator to re-initiate; the failed attempt
    // resolved this call for the current snapshot version.
    assert!(coordinator.submit(0).is_empty());
}

#[test]
fn submit_without_a_pending_call_is_a_no_op() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.select(Some(exec_id("exec-1")));
    assert!(coordinator.submit(0).is_empty());
    assert!(!coordinator.submission_in_flight());
}

#[test]
fn selection_change_mid_flight_discards_the_outcome() {
    let mut coordinator = coordinator_with_pending_call();
    coordinator.submit(0);
    coordinator.select(Some(exec_id("exec-2")));

    let actions = coordinator.apply_submit_outcome(Ok(()));
    assert!(actions.is_empty());
    assert_eq!(coordinator.mode(), SyncMode::Polling);
    assert_eq!(coordinator.selected().unwrap().as_str(), "exec-2");
}
