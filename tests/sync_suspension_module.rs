use agentdeck::api::{ExecutionId, ExecutionSnapshot, ExecutionStatus, ToolCall};
use agentdeck::channel::ChannelEvent;
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

fn coordinator_with_pending_call() -> (SyncCoordinator, u64) {
    let mut coordinator = SyncCoordinator::new();
    let actions = coordinator.select(Some(exec_id("exec-1")));
    let generation = fetch_generation(&actions);
    coordinator.apply_snapshot(generation, Ok(interrupted_snapshot(1)));
    (coordinator, generation)
}

#[test]
fn beginning_an_edit_suspends_synchronization_and_detaches_push() {
    let (mut coordinator, _) = coordinator_with_pending_call();
    assert_eq!(coordinator.mode(), SyncMode::PushAttached);

    let actions = coordinator.begin_edit(0);
    assert_eq!(coordinator.mode(), SyncMode::Suspended);
    assert!(actions.contains(&SyncAction::CloseChannel));
    assert!(coordinator.is_editing());
    assert_eq!(
        coordinator.edit(0).unwrap().original_args,
        r#"{"q":"weather"}"#
    );
}

#[test]
fn no_tick_or_event_applies_a_snapshot_while_editing() {
    let (mut coordinator, generation_before) = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    let frozen = coordinator.snapshot().cloned().unwrap();

    assert!(coordinator.poll_tick().is_empty());

    let event = ChannelEvent::decode(
        r#"{"type": "state_update", "data": {"execution_id": "exec-1"}, "timestamp": 4}"#,
    )
    .unwrap();
    assert!(coordinator.channel_event(&event).is_empty());

    // A fetch issued before suspension completes afterwards: its generation
    // is stale, so the result is discarded.
    let dropped =
        coordinator.apply_snapshot(generation_before, Ok(interrupted_snapshot(99)));
    assert!(dropped.is_empty());
    assert_eq!(coordinator.snapshot(), Some(&frozen));
}

#[test]
fn cancelling_the_last_edit_resumes_polling_with_one_immediate_fetch() {
    let (mut coordinator, _) = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    coordinator.update_edit(0, r#"{"q":"forecast"}"#.to_string());

    let actions = coordinator.cancel_edit(0);
    assert_eq!(coordinator.mode(), SyncMode::Polling);
    assert!(!coordinator.is_editing());
    assert!(matches!(actions[0], SyncAction::FetchSnapshot { .. }));
    assert!(actions.contains(&SyncAction::FetchRoster));
}

#[test]
fn cancelling_an_unknown_edit_changes_nothing() {
    let (mut coordinator, _) = coordinator_with_pending_call();
    assert!(coordinator.cancel_edit(3).is_empty());
    assert_eq!(coordinator.mode(), SyncMode::PushAttached);
}

#[test]
fn edit_cannot_begin_without_a_pending_call() {
    let mut coordinator = SyncCoordinator::new();
    coordinator.select(Some(exec_id("exec-1")));
    assert!(coordinator.begin_edit(0).is_empty());
    assert!(!coordinator.is_editing());
    assert_eq!(coordinator.mode(), SyncMode::Polling);
}

#[test]
fn a_new_pending_set_invalidates_stale_edit_sessions() {
    let (mut coordinator, _) = coordinator_with_pending_call();
    coordinator.begin_edit(0);
    let resume = coordinator.cancel_edit(0);
    let generation = fetch_generation(&resume);

    let mut changed = interrupted_snapshot(2);
    changed.pending_tool_calls = vec![ToolCall {
        id: "t2".to_string(),
        name: "lookup".to_string(),
        args: "{}".to_string(),
    }];
    coordinator.apply_snapshot(generation, Ok(changed));
    assert!(coordinator.edit(0).is_none());
}
