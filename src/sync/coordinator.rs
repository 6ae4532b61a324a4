use super::edit::EditSession;
use crate::api::{Decision, EngineError, ExecutionId, ExecutionSnapshot, ExecutionStatus};
use crate::channel::ChannelEvent;
use std::collections::BTreeMap;

/// Synchronization mode for the currently observed execution. Push is an
/// overlay over polling: while attached, poll-driven fetch remains the
/// source of record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Idle,
    Polling,
    PushAttached,
    Suspended,
}

/// Command emitted by the coordinator for the driver to execute. The
/// coordinator itself performs no I/O.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncAction {
    FetchSnapshot {
        execution_id: ExecutionId,
        generation: u64,
    },
    FetchRoster,
    OpenChannel {
        execution_id: ExecutionId,
    },
    CloseChannel,
    Submit {
        execution_id: ExecutionId,
        call_index: usize,
        decision: Decision,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Polling,
    Suspended,
}

#[derive(Debug, Clone, PartialEq)]
struct PendingSubmission {
    execution_id: ExecutionId,
    call_index: usize,
    snapshot_version: i64,
}

/// Resolved decision key: (execution, call index, snapshot version). Blocks
/// resubmission of an already-decided call until a newer snapshot arrives.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedDecision {
    execution_id: ExecutionId,
    call_index: usize,
    snapshot_version: i64,
}

/// The core state machine of the dashboard. Decides which data source is
/// active, when synchronization is suspended to protect an edit, and how a
/// pending decision is submitted exactly once. All snapshot mutation flows
/// through here; other components only receive read-only views.
#[derive(Debug, Default)]
pub struct SyncCoordinator {
    selected: Option<ExecutionId>,
    phase: Phase,
    push_attached: bool,
    push_gave_up: bool,
    generation: u64,
    snapshot: Option<ExecutionSnapshot>,
    edits: BTreeMap<usize, EditSession>,
    in_flight: Option<PendingSubmission>,
    resolved: Option<ResolvedDecision>,
    last_error: Option<String>,
}

impl Default for Phase {
    fn default() -> Self {
        Self::Idle
    }
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> SyncMode {
        match self.phase {
            Phase::Idle => SyncMode::Idle,
            Phase::Suspended => SyncMode::Suspended,
            Phase::Polling if self.push_attached => SyncMode::PushAttached,
            Phase::Polling => SyncMode::Polling,
        }
    }

    pub fn selected(&self) -> Option<&ExecutionId> {
        self.selected.as_ref()
    }

    pub fn snapshot(&self) -> Option<&ExecutionSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn edit(&self, call_index: usize) -> Option<&EditSession> {
        self.edits.get(&call_index)
    }

    pub fn is_editing(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn submission_in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn dismiss_error(&mut self) {
        self.last_error = None;
    }

    /// Surfaces an operator-visible message from outside the state machine
    /// (roster fetch failures, pass-through call failures).
    pub fn note_error(&mut self, message: String) {
        self.last_error = Some(message);
    }

    /// Focuses a different execution (or none). Tears down the previous
    /// execution's channel and cancels its in-flight fetches via the
    /// generation token; nothing from the old selection may mutate the
    /// snapshot afterwards.
    pub fn select(&mut self, id: Option<ExecutionId>) -> Vec<SyncAction> {
        let mut actions = Vec::new();
        if self.push_attached {
            self.push_attached = false;
            actions.push(SyncAction::CloseChannel);
        }
        self.generation += 1;
        self.snapshot = None;
        self.edits.clear();
        self.in_flight = None;
        self.resolved = None;
        self.push_gave_up = false;

        match id {
            Some(id) => {
                self.phase = Phase::Polling;
                actions.push(SyncAction::FetchSnapshot {
                    execution_id: id.clone(),
                    generation: self.generation,
                });
                actions.push(SyncAction::FetchRoster);
                self.selected = Some(id);
            }
            None => {
                self.phase = Phase::Idle;
                self.selected = None;
            }
        }
        actions
    }

    /// Periodic snapshot tick. Inert while idle or suspended.
    pub fn poll_tick(&mut self) -> Vec<SyncAction> {
        if self.phase != Phase::Polling {
            return Vec::new();
        }
        let Some(id) = self.selected.clone() else {
            return Vec::new();
        };
        vec![
            SyncAction::FetchSnapshot {
                execution_id: id,
                generation: self.generation,
            },
            SyncAction::FetchRoster,
        ]
    }

    /// Push events signal a re-fetch; they never carry authoritative state.
    pub fn channel_event(&mut self, event: &ChannelEvent) -> Vec<SyncAction> {
        if self.phase != Phase::Polling {
            return Vec::new();
        }
        let Some(selected) = self.selected.clone() else {
            return Vec::new();
        };
        let refetch = match event {
            ChannelEvent::StateUpdate { data, .. } => data.execution_id == selected,
            ChannelEvent::ExecutionStarted { .. } | ChannelEvent::ExecutionCompleted { .. } => true,
            ChannelEvent::Error { data, .. } => {
                self.last_error = Some(data.error.clone());
                false
            }
        };
        if !refetch {
            return Vec::new();
        }
        vec![
            SyncAction::FetchSnapshot {
                execution_id: selected,
                generation: self.generation,
            },
            SyncAction::FetchRoster,
        ]
    }

    /// The channel exhausted its reconnect attempts. Degrade silently to
    /// poll-only; the open is not retried until the execution is re-selected
    /// or its status leaves and re-enters `interrupted`.
    pub fn channel_gave_up(&mut self) {
        self.push_attached = false;
        self.push_gave_up = true;
    }

    /// Applies a completed snapshot fetch. Results tagged with a stale
    /// generation are dropped; failures retain the last good snapshot.
    pub fn apply_snapshot(
        &mut self,
        generation: u64,
        result: Result<ExecutionSnapshot, EngineError>,
    ) -> Vec<SyncAction> {
        if generation != self.generation {
            return Vec::new();
        }
        let snapshot = match result {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.last_error = Some(err.to_string());
                return Vec::new();
            }
        };
        if self.selected.as_ref() != Some(&snapshot.execution_id) {
            return Vec::new();
        }

        let pending_changed = self
            .snapshot
            .as_ref()
            .map(|previous| previous.pending_tool_calls != snapshot.pending_tool_calls)
            .unwrap_or(true);
        if pending_changed {
            self.edits.clear();
        }
        if let Some(resolved) = &self.resolved {
            if resolved.snapshot_version != snapshot.saved_at {
                self.resolved = None;
            }
        }

        let mut actions = Vec::new();
        if snapshot.status == ExecutionStatus::Interrupted {
            if !self.push_attached && !self.push_gave_up && self.phase == Phase::Polling {
                self.push_attached = true;
                actions.push(SyncAction::OpenChannel {
                    execution_id: snapshot.execution_id.clone(),
                });
            }
        } else {
            self.push_gave_up = false;
            if self.push_attached {
                self.push_attached = false;
                actions.push(SyncAction::CloseChannel);
            }
        }

        self.snapshot = Some(snapshot);
        actions
    }

    /// Opens an edit on a pending tool call. Entering the edit suspends
    /// synchronization: the timer stops, the channel detaches, and the
    /// generation bump discards any fetch already in flight.
    pub fn begin_edit(&mut self, call_index: usize) -> Vec<SyncAction> {
        let Some(original) = self.pending_args(call_index) else {
            return Vec::new();
        };
        self.edits
            .insert(call_index, EditSession::new(call_index, &original));

        let mut actions = Vec::new();
        if self.phase != Phase::Suspended {
            self.phase = Phase::Suspended;
            self.generation += 1;
            if self.push_attached {
                self.push_attached = false;
                actions.push(SyncAction::CloseChannel);
            }
        }
        actions
    }

    pub fn update_edit(&mut self, call_index: usize, edited_args: String) {
        if let Some(session) = self.edits.get_mut(&call_index) {
            session.edited_args = edited_args;
        }
    }

    /// Cancels one edit. When the last active session goes away and no
    /// submission is in flight, synchronization resumes with one immediate
    /// fetch.
    pub fn cancel_edit(&mut self, call_index: usize) -> Vec<SyncAction> {
        if self.edits.remove(&call_index).is_none() {
            return Vec::new();
        }
        if self.edits.is_empty() && self.in_flight.is_none() && self.phase == Phase::Suspended {
            return self.resume_polling();
        }
        Vec::new()
    }

    /// Submits the operator's decision for the pending call at `call_index`.
    /// With an edit session open the decision is a rejection carrying the
    /// edited arguments; otherwise the call is confirmed as-is. At most one
    /// submission may be in flight, and a call already resolved against the
    /// current snapshot version cannot be submitted again.
    pub fn submit(&mut self, call_index: usize) -> Vec<SyncAction> {
        if self.in_flight.is_some() {
            return Vec::new();
        }
        let Some(selected) = self.selected.clone() else {
            return Vec::new();
        };
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Vec::new();
        };
        if snapshot.pending_tool_calls.get(call_index).is_none() {
            return Vec::new();
        }
        let snapshot_version = snapshot.saved_at;
        if let Some(resolved) = &self.resolved {
            if resolved.execution_id == selected
                && resolved.call_index == call_index
                && resolved.snapshot_version == snapshot_version
            {
                return Vec::new();
            }
        }

        let decision = match self.edits.get(&call_index) {
            Some(session) if !session.edited_args.is_empty() => {
                Decision::RejectWithArgs(session.edited_args.clone())
            }
            _ => Decision::Confirm,
        };

        // The submission itself suspends synchronization so no fetch can
        // race the decision, including the confirm-as-is path.
        let mut actions = Vec::new();
        if self.phase != Phase::Suspended {
            self.phase = Phase::Suspended;
            self.generation += 1;
            if self.push_attached {
                self.push_attached = false;
                actions.push(SyncAction::CloseChannel);
            }
        }
        self.in_flight = Some(PendingSubmission {
            execution_id: selected.clone(),
            call_index,
            snapshot_version,
        });
        actions.push(SyncAction::Submit {
            execution_id: selected,
            call_index,
            decision,
        });
        actions
    }

    /// A submission reached its terminal outcome. Success and failure both
    /// end the attempt: the edit session is discarded either way, and the
    /// operator must re-initiate to retry a failed one. Synchronization
    /// resumes with one forced immediate fetch.
    pub fn apply_submit_outcome(&mut self, result: Result<(), EngineError>) -> Vec<SyncAction> {
        let Some(submission) = self.in_flight.take() else {
            return Vec::new();
        };
        if self.selected.as_ref() != Some(&submission.execution_id) {
            // Selection moved on mid-flight; the new selection already tore
            // this state down.
            return Vec::new();
        }
        self.edits.clear();
        self.resolved = Some(ResolvedDecision {
            execution_id: submission.execution_id,
            call_index: submission.call_index,
            snapshot_version: submission.snapshot_version,
        });
        if let Err(err) = result {
            self.last_error = Some(err.to_string());
        }
        self.resume_polling()
    }

    fn resume_polling(&mut self) -> Vec<SyncAction> {
        self.phase = Phase::Polling;
        self.generation += 1;
        let Some(id) = self.selected.clone() else {
            return Vec::new();
        };
        vec![
            SyncAction::FetchSnapshot {
                execution_id: id,
                generation: self.generation,
            },
            SyncAction::FetchRoster,
        ]
    }

    fn pending_args(&self, call_index: usize) -> Option<String> {
        let snapshot = self.snapshot.as_ref()?;
        if snapshot.status != ExecutionStatus::Interrupted {
            return None;
        }
        snapshot
            .pending_tool_calls
            .get(call_index)
            .map(|call| call.args.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coordinator_starts_idle_with_nothing_selected() {
        let mut coordinator = SyncCoordinator::new();
        assert_eq!(coordinator.mode(), SyncMode::Idle);
        assert!(coordinator.selected().is_none());
        assert!(coordinator.poll_tick().is_empty());
    }
}
