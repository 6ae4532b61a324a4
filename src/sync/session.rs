use super::coordinator::{SyncAction, SyncCoordinator, SyncMode};
use super::roster::RosterState;
use crate::api::{
    CheckpointSummary, ConfirmOutcome, Decision, EngineClient, EngineError, ExecuteRequest,
    ExecutionId, ExecutionSnapshot, ExecutionSummary,
};
use crate::channel::{ChannelError, ChannelEvent, ChannelState, EventChannel};
use crate::config::Settings;
use crate::shared::append_session_log_line;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Inputs delivered to the session loop. Timer ticks, channel callbacks and
/// completed background calls all interleave through one receiver, so the
/// coordinator's transitions observe them in arrival order.
enum SessionMsg {
    PollTick,
    RosterTick,
    Channel(ChannelEvent),
    SnapshotFetched {
        generation: u64,
        result: Result<ExecutionSnapshot, EngineError>,
    },
    RosterFetched(Result<Vec<ExecutionSummary>, EngineError>),
    SubmitFinished(Result<ConfirmOutcome, EngineError>),
}

/// Owns the per-session resources: the coordinator, the roster, the push
/// channel handle, the timer threads and the worker threads executing
/// coordinator actions. One instance per dashboard session; nothing lives
/// in module-level globals.
pub struct DashboardSession {
    client: Arc<EngineClient>,
    settings: Settings,
    coordinator: SyncCoordinator,
    roster: RosterState,
    channel: Option<EventChannel>,
    tx: Sender<SessionMsg>,
    rx: Receiver<SessionMsg>,
    stop: Arc<AtomicBool>,
    timers: Vec<JoinHandle<()>>,
}

fn sleep_with_stop(stop: &AtomicBool, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if stop.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(200));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !stop.load(Ordering::Relaxed)
}

impl DashboardSession {
    pub fn start(settings: Settings) -> Self {
        let (tx, rx) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let mut timers = Vec::new();

        let poll_tx = tx.clone();
        let poll_stop = Arc::clone(&stop);
        let poll_interval = settings.poll_interval();
        timers.push(thread::spawn(move || {
            while sleep_with_stop(&poll_stop, poll_interval) {
                if poll_tx.send(SessionMsg::PollTick).is_err() {
                    break;
                }
            }
        }));

        // Roster refresh runs on its own tick regardless of selection or
        // suspension; it is not a per-execution concern.
        let roster_tx = tx.clone();
        let roster_stop = Arc::clone(&stop);
        let roster_interval = settings.roster_interval();
        timers.push(thread::spawn(move || {
            while sleep_with_stop(&roster_stop, roster_interval) {
                if roster_tx.send(SessionMsg::RosterTick).is_err() {
                    break;
                }
            }
        }));

        let mut session = Self {
            client: Arc::new(EngineClient::new(&settings.api_base)),
            settings,
            coordinator: SyncCoordinator::new(),
            roster: RosterState::default(),
            channel: None,
            tx,
            rx,
            stop,
            timers,
        };
        session.log("info", "session.started", "");
        session.spawn_roster_fetch();
        session
    }

    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    pub fn roster(&self) -> &RosterState {
        &self.roster
    }

    pub fn mode(&self) -> SyncMode {
        self.coordinator.mode()
    }

    pub fn snapshot(&self) -> Option<&ExecutionSnapshot> {
        self.coordinator.snapshot()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.coordinator.last_error()
    }

    pub fn dismiss_error(&mut self) {
        self.coordinator.dismiss_error();
    }

    fn log(&self, level: &str, event: &str, detail: &str) {
        if let Some(root) = &self.settings.state_root {
            append_session_log_line(root, level, event, detail);
        }
    }

    fn log_root(&self) -> Option<PathBuf> {
        self.settings.state_root.clone()
    }

    /// Drains everything queued since the last call and feeds it through the
    /// coordinator. Called from the UI loop; returns whether anything
    /// changed so the caller can skip redraws.
    pub fn pump(&mut self) -> bool {
        let mut changed = false;
        let gave_up = self
            .channel
            .as_ref()
            .filter(|channel| channel.state() == ChannelState::GaveUp)
            .map(|channel| channel.execution_id().clone());
        if let Some(id) = gave_up {
            self.coordinator.channel_gave_up();
            self.drop_channel();
            let err = ChannelError::Exhausted {
                execution_id: id.to_string(),
            };
            self.log("warn", "session.push.gave_up", &err.to_string());
            changed = true;
        }
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
            changed = true;
        }
        changed
    }

    fn handle(&mut self, msg: SessionMsg) {
        match msg {
            SessionMsg::PollTick => {
                let actions = self.coordinator.poll_tick();
                self.run_actions(actions);
            }
            SessionMsg::RosterTick => self.spawn_roster_fetch(),
            SessionMsg::Channel(event) => {
                let actions = self.coordinator.channel_event(&event);
                self.run_actions(actions);
            }
            SessionMsg::SnapshotFetched { generation, result } => {
                if let Err(err) = &result {
                    self.log("warn", "session.fetch.failed", &err.to_string());
                }
                let actions = self.coordinator.apply_snapshot(generation, result);
                self.run_actions(actions);
            }
            SessionMsg::RosterFetched(result) => match result {
                Ok(entries) => self.roster.apply(entries),
                Err(err) => {
                    self.log("warn", "session.roster.failed", &err.to_string());
                    self.coordinator.note_error(err.to_string());
                }
            },
            SessionMsg::SubmitFinished(result) => {
                if let Ok(outcome) = &result {
                    self.log("info", "session.submit.finished", &outcome.status);
                }
                let actions = self.coordinator.apply_submit_outcome(result.map(|_| ()));
                self.run_actions(actions);
            }
        }
    }

    fn run_actions(&mut self, actions: Vec<SyncAction>) {
        for action in actions {
            match action {
                SyncAction::FetchSnapshot {
                    execution_id,
                    generation,
                } => self.spawn_snapshot_fetch(execution_id, generation),
                SyncAction::FetchRoster => self.spawn_roster_fetch(),
                SyncAction::OpenChannel { execution_id } => self.open_channel(execution_id),
                SyncAction::CloseChannel => self.drop_channel(),
                SyncAction::Submit {
                    execution_id,
                    call_index,
                    decision,
                } => self.spawn_submit(execution_id, call_index, decision),
            }
        }
    }

    fn spawn_snapshot_fetch(&self, execution_id: ExecutionId, generation: u64) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let result = client.fetch_snapshot(&execution_id);
            let _ = tx.send(SessionMsg::SnapshotFetched { generation, result });
        });
    }

    fn spawn_roster_fetch(&self) {
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send(SessionMsg::RosterFetched(client.fetch_roster()));
        });
    }

    fn spawn_submit(&mut self, execution_id: ExecutionId, call_index: usize, decision: Decision) {
        self.log(
            "info",
            "session.submit.sent",
            &format!(
                "execution={execution_id} call_index={call_index} action={}",
                decision.action()
            ),
        );
        let client = Arc::clone(&self.client);
        let tx = self.tx.clone();
        thread::spawn(move || {
            let _ = tx.send(SessionMsg::SubmitFinished(
                client.confirm(&execution_id, &decision),
            ));
        });
    }

    fn open_channel(&mut self, execution_id: ExecutionId) {
        self.drop_channel();
        let channel = EventChannel::open(
            &self.settings.events_base,
            &execution_id,
            self.settings.reconnect_policy(),
            self.log_root(),
        );
        let tx = self.tx.clone();
        channel.subscribe(move |event| {
            let _ = tx.send(SessionMsg::Channel(event.clone()));
        });
        self.log("info", "session.push.attached", execution_id.as_str());
        self.channel = Some(channel);
    }

    fn drop_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    pub fn select(&mut self, id: Option<ExecutionId>) {
        let actions = self.coordinator.select(id);
        self.run_actions(actions);
    }

    pub fn begin_edit(&mut self, call_index: usize) {
        let actions = self.coordinator.begin_edit(call_index);
        self.run_actions(actions);
    }

    pub fn update_edit(&mut self, call_index: usize, edited_args: String) {
        self.coordinator.update_edit(call_index, edited_args);
    }

    pub fn cancel_edit(&mut self, call_index: usize) {
        let actions = self.coordinator.cancel_edit(call_index);
        self.run_actions(actions);
    }

    pub fn submit(&mut self, call_index: usize) {
        let actions = self.coordinator.submit(call_index);
        self.run_actions(actions);
    }

    /// Pass-through to the engine; on success the new execution becomes the
    /// observed one and the roster refreshes.
    pub fn create_execution(&mut self, name: &str, location: &str) -> Option<ExecutionId> {
        let request = ExecuteRequest {
            name: name.to_string(),
            location: location.to_string(),
        };
        match self.client.execute(&request) {
            Ok(summary) => {
                self.log("info", "session.execution.created", summary.id.as_str());
                let id = summary.id.clone();
                self.select(Some(id.clone()));
                Some(id)
            }
            Err(err) => {
                self.coordinator.note_error(err.to_string());
                None
            }
        }
    }

    /// Pass-through to the engine; triggers a roster refresh plus one
    /// immediate snapshot fetch for the observed execution.
    pub fn resume_selected(&mut self) {
        let Some(id) = self.coordinator.selected().cloned() else {
            return;
        };
        match self.client.resume(&id) {
            Ok(_) => {
                self.log("info", "session.execution.resumed", id.as_str());
                let actions = self.coordinator.poll_tick();
                self.run_actions(actions);
            }
            Err(err) => self.coordinator.note_error(err.to_string()),
        }
    }

    /// Pass-through to the engine; failures surface as a dismissible banner
    /// and an empty list.
    pub fn list_checkpoints(&mut self) -> Vec<CheckpointSummary> {
        match self.client.list_checkpoints() {
            Ok(checkpoints) => checkpoints,
            Err(err) => {
                self.coordinator.note_error(err.to_string());
                Vec::new()
            }
        }
    }

    pub fn delete_checkpoint(&mut self, checkpoint_id: &str) -> bool {
        match self.client.delete_checkpoint(checkpoint_id) {
            Ok(()) => {
                self.log("info", "session.checkpoint.deleted", checkpoint_id);
                true
            }
            Err(err) => {
                self.coordinator.note_error(err.to_string());
                false
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.drop_channel();
        for timer in self.timers.drain(..) {
            let _ = timer.join();
        }
        self.log("info", "session.stopped", "");
    }
}

impl Drop for DashboardSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}
