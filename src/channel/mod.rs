pub mod backoff;
pub mod event;

pub use backoff::ReconnectPolicy;
pub use event::ChannelEvent;

use crate::api::ExecutionId;
use crate::shared::append_session_log_line;
use std::io::ErrorKind;
use std::net::TcpStream;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{connect, Message, WebSocket};

const SOCKET_IDLE_SLEEP: Duration = Duration::from_millis(40);

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("reconnect attempts exhausted for execution `{execution_id}`")]
    Exhausted { execution_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    GaveUp,
    Closed,
}

impl ChannelState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Open,
            2 => Self::GaveUp,
            3 => Self::Closed,
            _ => Self::Connecting,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Connecting => 0,
            Self::Open => 1,
            Self::GaveUp => 2,
            Self::Closed => 3,
        }
    }
}

pub type SubscriberId = u64;

type Handler = Box<dyn Fn(&ChannelEvent) + Send>;

/// Fan-out registry. Every subscriber receives every event; a panicking
/// handler must not prevent delivery to the others.
#[derive(Default)]
pub(crate) struct SubscriberSet {
    next_id: AtomicU64,
    handlers: Mutex<Vec<(SubscriberId, Handler)>>,
}

impl SubscriberSet {
    fn locked(&self) -> std::sync::MutexGuard<'_, Vec<(SubscriberId, Handler)>> {
        // A panic inside a handler is caught, so poisoning only happens if
        // delivery itself panicked; the registry is still usable.
        self.handlers.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub(crate) fn add(&self, handler: Handler) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.locked().push((id, handler));
        id
    }

    pub(crate) fn remove(&self, id: SubscriberId) {
        self.locked().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn deliver(&self, event: &ChannelEvent) {
        let handlers = self.locked();
        for (_, handler) in handlers.iter() {
            let _ = catch_unwind(AssertUnwindSafe(|| handler(event)));
        }
    }
}

struct ChannelShared {
    state: AtomicU8,
    manual_close: AtomicBool,
    subscribers: SubscriberSet,
    log_root: Option<PathBuf>,
}

impl ChannelShared {
    fn set_state(&self, state: ChannelState) {
        self.state.store(state.as_u8(), Ordering::Relaxed);
    }

    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn log(&self, level: &str, event: &str, detail: &str) {
        if let Some(root) = &self.log_root {
            append_session_log_line(root, level, event, detail);
        }
    }
}

/// Reconnecting push channel scoped to one execution id. Owns its reader
/// thread; `close()` is synchronous, no event fires after it returns.
pub struct EventChannel {
    shared: Arc<ChannelShared>,
    worker: Option<JoinHandle<()>>,
    execution_id: ExecutionId,
}

pub fn channel_url(events_base: &str, execution_id: &ExecutionId) -> String {
    format!(
        "{}/{}",
        events_base.trim_end_matches('/'),
        urlencoding::encode(execution_id.as_str())
    )
}

impl EventChannel {
    pub fn open(
        events_base: &str,
        execution_id: &ExecutionId,
        policy: ReconnectPolicy,
        log_root: Option<PathBuf>,
    ) -> Self {
        let shared = Arc::new(ChannelShared {
            state: AtomicU8::new(ChannelState::Connecting.as_u8()),
            manual_close: AtomicBool::new(false),
            subscribers: SubscriberSet::default(),
            log_root,
        });
        let url = channel_url(events_base, execution_id);
        let worker_shared = Arc::clone(&shared);
        let worker = thread::spawn(move || run_socket_loop(&worker_shared, &url, policy));
        Self {
            shared,
            worker: Some(worker),
            execution_id: execution_id.clone(),
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriberId
    where
        F: Fn(&ChannelEvent) + Send + 'static,
    {
        self.shared.subscribers.add(Box::new(handler))
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.shared.subscribers.remove(id);
    }

    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state() == ChannelState::Open
    }

    /// Suppresses all further reconnect attempts, then tears the connection
    /// down and waits for the reader thread to exit.
    pub fn close(&mut self) {
        self.shared.manual_close.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        self.shared.set_state(ChannelState::Closed);
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn manual_close_requested(shared: &ChannelShared) -> bool {
    shared.manual_close.load(Ordering::Relaxed)
}

fn sleep_reconnect(shared: &ChannelShared, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if manual_close_requested(shared) {
            return false;
        }
        let step = remaining.min(Duration::from_millis(25));
        thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !manual_close_requested(shared)
}

fn run_socket_loop(shared: &ChannelShared, url: &str, policy: ReconnectPolicy) {
    let mut attempt = 0u32;
    loop {
        if manual_close_requested(shared) {
            shared.set_state(ChannelState::Closed);
            return;
        }

        match connect(url) {
            Ok((mut socket, _)) => {
                attempt = 0;
                shared.set_state(ChannelState::Open);
                shared.log("info", "channel.connected", url);
                if set_socket_nonblocking(&mut socket).is_err() {
                    shared.log("warn", "channel.nonblocking.failed", url);
                }
                let closed_by_operator = read_until_disconnect(shared, &mut socket);
                let _ = socket.close(None);
                if closed_by_operator {
                    shared.set_state(ChannelState::Closed);
                    return;
                }
                shared.set_state(ChannelState::Connecting);
            }
            Err(err) => {
                shared.log("warn", "channel.connect.failed", &err.to_string());
            }
        }

        attempt += 1;
        match policy.delay_for(attempt) {
            Some(delay) => {
                if !sleep_reconnect(shared, delay) {
                    shared.set_state(ChannelState::Closed);
                    return;
                }
            }
            None => {
                shared.set_state(ChannelState::GaveUp);
                shared.log("warn", "channel.gave_up", url);
                return;
            }
        }
    }
}

/// Returns true when the loop ended because of an explicit `close()`.
fn read_until_disconnect(
    shared: &ChannelShared,
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
) -> bool {
    loop {
        if manual_close_requested(shared) {
            return true;
        }
        match socket.read() {
            Ok(Message::Text(text)) => dispatch_payload(shared, text.as_str()),
            Ok(Message::Binary(_)) => {}
            Ok(Message::Ping(payload)) => {
                let _ = socket.send(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => return false,
            Err(tungstenite::Error::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                thread::sleep(SOCKET_IDLE_SLEEP);
            }
            Err(tungstenite::Error::ConnectionClosed) => return false,
            Err(err) => {
                shared.log("warn", "channel.read.failed", &err.to_string());
                return false;
            }
        }
    }
}

/// Malformed payloads are dropped and logged, never propagated.
fn dispatch_payload(shared: &ChannelShared, raw: &str) {
    match ChannelEvent::decode(raw) {
        Ok(event) => shared.subscribers.deliver(&event),
        Err(err) => shared.log(
            "warn",
            "channel.payload.dropped",
            &format!("bytes={} error={err}", raw.len()),
        ),
    }
}

fn set_socket_nonblocking(
    socket: &mut WebSocket<MaybeTlsStream<TcpStream>>,
) -> std::io::Result<()> {
    match socket.get_mut() {
        MaybeTlsStream::Plain(stream) => stream.set_nonblocking(true),
        MaybeTlsStream::Rustls(stream) => stream.sock.set_nonblocking(true),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sample_event() -> ChannelEvent {
        ChannelEvent::decode(
            r#"{"type": "state_update", "data": {"execution_id": "exec-1"}, "timestamp": 1}"#,
        )
        .unwrap()
    }

    #[test]
    fn every_subscriber_receives_every_event() {
        let set = SubscriberSet::default();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let first_counter = Arc::clone(&first);
        let second_counter = Arc::clone(&second);
        set.add(Box::new(move |_| {
            first_counter.fetch_add(1, Ordering::Relaxed);
        }));
        set.add(Box::new(move |_| {
            second_counter.fetch_add(1, Ordering::Relaxed);
        }));

        set.deliver(&sample_event());
        set.deliver(&sample_event());

        assert_eq!(first.load(Ordering::Relaxed), 2);
        assert_eq!(second.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn panicking_subscriber_does_not_block_the_rest() {
        let set = SubscriberSet::default();
        let reached = Arc::new(AtomicUsize::new(0));
        let reached_counter = Arc::clone(&reached);
        set.add(Box::new(|_| panic!("handler blew up")));
        set.add(Box::new(move |_| {
            reached_counter.fetch_add(1, Ordering::Relaxed);
        }));

        set.deliver(&sample_event());
        assert_eq!(reached.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn unsubscribed_handlers_stop_receiving() {
        let set = SubscriberSet::default();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let id = set.add(Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        set.deliver(&sample_event());
        set.remove(id);
        set.deliver(&sample_event());
        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn channel_url_appends_the_execution_id_as_a_path_segment() {
        let id = ExecutionId::parse("exec-42").unwrap();
        assert_eq!(
            channel_url("ws://127.0.0.1:8080/ws/events/", &id),
            "ws://127.0.0.1:8080/ws/events/exec-42"
        );
    }
}
