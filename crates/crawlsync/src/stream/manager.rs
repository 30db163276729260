//! Push channel lifecycle: connect, forward, reconnect, stop.
//!
//! Every connection attempt gets a new epoch. Background tasks carry the
//! epoch they were started for and re-check it under the session lock
//! before touching shared state, so a late callback from a superseded
//! attempt can neither forward events nor schedule a second timer.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::policy::ReconnectPolicy;
use super::state::ConnectionState;
use super::transport::{decode_frame, Connector, Frame};
use super::EventSink;

/// How long `stop` waits for the channel task to finish its close
/// handshake before aborting it.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Owns the push channel and its reconnect timer.
pub struct StreamManager {
    shared: Arc<Shared>,
}

struct Shared {
    connector: Arc<dyn Connector>,
    sink: Arc<dyn EventSink>,
    policy: ReconnectPolicy,
    session: Mutex<Session>,
    state_tx: watch::Sender<ConnectionState>,
}

#[derive(Default)]
struct Session {
    state: ConnectionState,
    started: bool,
    stopped: bool,
    epoch: u64,
    /// Consecutive failed or dropped connections, reset once a channel opens.
    failures: u32,
    attempts: u64,
    reconnect_timer: Option<JoinHandle<()>>,
    channel_task: Option<JoinHandle<()>>,
    shutdown: Option<Arc<Notify>>,
}

impl StreamManager {
    pub fn new(
        connector: Arc<dyn Connector>,
        sink: Arc<dyn EventSink>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                connector,
                sink,
                policy,
                session: Mutex::new(Session::default()),
                state_tx,
            }),
        }
    }

    /// Opens the push channel. Must be called from within a tokio runtime.
    ///
    /// Calling `start` while a session is already running is a no-op. After
    /// `stop`, `start` begins a fresh session.
    pub fn start(&self) {
        let mut session = self.shared.lock_session();
        if session.started && !session.stopped {
            log::warn!("Stream already started, ignoring start request");
            return;
        }

        session.started = true;
        session.stopped = false;
        session.failures = 0;
        log::info!("Starting stream");
        begin_attempt(&self.shared, &mut session);
    }

    /// Closes the channel and cancels any pending reconnect.
    ///
    /// Once this returns no further payload reaches the sink, the state is
    /// `Disconnected` and no reconnect timer is pending.
    pub async fn stop(&self) {
        let (task, shutdown) = {
            let mut session = self.shared.lock_session();
            if session.stopped || !session.started {
                return;
            }
            session.stopped = true;
            self.shared.set_state(&mut session, ConnectionState::Closing);
            if let Some(timer) = session.reconnect_timer.take() {
                timer.abort();
            }
            (session.channel_task.take(), session.shutdown.take())
        };

        if let Some(shutdown) = shutdown {
            shutdown.notify_one();
        }

        if let Some(task) = task {
            let abort = task.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, task).await.is_err() {
                log::warn!("Stream did not close within {:?}, aborting", CLOSE_TIMEOUT);
                abort.abort();
            }
        }

        let mut session = self.shared.lock_session();
        self.shared
            .set_state(&mut session, ConnectionState::Disconnected);
        log::info!("Stream stopped");
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock_session().state
    }

    /// Watches connection state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Number of reconnect timers currently pending. Never exceeds one.
    pub fn pending_reconnects(&self) -> usize {
        let session = self.shared.lock_session();
        match &session.reconnect_timer {
            Some(timer) if !timer.is_finished() => 1,
            _ => 0,
        }
    }

    /// Total connection attempts since construction.
    pub fn connect_attempts(&self) -> u64 {
        self.shared.lock_session().attempts
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.shared.policy
    }
}

impl Drop for StreamManager {
    fn drop(&mut self) {
        let mut session = self.shared.lock_session();
        session.stopped = true;
        if let Some(timer) = session.reconnect_timer.take() {
            timer.abort();
        }
        if let Some(task) = session.channel_task.take() {
            task.abort();
        }
    }
}

impl Shared {
    fn lock_session(&self) -> MutexGuard<'_, Session> {
        match self.session.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Stream session lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn set_state(&self, session: &mut Session, state: ConnectionState) {
        if session.state != state {
            log::debug!("Stream state {} -> {}", session.state, state);
        }
        session.state = state;
        self.state_tx.send_replace(state);
    }

    /// Decodes a data frame and hands it to the sink if `epoch` is still the
    /// live attempt.
    fn forward(&self, epoch: u64, frame: &Frame) {
        let payload = match decode_frame(frame) {
            Ok(Some(payload)) => payload,
            Ok(None) => return,
            Err(e) => {
                log::warn!("Dropping undecodable stream message: {}", e);
                return;
            }
        };

        // Delivery happens under the session lock so `stop` cannot slip in
        // between the check and the hand-off.
        let session = self.lock_session();
        if session.stopped || session.epoch != epoch {
            log::debug!("Dropping stream message from a closed session");
            return;
        }
        self.sink.deliver(payload);
    }
}

/// Starts a new connection attempt. Caller holds the session lock.
fn begin_attempt(shared: &Arc<Shared>, session: &mut Session) {
    if let Some(timer) = session.reconnect_timer.take() {
        timer.abort();
    }
    if let Some(task) = session.channel_task.take() {
        task.abort();
    }

    session.epoch += 1;
    session.attempts += 1;
    shared.set_state(session, ConnectionState::Connecting);

    let shutdown = Arc::new(Notify::new());
    session.shutdown = Some(shutdown.clone());
    session.channel_task = Some(tokio::spawn(run_channel(
        shared.clone(),
        session.epoch,
        shutdown,
    )));
}

/// Arms the reconnect timer after attempt `epoch` failed or dropped.
fn schedule_reconnect(shared: &Arc<Shared>, epoch: u64) {
    let mut session = shared.lock_session();
    if session.stopped || session.epoch != epoch {
        return;
    }

    session.failures = session.failures.saturating_add(1);
    shared.set_state(&mut session, ConnectionState::Disconnected);

    if let Some(timer) = session.reconnect_timer.take() {
        timer.abort();
    }

    let delay = shared.policy.delay_for(session.failures);
    log::info!(
        "Reconnecting stream in {:?} (consecutive failures: {})",
        delay,
        session.failures
    );

    let timer_shared = shared.clone();
    session.reconnect_timer = Some(tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        fire_reconnect(&timer_shared, epoch);
    }));
}

fn fire_reconnect(shared: &Arc<Shared>, epoch: u64) {
    let mut session = shared.lock_session();
    if session.stopped || session.epoch != epoch {
        return;
    }
    // This task is the timer; release the slot without aborting ourselves.
    session.reconnect_timer = None;
    begin_attempt(shared, &mut session);
}

async fn run_channel(shared: Arc<Shared>, epoch: u64, shutdown: Arc<Notify>) {
    let connected = tokio::select! {
        result = shared.connector.connect() => result,
        _ = shutdown.notified() => return,
    };

    let mut channel = match connected {
        Ok(channel) => channel,
        Err(e) => {
            log::warn!("Stream connection failed: {}", e);
            schedule_reconnect(&shared, epoch);
            return;
        }
    };

    let superseded = {
        let mut session = shared.lock_session();
        if session.stopped || session.epoch != epoch {
            true
        } else {
            session.failures = 0;
            shared.set_state(&mut session, ConnectionState::Open);
            false
        }
    };
    if superseded {
        channel.close().await;
        return;
    }
    log::info!("Stream connected");

    let stopped = loop {
        tokio::select! {
            _ = shutdown.notified() => break true,
            frame = channel.recv() => match frame {
                Some(Ok(Frame::Close(info))) => {
                    match info {
                        Some(info) => log::info!(
                            "Stream closed by server (code {}, reason '{}')",
                            info.code,
                            info.reason
                        ),
                        None => log::info!("Stream closed by server"),
                    }
                    break false;
                }
                Some(Ok(frame)) => shared.forward(epoch, &frame),
                Some(Err(e)) => {
                    log::warn!("Stream error: {}", e);
                    break false;
                }
                None => {
                    log::info!("Stream ended");
                    break false;
                }
            },
        }
    };

    if stopped {
        channel.close().await;
    } else {
        schedule_reconnect(&shared, epoch);
    }
}
