//! Session manager for multiple concurrent PTY sessions.
//!
//! The manager owns every session it creates. Each session gets an output
//! pump task that relays the handle's output chunks and its exit to the
//! manager's single event sink, then deregisters the session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

use super::pty::{PtyEvents, PtyHandle, SessionError, SessionId, SpawnSpec};
use super::registry::SessionRegistry;
use super::shell::{default_cwd, detect_shell};
use crate::config::SessionConfig;

/// How often `shutdown` checks whether the registry has drained.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Session-scoped notification delivered to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A chunk of process output.
    Data { id: SessionId, chunk: Vec<u8> },
    /// The process has terminated. Always the last event for `id`.
    Exit { id: SessionId },
}

impl SessionEvent {
    /// Returns the session this event belongs to.
    pub fn id(&self) -> &SessionId {
        match self {
            SessionEvent::Data { id, .. } | SessionEvent::Exit { id } => id,
        }
    }
}

/// Sending side of the event sink.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiving side of the event sink, handed to the owning surface.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Creates, drives and tears down PTY sessions.
///
/// Clones share the registry, the sink and the configuration.
#[derive(Clone)]
pub struct SessionManager {
    registry: SessionRegistry<PtyHandle>,
    sink: EventSender,
    config: Arc<SessionConfig>,
}

impl SessionManager {
    /// Creates a manager with an empty registry.
    ///
    /// Every event of every session this manager creates goes to the
    /// returned receiver.
    pub fn new(config: SessionConfig) -> (Self, EventReceiver) {
        Self::with_registry(config, SessionRegistry::new())
    }

    /// Creates a manager on top of an existing registry.
    pub fn with_registry(
        config: SessionConfig,
        registry: SessionRegistry<PtyHandle>,
    ) -> (Self, EventReceiver) {
        let (sink, events) = mpsc::unbounded_channel();
        let manager = Self {
            registry,
            sink,
            config: Arc::new(config),
        };
        (manager, events)
    }

    /// Starts the default shell in a new session.
    ///
    /// The shell gets the full host environment, `TERM` from the
    /// configuration, and the home directory as working directory.
    pub async fn create(&self, cols: u16, rows: u16) -> Result<SessionId, SessionError> {
        let mut spec = SpawnSpec::new(detect_shell(self.config.shell.as_deref()), cols, rows)
            .with_term(self.config.term.clone());
        spec.cwd = default_cwd();

        self.create_with(spec).await
    }

    /// Starts a session from an explicit spawn spec.
    pub async fn create_with(&self, spec: SpawnSpec) -> Result<SessionId, SessionError> {
        let program = spec.program.clone();
        let (cols, rows) = (spec.cols, spec.rows);

        let (handle, events) = PtyHandle::spawn(spec).inspect_err(|e| {
            tracing::warn!(shell = %program, error = %e, "Failed to create session");
        })?;

        let id = uuid::Uuid::new_v4().to_string();
        let pid = handle.pid();

        self.registry.insert(id.clone(), Arc::new(handle));

        // Output produced so far sits in the handle's channel until the
        // pump picks it up.
        tokio::spawn(pump(
            id.clone(),
            events,
            self.registry.clone(),
            self.sink.clone(),
            self.config.exit_drain(),
        ));

        tracing::info!(
            session_id = %id,
            pid = ?pid,
            shell = %program,
            cols = cols,
            rows = rows,
            "Created new session"
        );

        Ok(id)
    }

    /// Queues `data` for the session's input. Unknown ids are ignored.
    ///
    /// Never waits for the process to consume the input.
    pub async fn write(&self, id: &str, data: &[u8]) {
        let Some(handle) = self.lookup(id, "write") else {
            return;
        };
        if let Err(e) = handle.write(data) {
            tracing::warn!(session_id = %id, error = %e, "Write to session failed");
        }
    }

    /// Resizes the session's terminal. Unknown ids are ignored.
    pub async fn resize(&self, id: &str, cols: u16, rows: u16) {
        let Some(handle) = self.lookup(id, "resize") else {
            return;
        };
        if let Err(e) = handle.resize(cols, rows).await {
            tracing::warn!(session_id = %id, error = %e, "Resize of session failed");
        }
    }

    /// Asks the session's process to terminate. Unknown ids are ignored.
    ///
    /// The session stays registered until its process actually exits; the
    /// pump then emits the single exit event. A process still running after
    /// the configured grace period is killed unconditionally.
    pub async fn kill(&self, id: &str) {
        let Some(handle) = self.lookup(id, "kill") else {
            return;
        };
        if let Err(e) = handle.kill().await {
            tracing::warn!(session_id = %id, error = %e, "Kill of session failed");
        }
        drop(handle);

        tracing::debug!(session_id = %id, "Kill requested");

        let registry = self.registry.clone();
        let grace = self.config.kill_grace();
        let id = id.to_string();
        tokio::spawn(async move {
            sleep(grace).await;
            escalate(&registry, &id).await;
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.registry.contains(id)
    }

    pub fn count(&self) -> usize {
        self.registry.len()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        self.registry.ids()
    }

    /// Current `(cols, rows)` of a live session.
    pub async fn size(&self, id: &str) -> Option<(u16, u16)> {
        let handle = self.registry.get(id)?;
        Some(handle.size().await)
    }

    /// Kills every session and waits for them to exit.
    ///
    /// Sessions still registered after the shutdown timeout are killed
    /// unconditionally and left to their pumps.
    pub async fn shutdown(&self) {
        let ids = self.registry.ids();
        if ids.is_empty() {
            return;
        }

        tracing::info!(count = ids.len(), "Shutting down sessions");

        for id in &ids {
            self.kill(id).await;
        }

        let registry = &self.registry;
        let drained = timeout(self.config.shutdown_timeout(), async {
            while !registry.is_empty() {
                sleep(SHUTDOWN_POLL_INTERVAL).await;
            }
        })
        .await;

        if drained.is_err() {
            let remaining = registry.ids();
            tracing::warn!(
                remaining = remaining.len(),
                "Sessions still running after shutdown timeout"
            );
            for id in &remaining {
                escalate(registry, id).await;
            }
        } else {
            tracing::info!("All sessions exited");
        }
    }

    fn lookup(&self, id: &str, op: &'static str) -> Option<Arc<PtyHandle>> {
        let handle = self.registry.get(id);
        if handle.is_none() {
            tracing::debug!(session_id = %id, op, "Ignoring request for unknown session");
        }
        handle
    }
}

/// Sends SIGKILL to a session that is still registered and running.
async fn escalate(registry: &SessionRegistry<PtyHandle>, id: &str) {
    let Some(handle) = registry.get(id) else {
        return;
    };
    if !handle.is_running() {
        return;
    }

    tracing::warn!(session_id = %id, "Session ignored kill request, forcing termination");
    if let Err(e) = handle.force_kill().await {
        tracing::error!(session_id = %id, error = %e, "Forced kill failed");
    }
}

/// Relays one session's output and exit to the sink.
async fn pump(
    id: SessionId,
    events: PtyEvents,
    registry: SessionRegistry<PtyHandle>,
    sink: EventSender,
    exit_drain: Duration,
) {
    let PtyEvents {
        mut output,
        mut exit,
    } = events;

    let forward = |chunk: Vec<u8>| {
        let _ = sink.send(SessionEvent::Data {
            id: id.clone(),
            chunk,
        });
    };

    let exit_code = loop {
        tokio::select! {
            biased;

            chunk = output.recv() => match chunk {
                Some(chunk) => forward(chunk),
                None => {
                    // Reader is done; the waiter reports shortly after.
                    break (&mut exit).await.ok();
                }
            },

            code = &mut exit => {
                // Output written just before exit may still be in flight.
                // A grandchild holding the pty open must not stall us.
                let drain = async {
                    while let Some(chunk) = output.recv().await {
                        forward(chunk);
                    }
                };
                if timeout(exit_drain, drain).await.is_err() {
                    tracing::debug!(session_id = %id, "Output drain timed out after exit");
                }
                break code.ok();
            }
        }
    };

    if let Some(handle) = registry.get(&id) {
        handle.mark_exited();
    }
    registry.remove(&id);

    tracing::info!(session_id = %id, exit_code = ?exit_code, "Session exited");

    let _ = sink.send(SessionEvent::Exit { id });
}
