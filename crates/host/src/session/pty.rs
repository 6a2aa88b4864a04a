//! PTY process handle.
//!
//! A [`PtyHandle`] owns exactly one pseudo-terminal and the shell process
//! attached to it. Output and exit notifications are not polled from the
//! handle; they arrive on the [`PtyEvents`] channels returned by
//! [`PtyHandle::spawn`], fed by dedicated OS threads (one blocking reader,
//! one blocking waiter). Input goes the other way through a queue drained
//! by a third thread, so a process that stops reading its terminal never
//! stalls the caller.

use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Mutex};

use super::shell::inherited_env;

/// Unique identifier for a session.
pub type SessionId = String;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The OS refused to create the pty or start the process.
    #[error("failed to spawn PTY: {0}")]
    Spawn(String),

    /// Failed to write to the PTY.
    #[error("failed to write to PTY: {0}")]
    Write(String),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    Resize(String),

    /// Failed to signal the process.
    #[error("failed to kill session: {0}")]
    Kill(String),
}

/// Buffer size for reading from PTY.
const READ_BUFFER_SIZE: usize = 4096;

/// Everything needed to start a process on a fresh pty.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Program to run.
    pub program: String,
    /// Arguments, program name excluded.
    pub args: Vec<String>,
    /// Initial terminal width in columns.
    pub cols: u16,
    /// Initial terminal height in rows.
    pub rows: u16,
    /// Working directory. Inherits the host's when `None`.
    pub cwd: Option<PathBuf>,
    /// Complete child environment, passed through byte for byte.
    pub env: Vec<(OsString, OsString)>,
    /// Value for `TERM`, applied after `env`.
    pub term: Option<String>,
}

impl SpawnSpec {
    /// Creates a spec for `program` that inherits the host environment.
    pub fn new(program: impl Into<String>, cols: u16, rows: u16) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cols,
            rows,
            cwd: None,
            env: inherited_env(),
            term: None,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Sets one environment variable, replacing an existing value.
    pub fn with_env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        let key = key.into();
        self.env.retain(|(k, _)| *k != key);
        self.env.push((key, value.into()));
        self
    }

    pub fn with_term(mut self, term: impl Into<String>) -> Self {
        self.term = Some(term.into());
        self
    }
}

/// Receiving side of a handle's output and exit notifications.
pub struct PtyEvents {
    /// One entry per read chunk, in production order. Closed at reader EOF.
    pub output: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Resolved once with the exit code when the process terminates.
    pub exit: oneshot::Receiver<u32>,
}

/// A running process attached to a pseudo-terminal.
pub struct PtyHandle {
    /// The PTY master handle.
    master: Mutex<Box<dyn MasterPty + Send>>,

    /// Input queue drained by the writer thread.
    input: mpsc::UnboundedSender<Vec<u8>>,

    /// Signals the child; the child itself lives on the waiter thread.
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,

    /// Cleared once the process has exited.
    running: AtomicBool,

    /// Last requested size, packed as `cols << 16 | rows`.
    dims: AtomicU32,

    /// Process ID.
    pid: Option<u32>,
}

impl PtyHandle {
    /// Spawns `spec.program` on a new pty.
    ///
    /// The returned [`PtyEvents`] start buffering output immediately, so a
    /// consumer attached later still sees everything the process wrote.
    pub fn spawn(spec: SpawnSpec) -> Result<(Self, PtyEvents), SessionError> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(pty_size(spec.cols, spec.rows))
            .map_err(|e| SessionError::Spawn(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&spec.program);
        cmd.args(&spec.args);
        cmd.env_clear();
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(term) = &spec.term {
            cmd.env("TERM", term);
        }
        if let Some(dir) = &spec.cwd {
            cmd.cwd(dir);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| SessionError::Spawn(format!("{}: {}", spec.program, e)))?;

        // The child owns its own slave descriptors. Ours must go, or the
        // reader never sees EOF after the child exits.
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let streams = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (reader, writer) = match streams {
            Ok(streams) => streams,
            Err(e) => {
                let _ = killer.kill();
                return Err(SessionError::Spawn(e.to_string()));
            }
        };

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (exit_tx, exit_rx) = oneshot::channel();

        let threads = start_reader(reader, output_tx, pid)
            .and_then(|()| start_writer(writer, input_rx, pid))
            .and_then(|()| start_waiter(child, exit_tx, pid));
        if let Err(e) = threads {
            let _ = killer.kill();
            return Err(SessionError::Spawn(e.to_string()));
        }

        tracing::debug!(
            program = %spec.program,
            pid = ?pid,
            cols = spec.cols,
            rows = spec.rows,
            "Spawned PTY process"
        );

        let handle = PtyHandle {
            master: Mutex::new(pair.master),
            input: input_tx,
            killer: Mutex::new(killer),
            running: AtomicBool::new(true),
            dims: AtomicU32::new(pack_dims(spec.cols, spec.rows)),
            pid,
        };

        Ok((
            handle,
            PtyEvents {
                output: output_rx,
                exit: exit_rx,
            },
        ))
    }

    /// Returns the process ID of the shell, if available.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Returns whether the process is still running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Records that the process has exited. Later writes, resizes and kills
    /// become no-ops.
    pub fn mark_exited(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Queues data for the process's input. No-op after exit.
    ///
    /// Returns as soon as the bytes are queued; the writer thread delivers
    /// them in order as the terminal accepts them.
    pub fn write(&self, data: &[u8]) -> Result<(), SessionError> {
        if !self.is_running() || data.is_empty() {
            return Ok(());
        }

        self.input
            .send(data.to_vec())
            .map_err(|_| SessionError::Write("PTY writer is closed".to_string()))
    }

    /// Resizes the PTY. No-op after exit.
    pub async fn resize(&self, cols: u16, rows: u16) -> Result<(), SessionError> {
        if !self.is_running() {
            return Ok(());
        }

        let master = self.master.lock().await;
        master
            .resize(pty_size(cols, rows))
            .map_err(|e| SessionError::Resize(e.to_string()))?;
        self.dims.store(pack_dims(cols, rows), Ordering::SeqCst);

        tracing::debug!(pid = ?self.pid, cols, rows, "Resized PTY");

        Ok(())
    }

    /// Returns the current `(cols, rows)` as reported by the OS pty, or the
    /// last requested size if the query fails.
    pub async fn size(&self) -> (u16, u16) {
        let master = self.master.lock().await;
        match master.get_size() {
            Ok(size) => (size.cols, size.rows),
            Err(_) => unpack_dims(self.dims.load(Ordering::SeqCst)),
        }
    }

    /// Asks the process to terminate (SIGHUP on unix). No-op after exit.
    pub async fn kill(&self) -> Result<(), SessionError> {
        if !self.is_running() {
            return Ok(());
        }

        let mut killer = self.killer.lock().await;
        killer
            .kill()
            .map_err(|e| SessionError::Kill(e.to_string()))
    }

    /// Terminates the process unconditionally. No-op after exit.
    pub async fn force_kill(&self) -> Result<(), SessionError> {
        if !self.is_running() {
            return Ok(());
        }
        self.hard_kill().await
    }

    #[cfg(unix)]
    async fn hard_kill(&self) -> Result<(), SessionError> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match self.pid {
            Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGKILL)
                .map_err(|e| SessionError::Kill(e.to_string())),
            None => self.kill().await,
        }
    }

    #[cfg(not(unix))]
    async fn hard_kill(&self) -> Result<(), SessionError> {
        // TerminateProcess is already unconditional.
        self.kill().await
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

fn pack_dims(cols: u16, rows: u16) -> u32 {
    (u32::from(cols) << 16) | u32::from(rows)
}

fn unpack_dims(packed: u32) -> (u16, u16) {
    ((packed >> 16) as u16, (packed & 0xffff) as u16)
}

fn start_reader(
    reader: Box<dyn Read + Send>,
    output_tx: mpsc::UnboundedSender<Vec<u8>>,
    pid: Option<u32>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-read-{}", pid.unwrap_or(0)))
        .spawn(move || read_loop(reader, output_tx, pid))
        .map(|_| ())
}

fn read_loop(
    mut reader: Box<dyn Read + Send>,
    output_tx: mpsc::UnboundedSender<Vec<u8>>,
    pid: Option<u32>,
) {
    let mut buffer = vec![0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                tracing::trace!(pid = ?pid, "PTY EOF");
                break;
            }
            Ok(n) => {
                if output_tx.send(buffer[..n].to_vec()).is_err() {
                    // Nobody is listening any more.
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                // Linux reports EIO once the slave side is fully closed.
                tracing::trace!(pid = ?pid, error = %e, "PTY read ended");
                break;
            }
        }
    }
}

fn start_writer(
    writer: Box<dyn Write + Send>,
    input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pid: Option<u32>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-write-{}", pid.unwrap_or(0)))
        .spawn(move || write_loop(writer, input_rx, pid))
        .map(|_| ())
}

fn write_loop(
    mut writer: Box<dyn Write + Send>,
    mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pid: Option<u32>,
) {
    // Ends when the handle is dropped or the terminal goes away.
    while let Some(input) = input_rx.blocking_recv() {
        if let Err(e) = writer.write_all(&input).and_then(|()| writer.flush()) {
            tracing::trace!(pid = ?pid, error = %e, "PTY write ended");
            break;
        }
    }
}

fn start_waiter(
    mut child: Box<dyn Child + Send + Sync>,
    exit_tx: oneshot::Sender<u32>,
    pid: Option<u32>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("pty-wait-{}", pid.unwrap_or(0)))
        .spawn(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code(),
                Err(e) => {
                    tracing::warn!(pid = ?pid, error = %e, "Failed to wait for PTY process");
                    1
                }
            };
            let _ = exit_tx.send(code);
        })
        .map(|_| ())
}
