//! Session management module.
//!
//! This module provides PTY spawning and session lifecycle management.
//! Sessions can be created, written to, resized, and killed; their output
//! and exit arrive as [`SessionEvent`]s on the manager's event sink.

pub mod manager;
pub mod pty;
pub mod registry;
pub mod shell;

pub use manager::{EventReceiver, EventSender, SessionEvent, SessionManager};
pub use pty::{PtyEvents, PtyHandle, SessionError, SessionId, SpawnSpec};
pub use registry::SessionRegistry;
pub use shell::{default_cwd, detect_shell, inherited_env};
