//! # termhost Library
//!
//! Host-side core of a desktop terminal emulator: owns pseudo-terminal
//! sessions and streams their input and output to a display surface.
//!
//! ## Overview
//!
//! - **PTY Session Management**: spawn shells on pseudo-terminals, route
//!   input to them, resize them, and tear them down
//! - **Event Streaming**: every session's output and exit delivered, in
//!   order, to the single sink owned by the surface that created it
//! - **Stdio Bridge**: a JSON-lines transport so an out-of-process display
//!   surface can drive the core
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   Display surface                    │
//! └───────────────▲──────────────────────┬───────────────┘
//!                 │ data / exit / created │ create / write / resize / kill
//! ┌───────────────┴──────────────────────▼───────────────┐
//! │                       Bridge                         │
//! ├──────────────────────────────────────────────────────┤
//! │                   Session Manager                    │
//! │   ┌────────────────┐   ┌──────────────────────────┐  │
//! │   │    Registry    │   │  one pump task / session │  │
//! │   └────────────────┘   └──────────────────────────┘  │
//! ├──────────────────────────────────────────────────────┤
//! │        PTY handles (reader + waiter threads)         │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use host::config::SessionConfig;
//! use host::session::{SessionEvent, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (manager, mut events) = SessionManager::new(SessionConfig::default());
//!
//!     let id = manager.create(80, 24).await?;
//!     manager.write(&id, b"echo hello\nexit\n").await;
//!
//!     while let Some(event) = events.recv().await {
//!         match event {
//!             SessionEvent::Data { chunk, .. } => print!("{}", String::from_utf8_lossy(&chunk)),
//!             SessionEvent::Exit { .. } => break,
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: Configuration loading and defaults
//! - [`session`]: PTY handles, the session registry and the session manager
//! - [`bridge`]: Stdio transport for out-of-process display surfaces

pub mod bridge;
pub mod config;
pub mod session;

pub use bridge::{Bridge, BridgeError};
pub use config::Config;
pub use session::{SessionError, SessionEvent, SessionId, SessionManager};
