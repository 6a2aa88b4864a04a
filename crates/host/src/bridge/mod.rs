//! Stdio bridge between a display surface and the session core.
//!
//! The display surface runs out of process and talks to `termhost serve`
//! over its stdin and stdout. Each message is a single JSON object followed
//! by a newline (see the `protocol` crate). Requests carry a `type` of
//! `create`, `write`, `resize` or `kill`; `create` is answered with
//! `created` or `error`, everything else is fire-and-forget. Session output
//! and termination arrive as unsolicited `data` and `exit` messages.
//!
//! ## Example
//!
//! ```rust,no_run
//! use host::bridge::Bridge;
//! use host::config::SessionConfig;
//! use host::session::SessionManager;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (manager, events) = SessionManager::new(SessionConfig::default());
//!     Bridge::new(manager, events)
//!         .run(tokio::io::stdin(), tokio::io::stdout())
//!         .await?;
//!     Ok(())
//! }
//! ```

mod connection;
mod server;

pub use connection::{BridgeConnection, BridgeError};
pub use server::Bridge;
