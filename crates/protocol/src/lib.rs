//! # termhost Protocol Library
//!
//! Message definitions shared by the termhost bridge and the display
//! surfaces that drive it.
//!
//! ## Overview
//!
//! - **Message Definitions**: requests (`create`, `write`, `resize`, `kill`)
//!   and events (`created`, `data`, `exit`, `error`)
//! - **Framing**: newline-delimited JSON, one message per line
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{decode_line, encode_line, Event, Request};
//!
//! let request: Request = decode_line(r#"{"type":"create","seq":1,"cols":80,"rows":24}"#).unwrap();
//! assert!(matches!(request, Request::Create(_)));
//!
//! let line = encode_line(&Event::exit("session-1")).unwrap();
//! assert_eq!(line, "{\"type\":\"exit\",\"id\":\"session-1\"}\n");
//! ```
//!
//! ## Modules
//!
//! - [`messages`]: Request and event definitions
//! - [`framing`]: Line encoding and decoding
//! - [`error`]: Error types

pub mod error;
pub mod framing;
pub mod messages;

pub use error::{ProtocolError, Result};
pub use framing::{decode_line, encode_line, MAX_LINE_SIZE};
pub use messages::{
    CreateSession, ErrorMessage, Event, KillSession, Request, ResizeSession, SessionCreated,
    SessionData, SessionExit, SessionId, WriteInput,
};
