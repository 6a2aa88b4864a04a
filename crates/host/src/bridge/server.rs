//! Request dispatch and event forwarding between a display surface and a
//! [`SessionManager`].

use std::future::Future;
use std::time::Duration;

use protocol::{CreateSession, Event, KillSession, Request, ResizeSession, WriteInput};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;

use super::connection::{BridgeConnection, BridgeError};
use crate::session::{EventReceiver, SessionEvent, SessionManager};

/// How long the event sink must stay silent before the final drain stops.
const DRAIN_QUIET: Duration = Duration::from_millis(200);

/// Drives one manager on behalf of one display surface.
pub struct Bridge {
    manager: SessionManager,
    events: EventReceiver,
}

impl Bridge {
    /// Creates a bridge around a manager and the manager's event sink.
    pub fn new(manager: SessionManager, events: EventReceiver) -> Self {
        Self { manager, events }
    }

    /// Serves until the peer disconnects.
    pub async fn run<R, W>(self, reader: R, writer: W) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.run_until(reader, writer, std::future::pending()).await
    }

    /// Serves until the peer disconnects or `shutdown` completes.
    ///
    /// Either way every remaining session is shut down before returning, and
    /// the exit events this produces are written out if the peer is still
    /// listening.
    pub async fn run_until<R, W, F>(
        mut self,
        reader: R,
        writer: W,
        shutdown: F,
    ) -> Result<(), BridgeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
        F: Future<Output = ()>,
    {
        let mut conn = BridgeConnection::new(reader, writer);
        tokio::pin!(shutdown);

        tracing::info!("Bridge serving");

        let result = loop {
            tokio::select! {
                request = conn.read_request() => match request {
                    Ok(Some(request)) => {
                        if let Some(reply) = self.dispatch(request).await {
                            if let Err(e) = conn.send(&reply).await {
                                break Err(e);
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Display surface disconnected");
                        break Ok(());
                    }
                    Err(BridgeError::Protocol(e)) => {
                        tracing::warn!(error = %e, "Ignoring malformed request");
                        if let Err(e) = conn.send(&Event::error(None, e.to_string())).await {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(e),
                },

                Some(event) = self.events.recv() => {
                    if let Err(e) = conn.send(&wire_event(event)).await {
                        break Err(e);
                    }
                }

                _ = &mut shutdown => {
                    tracing::info!("Bridge shutting down");
                    break Ok(());
                }
            }
        };

        self.manager.shutdown().await;

        // Exit events trail deregistration, so keep listening until quiet.
        if result.is_ok() {
            while let Ok(Some(event)) = timeout(DRAIN_QUIET, self.events.recv()).await {
                if conn.send(&wire_event(event)).await.is_err() {
                    break;
                }
            }
        }

        result
    }

    /// Applies one request to the manager, returning the reply if the
    /// request has one.
    async fn dispatch(&self, request: Request) -> Option<Event> {
        match request {
            Request::Create(CreateSession { seq, cols, rows }) => {
                match self.manager.create(cols, rows).await {
                    Ok(id) => Some(Event::created(seq, id)),
                    Err(e) => Some(Event::error(Some(seq), e.to_string())),
                }
            }
            Request::Write(WriteInput { id, data }) => {
                self.manager.write(&id, &data).await;
                None
            }
            Request::Resize(ResizeSession { id, cols, rows }) => {
                self.manager.resize(&id, cols, rows).await;
                None
            }
            Request::Kill(KillSession { id }) => {
                self.manager.kill(&id).await;
                None
            }
        }
    }
}

fn wire_event(event: SessionEvent) -> Event {
    match event {
        SessionEvent::Data { id, chunk } => Event::data(id, chunk),
        SessionEvent::Exit { id } => Event::exit(id),
    }
}
