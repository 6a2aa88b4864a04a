//! Line-oriented connection to a display surface.

use std::io;

use protocol::{decode_line, encode_line, Event, ProtocolError, Request, MAX_LINE_SIZE};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Longest raw line buffered before giving up on it, room for `\r\n` included.
const LINE_CAP: usize = MAX_LINE_SIZE + 2;

/// Errors that can occur on a bridge connection.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A line could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// A connection carrying requests in and events out, one JSON object per
/// line.
///
/// Works over any byte stream pair: stdin/stdout in production, an
/// in-memory duplex in tests.
pub struct BridgeConnection<R, W> {
    reader: BufReader<R>,
    /// Bytes of the line being read. Kept across calls so a cancelled read
    /// resumes where it stopped.
    pending: Vec<u8>,
    /// Set after an oversized line until its terminating newline is seen.
    discarding: bool,
    writer: W,
}

impl<R, W> BridgeConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
            discarding: false,
            writer,
        }
    }

    /// Reads the next request, skipping blank lines.
    ///
    /// Returns `None` once the peer has closed its side. A malformed or
    /// oversized line yields [`BridgeError::Protocol`] and leaves the
    /// connection usable. Safe to use as a `select!` branch: no input is
    /// lost on cancellation.
    pub async fn read_request(&mut self) -> Result<Option<Request>, BridgeError> {
        loop {
            let Some(line) = self.read_line().await? else {
                return Ok(None);
            };
            match decode_line(&line) {
                Ok(request) => return Ok(Some(request)),
                Err(ProtocolError::EmptyLine) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Reads one line, never buffering more than [`LINE_CAP`] bytes of it.
    ///
    /// The rest of an oversized line is skipped on later calls.
    async fn read_line(&mut self) -> Result<Option<String>, BridgeError> {
        loop {
            let limit = LINE_CAP.saturating_sub(self.pending.len()) as u64;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.pending)
                .await?;
            let complete = self.pending.last() == Some(&b'\n');

            if self.discarding {
                self.pending.clear();
                if complete {
                    self.discarding = false;
                } else if n == 0 {
                    return Ok(None);
                }
                continue;
            }

            if n == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
            } else if !complete {
                if self.pending.len() < LINE_CAP {
                    continue;
                }
                let size = self.pending.len();
                self.pending.clear();
                self.discarding = true;
                return Err(ProtocolError::LineTooLarge {
                    size,
                    max: MAX_LINE_SIZE,
                }
                .into());
            }

            let line = std::mem::take(&mut self.pending);
            return String::from_utf8(line)
                .map(Some)
                .map_err(|e| ProtocolError::Deserialization(e.to_string()).into());
        }
    }

    /// Writes one event and flushes it.
    pub async fn send(&mut self, event: &Event) -> Result<(), BridgeError> {
        let line = encode_line(event)?;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{CreateSession, KillSession};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_read_requests_and_eof() {
        let input = b"{\"type\":\"create\",\"seq\":1,\"cols\":80,\"rows\":24}\n\n{\"type\":\"kill\",\"id\":\"s1\"}\n";
        let mut conn = BridgeConnection::new(&input[..], tokio::io::sink());

        assert_eq!(
            conn.read_request().await.unwrap(),
            Some(Request::Create(CreateSession {
                seq: 1,
                cols: 80,
                rows: 24
            }))
        );
        assert_eq!(
            conn.read_request().await.unwrap(),
            Some(Request::Kill(KillSession {
                id: "s1".to_string()
            }))
        );
        assert_eq!(conn.read_request().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_malformed_line_is_recoverable() {
        let input = b"not json\n{\"type\":\"kill\",\"id\":\"s1\"}\n";
        let mut conn = BridgeConnection::new(&input[..], tokio::io::sink());

        assert!(matches!(
            conn.read_request().await,
            Err(BridgeError::Protocol(_))
        ));
        assert!(matches!(
            conn.read_request().await,
            Ok(Some(Request::Kill(_)))
        ));
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_skipped() {
        let mut input = vec![b'x'; MAX_LINE_SIZE + 10];
        input.extend_from_slice(b"\n{\"type\":\"kill\",\"id\":\"s1\"}\n");
        let mut conn = BridgeConnection::new(&input[..], tokio::io::sink());

        let err = conn.read_request().await.unwrap_err();
        assert!(
            matches!(
                err,
                BridgeError::Protocol(ProtocolError::LineTooLarge { max, .. }) if max == MAX_LINE_SIZE
            ),
            "got: {:?}",
            err
        );
        assert!(matches!(
            conn.read_request().await,
            Ok(Some(Request::Kill(_)))
        ));
        assert_eq!(conn.read_request().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_line_does_not_wait_for_newline() {
        // The peer never terminates the line; the error must still arrive.
        let (mut client, server) = duplex(64 * 1024);
        let mut conn = BridgeConnection::new(server, tokio::io::sink());

        let writer = tokio::spawn(async move {
            let chunk = vec![b'x'; 64 * 1024];
            let mut sent = 0;
            while sent <= LINE_CAP {
                client.write_all(&chunk).await.unwrap();
                sent += chunk.len();
            }
            client
        });

        let err = conn.read_request().await.unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Protocol(ProtocolError::LineTooLarge { .. })
        ));
        drop(writer.await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_recoverable() {
        let input = b"\xff\xfe\n{\"type\":\"kill\",\"id\":\"s1\"}\n";
        let mut conn = BridgeConnection::new(&input[..], tokio::io::sink());

        assert!(matches!(
            conn.read_request().await,
            Err(BridgeError::Protocol(ProtocolError::Deserialization(_)))
        ));
        assert!(matches!(
            conn.read_request().await,
            Ok(Some(Request::Kill(_)))
        ));
    }

    #[tokio::test]
    async fn test_send_writes_one_line() {
        let (client, server) = duplex(1024);
        let mut conn = BridgeConnection::new(tokio::io::empty(), server);

        conn.send(&Event::exit("s1")).await.unwrap();
        drop(conn);

        let mut written = String::new();
        let mut client = client;
        client.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "{\"type\":\"exit\",\"id\":\"s1\"}\n");
    }
}
