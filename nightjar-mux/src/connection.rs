//! Connection lifecycle state shared across every transport this crate
//! multiplexes, and a driver loop for the raw-stream case (direct,
//! non-relay peer links negotiated by the mesh participant's transport).

use crate::codec::FrameReader;
use crate::dedup::DedupWindow;
use crate::error::MuxError;
use crate::frame::MuxFrame;
use crate::heartbeat::Heartbeat;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Lifecycle state of a connection, whether it is a mesh DHT-connection or
/// a WebSocket subscriber (spec data model, §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Open,
    Closing,
    Closed,
}

/// Why a connection ended. Exactly one of these is reported per close, and
/// the driver guarantees cleanup (dropping the reader/writer, clearing
/// dedup/heartbeat state) on every path that produces one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Normal,
    BufferOverflow,
    HeartbeatTimeout,
    TransportError,
    PeerClosed,
    Shutdown,
}

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Drives a raw bidirectional stream as a multiplexed connection: frames
/// in, dedup, heartbeat, frames out to `frame_tx` for the owning
/// application to handle.
pub struct MuxConnection<R, W> {
    reader: FrameReader<R>,
    writer: W,
    heartbeat: Heartbeat,
    dedup: DedupWindow,
    node_id: String,
}

impl<R, W> MuxConnection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, node_id: impl Into<String>) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer,
            heartbeat: Heartbeat::new(),
            dedup: DedupWindow::new(),
            node_id: node_id.into(),
        }
    }

    /// Run until the connection closes. Non-heartbeat, non-duplicate
    /// frames are forwarded on `frame_tx`; if the receiver is dropped the
    /// connection is torn down as if by a local shutdown.
    pub async fn run(mut self, frame_tx: mpsc::Sender<MuxFrame>) -> CloseReason {
        loop {
            if self.heartbeat.should_send_ping() {
                let ping = MuxFrame::ping(unix_millis());
                if self.write_frame(&ping).await.is_err() {
                    return CloseReason::TransportError;
                }
                self.heartbeat.ping_sent();
            }
            if self.heartbeat.is_timed_out() {
                warn!("heartbeat pong not received in time, closing");
                return CloseReason::HeartbeatTimeout;
            }

            tokio::select! {
                result = self.reader.read_frame() => {
                    match result {
                        Ok(Some(frame)) => {
                            self.heartbeat.record_activity();
                            match self.handle_inbound(frame, &frame_tx).await {
                                Ok(true) => {}
                                Ok(false) => return CloseReason::Shutdown,
                                Err(_) => return CloseReason::TransportError,
                            }
                        }
                        Ok(None) => return CloseReason::PeerClosed,
                        Err(MuxError::BufferOverflow) => return CloseReason::BufferOverflow,
                        Err(_) => return CloseReason::TransportError,
                    }
                }
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    /// Returns `Ok(false)` if the application side has gone away and the
    /// connection should close.
    async fn handle_inbound(
        &mut self,
        frame: MuxFrame,
        frame_tx: &mpsc::Sender<MuxFrame>,
    ) -> Result<bool, MuxError> {
        match &frame {
            MuxFrame::Ping { .. } => {
                let pong = MuxFrame::pong(self.node_id.clone(), unix_millis());
                self.write_frame(&pong).await?;
                return Ok(true);
            }
            MuxFrame::Pong { .. } => {
                self.heartbeat.record_pong();
                return Ok(true);
            }
            _ => {}
        }

        if !frame.bypasses_dedup() {
            let line = frame.to_line();
            if self.dedup.check(frame.frame_type(), line.as_bytes()) {
                debug!(frame_type = frame.frame_type(), "suppressing duplicate frame");
                return Ok(true);
            }
        }

        Ok(frame_tx.send(frame).await.is_ok())
    }

    async fn write_frame(&mut self, frame: &MuxFrame) -> Result<(), MuxError> {
        let mut line = frame.to_line();
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn forwards_a_direct_message_frame() {
        let (mut client, server) = duplex(4096);
        let (reader, writer) = tokio::io::split(server);
        let conn = MuxConnection::new(reader, writer, "node-under-test");
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(conn.run(tx));

        client.write_all(b"{\"type\":\"custom\",\"v\":1}\n").await.unwrap();
        let frame = rx.recv().await.unwrap();
        assert_eq!(frame.frame_type(), "custom");

        drop(client);
        let reason = handle.await.unwrap();
        assert_eq!(reason, CloseReason::PeerClosed);
    }

    #[tokio::test]
    async fn duplicate_frames_are_suppressed_but_ping_pong_are_not() {
        let (mut client, server) = duplex(8192);
        let (reader, writer) = tokio::io::split(server);
        let conn = MuxConnection::new(reader, writer, "node-under-test");
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(conn.run(tx));

        client.write_all(b"{\"type\":\"custom\",\"v\":1}\n").await.unwrap();
        client.write_all(b"{\"type\":\"custom\",\"v\":1}\n").await.unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.frame_type(), "custom");

        client.write_all(b"{\"type\":\"custom\",\"v\":2}\n").await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.frame_type(), "custom");

        drop(client);
        handle.await.unwrap();
    }
}
