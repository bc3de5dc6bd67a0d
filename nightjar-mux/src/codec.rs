//! Newline-delimited JSON framing over an arbitrary byte stream, enforcing
//! the two size caps: a connection-destroying cumulative buffer cap, and a
//! per-line cap that drops only the offending line.

use crate::error::MuxError;
use crate::frame::MuxFrame;
use bytes::BytesMut;
use nightjar_core::constants::{MUX_BUFFER_OVERFLOW_BYTES, MUX_MAX_LINE_BYTES};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

enum ExtractedLine {
    Frame(MuxFrame),
    /// A complete line was present but exceeded the per-line cap, or failed
    /// to parse; it was dropped. The caller should look for another line in
    /// the same buffer before reading more bytes.
    Dropped,
    /// No newline yet and the buffer has grown past the cumulative cap:
    /// the connection must be destroyed.
    Overflow,
    /// No complete line yet, within the cumulative cap; read more bytes.
    NeedMoreData,
}

/// Reads [`MuxFrame`]s off an `AsyncRead` stream, applying the framing
/// contract from the peer connection multiplexer's spec.
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, buf: BytesMut::new() }
    }

    /// Read the next frame, looping internally over dropped oversized or
    /// malformed lines. Returns `Ok(None)` on clean EOF, and
    /// `Err(MuxError::BufferOverflow)` if the cumulative cap is exceeded
    /// with no newline in sight — the caller must destroy the connection.
    pub async fn read_frame(&mut self) -> Result<Option<MuxFrame>, MuxError> {
        loop {
            match self.extract_line() {
                ExtractedLine::Frame(frame) => return Ok(Some(frame)),
                ExtractedLine::Dropped => continue,
                ExtractedLine::Overflow => return Err(MuxError::BufferOverflow),
                ExtractedLine::NeedMoreData => {}
            }
            self.buf.reserve(8192);
            let n = self.inner.read_buf(&mut self.buf).await?;
            if n == 0 {
                // Clean EOF; any partial trailing bytes never formed a
                // complete frame and are discarded.
                return Ok(None);
            }
        }
    }

    fn extract_line(&mut self) -> ExtractedLine {
        let Some(newline_pos) = self.buf.iter().position(|&b| b == b'\n') else {
            if self.buf.len() > MUX_BUFFER_OVERFLOW_BYTES {
                return ExtractedLine::Overflow;
            }
            return ExtractedLine::NeedMoreData;
        };
        let mut line = self.buf.split_to(newline_pos + 1);
        line.truncate(line.len() - 1); // drop the newline itself
        if !line.is_empty() && line[line.len() - 1] == b'\r' {
            line.truncate(line.len() - 1);
        }
        if line.len() > MUX_MAX_LINE_BYTES {
            warn!(line_len = line.len(), "dropping oversized line");
            return ExtractedLine::Dropped;
        }
        match MuxFrame::parse(&line) {
            Ok(frame) => ExtractedLine::Frame(frame),
            Err(_) => {
                warn!("dropping line that failed to parse as JSON");
                ExtractedLine::Dropped
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_a_single_line() {
        let data = b"{\"type\":\"ping\",\"timestamp\":1}\n".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame.frame_type(), "ping");
    }

    #[tokio::test]
    async fn reads_multiple_lines_from_one_read() {
        let data = b"{\"type\":\"ping\",\"timestamp\":1}\n{\"type\":\"ping\",\"timestamp\":2}\n".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        let first = reader.read_frame().await.unwrap().unwrap();
        let second = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(first, MuxFrame::ping(1));
        assert_eq!(second, MuxFrame::ping(2));
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_but_connection_continues() {
        let big = "x".repeat(MUX_MAX_LINE_BYTES + 10);
        let data = format!("{{\"type\":\"custom\",\"v\":\"{big}\"}}\n{{\"type\":\"ping\",\"timestamp\":5}}\n");
        let mut reader = FrameReader::new(Cursor::new(data.into_bytes()));
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, MuxFrame::ping(5));
    }

    #[tokio::test]
    async fn malformed_json_is_dropped_but_connection_continues() {
        let data = b"not json at all\n{\"type\":\"ping\",\"timestamp\":7}\n".to_vec();
        let mut reader = FrameReader::new(Cursor::new(data));
        let frame = reader.read_frame().await.unwrap().unwrap();
        assert_eq!(frame, MuxFrame::ping(7));
    }

    #[tokio::test]
    async fn cumulative_overflow_with_no_newline_errors() {
        let data = "x".repeat(MUX_BUFFER_OVERFLOW_BYTES + 10).into_bytes();
        let mut reader = FrameReader::new(Cursor::new(data));
        let result = reader.read_frame().await;
        assert!(matches!(result, Err(MuxError::BufferOverflow)));
    }

    #[tokio::test]
    async fn clean_eof_with_empty_buffer_returns_none() {
        let mut reader = FrameReader::new(Cursor::new(Vec::new()));
        let result = reader.read_frame().await.unwrap();
        assert!(result.is_none());
    }
}
