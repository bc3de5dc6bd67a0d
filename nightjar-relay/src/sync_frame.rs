//! Binary `SyncFrame` wire format exchanged between the relay bridge and
//! the relay server: a two-layer varuint-tagged envelope around an opaque
//! CRDT payload.

use crate::error::{RelayError, RelayResult};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use nightjar_core::constants::MAX_SYNC_PAYLOAD_BYTES;

/// Inner tag, present only when the outer layer is `Sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncInner {
    StateVector,
    StateDiff,
    IncrementalUpdate,
}

impl SyncInner {
    fn to_varuint(self) -> u64 {
        match self {
            SyncInner::StateVector => 0,
            SyncInner::StateDiff => 1,
            SyncInner::IncrementalUpdate => 2,
        }
    }

    fn from_varuint(v: u64) -> RelayResult<Self> {
        match v {
            0 => Ok(SyncInner::StateVector),
            1 => Ok(SyncInner::StateDiff),
            2 => Ok(SyncInner::IncrementalUpdate),
            other => Err(RelayError::MalformedSyncFrame(format!("unknown sync inner tag {other}"))),
        }
    }
}

/// Outer layer: whether this frame carries CRDT sync-protocol traffic or
/// an awareness (presence) update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncFrameKind {
    Sync(SyncInner),
    Awareness,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFrame {
    pub kind: SyncFrameKind,
    pub payload: Bytes,
}

impl SyncFrame {
    pub fn sync(inner: SyncInner, payload: impl Into<Bytes>) -> RelayResult<Self> {
        Self::new(SyncFrameKind::Sync(inner), payload)
    }

    pub fn awareness(payload: impl Into<Bytes>) -> RelayResult<Self> {
        Self::new(SyncFrameKind::Awareness, payload)
    }

    fn new(kind: SyncFrameKind, payload: impl Into<Bytes>) -> RelayResult<Self> {
        let payload = payload.into();
        if payload.len() > MAX_SYNC_PAYLOAD_BYTES {
            return Err(RelayError::PayloadTooLarge(payload.len(), MAX_SYNC_PAYLOAD_BYTES));
        }
        Ok(Self { kind, payload })
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 2);
        match self.kind {
            SyncFrameKind::Sync(inner) => {
                write_varuint(&mut buf, 0);
                write_varuint(&mut buf, inner.to_varuint());
            }
            SyncFrameKind::Awareness => {
                write_varuint(&mut buf, 1);
            }
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut bytes: Bytes) -> RelayResult<Self> {
        let outer = read_varuint(&mut bytes)?;
        let kind = match outer {
            0 => {
                let inner = SyncInner::from_varuint(read_varuint(&mut bytes)?)?;
                SyncFrameKind::Sync(inner)
            }
            1 => SyncFrameKind::Awareness,
            other => return Err(RelayError::MalformedSyncFrame(format!("unknown outer tag {other}"))),
        };
        if bytes.len() > MAX_SYNC_PAYLOAD_BYTES {
            return Err(RelayError::PayloadTooLarge(bytes.len(), MAX_SYNC_PAYLOAD_BYTES));
        }
        Ok(Self { kind, payload: bytes })
    }
}

fn write_varuint(buf: &mut BytesMut, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.put_u8(byte);
            break;
        }
        buf.put_u8(byte | 0x80);
    }
}

fn read_varuint(bytes: &mut Bytes) -> RelayResult<u64> {
    let mut value = 0u64;
    let mut shift = 0u32;
    loop {
        if !bytes.has_remaining() {
            return Err(RelayError::MalformedSyncFrame("truncated varuint".to_string()));
        }
        let byte = bytes.get_u8();
        value |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(RelayError::MalformedSyncFrame("varuint too long".to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_frame_round_trips_through_encode_decode() {
        let frame = SyncFrame::sync(SyncInner::IncrementalUpdate, b"update-bytes".to_vec()).unwrap();
        let encoded = frame.encode();
        let decoded = SyncFrame::decode(encoded).unwrap();
        assert_eq!(decoded.kind, SyncFrameKind::Sync(SyncInner::IncrementalUpdate));
        assert_eq!(decoded.payload.as_ref(), b"update-bytes");
    }

    #[test]
    fn awareness_frame_carries_no_inner_tag() {
        let frame = SyncFrame::awareness(b"presence".to_vec()).unwrap();
        let encoded = frame.encode();
        assert_eq!(encoded[0], 1);
        let decoded = SyncFrame::decode(encoded).unwrap();
        assert_eq!(decoded.kind, SyncFrameKind::Awareness);
    }

    #[test]
    fn oversized_payload_is_rejected_on_construction() {
        let oversized = vec![0u8; MAX_SYNC_PAYLOAD_BYTES + 1];
        assert!(matches!(
            SyncFrame::sync(SyncInner::StateDiff, oversized),
            Err(RelayError::PayloadTooLarge(_, _))
        ));
    }

    #[test]
    fn oversized_payload_is_rejected_on_decode() {
        let mut raw = BytesMut::new();
        write_varuint(&mut raw, 1);
        raw.put_slice(&vec![0u8; MAX_SYNC_PAYLOAD_BYTES + 1]);
        assert!(matches!(
            SyncFrame::decode(raw.freeze()),
            Err(RelayError::PayloadTooLarge(_, _))
        ));
    }

    #[test]
    fn unknown_outer_tag_is_rejected() {
        let mut raw = BytesMut::new();
        write_varuint(&mut raw, 7);
        assert!(SyncFrame::decode(raw.freeze()).is_err());
    }
}
