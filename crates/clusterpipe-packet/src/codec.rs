use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MuxError, Result};
use crate::multiplexer::PipeId;

/// Frame header: magic (2) + length (4) + pipe id (4) = 10 bytes.
pub const FRAME_HEADER_SIZE: usize = 10;

/// Magic bytes: "CP" (0x43 0x50).
pub const MAGIC: [u8; 2] = [0x43, 0x50];

/// One packet on a byte stream, addressed to a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub pipe_id: PipeId,
    pub payload: Bytes,
}

/// Encode a packet payload into the stream wire format.
///
/// ```text
/// ┌──────────────┬───────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Pipe id   │ Payload         │
/// │ 0x43 0x50    │ (4B LE)   │ (4B LE)   │ (Length bytes)  │
/// │ "CP"         │           │           │                 │
/// └──────────────┴───────────┴───────────┴─────────────────┘
/// ```
pub fn encode_frame(pipe_id: PipeId, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| MuxError::PayloadTooLarge {
        pipe_id,
        size: payload.len(),
        max: u32::MAX as usize,
    })?;
    dst.reserve(FRAME_HEADER_SIZE + payload.len());
    dst.put_slice(&MAGIC);
    dst.put_u32_le(len);
    dst.put_u32_le(pipe_id.get());
    dst.put_slice(payload);
    Ok(())
}

/// Decode one frame from the front of `src`.
///
/// Returns `Ok(None)` until a complete frame is buffered; on success the
/// frame's bytes are consumed.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }
    if src[0..2] != MAGIC {
        return Err(MuxError::InvalidMagic);
    }

    let mut header = &src[2..FRAME_HEADER_SIZE];
    let payload_len = header.get_u32_le() as usize;
    let pipe_id = PipeId::new(header.get_u32_le());

    if payload_len > max_payload {
        return Err(MuxError::PayloadTooLarge {
            pipe_id,
            size: payload_len,
            max: max_payload,
        });
    }
    if src.len() < FRAME_HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(FRAME_HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();
    Ok(Some(Frame { pipe_id, payload }))
}
