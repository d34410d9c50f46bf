use super::consts::{FIN_MASK, MASKED_MASK};
use super::encoding::encode_length;
use super::frame::{apply_mask, Frame};
use crate::error::Result;

/// Serializes a frame, masking the payload when the frame carries a key.
pub fn encode_frame(frame: &Frame) -> Result<Vec<u8>> {
    let fin = if frame.fin { FIN_MASK } else { 0 };
    let first_byte = fin | (frame.rsv & 0b111) << 4 | frame.opcode.encode();
    let mask_bit = if frame.is_masked() { MASKED_MASK } else { 0 };
    let length = encode_length(frame.payload_length(), mask_bit)?;

    let mut buffer = Vec::with_capacity(1 + length.len() + 4 + frame.payload.len());
    buffer.push(first_byte);
    buffer.extend_from_slice(&length);
    match frame.mask {
        Some(mask) => {
            buffer.extend_from_slice(&mask);
            let start = buffer.len();
            buffer.extend_from_slice(&frame.payload);
            apply_mask(&mut buffer[start..], mask);
        }
        None => buffer.extend_from_slice(&frame.payload),
    }
    Ok(buffer)
}
