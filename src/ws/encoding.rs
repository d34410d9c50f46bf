use super::consts::{LENGTH_U16, LENGTH_U64, MAX_PAYLOAD};
use crate::error::{Error, Result};

/// Minimal length encoding; `mask_bit` is OR-ed into the first byte.
pub fn encode_length(length: u64, mask_bit: u8) -> Result<Vec<u8>> {
    if length <= 125 {
        // the first byte is the length
        Ok(vec![mask_bit | length as u8])
    } else if length <= 0xFFFF {
        // the first byte is 126, read the next 2 bytes as u16 for a length
        Ok([&[mask_bit | LENGTH_U16][..], &(length as u16).to_be_bytes()].concat())
    } else if length <= MAX_PAYLOAD {
        // the first byte is 127, read the next 8 bytes as u64 for a length
        Ok([&[mask_bit | LENGTH_U64][..], &length.to_be_bytes()].concat())
    } else {
        Err(Error::PayloadTooLarge(length))
    }
}
