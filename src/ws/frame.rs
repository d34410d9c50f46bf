use super::opcode::Opcode;

/// RSV1, the only reserved bit with a meaning: the message is deflated.
pub const RSV_COMPRESSED: u8 = 0b100;

/// A single WebSocket frame with its payload already unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub fin: bool,
    /// RSV1..RSV3 as a 3 bit field, RSV1 being the most significant.
    pub rsv: u8,
    pub opcode: Opcode,
    /// Set when the frame is (or should be) masked on the wire.
    pub mask: Option<[u8; 4]>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(fin: bool, opcode: Opcode, payload: Vec<u8>) -> Self {
        Frame {
            fin,
            rsv: 0,
            opcode,
            mask: None,
            payload,
        }
    }

    pub fn text(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Text, payload.into())
    }

    pub fn binary(payload: impl Into<Vec<u8>>) -> Self {
        Frame::new(true, Opcode::Binary, payload.into())
    }

    pub fn pong(payload: Vec<u8>) -> Self {
        Frame::new(true, Opcode::Pong, payload)
    }

    pub fn close(code: u16, reason: &[u8]) -> Self {
        let payload = [&code.to_be_bytes()[..], reason].concat();
        Frame::new(true, Opcode::Close, payload)
    }

    pub fn with_mask(mut self, mask: [u8; 4]) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn compressed(mut self) -> Self {
        self.rsv |= RSV_COMPRESSED;
        self
    }

    pub fn is_compressed(&self) -> bool {
        self.rsv & RSV_COMPRESSED != 0
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    pub fn payload_length(&self) -> u64 {
        self.payload.len() as u64
    }
}

pub fn apply_mask(payload: &mut [u8], mask: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask[i % 4];
    }
}
