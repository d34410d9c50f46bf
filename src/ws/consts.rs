pub const FIN_MASK: u8 = 0b1000_0000;
pub const RSV_MASK: u8 = 0b0111_0000;
pub const OPCODE_MASK: u8 = 0b0000_1111;
pub const LENGTH_MASK: u8 = 0b0111_1111;
pub const MASKED_MASK: u8 = 0b1000_0000;

pub const LENGTH_U16: u8 = 126;
pub const LENGTH_U64: u8 = 127;
pub const MAX_CONTROL_PAYLOAD: u64 = 125;
// the most significant bit of a 64 bit length must be 0
pub const MAX_PAYLOAD: u64 = i64::MAX as u64;

pub const WS_MAGIC_CONST: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
pub const SUPPORTED_VERSIONS: [&str; 3] = ["13", "8", "7"];
pub const PERMESSAGE_DEFLATE: &str = "permessage-deflate";
pub const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

pub const CLOSE_NORMAL: u16 = 1000;
pub const CLOSE_PROTOCOL_ERROR: u16 = 1002;
pub const CLOSE_INVALID_PAYLOAD: u16 = 1007;
pub const CLOSE_MESSAGE_TOO_BIG: u16 = 1009;

pub const fn is_fin(byte: u8) -> bool {
    (byte & FIN_MASK) == FIN_MASK
}
pub const fn is_mask(byte: u8) -> bool {
    (byte & MASKED_MASK) == MASKED_MASK
}
pub const fn rsv_bits(byte: u8) -> u8 {
    (byte & RSV_MASK) >> 4
}

/// Codes a peer may not put on the wire.
pub const fn is_invalid_close_code(code: u16) -> bool {
    matches!(code, 0..=999 | 1004..=1006 | 1012..=1016 | 1100 | 2000..=2999)
}
