use std::io;

use thiserror::Error;

use crate::ws::consts::{
    CLOSE_INVALID_PAYLOAD, CLOSE_MESSAGE_TOO_BIG, CLOSE_NORMAL, CLOSE_PROTOCOL_ERROR,
};

pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong on a single WebSocket connection.
///
/// Handshake failures never show up here: they are answered at the HTTP level
/// by [`crate::ws::handshake::Rejection`] before a connection exists.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unexpected EOF while reading a frame")]
    UnexpectedEof,
    #[error("transport error: {0}")]
    Io(#[from] io::Error),

    #[error("fragmented control frame")]
    FragmentedControlFrame,
    #[error("control frame payload of {0} bytes exceeds 125")]
    ControlFrameTooLarge(u64),
    #[error("invalid reserved bits {0:#05b}")]
    InvalidReservedBits(u8),
    #[error("unknown opcode {0:#X}")]
    UnknownOpcode(u8),
    #[error("payload of {0} bytes can not be framed")]
    PayloadTooLarge(u64),
    #[error("unexpected continuation frame")]
    UnexpectedContinuation,
    #[error("data frame received while a message is being assembled")]
    UnexpectedDataFrame,
    #[error("close frame payload of {0} byte is too short")]
    InvalidClosePayload(usize),
    #[error("invalid close code {0}")]
    InvalidCloseCode(u16),
    #[error("invalid deflate stream: {0}")]
    Compression(String),

    #[error("invalid UTF-8 in text payload")]
    InvalidUtf8,

    #[error("message of {size} bytes exceeds limit of {limit}")]
    MessageTooLarge { size: u64, limit: u64 },

    #[error("WebSocket already closed")]
    AlreadyClosed,
}

impl Error {
    /// Socket level failures: the peer is unreachable, so no Close frame is attempted.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Io(_) | Error::UnexpectedEof)
    }

    /// Status code sent in the Close frame that answers this error.
    pub fn close_code(&self) -> u16 {
        match self {
            Error::InvalidUtf8 => CLOSE_INVALID_PAYLOAD,
            Error::MessageTooLarge { .. } => CLOSE_MESSAGE_TOO_BIG,
            Error::Io(_) | Error::UnexpectedEof | Error::AlreadyClosed => CLOSE_NORMAL,
            _ => CLOSE_PROTOCOL_ERROR,
        }
    }

    pub(crate) fn from_read(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(err)
        }
    }
}
