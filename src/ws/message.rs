/// A complete, reassembled application message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Text(String),
    Binary(Vec<u8>),
}

impl Message {
    pub fn is_binary(&self) -> bool {
        matches!(self, Message::Binary(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(text) => text.as_bytes(),
            Message::Binary(data) => data,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Message::Text(text) => text.into_bytes(),
            Message::Binary(data) => data,
        }
    }
}

/// Why a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a Close frame.
    Peer { code: u16, reason: String },
    /// This side sent a Close frame, on request or after a protocol error.
    Local { code: u16, reason: String },
    /// The socket failed or hit EOF without a closing handshake.
    Disconnected,
}
