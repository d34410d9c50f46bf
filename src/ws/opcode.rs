use std::convert::TryFrom;

use super::consts::OPCODE_MASK;
use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
}

impl Opcode {
    pub fn encode(self) -> u8 {
        use Opcode::*;
        match self {
            Continuation => 0x0,
            Text => 0x1,
            Binary => 0x2,
            Close => 0x8,
            Ping => 0x9,
            Pong => 0xA,
        }
    }

    pub fn is_control(self) -> bool {
        matches!(self, Opcode::Close | Opcode::Ping | Opcode::Pong)
    }
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    // accepts the unchanged first header byte
    fn try_from(byte: u8) -> Result<Self, Error> {
        use Opcode::*;
        match byte & OPCODE_MASK {
            0x0 => Ok(Continuation),
            0x1 => Ok(Text),
            0x2 => Ok(Binary),
            0x8 => Ok(Close),
            0x9 => Ok(Ping),
            0xA => Ok(Pong),
            // 0x3-0x7 and 0xB-0xF are reserved
            value => Err(Error::UnknownOpcode(value)),
        }
    }
}
