use std::convert::TryFrom;

use tokio::io::{AsyncRead, AsyncReadExt};

use super::consts::*;
use super::frame::{apply_mask, Frame, RSV_COMPRESSED};
use super::opcode::Opcode;
use crate::error::{Error, Result};

/// What the reading side of a connection accepts.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// RSV1 is allowed only when permessage-deflate was negotiated.
    pub compression: bool,
    pub max_payload: u64,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            compression: false,
            max_payload: MAX_PAYLOAD,
        }
    }
}

async fn read_array<T: AsyncRead + Unpin, const N: usize>(reader: &mut T) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).await.map_err(Error::from_read)?;
    Ok(buf)
}

pub async fn read_length_u16<T: AsyncRead + Unpin>(reader: &mut T) -> Result<u64> {
    Ok(u16::from_be_bytes(read_array(reader).await?) as u64)
}

pub async fn read_length_u64<T: AsyncRead + Unpin>(reader: &mut T) -> Result<u64> {
    check_length_u64(u64::from_be_bytes(read_array(reader).await?))
}

pub async fn read_mask<T: AsyncRead + Unpin>(reader: &mut T) -> Result<[u8; 4]> {
    read_array(reader).await
}

// the fixed part of a frame header, already validated
struct Header {
    fin: bool,
    rsv: u8,
    opcode: Opcode,
    masked: bool,
    length: u64,
}

fn check_header(head: [u8; 2], length: u64, options: ReadOptions) -> Result<Header> {
    let fin = is_fin(head[0]);
    let rsv = rsv_bits(head[0]);
    let opcode = Opcode::try_from(head[0])?;
    if opcode.is_control() {
        if !fin {
            return Err(Error::FragmentedControlFrame);
        }
        if length > MAX_CONTROL_PAYLOAD {
            return Err(Error::ControlFrameTooLarge(length));
        }
    }
    let allowed = if options.compression { RSV_COMPRESSED } else { 0 };
    if rsv & !allowed != 0 {
        return Err(Error::InvalidReservedBits(rsv));
    }
    if length > options.max_payload {
        return Err(Error::MessageTooLarge {
            size: length,
            limit: options.max_payload,
        });
    }
    Ok(Header {
        fin,
        rsv,
        opcode,
        masked: is_mask(head[1]),
        length,
    })
}

fn check_length_u64(length: u64) -> Result<u64> {
    if length > MAX_PAYLOAD {
        return Err(Error::PayloadTooLarge(length));
    }
    Ok(length)
}

fn into_frame(header: Header, mask: Option<[u8; 4]>, mut payload: Vec<u8>) -> Frame {
    if let Some(mask) = mask {
        apply_mask(&mut payload, mask);
    }
    Frame {
        fin: header.fin,
        rsv: header.rsv,
        opcode: header.opcode,
        mask,
        payload,
    }
}

/// Reads exactly one frame, unmasking its payload.
pub async fn read_frame<T: AsyncRead + Unpin>(
    reader: &mut T,
    options: ReadOptions,
) -> Result<Frame> {
    let head: [u8; 2] = read_array(reader).await?;
    let length = match head[1] & LENGTH_MASK {
        LENGTH_U16 => read_length_u16(reader).await?,
        LENGTH_U64 => read_length_u64(reader).await?,
        value => value as u64,
    };
    let header = check_header(head, length, options)?;

    let mask = if header.masked {
        Some(read_mask(reader).await?)
    } else {
        None
    };

    let length = usize::try_from(length).map_err(|_| Error::PayloadTooLarge(length))?;
    let mut payload = vec![0; length];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(Error::from_read)?;
    Ok(into_frame(header, mask, payload))
}

fn take<const N: usize>(buf: &[u8], offset: &mut usize) -> Option<[u8; N]> {
    let bytes: [u8; N] = buf.get(*offset..*offset + N)?.try_into().ok()?;
    *offset += N;
    Some(bytes)
}

/// Decodes one frame from the front of `buf`.
///
/// Returns the frame and the number of bytes it used, or `None` while the
/// frame is incomplete. Header errors are reported as soon as the header is
/// complete, before any payload has arrived.
pub fn decode_frame(buf: &[u8], options: ReadOptions) -> Result<Option<(Frame, usize)>> {
    let mut offset = 0;
    let Some(head) = take::<2>(buf, &mut offset) else {
        return Ok(None);
    };
    let length = match head[1] & LENGTH_MASK {
        LENGTH_U16 => match take::<2>(buf, &mut offset) {
            Some(bytes) => u16::from_be_bytes(bytes) as u64,
            None => return Ok(None),
        },
        LENGTH_U64 => match take::<8>(buf, &mut offset) {
            Some(bytes) => check_length_u64(u64::from_be_bytes(bytes))?,
            None => return Ok(None),
        },
        value => value as u64,
    };
    let header = check_header(head, length, options)?;

    let mask = if header.masked {
        match take::<4>(buf, &mut offset) {
            Some(mask) => Some(mask),
            None => return Ok(None),
        }
    } else {
        None
    };

    let length = usize::try_from(length).map_err(|_| Error::PayloadTooLarge(length))?;
    let end = match offset.checked_add(length) {
        Some(end) if end <= buf.len() => end,
        _ => return Ok(None),
    };
    let payload = buf[offset..end].to_vec();
    Ok(Some((into_frame(header, mask, payload), end)))
}
