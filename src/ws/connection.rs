use std::time::Duration;

use hyper::upgrade::Upgraded;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::consts::{is_invalid_close_code, CLOSE_NORMAL, MAX_CONTROL_PAYLOAD};
use super::deflate::Deflate;
use super::frame::Frame;
use super::message::{CloseReason, Message};
use super::opcode::Opcode;
use super::read::{decode_frame, ReadOptions};
use super::write::encode_frame;
use crate::config::WebSocketConfig;
use crate::error::{Error, Result};

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Open,
    /// A Close frame is being sent.
    Closing,
    Closed,
}

// message being reassembled from a data frame and its continuations
struct Assembly {
    opcode: Opcode,
    compressed: bool,
    buffer: Vec<u8>,
}

/// One live WebSocket connection, owned by the task that serves it.
pub struct WebSocket<S = Upgraded> {
    stream: S,
    // bytes received but not yet decoded, kept across timed out reads
    read_buf: Vec<u8>,
    state: State,
    assembly: Option<Assembly>,
    deflate: Option<Deflate>,
    options: ReadOptions,
    close_reason: Option<CloseReason>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> WebSocket<S> {
    pub fn new(stream: S, compression: bool, config: &WebSocketConfig) -> Self {
        WebSocket {
            stream,
            read_buf: Vec::new(),
            state: State::Open,
            assembly: None,
            deflate: compression.then(|| Deflate::new(config.compression_level)),
            options: ReadOptions {
                compression,
                max_payload: config.max_message_size,
            },
            close_reason: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn compression(&self) -> bool {
        self.deflate.is_some()
    }

    /// Waits up to `timeout` for the next message; `None` on timeout or when
    /// the connection closed while receiving. A frame cut off by the timeout
    /// stays buffered for the next call.
    pub async fn recv(&mut self, timeout: Duration) -> Result<Option<Message>> {
        if self.is_closed() {
            return Err(Error::AlreadyClosed);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let result = match self.next_frame() {
                Ok(Some(frame)) => self.handle_frame(frame).await,
                Ok(None) => {
                    if !self.fill_read_buf(deadline).await {
                        return Ok(None);
                    }
                    continue;
                }
                Err(e) => Err(e),
            };
            match result {
                Ok(Some(message)) => return Ok(Some(message)),
                Ok(None) if self.is_closed() => return Ok(None),
                Ok(None) => {}
                Err(e) => {
                    self.fail(e).await;
                    return Ok(None);
                }
            }
        }
    }

    /// Sends one unfragmented message.
    pub async fn send(&mut self, payload: &[u8], binary: bool, compress: bool) -> Result<()> {
        if self.state != State::Open {
            return Err(Error::AlreadyClosed);
        }
        let opcode = if binary { Opcode::Binary } else { Opcode::Text };
        let frame = match self.deflate.as_mut() {
            Some(deflate) if compress => {
                Frame::new(true, opcode, deflate.compress(payload)?).compressed()
            }
            _ => Frame::new(true, opcode, payload.to_vec()),
        };
        let result = self.write_frame(&frame).await;
        if let Err(e) = &result {
            if e.is_transport() {
                self.disconnect();
            }
        }
        result
    }

    pub async fn send_message(&mut self, message: &Message, compress: bool) -> Result<()> {
        self.send(message.as_bytes(), message.is_binary(), compress)
            .await
    }

    /// Best effort: write errors are logged and dropped, a second call does nothing.
    pub async fn close(&mut self, code: u16, reason: &str) {
        if self.state != State::Open {
            return;
        }
        self.state = State::Closing;
        let reason = truncate_reason(reason);
        if let Err(e) = self
            .write_frame(&Frame::close(code, reason.as_bytes()))
            .await
        {
            debug!("close frame not delivered: {}", e);
        }
        if let Err(e) = self.stream.shutdown().await {
            debug!("shutdown after close failed: {}", e);
        }
        self.state = State::Closed;
        self.close_reason.get_or_insert(CloseReason::Local {
            code,
            reason: reason.to_string(),
        });
    }

    async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let buffer = encode_frame(frame)?;
        self.stream.write_all(&buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state = State::Closed;
        self.assembly = None;
        self.read_buf.clear();
        self.close_reason.get_or_insert(CloseReason::Disconnected);
    }

    async fn fail(&mut self, error: Error) {
        if error.is_transport() {
            debug!("connection lost: {}", error);
            self.disconnect();
        } else {
            warn!("closing on protocol error: {}", error);
            self.close(error.close_code(), &error.to_string()).await;
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let (frame, used) = match decode_frame(&self.read_buf, self.options)? {
            Some(decoded) => decoded,
            None => return Ok(None),
        };
        self.read_buf.drain(..used);
        Ok(Some(frame))
    }

    // false once the deadline passed or the connection is gone
    async fn fill_read_buf(&mut self, deadline: Instant) -> bool {
        self.read_buf.reserve(READ_CHUNK);
        let read = tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.read_buf));
        match read.await {
            Err(_) => false,
            Ok(Ok(0)) => {
                if self.read_buf.is_empty() {
                    debug!("peer went away without a closing handshake");
                } else {
                    debug!(pending = self.read_buf.len(), "peer went away mid-frame");
                }
                self.disconnect();
                false
            }
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                self.fail(Error::Io(e)).await;
                false
            }
        }
    }

    async fn handle_frame(&mut self, frame: Frame) -> Result<Option<Message>> {
        if frame.opcode.is_control() && frame.rsv != 0 {
            return Err(Error::InvalidReservedBits(frame.rsv));
        }
        match frame.opcode {
            Opcode::Continuation => {
                // RSV1 marks only the first frame of a compressed message
                if frame.rsv != 0 {
                    return Err(Error::InvalidReservedBits(frame.rsv));
                }
                let assembly = self
                    .assembly
                    .as_mut()
                    .ok_or(Error::UnexpectedContinuation)?;
                assembly.buffer.extend_from_slice(&frame.payload);
            }
            Opcode::Text | Opcode::Binary => {
                if self.assembly.is_some() {
                    return Err(Error::UnexpectedDataFrame);
                }
                self.assembly = Some(Assembly {
                    opcode: frame.opcode,
                    compressed: frame.is_compressed(),
                    buffer: frame.payload,
                });
            }
            Opcode::Close => {
                self.on_close(&frame.payload).await?;
                return Ok(None);
            }
            Opcode::Ping => {
                self.write_frame(&Frame::pong(frame.payload)).await?;
                return Ok(None);
            }
            Opcode::Pong => return Ok(None),
        }

        let size = self.assembly.as_ref().map_or(0, |a| a.buffer.len() as u64);
        if size > self.options.max_payload {
            return Err(Error::MessageTooLarge {
                size,
                limit: self.options.max_payload,
            });
        }
        if !frame.fin {
            return Ok(None);
        }
        match self.assembly.take() {
            Some(assembly) => self.finish(assembly).map(Some),
            None => Ok(None),
        }
    }

    fn finish(&mut self, assembly: Assembly) -> Result<Message> {
        let payload = match self.deflate.as_mut() {
            Some(deflate) if assembly.compressed => {
                deflate.decompress(&assembly.buffer, self.options.max_payload)?
            }
            _ => assembly.buffer,
        };
        match assembly.opcode {
            Opcode::Binary => Ok(Message::Binary(payload)),
            _ => String::from_utf8(payload)
                .map(Message::Text)
                .map_err(|_| Error::InvalidUtf8),
        }
    }

    async fn on_close(&mut self, payload: &[u8]) -> Result<()> {
        let (code, reason) = match payload {
            [] => (CLOSE_NORMAL, String::new()),
            [_] => return Err(Error::InvalidClosePayload(1)),
            [high, low, reason @ ..] => {
                let code = u16::from_be_bytes([*high, *low]);
                if is_invalid_close_code(code) {
                    return Err(Error::InvalidCloseCode(code));
                }
                let reason = std::str::from_utf8(reason).map_err(|_| Error::InvalidUtf8)?;
                (code, reason.to_string())
            }
        };
        debug!(code, %reason, "peer closed the connection");
        self.close_reason = Some(CloseReason::Peer {
            code,
            reason: reason.clone(),
        });
        self.close(code, &reason).await;
        Ok(())
    }
}

// a close frame carries the 2 byte code plus at most 123 bytes of reason
fn truncate_reason(reason: &str) -> &str {
    let limit = MAX_CONTROL_PAYLOAD as usize - 2;
    if reason.len() <= limit {
        return reason;
    }
    let mut end = limit;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}
