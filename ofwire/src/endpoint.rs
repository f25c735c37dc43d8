use std::convert::TryInto;
use std::io::Read;

use crate::buffer::Buffer;
use crate::{CodecError, OfHeader, Result, HEADER_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReceiveState {
    RecvHeader,
    RecvBody(OfHeader),
}

/// Incremental message reader for a non-blocking stream.
///
/// Feeds bytes into an internal header/body state machine and yields one
/// complete `(header, body)` pair at a time. `Ok(None)` means the socket
/// would block and the caller should wait for the next readiness event.
pub struct MessageReader {
    state: ReceiveState,
    header: Buffer,
    body: Buffer,
}

impl Default for MessageReader {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageReader {
    pub fn new() -> Self {
        MessageReader {
            state: ReceiveState::RecvHeader,
            header: Buffer::with_len(HEADER_LEN),
            body: Buffer::default(),
        }
    }

    pub fn poll_message<R: Read>(&mut self, stream: &mut R) -> Result<Option<(OfHeader, Vec<u8>)>> {
        loop {
            match self.state {
                ReceiveState::RecvHeader => {
                    match Self::recv_buffer(stream, &mut self.header) {
                        Ok(_) => {}
                        Err(CodecError::WouldBlock) => return Ok(None),
                        Err(e) => return Err(e),
                    }
                    if self.header.is_clear() {
                        let raw: [u8; HEADER_LEN] =
                            self.header.as_slice().try_into().expect("header len");
                        let h = OfHeader::parse(&raw)?;
                        self.body = Buffer::with_len(h.body_len());
                        self.state = ReceiveState::RecvBody(h);
                    }
                }
                ReceiveState::RecvBody(h) => {
                    if !self.body.is_clear() {
                        match Self::recv_buffer(stream, &mut self.body) {
                            Ok(_) => {}
                            Err(CodecError::WouldBlock) => return Ok(None),
                            Err(e) => return Err(e),
                        }
                    }
                    if self.body.is_clear() {
                        let body = std::mem::take(&mut self.body).into_vec();
                        self.header = Buffer::with_len(HEADER_LEN);
                        self.state = ReceiveState::RecvHeader;
                        log::trace!(
                            "recv message type {} len {} xid {}",
                            h.msg_type,
                            h.length,
                            h.xid
                        );
                        return Ok(Some((h, body)));
                    }
                }
            }
        }
    }

    fn recv_buffer<R: Read>(stream: &mut R, buffer: &mut Buffer) -> Result<usize> {
        let buf = buffer.get_remain_buffer_mut();
        if buf.is_empty() {
            return Ok(0);
        }
        match stream.read(buf) {
            Ok(0) => Err(CodecError::ConnectionLost),
            Ok(nbytes) => {
                buffer.mark_handled(nbytes);
                Ok(nbytes)
            }
            Err(e) => Err(e.into()),
        }
    }
}
