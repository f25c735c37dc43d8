//! OpenFlow 1.0 wire codec.
//!
//! Every message on the wire starts with an 8-byte header:
//! `version(1) type(1) length(2) xid(4)`, all multi-byte integers
//! big-endian. The body layout depends on the type; see [`message`].

use std::io::{Read, Write};

use thiserror::Error;

pub mod buffer;
pub mod endpoint;
pub mod lldp;
pub mod message;

pub use message::OfMessage;

pub const OFP_VERSION: u8 = 0x01;
pub const HEADER_LEN: usize = 8;

/// OpenFlow 1.0 message type codes.
pub mod msg_type {
    pub const HELLO: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const ECHO_REQUEST: u8 = 2;
    pub const ECHO_REPLY: u8 = 3;
    pub const VENDOR: u8 = 4;
    pub const FEATURES_REQUEST: u8 = 5;
    pub const FEATURES_REPLY: u8 = 6;
    pub const GET_CONFIG_REQUEST: u8 = 7;
    pub const GET_CONFIG_REPLY: u8 = 8;
    pub const SET_CONFIG: u8 = 9;
    pub const PACKET_IN: u8 = 10;
    pub const FLOW_REMOVED: u8 = 11;
    pub const PORT_STATUS: u8 = 12;
    pub const PACKET_OUT: u8 = 13;
    pub const FLOW_MOD: u8 = 14;
    pub const PORT_MOD: u8 = 15;
    pub const STATS_REQUEST: u8 = 16;
    pub const STATS_REPLY: u8 = 17;
    pub const BARRIER_REQUEST: u8 = 18;
    pub const BARRIER_REPLY: u8 = 19;
}

/// Match wildcard bits at their OF1.0 positions.
pub mod wildcards {
    pub const IN_PORT: u32 = 1 << 0;
    pub const DL_VLAN: u32 = 1 << 1;
    pub const DL_SRC: u32 = 1 << 2;
    pub const DL_DST: u32 = 1 << 3;
    pub const DL_TYPE: u32 = 1 << 4;
    pub const NW_PROTO: u32 = 1 << 5;
    pub const TP_SRC: u32 = 1 << 6;
    pub const TP_DST: u32 = 1 << 7;
    pub const NW_SRC_SHIFT: u32 = 8;
    pub const NW_SRC_ALL: u32 = 32 << NW_SRC_SHIFT;
    pub const NW_DST_SHIFT: u32 = 14;
    pub const NW_DST_ALL: u32 = 32 << NW_DST_SHIFT;
    pub const DL_VLAN_PCP: u32 = 1 << 20;
    pub const NW_TOS: u32 = 1 << 21;
    pub const ALL: u32 = (1 << 22) - 1;
}

/// Reserved port numbers.
pub mod port {
    /// Largest valid physical port number.
    pub const MAX: u16 = 0xff00;
    pub const CONTROLLER: u16 = 0xfffd;
    pub const FLOOD: u16 = 0xfffb;
    pub const NONE: u16 = 0xffff;
}

/// `ofp_port_mod` config/mask bit: administratively down.
pub const PORT_DOWN: u32 = 1 << 0;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("WouldBlock")]
    WouldBlock,
    #[error("connection closed by peer")]
    ConnectionLost,
    #[error("IO error: {0}")]
    Io(std::io::Error),
    #[error("unsupported OpenFlow version 0x{0:02x}")]
    BadVersion(u8),
    #[error("bad message length {0}")]
    BadLength(u16),
    #[error("truncated {0}: got {1} bytes")]
    Truncated(&'static str, usize),
    #[error("unsupported action type {0}")]
    UnsupportedAction(u16),
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::WouldBlock => CodecError::WouldBlock,
            std::io::ErrorKind::UnexpectedEof => CodecError::ConnectionLost,
            _ => CodecError::Io(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfHeader {
    pub version: u8,
    pub msg_type: u8,
    pub length: u16,
    pub xid: u32,
}

impl OfHeader {
    pub fn parse(b: &[u8; HEADER_LEN]) -> Result<OfHeader> {
        let h = OfHeader {
            version: b[0],
            msg_type: b[1],
            length: u16::from_be_bytes([b[2], b[3]]),
            xid: u32::from_be_bytes([b[4], b[5], b[6], b[7]]),
        };
        if h.version != OFP_VERSION {
            return Err(CodecError::BadVersion(h.version));
        }
        if (h.length as usize) < HEADER_LEN {
            return Err(CodecError::BadLength(h.length));
        }
        Ok(h)
    }

    pub fn body_len(&self) -> usize {
        self.length as usize - HEADER_LEN
    }

    pub fn write(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.push(self.msg_type);
        out.extend_from_slice(&self.length.to_be_bytes());
        out.extend_from_slice(&self.xid.to_be_bytes());
    }
}

/// Read one full message from a blocking stream: the header first, then
/// exactly `length - 8` body bytes. Never reads across message boundaries.
pub fn read_frame<R: Read>(r: &mut R) -> Result<(OfHeader, Vec<u8>)> {
    let mut hdr = [0u8; HEADER_LEN];
    r.read_exact(&mut hdr)?;
    let h = OfHeader::parse(&hdr)?;
    let mut body = vec![0u8; h.body_len()];
    r.read_exact(&mut body)?;
    Ok((h, body))
}

/// Marshal and write a message with the given xid.
pub fn write_frame<W: Write>(w: &mut W, msg: &OfMessage, xid: u32) -> Result<()> {
    let buf = msg.marshal(xid);
    w.write_all(&buf)?;
    Ok(())
}
