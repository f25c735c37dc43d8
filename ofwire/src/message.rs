//! Typed OpenFlow 1.0 messages and their binary encodings.

use crate::{msg_type, wildcards, CodecError, OfHeader, Result, HEADER_LEN, OFP_VERSION};

fn get_u16(b: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([b[off], b[off + 1]])
}

fn get_u32(b: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([b[off], b[off + 1], b[off + 2], b[off + 3]])
}

fn get_u64(b: &[u8], off: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&b[off..off + 8]);
    u64::from_be_bytes(raw)
}

/// The 40-byte `ofp_match`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub wildcards: u32,
    pub in_port: u16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub dl_vlan: u16,
    pub dl_vlan_pcp: u8,
    pub dl_type: u16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub nw_src: u32,
    pub nw_dst: u32,
    pub tp_src: u16,
    pub tp_dst: u16,
}

impl Default for Match {
    fn default() -> Self {
        Match {
            wildcards: wildcards::ALL,
            in_port: 0,
            dl_src: [0; 6],
            dl_dst: [0; 6],
            dl_vlan: 0,
            dl_vlan_pcp: 0,
            dl_type: 0,
            nw_tos: 0,
            nw_proto: 0,
            nw_src: 0,
            nw_dst: 0,
            tp_src: 0,
            tp_dst: 0,
        }
    }
}

impl Match {
    pub const LEN: usize = 40;

    /// Match on ingress port and destination MAC only; everything else
    /// wildcarded. This is the shape installed by the L2 learning handler.
    pub fn l2_learned(in_port: u16, dl_dst: [u8; 6]) -> Match {
        Match {
            wildcards: wildcards::ALL & !(wildcards::IN_PORT | wildcards::DL_DST),
            in_port,
            dl_dst,
            ..Default::default()
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.wildcards.to_be_bytes());
        out.extend_from_slice(&self.in_port.to_be_bytes());
        out.extend_from_slice(&self.dl_src);
        out.extend_from_slice(&self.dl_dst);
        out.extend_from_slice(&self.dl_vlan.to_be_bytes());
        out.push(self.dl_vlan_pcp);
        out.push(0); // pad
        out.extend_from_slice(&self.dl_type.to_be_bytes());
        out.push(self.nw_tos);
        out.push(self.nw_proto);
        out.extend_from_slice(&[0, 0]); // pad
        out.extend_from_slice(&self.nw_src.to_be_bytes());
        out.extend_from_slice(&self.nw_dst.to_be_bytes());
        out.extend_from_slice(&self.tp_src.to_be_bytes());
        out.extend_from_slice(&self.tp_dst.to_be_bytes());
    }

    pub fn decode(b: &[u8]) -> Result<Match> {
        if b.len() < Self::LEN {
            return Err(CodecError::Truncated("ofp_match", b.len()));
        }
        let mut dl_src = [0u8; 6];
        dl_src.copy_from_slice(&b[6..12]);
        let mut dl_dst = [0u8; 6];
        dl_dst.copy_from_slice(&b[12..18]);
        Ok(Match {
            wildcards: get_u32(b, 0),
            in_port: get_u16(b, 4),
            dl_src,
            dl_dst,
            dl_vlan: get_u16(b, 18),
            dl_vlan_pcp: b[20],
            dl_type: get_u16(b, 22),
            nw_tos: b[24],
            nw_proto: b[25],
            nw_src: get_u32(b, 28),
            nw_dst: get_u32(b, 32),
            tp_src: get_u16(b, 36),
            tp_dst: get_u16(b, 38),
        })
    }
}

/// Flow/packet actions. Only OUTPUT is needed by this controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Output { port: u16, max_len: u16 },
}

impl Action {
    pub const OUTPUT_TYPE: u16 = 0;
    pub const OUTPUT_LEN: usize = 8;

    pub fn output(port: u16) -> Action {
        Action::Output { port, max_len: 0 }
    }

    pub fn encoded_len(&self) -> usize {
        match self {
            Action::Output { .. } => Self::OUTPUT_LEN,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        match *self {
            Action::Output { port, max_len } => {
                out.extend_from_slice(&Self::OUTPUT_TYPE.to_be_bytes());
                out.extend_from_slice(&(Self::OUTPUT_LEN as u16).to_be_bytes());
                out.extend_from_slice(&port.to_be_bytes());
                out.extend_from_slice(&max_len.to_be_bytes());
            }
        }
    }

    pub fn decode_list(mut b: &[u8]) -> Result<Vec<Action>> {
        let mut actions = Vec::new();
        while !b.is_empty() {
            if b.len() < 4 {
                return Err(CodecError::Truncated("action header", b.len()));
            }
            let ty = get_u16(b, 0);
            let len = get_u16(b, 2) as usize;
            if len < 4 || len > b.len() {
                return Err(CodecError::Truncated("action body", b.len()));
            }
            match ty {
                Self::OUTPUT_TYPE => {
                    if len != Self::OUTPUT_LEN {
                        return Err(CodecError::Truncated("output action", len));
                    }
                    actions.push(Action::Output {
                        port: get_u16(b, 4),
                        max_len: get_u16(b, 6),
                    });
                }
                other => return Err(CodecError::UnsupportedAction(other)),
            }
            b = &b[len..];
        }
        Ok(actions)
    }
}

/// `ofp_flow_mod` commands.
pub mod flow_mod_cmd {
    pub const ADD: u16 = 0;
    pub const MODIFY: u16 = 1;
    pub const MODIFY_STRICT: u16 = 2;
    pub const DELETE: u16 = 3;
    pub const DELETE_STRICT: u16 = 4;
}

pub const NO_BUFFER: u32 = 0xffff_ffff;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowMod {
    pub pattern: Match,
    pub cookie: u64,
    pub command: u16,
    pub idle_timeout: u16,
    pub hard_timeout: u16,
    pub priority: u16,
    pub buffer_id: u32,
    pub out_port: u16,
    pub flags: u16,
    pub actions: Vec<Action>,
}

impl FlowMod {
    fn body_len(&self) -> usize {
        Match::LEN + 24 + self.actions.iter().map(|a| a.encoded_len()).sum::<usize>()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        self.pattern.encode(out);
        out.extend_from_slice(&self.cookie.to_be_bytes());
        out.extend_from_slice(&self.command.to_be_bytes());
        out.extend_from_slice(&self.idle_timeout.to_be_bytes());
        out.extend_from_slice(&self.hard_timeout.to_be_bytes());
        out.extend_from_slice(&self.priority.to_be_bytes());
        out.extend_from_slice(&self.buffer_id.to_be_bytes());
        out.extend_from_slice(&self.out_port.to_be_bytes());
        out.extend_from_slice(&self.flags.to_be_bytes());
        for a in &self.actions {
            a.encode(out);
        }
    }

    fn decode(b: &[u8]) -> Result<FlowMod> {
        if b.len() < Match::LEN + 24 {
            return Err(CodecError::Truncated("ofp_flow_mod", b.len()));
        }
        let pattern = Match::decode(&b[..Match::LEN])?;
        let p = Match::LEN;
        Ok(FlowMod {
            pattern,
            cookie: get_u64(b, p),
            command: get_u16(b, p + 8),
            idle_timeout: get_u16(b, p + 10),
            hard_timeout: get_u16(b, p + 12),
            priority: get_u16(b, p + 14),
            buffer_id: get_u32(b, p + 16),
            out_port: get_u16(b, p + 20),
            flags: get_u16(b, p + 22),
            actions: Action::decode_list(&b[p + 24..])?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketIn {
    pub buffer_id: u32,
    pub total_len: u16,
    pub in_port: u16,
    pub reason: u8,
    pub data: Vec<u8>,
}

impl PacketIn {
    fn body_len(&self) -> usize {
        10 + self.data.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.buffer_id.to_be_bytes());
        out.extend_from_slice(&self.total_len.to_be_bytes());
        out.extend_from_slice(&self.in_port.to_be_bytes());
        out.push(self.reason);
        out.push(0); // pad
        out.extend_from_slice(&self.data);
    }

    fn decode(b: &[u8]) -> Result<PacketIn> {
        if b.len() < 10 {
            return Err(CodecError::Truncated("ofp_packet_in", b.len()));
        }
        Ok(PacketIn {
            buffer_id: get_u32(b, 0),
            total_len: get_u16(b, 4),
            in_port: get_u16(b, 6),
            reason: b[8],
            data: b[10..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketOut {
    pub buffer_id: u32,
    pub in_port: u16,
    pub actions: Vec<Action>,
    pub data: Vec<u8>,
}

impl PacketOut {
    fn body_len(&self) -> usize {
        8 + self.actions.iter().map(|a| a.encoded_len()).sum::<usize>() + self.data.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        let actions_len: usize = self.actions.iter().map(|a| a.encoded_len()).sum();
        out.extend_from_slice(&self.buffer_id.to_be_bytes());
        out.extend_from_slice(&self.in_port.to_be_bytes());
        out.extend_from_slice(&(actions_len as u16).to_be_bytes());
        for a in &self.actions {
            a.encode(out);
        }
        out.extend_from_slice(&self.data);
    }

    fn decode(b: &[u8]) -> Result<PacketOut> {
        if b.len() < 8 {
            return Err(CodecError::Truncated("ofp_packet_out", b.len()));
        }
        let actions_len = get_u16(b, 6) as usize;
        if b.len() < 8 + actions_len {
            return Err(CodecError::Truncated("packet_out actions", b.len()));
        }
        Ok(PacketOut {
            buffer_id: get_u32(b, 0),
            in_port: get_u16(b, 4),
            actions: Action::decode_list(&b[8..8 + actions_len])?,
            data: b[8 + actions_len..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMod {
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    pub config: u32,
    pub mask: u32,
    pub advertise: u32,
}

/// Advertise mask for a target speed, picking the highest full-duplex
/// feature bit not above the speed. 0 means "advertise nothing".
pub fn advertise_for_speed(speed_mbps: u32) -> u32 {
    const F_10MB_FD: u32 = 1 << 1;
    const F_100MB_FD: u32 = 1 << 3;
    const F_1GB_FD: u32 = 1 << 5;
    const F_10GB_FD: u32 = 1 << 6;
    if speed_mbps >= 10_000 {
        F_10GB_FD
    } else if speed_mbps >= 1_000 {
        F_1GB_FD
    } else if speed_mbps >= 100 {
        F_100MB_FD
    } else if speed_mbps >= 10 {
        F_10MB_FD
    } else {
        0
    }
}

impl PortMod {
    const BODY_LEN: usize = 24;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.port_no.to_be_bytes());
        out.extend_from_slice(&self.hw_addr);
        out.extend_from_slice(&self.config.to_be_bytes());
        out.extend_from_slice(&self.mask.to_be_bytes());
        out.extend_from_slice(&self.advertise.to_be_bytes());
        out.extend_from_slice(&[0; 4]); // pad
    }

    fn decode(b: &[u8]) -> Result<PortMod> {
        if b.len() < Self::BODY_LEN {
            return Err(CodecError::Truncated("ofp_port_mod", b.len()));
        }
        let mut hw_addr = [0u8; 6];
        hw_addr.copy_from_slice(&b[2..8]);
        Ok(PortMod {
            port_no: get_u16(b, 0),
            hw_addr,
            config: get_u32(b, 8),
            mask: get_u32(b, 12),
            advertise: get_u32(b, 16),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SwitchConfig {
    pub flags: u16,
    pub miss_send_len: u16,
}

impl SwitchConfig {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.flags.to_be_bytes());
        out.extend_from_slice(&self.miss_send_len.to_be_bytes());
    }

    fn decode(b: &[u8]) -> Result<SwitchConfig> {
        if b.len() < 4 {
            return Err(CodecError::Truncated("ofp_switch_config", b.len()));
        }
        Ok(SwitchConfig {
            flags: get_u16(b, 0),
            miss_send_len: get_u16(b, 2),
        })
    }
}

/// One physical port description inside FEATURES_REPLY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhyPort {
    pub port_no: u16,
    pub hw_addr: [u8; 6],
    pub name: [u8; 16],
    pub config: u32,
    pub state: u32,
    pub curr: u32,
    pub advertised: u32,
    pub supported: u32,
    pub peer: u32,
}

impl PhyPort {
    pub const LEN: usize = 48;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.port_no.to_be_bytes());
        out.extend_from_slice(&self.hw_addr);
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&self.config.to_be_bytes());
        out.extend_from_slice(&self.state.to_be_bytes());
        out.extend_from_slice(&self.curr.to_be_bytes());
        out.extend_from_slice(&self.advertised.to_be_bytes());
        out.extend_from_slice(&self.supported.to_be_bytes());
        out.extend_from_slice(&self.peer.to_be_bytes());
    }

    fn decode(b: &[u8]) -> Result<PhyPort> {
        if b.len() < Self::LEN {
            return Err(CodecError::Truncated("ofp_phy_port", b.len()));
        }
        let mut hw_addr = [0u8; 6];
        hw_addr.copy_from_slice(&b[2..8]);
        let mut name = [0u8; 16];
        name.copy_from_slice(&b[8..24]);
        Ok(PhyPort {
            port_no: get_u16(b, 0),
            hw_addr,
            name,
            config: get_u32(b, 24),
            state: get_u32(b, 28),
            curr: get_u32(b, 32),
            advertised: get_u32(b, 36),
            supported: get_u32(b, 40),
            peer: get_u32(b, 44),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchFeatures {
    pub datapath_id: u64,
    pub n_buffers: u32,
    pub n_tables: u8,
    pub capabilities: u32,
    pub actions: u32,
    pub ports: Vec<PhyPort>,
}

impl SwitchFeatures {
    fn body_len(&self) -> usize {
        24 + self.ports.len() * PhyPort::LEN
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.datapath_id.to_be_bytes());
        out.extend_from_slice(&self.n_buffers.to_be_bytes());
        out.push(self.n_tables);
        out.extend_from_slice(&[0; 3]); // pad
        out.extend_from_slice(&self.capabilities.to_be_bytes());
        out.extend_from_slice(&self.actions.to_be_bytes());
        for p in &self.ports {
            p.encode(out);
        }
    }

    fn decode(b: &[u8]) -> Result<SwitchFeatures> {
        if b.len() < 24 {
            return Err(CodecError::Truncated("ofp_switch_features", b.len()));
        }
        let mut ports = Vec::new();
        let mut off = 24;
        while off + PhyPort::LEN <= b.len() {
            ports.push(PhyPort::decode(&b[off..off + PhyPort::LEN])?);
            off += PhyPort::LEN;
        }
        if off != b.len() {
            return Err(CodecError::Truncated("features port list", b.len() - off));
        }
        Ok(SwitchFeatures {
            datapath_id: get_u64(b, 0),
            n_buffers: get_u32(b, 8),
            n_tables: b[12],
            capabilities: get_u32(b, 16),
            actions: get_u32(b, 20),
            ports,
        })
    }
}

/// Stats subtype for per-port counters.
pub const STATS_PORT: u16 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsRequest {
    /// PORT stats; `port::NONE` (0xffff) asks for every port.
    Port { flags: u16, port_no: u16 },
    Other { kind: u16, flags: u16, body: Vec<u8> },
}

impl StatsRequest {
    pub fn all_ports() -> StatsRequest {
        StatsRequest::Port {
            flags: 0,
            port_no: crate::port::NONE,
        }
    }

    fn body_len(&self) -> usize {
        match self {
            StatsRequest::Port { .. } => 4 + 8,
            StatsRequest::Other { body, .. } => 4 + body.len(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            StatsRequest::Port { flags, port_no } => {
                out.extend_from_slice(&STATS_PORT.to_be_bytes());
                out.extend_from_slice(&flags.to_be_bytes());
                out.extend_from_slice(&port_no.to_be_bytes());
                out.extend_from_slice(&[0; 6]); // pad
            }
            StatsRequest::Other { kind, flags, body } => {
                out.extend_from_slice(&kind.to_be_bytes());
                out.extend_from_slice(&flags.to_be_bytes());
                out.extend_from_slice(body);
            }
        }
    }

    fn decode(b: &[u8]) -> Result<StatsRequest> {
        if b.len() < 4 {
            return Err(CodecError::Truncated("ofp_stats_request", b.len()));
        }
        let kind = get_u16(b, 0);
        let flags = get_u16(b, 2);
        if kind == STATS_PORT {
            if b.len() < 12 {
                return Err(CodecError::Truncated("port_stats_request", b.len()));
            }
            Ok(StatsRequest::Port {
                flags,
                port_no: get_u16(b, 4),
            })
        } else {
            Ok(StatsRequest::Other {
                kind,
                flags,
                body: b[4..].to_vec(),
            })
        }
    }
}

/// One 104-byte `ofp_port_stats` record. Counters are big-endian u64.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortStatsEntry {
    pub port_no: u16,
    pub rx_packets: u64,
    pub tx_packets: u64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_dropped: u64,
    pub tx_dropped: u64,
    pub rx_errors: u64,
    pub tx_errors: u64,
    pub rx_frame_err: u64,
    pub rx_over_err: u64,
    pub rx_crc_err: u64,
    pub collisions: u64,
}

impl PortStatsEntry {
    pub const LEN: usize = 104;

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.port_no.to_be_bytes());
        out.extend_from_slice(&[0; 6]); // pad
        for v in &[
            self.rx_packets,
            self.tx_packets,
            self.rx_bytes,
            self.tx_bytes,
            self.rx_dropped,
            self.tx_dropped,
            self.rx_errors,
            self.tx_errors,
            self.rx_frame_err,
            self.rx_over_err,
            self.rx_crc_err,
            self.collisions,
        ] {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }

    fn decode(b: &[u8]) -> Result<PortStatsEntry> {
        if b.len() < Self::LEN {
            return Err(CodecError::Truncated("ofp_port_stats", b.len()));
        }
        Ok(PortStatsEntry {
            port_no: get_u16(b, 0),
            rx_packets: get_u64(b, 8),
            tx_packets: get_u64(b, 16),
            rx_bytes: get_u64(b, 24),
            tx_bytes: get_u64(b, 32),
            rx_dropped: get_u64(b, 40),
            tx_dropped: get_u64(b, 48),
            rx_errors: get_u64(b, 56),
            tx_errors: get_u64(b, 64),
            rx_frame_err: get_u64(b, 72),
            rx_over_err: get_u64(b, 80),
            rx_crc_err: get_u64(b, 88),
            collisions: get_u64(b, 96),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsReplyBody {
    Port(Vec<PortStatsEntry>),
    Other { kind: u16, body: Vec<u8> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsReply {
    pub flags: u16,
    pub body: StatsReplyBody,
}

impl StatsReply {
    pub fn ports(entries: Vec<PortStatsEntry>) -> StatsReply {
        StatsReply {
            flags: 0,
            body: StatsReplyBody::Port(entries),
        }
    }

    fn body_len(&self) -> usize {
        4 + match &self.body {
            StatsReplyBody::Port(entries) => entries.len() * PortStatsEntry::LEN,
            StatsReplyBody::Other { body, .. } => body.len(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        match &self.body {
            StatsReplyBody::Port(entries) => {
                out.extend_from_slice(&STATS_PORT.to_be_bytes());
                out.extend_from_slice(&self.flags.to_be_bytes());
                for e in entries {
                    e.encode(out);
                }
            }
            StatsReplyBody::Other { kind, body } => {
                out.extend_from_slice(&kind.to_be_bytes());
                out.extend_from_slice(&self.flags.to_be_bytes());
                out.extend_from_slice(body);
            }
        }
    }

    fn decode(b: &[u8]) -> Result<StatsReply> {
        if b.len() < 4 {
            return Err(CodecError::Truncated("ofp_stats_reply", b.len()));
        }
        let kind = get_u16(b, 0);
        let flags = get_u16(b, 2);
        if kind == STATS_PORT {
            let body = &b[4..];
            if body.len() % PortStatsEntry::LEN != 0 {
                return Err(CodecError::Truncated("port stats entries", body.len()));
            }
            let entries = body
                .chunks(PortStatsEntry::LEN)
                .map(PortStatsEntry::decode)
                .collect::<Result<Vec<_>>>()?;
            Ok(StatsReply {
                flags,
                body: StatsReplyBody::Port(entries),
            })
        } else {
            Ok(StatsReply {
                flags,
                body: StatsReplyBody::Other {
                    kind,
                    body: b[4..].to_vec(),
                },
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMsg {
    pub err_type: u16,
    pub code: u16,
    pub data: Vec<u8>,
}

impl ErrorMsg {
    fn body_len(&self) -> usize {
        4 + self.data.len()
    }

    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.err_type.to_be_bytes());
        out.extend_from_slice(&self.code.to_be_bytes());
        out.extend_from_slice(&self.data);
    }

    fn decode(b: &[u8]) -> Result<ErrorMsg> {
        if b.len() < 4 {
            return Err(CodecError::Truncated("ofp_error_msg", b.len()));
        }
        Ok(ErrorMsg {
            err_type: get_u16(b, 0),
            code: get_u16(b, 2),
            data: b[4..].to_vec(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfMessage {
    Hello,
    Error(ErrorMsg),
    EchoRequest(Vec<u8>),
    EchoReply(Vec<u8>),
    FeaturesRequest,
    FeaturesReply(SwitchFeatures),
    GetConfigRequest,
    GetConfigReply(SwitchConfig),
    SetConfig(SwitchConfig),
    PacketIn(PacketIn),
    PacketOut(PacketOut),
    FlowMod(FlowMod),
    PortMod(PortMod),
    StatsRequest(StatsRequest),
    StatsReply(StatsReply),
    BarrierRequest,
    BarrierReply,
    /// Anything this controller does not interpret (VENDOR, PORT_STATUS, ...).
    Other { msg_type: u8, body: Vec<u8> },
}

impl OfMessage {
    pub fn msg_type(&self) -> u8 {
        use OfMessage::*;
        match self {
            Hello => msg_type::HELLO,
            Error(_) => msg_type::ERROR,
            EchoRequest(_) => msg_type::ECHO_REQUEST,
            EchoReply(_) => msg_type::ECHO_REPLY,
            FeaturesRequest => msg_type::FEATURES_REQUEST,
            FeaturesReply(_) => msg_type::FEATURES_REPLY,
            GetConfigRequest => msg_type::GET_CONFIG_REQUEST,
            GetConfigReply(_) => msg_type::GET_CONFIG_REPLY,
            SetConfig(_) => msg_type::SET_CONFIG,
            PacketIn(_) => msg_type::PACKET_IN,
            PacketOut(_) => msg_type::PACKET_OUT,
            FlowMod(_) => msg_type::FLOW_MOD,
            PortMod(_) => msg_type::PORT_MOD,
            StatsRequest(_) => msg_type::STATS_REQUEST,
            StatsReply(_) => msg_type::STATS_REPLY,
            BarrierRequest => msg_type::BARRIER_REQUEST,
            BarrierReply => msg_type::BARRIER_REPLY,
            Other { msg_type, .. } => *msg_type,
        }
    }

    fn body_len(&self) -> usize {
        use OfMessage::*;
        match self {
            Hello | FeaturesRequest | GetConfigRequest | BarrierRequest | BarrierReply => 0,
            Error(e) => e.body_len(),
            EchoRequest(p) | EchoReply(p) => p.len(),
            FeaturesReply(f) => f.body_len(),
            GetConfigReply(_) | SetConfig(_) => 4,
            PacketIn(p) => p.body_len(),
            PacketOut(p) => p.body_len(),
            FlowMod(f) => f.body_len(),
            PortMod(_) => self::PortMod::BODY_LEN,
            StatsRequest(s) => s.body_len(),
            StatsReply(s) => s.body_len(),
            Other { body, .. } => body.len(),
        }
    }

    /// Serialize header + body with the given transaction id.
    pub fn marshal(&self, xid: u32) -> Vec<u8> {
        let length = HEADER_LEN + self.body_len();
        debug_assert!(length <= u16::MAX as usize);
        let header = OfHeader {
            version: OFP_VERSION,
            msg_type: self.msg_type(),
            length: length as u16,
            xid,
        };
        let mut out = Vec::with_capacity(length);
        header.write(&mut out);
        use OfMessage::*;
        match self {
            Hello | FeaturesRequest | GetConfigRequest | BarrierRequest | BarrierReply => {}
            Error(e) => e.encode(&mut out),
            EchoRequest(p) | EchoReply(p) => out.extend_from_slice(p),
            FeaturesReply(f) => f.encode(&mut out),
            GetConfigReply(c) | SetConfig(c) => c.encode(&mut out),
            PacketIn(p) => p.encode(&mut out),
            PacketOut(p) => p.encode(&mut out),
            FlowMod(f) => f.encode(&mut out),
            PortMod(p) => p.encode(&mut out),
            StatsRequest(s) => s.encode(&mut out),
            StatsReply(s) => s.encode(&mut out),
            Other { body, .. } => out.extend_from_slice(body),
        }
        debug_assert_eq!(out.len(), length);
        out
    }

    /// Interpret a framed body according to the header's type.
    pub fn parse(header: &OfHeader, body: &[u8]) -> Result<OfMessage> {
        use OfMessage::*;
        let msg = match header.msg_type {
            msg_type::HELLO => Hello,
            msg_type::ERROR => Error(ErrorMsg::decode(body)?),
            msg_type::ECHO_REQUEST => EchoRequest(body.to_vec()),
            msg_type::ECHO_REPLY => EchoReply(body.to_vec()),
            msg_type::FEATURES_REQUEST => FeaturesRequest,
            msg_type::FEATURES_REPLY => FeaturesReply(SwitchFeatures::decode(body)?),
            msg_type::GET_CONFIG_REQUEST => GetConfigRequest,
            msg_type::GET_CONFIG_REPLY => GetConfigReply(SwitchConfig::decode(body)?),
            msg_type::SET_CONFIG => SetConfig(SwitchConfig::decode(body)?),
            msg_type::PACKET_IN => PacketIn(self::PacketIn::decode(body)?),
            msg_type::PACKET_OUT => PacketOut(self::PacketOut::decode(body)?),
            msg_type::FLOW_MOD => FlowMod(self::FlowMod::decode(body)?),
            msg_type::PORT_MOD => PortMod(self::PortMod::decode(body)?),
            msg_type::STATS_REQUEST => StatsRequest(self::StatsRequest::decode(body)?),
            msg_type::STATS_REPLY => StatsReply(self::StatsReply::decode(body)?),
            msg_type::BARRIER_REQUEST => BarrierRequest,
            msg_type::BARRIER_REPLY => BarrierReply,
            other => Other {
                msg_type: other,
                body: body.to_vec(),
            },
        };
        Ok(msg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{port, HEADER_LEN};
    use std::convert::TryInto;

    fn roundtrip(msg: OfMessage, xid: u32) {
        let bytes = msg.marshal(xid);
        let header = OfHeader::parse(bytes[..HEADER_LEN].try_into().unwrap()).unwrap();
        assert_eq!(header.xid, xid);
        assert_eq!(header.length as usize, bytes.len());
        let decoded = OfMessage::parse(&header, &bytes[HEADER_LEN..]).unwrap();
        assert_eq!(decoded, msg);
        // and byte-for-byte back again
        assert_eq!(decoded.marshal(xid), bytes);
    }

    #[test]
    fn roundtrip_plain_messages() {
        roundtrip(OfMessage::Hello, 1);
        roundtrip(OfMessage::FeaturesRequest, 2);
        roundtrip(OfMessage::GetConfigRequest, 3);
        roundtrip(OfMessage::BarrierRequest, 4);
        roundtrip(OfMessage::BarrierReply, 5);
        roundtrip(OfMessage::EchoRequest(vec![1, 2, 3]), 6);
        roundtrip(OfMessage::EchoReply(vec![]), 7);
    }

    #[test]
    fn roundtrip_config_and_features() {
        roundtrip(
            OfMessage::SetConfig(SwitchConfig {
                flags: 0,
                miss_send_len: 0xffff,
            }),
            8,
        );
        let port = PhyPort {
            port_no: 1,
            hw_addr: [2, 0, 0, 0, 0, 1],
            name: *b"eth0\0\0\0\0\0\0\0\0\0\0\0\0",
            config: 0,
            state: 0,
            curr: 1 << 6,
            advertised: 0,
            supported: 0,
            peer: 0,
        };
        roundtrip(
            OfMessage::FeaturesReply(SwitchFeatures {
                datapath_id: 0xdead_beef_0000_0001,
                n_buffers: 256,
                n_tables: 2,
                capabilities: 0x87,
                actions: 0xfff,
                ports: vec![port],
            }),
            9,
        );
    }

    #[test]
    fn roundtrip_flow_mod() {
        let fm = FlowMod {
            pattern: Match::l2_learned(2, [0xaa; 6]),
            cookie: 0x1,
            command: flow_mod_cmd::ADD,
            idle_timeout: 30,
            hard_timeout: 0,
            priority: 100,
            buffer_id: 42,
            out_port: port::NONE,
            flags: 0,
            actions: vec![Action::output(1)],
        };
        roundtrip(OfMessage::FlowMod(fm), 10);
    }

    #[test]
    fn roundtrip_packet_messages() {
        roundtrip(
            OfMessage::PacketIn(PacketIn {
                buffer_id: 7,
                total_len: 60,
                in_port: 3,
                reason: 0,
                data: vec![0xab; 60],
            }),
            11,
        );
        roundtrip(
            OfMessage::PacketOut(PacketOut {
                buffer_id: NO_BUFFER,
                in_port: port::NONE,
                actions: vec![Action::output(port::FLOOD)],
                data: vec![1, 2, 3, 4],
            }),
            12,
        );
    }

    #[test]
    fn roundtrip_stats_and_port_mod() {
        roundtrip(OfMessage::StatsRequest(StatsRequest::all_ports()), 13);
        let entry = PortStatsEntry {
            port_no: 1,
            rx_bytes: 125_000_000,
            tx_bytes: 99,
            ..Default::default()
        };
        roundtrip(OfMessage::StatsReply(StatsReply::ports(vec![entry])), 14);
        roundtrip(
            OfMessage::PortMod(PortMod {
                port_no: 2,
                hw_addr: [0; 6],
                config: crate::PORT_DOWN,
                mask: crate::PORT_DOWN,
                advertise: 0,
            }),
            15,
        );
    }

    #[test]
    fn roundtrip_error_and_unknown() {
        roundtrip(
            OfMessage::Error(ErrorMsg {
                err_type: 3,
                code: 2,
                data: vec![0xde, 0xad],
            }),
            16,
        );
        // stats kinds we do not interpret keep their bytes
        roundtrip(
            OfMessage::StatsReply(StatsReply {
                flags: 0,
                body: StatsReplyBody::Other {
                    kind: 0,
                    body: vec![1, 2, 3],
                },
            }),
            17,
        );
        // PORT_STATUS passes through as an opaque body
        roundtrip(
            OfMessage::Other {
                msg_type: crate::msg_type::PORT_STATUS,
                body: vec![0; 64],
            },
            18,
        );
    }

    #[test]
    fn match_is_40_bytes_with_canonical_wildcards() {
        let mut buf = Vec::new();
        Match::default().encode(&mut buf);
        assert_eq!(buf.len(), Match::LEN);

        let m = Match::l2_learned(2, [0xaa; 6]);
        assert_eq!(m.wildcards & crate::wildcards::IN_PORT, 0);
        assert_eq!(m.wildcards & crate::wildcards::DL_DST, 0);
        for bit in &[
            crate::wildcards::DL_VLAN,
            crate::wildcards::DL_SRC,
            crate::wildcards::DL_TYPE,
            crate::wildcards::NW_PROTO,
            crate::wildcards::TP_SRC,
            crate::wildcards::TP_DST,
            crate::wildcards::DL_VLAN_PCP,
            crate::wildcards::NW_TOS,
        ] {
            assert_eq!(m.wildcards & bit, *bit);
        }
    }

    #[test]
    fn reserved_port_numbers() {
        assert_eq!(port::CONTROLLER, 0xfffd);
        assert_eq!(port::FLOOD, 0xfffb);
        assert_eq!(port::NONE, 0xffff);
    }
}
