//! OpenFlow 1.0 session manager.
//!
//! Owns the listening socket and every switch socket on a dedicated I/O
//! thread multiplexed with `mio`. One shared mutex protects the switch
//! inventory, per-switch MAC tables and last port counters; every public
//! operation acquires it while dispatching I/O.

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU32, AtomicU64, Ordering::SeqCst};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use ofwire::endpoint::MessageReader;
use ofwire::message::{
    flow_mod_cmd, Action, FlowMod, Match, PacketIn, PacketOut, PortMod, PortStatsEntry,
    StatsReplyBody, StatsRequest, SwitchConfig, NO_BUFFER,
};
use ofwire::{lldp, message::advertise_for_speed, port as ofport, CodecError, OfMessage};

use crate::models::PortStats;

pub type SwitchId = i32;

pub const DEFAULT_OF_PORT: u16 = 6633;
const LISTENER: Token = Token(0);
const POLL_TIMEOUT: Duration = Duration::from_secs(1);
/// Grace period between issuing stats requests and reading the replies.
const STATS_SETTLE: Duration = Duration::from_millis(150);
const FALLBACK_DPID: u64 = 0xdead_beef;

/// A neighbor observation decoded from a punted discovery frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LldpEvent {
    pub src_swid: SwitchId,
    pub src_port: u16,
    pub dst_swid: SwitchId,
    pub dst_port: u16,
}

pub type ErrorCallback = Box<dyn Fn(SwitchId, u16, u16, &str) + Send + Sync>;

#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    pub port_no: u16,
    pub up: bool,
    pub curr_speed_mbps: u32,
    pub last: PortStats,
}

#[derive(Debug, Clone, Default)]
pub struct SwitchInfo {
    pub swid: SwitchId,
    pub dpid: u64,
    pub connected: bool,
    pub ports: BTreeMap<u16, PortInfo>,
}

struct SwConn {
    stream: TcpStream,
    reader: MessageReader,
    swid: SwitchId,
    dpid: u64,
    connected: bool,
    feature_ports: Vec<u16>,
    mac_to_port: FnvHashMap<[u8; 6], u16>,
    last_ps: BTreeMap<u16, PortStatsEntry>,
}

impl SwConn {
    fn new(stream: TcpStream, swid: SwitchId) -> Self {
        SwConn {
            stream,
            reader: MessageReader::new(),
            swid,
            dpid: 0,
            connected: false,
            feature_ports: Vec::new(),
            mac_to_port: FnvHashMap::default(),
            last_ps: BTreeMap::new(),
        }
    }

    /// Ports to emit discovery frames on: the FEATURES_REPLY inventory,
    /// then whatever ports have reported counters, then 1..4 as a
    /// bootstrap guess while we know nothing.
    fn emission_ports(&self) -> Vec<u16> {
        if !self.feature_ports.is_empty() {
            return self.feature_ports.clone();
        }
        if !self.last_ps.is_empty() {
            return self.last_ps.keys().copied().collect();
        }
        (1..=4).collect()
    }
}

#[derive(Default)]
struct Inner {
    conns: HashMap<Token, SwConn>,
    swid_to_token: BTreeMap<SwitchId, Token>,
}

impl Inner {
    fn next_swid(&self) -> SwitchId {
        (1..).find(|i| !self.swid_to_token.contains_key(i)).unwrap()
    }
}

pub struct OfController {
    inner: Mutex<Inner>,
    running: AtomicBool,
    xid: AtomicU32,
    lldp_period_ms: AtomicU64,
    stats_period_ms: AtomicU64,
    local_port: AtomicU16,
    lldp_tx: Mutex<Option<mpsc::Sender<LldpEvent>>>,
    on_error: Mutex<Option<ErrorCallback>>,
    loop_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl Default for OfController {
    fn default() -> Self {
        Self::new()
    }
}

impl OfController {
    pub fn new() -> Self {
        OfController {
            inner: Mutex::new(Inner::default()),
            running: AtomicBool::new(false),
            xid: AtomicU32::new(1),
            lldp_period_ms: AtomicU64::new(2000),
            stats_period_ms: AtomicU64::new(3000),
            local_port: AtomicU16::new(0),
            lldp_tx: Mutex::new(None),
            on_error: Mutex::new(None),
            loop_handle: Mutex::new(None),
        }
    }

    /// Bind the listening socket and spawn the I/O loop thread.
    pub fn start(self: Arc<Self>, of_port: u16) -> anyhow::Result<()> {
        if self.running.swap(true, SeqCst) {
            return Ok(());
        }
        let addr: SocketAddr = format!("0.0.0.0:{}", of_port).parse()?;
        let listener = match TcpListener::bind(addr) {
            Ok(l) => l,
            Err(e) => {
                self.running.store(false, SeqCst);
                return Err(anyhow::anyhow!("failed to bind {}: {}", addr, e));
            }
        };
        self.local_port
            .store(listener.local_addr()?.port(), SeqCst);
        log::info!("OpenFlow controller listening on {}", listener.local_addr()?);

        let this = Arc::clone(&self);
        let handle = thread::Builder::new()
            .name("of-io".to_owned())
            .spawn(move || this.io_loop(listener))?;
        *self.loop_handle.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// Stop the I/O loop and tear down every session. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, SeqCst) {
            return;
        }
        if let Some(handle) = self.loop_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        let mut inner = self.inner.lock().unwrap();
        inner.conns.clear();
        inner.swid_to_token.clear();
        log::info!("controller stopped");
    }

    /// The actual bound port (useful when started with port 0).
    pub fn local_port(&self) -> u16 {
        self.local_port.load(SeqCst)
    }

    pub fn set_lldp_period(&self, p: Duration) {
        self.lldp_period_ms.store(p.as_millis() as u64, SeqCst);
    }

    pub fn set_stats_period(&self, p: Duration) {
        self.stats_period_ms.store(p.as_millis() as u64, SeqCst);
    }

    /// Register the channel on which decoded discovery events are delivered.
    pub fn set_lldp_sender(&self, tx: mpsc::Sender<LldpEvent>) {
        *self.lldp_tx.lock().unwrap() = Some(tx);
    }

    pub fn on_error(&self, cb: ErrorCallback) {
        *self.on_error.lock().unwrap() = Some(cb);
    }

    // ---- I/O loop ----

    fn io_loop(&self, mut listener: TcpListener) {
        let mut poll = match Poll::new() {
            Ok(p) => p,
            Err(e) => {
                log::error!("poll creation failed: {}", e);
                self.running.store(false, SeqCst);
                return;
            }
        };
        if let Err(e) = poll
            .registry()
            .register(&mut listener, LISTENER, Interest::READABLE)
        {
            log::error!("listener registration failed: {}", e);
            self.running.store(false, SeqCst);
            return;
        }

        let mut events = Events::with_capacity(256);
        let mut next_token: usize = 1;
        let mut last_lldp = Instant::now();
        let mut last_stats = Instant::now();

        while self.running.load(SeqCst) {
            match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
                Ok(()) => {}
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    log::error!("poll failed: {}", e);
                    break;
                }
            }

            for event in events.iter() {
                match event.token() {
                    LISTENER => self.accept_pending(&poll, &listener, &mut next_token),
                    token => self.drain_socket(token),
                }
            }

            let now = Instant::now();
            if now.duration_since(last_lldp)
                >= Duration::from_millis(self.lldp_period_ms.load(SeqCst))
            {
                self.lldp_tick();
                last_lldp = now;
            }
            if now.duration_since(last_stats)
                >= Duration::from_millis(self.stats_period_ms.load(SeqCst))
            {
                self.stats_tick();
                last_stats = now;
            }
        }

        let mut inner = self.inner.lock().unwrap();
        inner.conns.clear();
        inner.swid_to_token.clear();
    }

    fn accept_pending(&self, poll: &Poll, listener: &TcpListener, next_token: &mut usize) {
        loop {
            match listener.accept() {
                Ok((mut stream, addr)) => {
                    let token = Token(*next_token);
                    *next_token += 1;
                    if let Err(e) =
                        poll.registry()
                            .register(&mut stream, token, Interest::READABLE)
                    {
                        log::warn!("cannot register switch socket from {}: {}", addr, e);
                        continue;
                    }
                    let mut inner = self.inner.lock().unwrap();
                    let swid = inner.next_swid();
                    let mut conn = SwConn::new(stream, swid);
                    if let Err(e) = self.greet(&mut conn) {
                        log::warn!("handshake with {} failed: {}", addr, e);
                        continue;
                    }
                    log::info!("switch {} connected from {}", swid, addr);
                    inner.swid_to_token.insert(swid, token);
                    inner.conns.insert(token, conn);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::error!("accept failed: {}", e);
                    break;
                }
            }
        }
    }

    /// HELLO, FEATURES_REQUEST, then SET_CONFIG so packet-ins carry full
    /// payloads.
    fn greet(&self, conn: &mut SwConn) -> Result<(), CodecError> {
        self.send_msg(&mut conn.stream, &OfMessage::Hello)?;
        self.send_msg(&mut conn.stream, &OfMessage::FeaturesRequest)?;
        self.send_msg(
            &mut conn.stream,
            &OfMessage::SetConfig(SwitchConfig {
                flags: 0,
                miss_send_len: 0xffff,
            }),
        )?;
        Ok(())
    }

    /// Read every complete message currently buffered on one socket.
    fn drain_socket(&self, token: Token) {
        let mut pending_errors: Vec<(SwitchId, u16, u16, String)> = Vec::new();
        {
            let mut inner = self.inner.lock().unwrap();
            if !inner.conns.contains_key(&token) {
                return;
            }
            loop {
                let conn = match inner.conns.get_mut(&token) {
                    Some(c) => c,
                    None => break,
                };
                match conn.reader.poll_message(&mut conn.stream) {
                    Ok(Some((header, body))) => match OfMessage::parse(&header, &body) {
                        Ok(msg) => {
                            if let Err(e) =
                                self.dispatch(&mut inner, token, header.xid, msg, &mut pending_errors)
                            {
                                log::warn!("dispatch error, closing session: {}", e);
                                Self::purge_locked(&mut inner, token);
                                break;
                            }
                        }
                        Err(e) => {
                            log::warn!("malformed message, closing session: {}", e);
                            Self::purge_locked(&mut inner, token);
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(CodecError::ConnectionLost) => {
                        log::info!("switch {} disconnected", conn.swid);
                        Self::purge_locked(&mut inner, token);
                        break;
                    }
                    Err(e) => {
                        log::warn!("read error, closing session: {}", e);
                        Self::purge_locked(&mut inner, token);
                        break;
                    }
                }
            }
        }
        if !pending_errors.is_empty() {
            let cb = self.on_error.lock().unwrap();
            if let Some(cb) = cb.as_ref() {
                for (swid, ty, code, msg) in &pending_errors {
                    cb(*swid, *ty, *code, msg);
                }
            }
        }
    }

    fn dispatch(
        &self,
        inner: &mut Inner,
        token: Token,
        xid: u32,
        msg: OfMessage,
        pending_errors: &mut Vec<(SwitchId, u16, u16, String)>,
    ) -> Result<(), CodecError> {
        match msg {
            OfMessage::Hello => {}
            OfMessage::EchoRequest(payload) => {
                let conn = inner.conns.get_mut(&token).unwrap();
                Self::send_raw(&mut conn.stream, &OfMessage::EchoReply(payload), xid)?;
            }
            OfMessage::FeaturesReply(f) => {
                let conn = inner.conns.get_mut(&token).unwrap();
                conn.dpid = f.datapath_id;
                conn.connected = true;
                conn.feature_ports = f
                    .ports
                    .iter()
                    .map(|p| p.port_no)
                    .filter(|&p| p > 0 && p <= ofport::MAX)
                    .collect();
                conn.feature_ports.sort_unstable();
                log::info!(
                    "switch {}: dpid 0x{:016x}, {} ports",
                    conn.swid,
                    conn.dpid,
                    conn.feature_ports.len()
                );
                self.send_msg(
                    &mut conn.stream,
                    &OfMessage::SetConfig(SwitchConfig {
                        flags: 0,
                        miss_send_len: 0xffff,
                    }),
                )?;
                self.send_msg(&mut conn.stream, &OfMessage::GetConfigRequest)?;
            }
            OfMessage::GetConfigReply(_) => {}
            OfMessage::PacketIn(pi) => {
                if lldp::is_lldp(&pi.data) {
                    self.handle_lldp_in(inner, token, &pi);
                } else {
                    self.l2_learn(inner, token, &pi)?;
                }
            }
            OfMessage::StatsReply(sr) => {
                if let StatsReplyBody::Port(entries) = sr.body {
                    let conn = inner.conns.get_mut(&token).unwrap();
                    for e in entries {
                        conn.last_ps.insert(e.port_no, e);
                    }
                }
            }
            OfMessage::Error(e) => {
                let swid = inner.conns.get(&token).unwrap().swid;
                log::warn!(
                    "switch {} reported error type {} code {}",
                    swid,
                    e.err_type,
                    e.code
                );
                let detail = format!("{:02x?}", &e.data[..e.data.len().min(16)]);
                pending_errors.push((swid, e.err_type, e.code, detail));
            }
            OfMessage::EchoReply(_) | OfMessage::BarrierReply => {}
            other => {
                log::trace!("ignoring message type {}", other.msg_type());
            }
        }
        Ok(())
    }

    fn handle_lldp_in(&self, inner: &mut Inner, token: Token, pi: &PacketIn) {
        let (dst_swid, dst_port) = match inner.conns.get(&token) {
            Some(c) => (c.swid, pi.in_port),
            None => return,
        };
        let (dpid, src_port) = match lldp::parse_frame(&pi.data) {
            Some(v) => v,
            None => return,
        };
        let src_swid = inner
            .conns
            .values()
            .find(|c| c.connected && c.dpid == dpid)
            .map(|c| c.swid);
        if let Some(src_swid) = src_swid {
            let ev = LldpEvent {
                src_swid,
                src_port,
                dst_swid,
                dst_port,
            };
            log::trace!("lldp {:?}", ev);
            if let Some(tx) = self.lldp_tx.lock().unwrap().as_ref() {
                let _ = tx.send(ev);
            }
        }
    }

    /// Reactive L2 learning: remember the source, forward to a learned
    /// destination (installing a flow keyed on the switch buffer so this
    /// very packet goes out), flood otherwise.
    fn l2_learn(&self, inner: &mut Inner, token: Token, pi: &PacketIn) -> Result<(), CodecError> {
        if pi.data.len() < 14 {
            return Ok(());
        }
        let conn = inner.conns.get_mut(&token).unwrap();
        let mut dst = [0u8; 6];
        dst.copy_from_slice(&pi.data[0..6]);
        let mut src = [0u8; 6];
        src.copy_from_slice(&pi.data[6..12]);
        let in_port = pi.in_port;

        conn.mac_to_port.insert(src, in_port);

        match conn.mac_to_port.get(&dst).copied() {
            Some(out_port) if out_port != in_port => {
                let fm = FlowMod {
                    pattern: Match::l2_learned(in_port, dst),
                    cookie: 0x1,
                    command: flow_mod_cmd::ADD,
                    idle_timeout: 30,
                    hard_timeout: 0,
                    priority: 100,
                    buffer_id: pi.buffer_id,
                    out_port: ofport::NONE,
                    flags: 0,
                    actions: vec![Action::output(out_port)],
                };
                log::debug!(
                    "switch {}: flow in_port {} dl_dst {:02x?} -> port {}",
                    conn.swid,
                    in_port,
                    dst,
                    out_port
                );
                self.send_msg(&mut conn.stream, &OfMessage::FlowMod(fm))?;
            }
            _ => {
                let data = if pi.buffer_id == NO_BUFFER {
                    pi.data.clone()
                } else {
                    Vec::new()
                };
                let po = PacketOut {
                    buffer_id: pi.buffer_id,
                    in_port,
                    actions: vec![Action::output(ofport::FLOOD)],
                    data,
                };
                self.send_msg(&mut conn.stream, &OfMessage::PacketOut(po))?;
            }
        }
        Ok(())
    }

    fn lldp_tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        let tokens: Vec<Token> = inner.conns.keys().copied().collect();
        for token in tokens {
            let mut dead = false;
            if let Some(conn) = inner.conns.get_mut(&token) {
                let dpid = if conn.dpid != 0 { conn.dpid } else { FALLBACK_DPID };
                for p in conn.emission_ports() {
                    if self.emit_lldp(&mut conn.stream, dpid, p).is_err() {
                        dead = true;
                        break;
                    }
                }
            }
            if dead {
                Self::purge_locked(&mut inner, token);
            }
        }
    }

    fn stats_tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        let tokens: Vec<Token> = inner.conns.keys().copied().collect();
        for token in tokens {
            let mut dead = false;
            if let Some(conn) = inner.conns.get_mut(&token) {
                dead = self
                    .send_msg(
                        &mut conn.stream,
                        &OfMessage::StatsRequest(StatsRequest::all_ports()),
                    )
                    .is_err();
            }
            if dead {
                Self::purge_locked(&mut inner, token);
            }
        }
    }

    fn emit_lldp(
        &self,
        stream: &mut TcpStream,
        dpid: u64,
        port: u16,
    ) -> Result<(), CodecError> {
        let frame = lldp::build_frame(dpid, port);
        let po = PacketOut {
            buffer_id: NO_BUFFER,
            in_port: ofport::NONE,
            actions: vec![Action::output(port)],
            data: frame,
        };
        self.send_msg(stream, &OfMessage::PacketOut(po))
    }

    // ---- send helpers ----

    fn next_xid(&self) -> u32 {
        self.xid.fetch_add(1, SeqCst)
    }

    fn send_msg(&self, stream: &mut TcpStream, msg: &OfMessage) -> Result<(), CodecError> {
        Self::send_raw(stream, msg, self.next_xid())
    }

    fn send_raw(stream: &mut TcpStream, msg: &OfMessage, xid: u32) -> Result<(), CodecError> {
        let buf = msg.marshal(xid);
        Self::send_all(stream, &buf)
    }

    /// Loop until the whole buffer is written; a failed write means the
    /// session must be torn down by the caller.
    fn send_all(stream: &mut TcpStream, buf: &[u8]) -> Result<(), CodecError> {
        let mut off = 0;
        while off < buf.len() {
            match stream.write(&buf[off..]) {
                Ok(0) => return Err(CodecError::ConnectionLost),
                Ok(n) => off += n,
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(1));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(CodecError::Io(e)),
            }
        }
        Ok(())
    }

    fn purge_locked(inner: &mut Inner, token: Token) {
        if let Some(conn) = inner.conns.remove(&token) {
            inner.swid_to_token.remove(&conn.swid);
            log::info!("purged switch {}", conn.swid);
        }
    }

    fn with_conn<T>(
        &self,
        swid: SwitchId,
        f: impl FnOnce(&Self, &mut SwConn) -> Result<T, CodecError>,
    ) -> anyhow::Result<T> {
        let mut inner = self.inner.lock().unwrap();
        let token = *inner
            .swid_to_token
            .get(&swid)
            .ok_or_else(|| anyhow::anyhow!("unknown switch {}", swid))?;
        let conn = inner.conns.get_mut(&token).unwrap();
        match f(self, conn) {
            Ok(v) => Ok(v),
            Err(e) => {
                Self::purge_locked(&mut inner, token);
                Err(anyhow::anyhow!("switch {} I/O failed: {}", swid, e))
            }
        }
    }

    // ---- public control operations ----

    pub fn flow_mod(&self, swid: SwitchId, fm: FlowMod) -> anyhow::Result<()> {
        self.with_conn(swid, |this, conn| {
            this.send_msg(&mut conn.stream, &OfMessage::FlowMod(fm))
        })
    }

    /// Toggle a port's administrative state; `speed_mbps` selects the
    /// advertised rate when bringing the port up.
    pub fn port_mod(
        &self,
        swid: SwitchId,
        port_no: u16,
        up: bool,
        speed_mbps: u32,
    ) -> anyhow::Result<()> {
        let pm = PortMod {
            port_no,
            hw_addr: [0; 6],
            config: if up { 0 } else { ofwire::PORT_DOWN },
            mask: ofwire::PORT_DOWN,
            advertise: advertise_for_speed(speed_mbps),
        };
        self.with_conn(swid, |this, conn| {
            this.send_msg(&mut conn.stream, &OfMessage::PortMod(pm))
        })
    }

    pub fn barrier(&self, swid: SwitchId) -> anyhow::Result<()> {
        self.with_conn(swid, |this, conn| {
            this.send_msg(&mut conn.stream, &OfMessage::BarrierRequest)
        })
    }

    /// Inject a raw Ethernet frame out of the given port.
    pub fn packet_out(&self, swid: SwitchId, out_port: u16, eth: &[u8]) -> anyhow::Result<()> {
        if eth.len() < 14 {
            return Err(anyhow::anyhow!("frame too short"));
        }
        let po = PacketOut {
            buffer_id: NO_BUFFER,
            in_port: ofport::NONE,
            actions: vec![Action::output(out_port)],
            data: eth.to_vec(),
        };
        self.with_conn(swid, |this, conn| {
            this.send_msg(&mut conn.stream, &OfMessage::PacketOut(po))
        })
    }

    pub fn send_lldp(&self, swid: SwitchId, out_port: u16) -> anyhow::Result<()> {
        self.with_conn(swid, |this, conn| {
            let dpid = if conn.dpid != 0 { conn.dpid } else { FALLBACK_DPID };
            this.emit_lldp(&mut conn.stream, dpid, out_port)
        })
    }

    /// Request fresh counters from every switch, wait briefly for replies,
    /// then return the aggregated (swid, port) view.
    pub fn poll_port_stats(&self) -> BTreeMap<(SwitchId, u16), PortStats> {
        {
            let mut inner = self.inner.lock().unwrap();
            let tokens: Vec<Token> = inner.conns.keys().copied().collect();
            for token in tokens {
                let mut dead = false;
                if let Some(conn) = inner.conns.get_mut(&token) {
                    dead = self
                        .send_msg(
                            &mut conn.stream,
                            &OfMessage::StatsRequest(StatsRequest::all_ports()),
                        )
                        .is_err();
                }
                if dead {
                    Self::purge_locked(&mut inner, token);
                }
            }
        }
        thread::sleep(STATS_SETTLE);

        let inner = self.inner.lock().unwrap();
        let mut out = BTreeMap::new();
        for (&swid, token) in &inner.swid_to_token {
            if let Some(conn) = inner.conns.get(token) {
                for (&port, ps) in &conn.last_ps {
                    out.insert(
                        (swid, port),
                        PortStats {
                            rx_bytes: ps.rx_bytes,
                            tx_bytes: ps.tx_bytes,
                            speed_mbps: 0,
                        },
                    );
                }
            }
        }
        out
    }

    // ---- inventory accessors ----

    pub fn switch_ids(&self) -> Vec<SwitchId> {
        self.inner
            .lock()
            .unwrap()
            .swid_to_token
            .keys()
            .copied()
            .collect()
    }

    pub fn ports_of(&self, swid: SwitchId) -> Vec<u16> {
        let inner = self.inner.lock().unwrap();
        inner
            .swid_to_token
            .get(&swid)
            .and_then(|t| inner.conns.get(t))
            .map(|c| c.emission_ports())
            .unwrap_or_default()
    }

    pub fn switch_info(&self, swid: SwitchId) -> Option<SwitchInfo> {
        let inner = self.inner.lock().unwrap();
        let conn = inner
            .swid_to_token
            .get(&swid)
            .and_then(|t| inner.conns.get(t))?;
        Some(Self::info_of(conn))
    }

    pub fn inventory_snapshot(&self) -> BTreeMap<SwitchId, SwitchInfo> {
        let inner = self.inner.lock().unwrap();
        inner
            .swid_to_token
            .iter()
            .filter_map(|(&swid, t)| inner.conns.get(t).map(|c| (swid, Self::info_of(c))))
            .collect()
    }

    fn info_of(conn: &SwConn) -> SwitchInfo {
        let mut info = SwitchInfo {
            swid: conn.swid,
            dpid: conn.dpid,
            connected: conn.connected,
            ports: BTreeMap::new(),
        };
        for (&port, ps) in &conn.last_ps {
            info.ports.insert(
                port,
                PortInfo {
                    port_no: port,
                    up: true,
                    curr_speed_mbps: 0,
                    last: PortStats {
                        rx_bytes: ps.rx_bytes,
                        tx_bytes: ps.tx_bytes,
                        speed_mbps: 0,
                    },
                },
            );
        }
        info
    }
}

impl Drop for OfController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swid_assignment_fills_gaps() {
        let mut inner = Inner::default();
        assert_eq!(inner.next_swid(), 1);
        inner.swid_to_token.insert(1, Token(10));
        inner.swid_to_token.insert(2, Token(11));
        assert_eq!(inner.next_swid(), 3);
        inner.swid_to_token.remove(&1);
        assert_eq!(inner.next_swid(), 1);
    }

    #[test]
    fn stop_is_idempotent() {
        let ctl = Arc::new(OfController::new());
        ctl.clone().start(0).unwrap();
        assert!(ctl.local_port() > 0);
        ctl.stop();
        ctl.stop();
        // start/stop/start leaves the controller functional
        ctl.clone().start(0).unwrap();
        assert!(ctl.local_port() > 0);
        ctl.stop();
    }
}
