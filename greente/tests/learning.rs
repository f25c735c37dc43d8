//! End-to-end session tests with a mock switch speaking real OpenFlow 1.0
//! over a loopback socket.

use std::net::TcpStream;
use std::sync::{mpsc, Arc};
use std::time::Duration;

use greente::controller::{LldpEvent, OfController};
use ofwire::message::{
    flow_mod_cmd, Action, FlowMod, Match, PacketIn, PhyPort, PortStatsEntry, StatsReply,
    SwitchFeatures, NO_BUFFER,
};
use ofwire::{lldp, port as ofport, read_frame, wildcards, write_frame, OfMessage};

struct MockSwitch {
    stream: TcpStream,
}

impl MockSwitch {
    fn connect(port: u16) -> MockSwitch {
        let stream = TcpStream::connect(("127.0.0.1", port)).expect("connect to controller");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        MockSwitch { stream }
    }

    fn send(&mut self, msg: &OfMessage, xid: u32) {
        write_frame(&mut self.stream, msg, xid).expect("send to controller");
    }

    fn recv(&mut self) -> (u32, OfMessage) {
        let (header, body) = read_frame(&mut self.stream).expect("read from controller");
        let msg = OfMessage::parse(&header, &body).expect("parse controller message");
        (header.xid, msg)
    }

    /// Skip unrelated traffic (periodic LLDP floods, stats requests) until
    /// the predicate matches.
    fn wait_for(&mut self, pred: impl Fn(&OfMessage) -> bool) -> (u32, OfMessage) {
        loop {
            let (xid, msg) = self.recv();
            if pred(&msg) {
                return (xid, msg);
            }
        }
    }

    /// Complete the session handshake: answer FEATURES_REQUEST and wait
    /// for the controller to acknowledge with GET_CONFIG_REQUEST.
    fn handshake(&mut self, dpid: u64, ports: &[u16]) {
        self.wait_for(|m| matches!(m, OfMessage::Hello));
        self.wait_for(|m| matches!(m, OfMessage::FeaturesRequest));
        let (_, cfg) = self.wait_for(|m| matches!(m, OfMessage::SetConfig(_)));
        match cfg {
            OfMessage::SetConfig(c) => assert_eq!(c.miss_send_len, 0xffff),
            _ => unreachable!(),
        }
        self.send(
            &OfMessage::FeaturesReply(SwitchFeatures {
                datapath_id: dpid,
                n_buffers: 256,
                n_tables: 1,
                capabilities: 0,
                actions: 0,
                ports: ports.iter().map(|&p| phy_port(p)).collect(),
            }),
            1,
        );
        self.wait_for(|m| matches!(m, OfMessage::GetConfigRequest));
    }
}

fn phy_port(no: u16) -> PhyPort {
    PhyPort {
        port_no: no,
        hw_addr: [0; 6],
        name: [0; 16],
        config: 0,
        state: 0,
        curr: 0,
        advertised: 0,
        supported: 0,
        peer: 0,
    }
}

fn eth_frame(dst: [u8; 6], src: [u8; 6]) -> Vec<u8> {
    let mut f = Vec::new();
    f.extend_from_slice(&dst);
    f.extend_from_slice(&src);
    f.extend_from_slice(&0x0800u16.to_be_bytes());
    f.resize(60, 0);
    f
}

const MAC_A: [u8; 6] = [0xaa; 6];
const MAC_B: [u8; 6] = [0xbb; 6];

#[test]
fn learning_switch_end_to_end() {
    let ctl = Arc::new(OfController::new());
    ctl.clone().start(0).unwrap();
    let port = ctl.local_port();

    let mut sw = MockSwitch::connect(port);
    sw.handshake(0x11, &[1, 2]);

    // echo keeps the original xid and payload
    sw.send(&OfMessage::EchoRequest(vec![9, 9]), 0x55);
    let (xid, reply) = sw.wait_for(|m| matches!(m, OfMessage::EchoReply(_)));
    assert_eq!(xid, 0x55);
    assert_eq!(reply, OfMessage::EchoReply(vec![9, 9]));

    // unknown destination: expect a buffered flood
    sw.send(
        &OfMessage::PacketIn(PacketIn {
            buffer_id: 42,
            total_len: 60,
            in_port: 1,
            reason: 0,
            data: eth_frame(MAC_B, MAC_A),
        }),
        2,
    );
    let (_, po) = sw.wait_for(|m| match m {
        OfMessage::PacketOut(po) => po.buffer_id == 42,
        _ => false,
    });
    match po {
        OfMessage::PacketOut(po) => {
            assert_eq!(po.in_port, 1);
            assert_eq!(po.actions, vec![Action::output(ofport::FLOOD)]);
            assert!(po.data.is_empty(), "buffered packet-out carries no payload");
        }
        _ => unreachable!(),
    }

    // reverse direction: aa is now learned on port 1, expect a flow
    sw.send(
        &OfMessage::PacketIn(PacketIn {
            buffer_id: 43,
            total_len: 60,
            in_port: 2,
            reason: 0,
            data: eth_frame(MAC_A, MAC_B),
        }),
        3,
    );
    let (_, fm) = sw.wait_for(|m| matches!(m, OfMessage::FlowMod(_)));
    match fm {
        OfMessage::FlowMod(fm) => {
            assert_eq!(fm.command, flow_mod_cmd::ADD);
            assert_eq!(fm.priority, 100);
            assert_eq!(fm.idle_timeout, 30);
            assert_eq!(fm.hard_timeout, 0);
            assert_eq!(fm.cookie, 0x1);
            assert_eq!(fm.buffer_id, 43);
            assert_eq!(fm.pattern.in_port, 2);
            assert_eq!(fm.pattern.dl_dst, MAC_A);
            assert_eq!(
                fm.pattern.wildcards,
                wildcards::ALL & !(wildcards::IN_PORT | wildcards::DL_DST)
            );
            assert_eq!(fm.actions, vec![Action::output(1)]);
        }
        _ => unreachable!(),
    }

    ctl.stop();
    ctl.stop(); // idempotent
}

#[test]
fn control_operations_reach_the_switch() {
    let ctl = Arc::new(OfController::new());
    ctl.clone().start(0).unwrap();

    let mut sw = MockSwitch::connect(ctl.local_port());
    sw.handshake(0x44, &[1, 2, 3]);

    let info = ctl.switch_info(1).expect("switch 1 in inventory");
    assert_eq!(info.dpid, 0x44);
    assert!(info.connected);
    assert_eq!(ctl.switch_ids(), vec![1]);
    assert_eq!(ctl.ports_of(1), vec![1, 2, 3]);

    // explicit flow installation
    let fm = FlowMod {
        pattern: Match::l2_learned(3, MAC_B),
        cookie: 0x1234,
        command: flow_mod_cmd::ADD,
        idle_timeout: 0,
        hard_timeout: 0,
        priority: 50,
        buffer_id: NO_BUFFER,
        out_port: ofport::NONE,
        flags: 0,
        actions: vec![Action::output(2)],
    };
    ctl.flow_mod(1, fm.clone()).unwrap();
    let (_, got) = sw.wait_for(|m| matches!(m, OfMessage::FlowMod(_)));
    assert_eq!(got, OfMessage::FlowMod(fm));

    // admin-down a port, then a barrier
    ctl.port_mod(1, 2, false, 0).unwrap();
    let (_, pm) = sw.wait_for(|m| matches!(m, OfMessage::PortMod(_)));
    match pm {
        OfMessage::PortMod(pm) => {
            assert_eq!(pm.port_no, 2);
            assert_eq!(pm.config, ofwire::PORT_DOWN);
            assert_eq!(pm.mask, ofwire::PORT_DOWN);
            assert_eq!(pm.advertise, 0);
        }
        _ => unreachable!(),
    }
    ctl.barrier(1).unwrap();
    sw.wait_for(|m| matches!(m, OfMessage::BarrierRequest));

    // raw frame injection
    let frame = eth_frame(MAC_B, MAC_A);
    ctl.packet_out(1, 3, &frame).unwrap();
    let (_, po) = sw.wait_for(|m| match m {
        OfMessage::PacketOut(po) => po.buffer_id == NO_BUFFER && !lldp::is_lldp(&po.data),
        _ => false,
    });
    match po {
        OfMessage::PacketOut(po) => {
            assert_eq!(po.actions, vec![Action::output(3)]);
            assert_eq!(po.data, frame);
        }
        _ => unreachable!(),
    }

    // operations against an unknown switch fail without panicking
    assert!(ctl.barrier(99).is_err());

    ctl.stop();
}

#[test]
fn port_stats_polling_aggregates_counters() {
    let ctl = Arc::new(OfController::new());
    ctl.clone().start(0).unwrap();

    let mut sw = MockSwitch::connect(ctl.local_port());
    sw.handshake(0x55, &[1]);

    // answer the next stats request while the poll blocks on this thread
    let replier = std::thread::spawn(move || {
        let (xid, _) = sw.wait_for(|m| matches!(m, OfMessage::StatsRequest(_)));
        sw.send(
            &OfMessage::StatsReply(StatsReply::ports(vec![PortStatsEntry {
                port_no: 1,
                rx_bytes: 1000,
                tx_bytes: 2000,
                ..Default::default()
            }])),
            xid,
        );
        sw
    });

    let stats = ctl.poll_port_stats();
    let _sw = replier.join().unwrap();
    let ps = stats.get(&(1, 1)).expect("counters for switch 1 port 1");
    assert_eq!(ps.rx_bytes, 1000);
    assert_eq!(ps.tx_bytes, 2000);

    ctl.stop();
}

#[test]
fn lldp_discovery_end_to_end() {
    let ctl = Arc::new(OfController::new());
    let (tx, rx) = mpsc::channel::<LldpEvent>();
    ctl.set_lldp_sender(tx);
    ctl.clone().start(0).unwrap();
    let port = ctl.local_port();

    let mut sw1 = MockSwitch::connect(port);
    sw1.handshake(0x11, &[1, 2]);
    let mut sw2 = MockSwitch::connect(port);
    sw2.handshake(0x22, &[3, 4]);

    // switch 2 punts a discovery frame that left switch 1 port 3
    sw2.send(
        &OfMessage::PacketIn(PacketIn {
            buffer_id: NO_BUFFER,
            total_len: 60,
            in_port: 4,
            reason: 0,
            data: lldp::build_frame(0x11, 3),
        }),
        5,
    );

    let ev = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("discovery event");
    assert_eq!(
        ev,
        LldpEvent {
            src_swid: 1,
            src_port: 3,
            dst_swid: 2,
            dst_port: 4,
        }
    );

    ctl.stop();
}

#[test]
fn periodic_lldp_emission_reaches_the_switch() {
    let ctl = Arc::new(OfController::new());
    ctl.set_lldp_period(Duration::from_millis(200));
    ctl.clone().start(0).unwrap();

    let mut sw = MockSwitch::connect(ctl.local_port());
    sw.handshake(0x33, &[7]);

    // the periodic tick floods a parseable discovery frame on our port
    let (_, po) = sw.wait_for(|m| match m {
        OfMessage::PacketOut(po) => lldp::is_lldp(&po.data),
        _ => false,
    });
    match po {
        OfMessage::PacketOut(po) => {
            assert_eq!(po.actions, vec![Action::output(7)]);
            assert_eq!(lldp::parse_frame(&po.data), Some((0x33, 7)));
        }
        _ => unreachable!(),
    }

    ctl.stop();
}
