//! Discovery-driven topology viewer.
//!
//! Consumes decoded LLDP events from the session manager over a channel,
//! keeps a freshness-tracked set of undirected edges, and periodically
//! re-emits discovery frames and prunes anything not seen within the
//! expiry window.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fnv::FnvHashMap;
use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;

use crate::controller::{LldpEvent, OfController, SwitchId};

pub type NodeMapper = Box<dyn Fn(SwitchId) -> i32 + Send + Sync>;

/// Canonical undirected edge: `u < v`, `u_port` on `u`, `v_port` on `v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct EdgeKey {
    u: i32,
    v: i32,
    u_port: u16,
    v_port: u16,
}

#[derive(Debug, Clone, Copy)]
pub struct Edge {
    pub u: i32,
    pub v: i32,
    pub u_port: u16,
    pub v_port: u16,
    pub last_seen: Instant,
}

pub struct TopoViewer {
    ctl: Arc<OfController>,
    mapper: NodeMapper,
    lldp_period: Duration,
    expiry: Duration,
    edges: Mutex<BTreeMap<EdgeKey, Instant>>,
    rx: Mutex<Option<mpsc::Receiver<LldpEvent>>>,
    running: AtomicBool,
    bg: Mutex<Option<thread::JoinHandle<()>>>,
}

impl TopoViewer {
    /// Registers itself as the controller's LLDP event consumer.
    /// `mapper` translates switch ids to graph node ids (None = identity).
    pub fn new(
        ctl: Arc<OfController>,
        mapper: Option<NodeMapper>,
        lldp_period: Duration,
        expiry: Duration,
    ) -> Self {
        let (tx, rx) = mpsc::channel();
        ctl.set_lldp_sender(tx);
        TopoViewer {
            ctl,
            mapper: mapper.unwrap_or_else(|| Box::new(|sw| sw)),
            lldp_period,
            expiry,
            edges: Mutex::new(BTreeMap::new()),
            rx: Mutex::new(Some(rx)),
            running: AtomicBool::new(false),
            bg: Mutex::new(None),
        }
    }

    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, SeqCst) {
            return;
        }
        self.ctl.set_lldp_period(self.lldp_period);
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("viewer already consumed its event channel");
        let this = Arc::clone(&self);
        let handle = thread::Builder::new()
            .name("topo-tick".to_owned())
            .spawn(move || this.bg_loop(rx))
            .unwrap();
        *self.bg.lock().unwrap() = Some(handle);
    }

    pub fn stop(&self) {
        if !self.running.swap(false, SeqCst) {
            return;
        }
        if let Some(h) = self.bg.lock().unwrap().take() {
            let _ = h.join();
        }
    }

    fn bg_loop(&self, rx: mpsc::Receiver<LldpEvent>) {
        let mut next = Instant::now();
        while self.running.load(SeqCst) {
            match rx.recv_timeout(Duration::from_millis(50)) {
                Ok(ev) => self.ingest(ev),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
            let now = Instant::now();
            if now >= next {
                self.tick_send_lldp();
                self.prune_expired();
                next = now + self.lldp_period;
            }
        }
    }

    /// One round of discovery frames on every known (switch, port) pair.
    pub fn tick_send_lldp(&self) {
        for sw in self.ctl.switch_ids() {
            for p in self.ctl.ports_of(sw) {
                let _ = self.ctl.send_lldp(sw, p);
            }
        }
    }

    pub fn prune_expired(&self) {
        let now = Instant::now();
        let expiry = self.expiry;
        self.edges
            .lock()
            .unwrap()
            .retain(|_, seen| now.duration_since(*seen) <= expiry);
    }

    /// Canonicalize and refresh one observation. Self-loops are dropped.
    fn ingest(&self, e: LldpEvent) {
        let nu = (self.mapper)(e.src_swid);
        let nv = (self.mapper)(e.dst_swid);
        if nu == nv {
            return;
        }
        let key = if nu < nv {
            EdgeKey {
                u: nu,
                v: nv,
                u_port: e.src_port,
                v_port: e.dst_port,
            }
        } else {
            EdgeKey {
                u: nv,
                v: nu,
                u_port: e.dst_port,
                v_port: e.src_port,
            }
        };
        self.edges.lock().unwrap().insert(key, Instant::now());
    }

    /// Live edges only; anything past expiry is filtered even if the
    /// pruning tick has not run yet.
    pub fn snapshot_edges(&self) -> Vec<Edge> {
        let now = Instant::now();
        self.edges
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, seen)| now.duration_since(**seen) <= self.expiry)
            .map(|(k, seen)| Edge {
                u: k.u,
                v: k.v,
                u_port: k.u_port,
                v_port: k.v_port,
                last_seen: *seen,
            })
            .collect()
    }

    /// Graphviz export of the live topology, ports on the edge labels.
    pub fn export_dot(&self) -> String {
        let mut g: UnGraph<i32, (u16, u16)> = UnGraph::new_undirected();
        let mut ix: FnvHashMap<i32, NodeIndex> = FnvHashMap::default();
        for e in self.snapshot_edges() {
            let ui = *ix.entry(e.u).or_insert_with(|| g.add_node(e.u));
            let vi = *ix.entry(e.v).or_insert_with(|| g.add_node(e.v));
            g.add_edge(ui, vi, (e.u_port, e.v_port));
        }
        format!(
            "{:?}",
            Dot::with_attr_getters(
                &g,
                &[DotConfig::EdgeNoLabel, DotConfig::NodeNoLabel],
                &|_, er| format!("label = \"({},{})\"", er.weight().0, er.weight().1),
                &|_, (_, w)| format!("label = \"{}\"", w),
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn viewer(expiry: Duration) -> TopoViewer {
        let ctl = Arc::new(OfController::new());
        TopoViewer::new(ctl, None, Duration::from_millis(1000), expiry)
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let tv = viewer(Duration::from_secs(10));
        tv.ingest(LldpEvent {
            src_swid: 3,
            src_port: 1,
            dst_swid: 1,
            dst_port: 3,
        });
        tv.ingest(LldpEvent {
            src_swid: 1,
            src_port: 3,
            dst_swid: 3,
            dst_port: 1,
        });
        let snap = tv.snapshot_edges();
        assert_eq!(snap.len(), 1);
        let e = &snap[0];
        assert!(e.u < e.v);
        assert_eq!((e.u, e.v, e.u_port, e.v_port), (1, 3, 3, 1));
    }

    #[test]
    fn self_loops_are_dropped() {
        let tv = viewer(Duration::from_secs(10));
        tv.ingest(LldpEvent {
            src_swid: 2,
            src_port: 1,
            dst_swid: 2,
            dst_port: 2,
        });
        assert!(tv.snapshot_edges().is_empty());
    }

    #[test]
    fn edges_expire() {
        let tv = viewer(Duration::from_millis(40));
        tv.ingest(LldpEvent {
            src_swid: 1,
            src_port: 3,
            dst_swid: 2,
            dst_port: 4,
        });
        assert_eq!(tv.snapshot_edges().len(), 1);
        thread::sleep(Duration::from_millis(80));
        // stale both through the filter and after an explicit prune
        assert!(tv.snapshot_edges().is_empty());
        tv.prune_expired();
        assert!(tv.snapshot_edges().is_empty());
    }

    #[test]
    fn dot_export_lists_ports() {
        let tv = viewer(Duration::from_secs(10));
        tv.ingest(LldpEvent {
            src_swid: 1,
            src_port: 3,
            dst_swid: 2,
            dst_port: 4,
        });
        let dot = tv.export_dot();
        assert!(dot.contains("(3,4)"));
    }
}
