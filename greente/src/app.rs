//! Application glue: owns the controller, viewer, monitor and planner
//! configuration, and drives the periodic optimization cycle.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::actuate::Actuator;
use crate::config::{self, RuntimeGraph};
use crate::controller::{OfController, DEFAULT_OF_PORT};
use crate::forecast;
use crate::models::{FlowSpec, GraphCaps, LinkId};
use crate::monitor::Monitor;
use crate::paths;
use crate::planner::MilpTe;
use crate::topo::{Edge, TopoViewer};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub graph_json: String,
    pub flows_csv: String,
}

impl Default for AppPaths {
    fn default() -> Self {
        AppPaths {
            graph_json: "config/NSFNET.json".to_owned(),
            flows_csv: "config/flows.csv".to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub of_port: u16,
    pub paths: AppPaths,
    /// Time between optimization cycles.
    pub cycle: Duration,
    /// Candidate paths per (src, dst) pair.
    pub k_paths: usize,
    /// Solver wall-clock limit in seconds; 0 = unlimited.
    pub time_limit_sec: f64,
    /// Stop after this many cycles; 0 = run until stopped.
    pub max_cycles: u64,
    /// Rewrite the telemetry CSV here after every cycle.
    pub telemetry_csv: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            of_port: DEFAULT_OF_PORT,
            paths: AppPaths::default(),
            cycle: Duration::from_secs(5),
            k_paths: 4,
            time_limit_sec: 10.0,
            max_cycles: 0,
            telemetry_csv: None,
        }
    }
}

/// Points per link kept when rewriting the telemetry CSV.
const TELEMETRY_CAP: usize = 1000;

pub struct HybridApp {
    cfg: AppConfig,
    ctl: Arc<OfController>,
    topo: Arc<TopoViewer>,
    mon: Arc<Monitor>,
    fcfg: forecast::Config,
    graph: RuntimeGraph,
    flows: Vec<FlowSpec>,
    running: AtomicBool,
}

impl HybridApp {
    pub fn new(cfg: AppConfig) -> anyhow::Result<Self> {
        let graph = config::load_graph_json(&cfg.paths.graph_json)?;
        let flows = config::load_flows_csv_or_default(&cfg.paths.flows_csv);
        log::info!("{} flows loaded", flows.len());

        let ctl = Arc::new(OfController::new());
        ctl.on_error(Box::new(|swid, ty, code, msg| {
            log::warn!("switch {} error type {} code {}: {}", swid, ty, code, msg);
        }));

        let topo = Arc::new(TopoViewer::new(
            Arc::clone(&ctl),
            None,
            Duration::from_millis(1000),
            Duration::from_secs(10),
        ));

        // counters of the u-side port of each live edge, keyed by link
        let collector_ctl = Arc::clone(&ctl);
        let collector_topo = Arc::clone(&topo);
        let collector = Box::new(move || {
            let raw = collector_ctl.poll_port_stats();
            let mut out = std::collections::BTreeMap::new();
            for e in collector_topo.snapshot_edges() {
                if let Some(ps) = raw.get(&(e.u, e.u_port)) {
                    out.insert(LinkId::new(e.u, e.v), *ps);
                }
            }
            out
        });
        let cap_map = graph.cap_mbps.clone();
        let capacity = Box::new(move |id: &LinkId| cap_map.get(id).copied().unwrap_or(0.0));
        let mon = Arc::new(Monitor::new(collector, capacity, Duration::from_millis(2000)));
        ctl.set_stats_period(mon.period());

        Ok(HybridApp {
            cfg,
            ctl,
            topo,
            mon,
            fcfg: forecast::Config::default(),
            graph,
            flows,
            running: AtomicBool::new(false),
        })
    }

    pub fn controller(&self) -> Arc<OfController> {
        Arc::clone(&self.ctl)
    }

    pub fn monitor(&self) -> Arc<Monitor> {
        Arc::clone(&self.mon)
    }

    /// Start everything and block in the optimization loop.
    pub fn run(&self) -> anyhow::Result<()> {
        self.running.store(true, SeqCst);
        Arc::clone(&self.ctl).start(self.cfg.of_port)?;
        Arc::clone(&self.topo).start();
        Arc::clone(&self.mon).start();

        let mut done = 0u64;
        while self.running.load(SeqCst) {
            thread::sleep(self.cfg.cycle);
            if !self.running.load(SeqCst) {
                break;
            }
            self.te_cycle();
            done += 1;
            if self.cfg.max_cycles > 0 && done >= self.cfg.max_cycles {
                break;
            }
        }
        self.stop();
        Ok(())
    }

    pub fn stop(&self) {
        if !self.running.swap(false, SeqCst) {
            return;
        }
        self.topo.stop();
        self.mon.stop();
        self.ctl.stop();
    }

    /// One forecast + plan + actuate round.
    fn te_cycle(&self) {
        let alive = self.topo.snapshot_edges();
        if alive.is_empty() {
            log::debug!("no live edges yet, skipping cycle");
            return;
        }

        let caps = self.caps_from_alive(&alive);
        let pred = forecast::predict_next(&self.fcfg, &self.mon.series_mbps());
        let w = forecast::weights_from_peak(pred.peak, self.graph.max_capacity_mbps());
        log::info!(
            "cycle: {} live links, predicted peak {:.1} Mbps, weights ewr={:.3} lwr={:.3}",
            alive.len(),
            pred.peak,
            w.ewr,
            w.lwr
        );

        let mut pairs = BTreeSet::new();
        for f in &self.flows {
            pairs.insert((f.s.min(f.d), f.s.max(f.d)));
        }
        let cand = paths::enumerate_k_paths(&alive, &pairs, self.cfg.k_paths);
        let groups = paths::group_by_endpoints(&cand);

        let mut flows = self.flows.clone();
        for f in &mut flows {
            let key = (f.s.min(f.d), f.s.max(f.d));
            f.cand_path_ids = groups.get(&key).cloned().unwrap_or_default();
        }

        let planner = MilpTe::new(caps, &cand, &flows);
        match planner.solve(&w, self.cfg.time_limit_sec) {
            Ok(plan) => {
                for (fid, pid) in &plan.chosen_path {
                    log::debug!("flow {} -> path {}", fid, pid);
                }
                Actuator::new(Arc::clone(&self.ctl)).apply_beta(&plan, &alive);
            }
            Err(e) => {
                log::warn!("no applicable plan this cycle: {}", e);
            }
        }

        log::trace!("topology:\n{}", self.topo.export_dot());
        if let Some(path) = &self.cfg.telemetry_csv {
            if let Err(e) = self.mon.export_csv(path, TELEMETRY_CAP) {
                log::warn!("telemetry export to {} failed: {}", path, e);
            }
        }
    }

    /// Planner attributes for the currently alive subset of the
    /// configured graph. Links we have no configuration for are ignored.
    fn caps_from_alive(&self, alive: &[Edge]) -> GraphCaps {
        let mut caps = GraphCaps::default();
        for e in alive {
            let id = LinkId::new(e.u, e.v);
            if let Some(&c) = self.graph.cap_mbps.get(&id) {
                caps.capacity_mbps.insert(id, c);
                caps.power_cost.insert(id, self.graph.power_cost[&id]);
                caps.is_sdn.insert(id, self.graph.is_sdn[&id]);
            }
        }
        caps
    }
}
