//! Runtime configuration: the physical graph (JSON) and the demand set
//! (CSV). Both abort startup when present but malformed.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::models::{FlowSpec, LinkId};

#[derive(Debug, Deserialize)]
struct GraphJson {
    nodes: Vec<String>,
    sdn_nodes: Vec<String>,
    links: Vec<LinkJson>,
}

#[derive(Debug, Deserialize)]
struct LinkJson {
    u: String,
    v: String,
    /// Gbps in the file; stored internally as Mbps.
    cap: f64,
}

/// The configured graph: node ids, the SDN-capable subset, and per-link
/// capacity/power attributes. A link is SDN iff both endpoints are.
#[derive(Debug, Clone, Default)]
pub struct RuntimeGraph {
    pub nodes: Vec<i32>,
    pub sdn_nodes: BTreeSet<i32>,
    pub cap_mbps: BTreeMap<LinkId, f64>,
    pub power_cost: BTreeMap<LinkId, f64>,
    pub is_sdn: BTreeMap<LinkId, bool>,
}

impl RuntimeGraph {
    pub fn max_capacity_mbps(&self) -> f64 {
        self.cap_mbps.values().cloned().fold(0.0, f64::max)
    }
}

fn parse_node_id(s: &str) -> anyhow::Result<i32> {
    s.trim()
        .parse::<i32>()
        .with_context(|| format!("bad node id {:?}", s))
}

pub fn load_graph_json<P: AsRef<Path>>(path: P) -> anyhow::Result<RuntimeGraph> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("cannot open {}", path.display()))?;
    let j: GraphJson = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse {}", path.display()))?;

    let mut g = RuntimeGraph::default();
    for s in &j.nodes {
        g.nodes.push(parse_node_id(s)?);
    }
    for s in &j.sdn_nodes {
        g.sdn_nodes.insert(parse_node_id(s)?);
    }
    for l in &j.links {
        let u = parse_node_id(&l.u)?;
        let v = parse_node_id(&l.v)?;
        let cap = l.cap * 1000.0;
        let id = LinkId::new(u, v);
        g.cap_mbps.insert(id, cap);
        g.power_cost.insert(id, cap * 0.1);
        g.is_sdn
            .insert(id, g.sdn_nodes.contains(&u) && g.sdn_nodes.contains(&v));
    }
    log::info!(
        "graph {}: {} nodes ({} sdn), {} links",
        path.display(),
        g.nodes.len(),
        g.sdn_nodes.len(),
        g.cap_mbps.len()
    );
    Ok(g)
}

/// A deterministic demand set used when no flows file exists.
pub fn demo_flows() -> Vec<FlowSpec> {
    let demo: &[(i32, i32, f64)] = &[
        (1, 9, 200.0),
        (3, 7, 150.0),
        (4, 12, 180.0),
        (6, 11, 120.0),
        (8, 10, 160.0),
    ];
    demo.iter()
        .enumerate()
        .map(|(i, &(s, d, demand_mbps))| FlowSpec {
            id: i as i32 + 1,
            s,
            d,
            demand_mbps,
            cand_path_ids: Vec::new(),
        })
        .collect()
}

/// Parse `flow_id,s,d,demand_mbps` rows, skipping short ones. A missing
/// file falls back to [`demo_flows`].
pub fn load_flows_csv_or_default<P: AsRef<Path>>(path: P) -> Vec<FlowSpec> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path) {
        Ok(t) => t,
        Err(_) => {
            log::info!("no flows file at {}, using demo set", path.display());
            return demo_flows();
        }
    };
    parse_flows_csv(&text)
}

fn parse_flows_csv(text: &str) -> Vec<FlowSpec> {
    let mut flows = Vec::new();
    for line in text.lines().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() < 4 {
            log::warn!("skipping malformed flow row: {:?}", line);
            continue;
        }
        let parsed = (
            cols[0].trim().parse::<i32>(),
            cols[1].trim().parse::<i32>(),
            cols[2].trim().parse::<i32>(),
            cols[3].trim().parse::<f64>(),
        );
        match parsed {
            (Ok(id), Ok(s), Ok(d), Ok(demand_mbps)) => flows.push(FlowSpec {
                id,
                s,
                d,
                demand_mbps,
                cand_path_ids: Vec::new(),
            }),
            _ => log::warn!("skipping malformed flow row: {:?}", line),
        }
    }
    flows
}
