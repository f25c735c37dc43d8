//! Shared data model: links, paths, flows, capacities and plan output.

use std::collections::BTreeMap;

/// Undirected link identity: a canonical (smaller node first) pair of
/// graph node ids. Distinct from the (switch, port) endpoints that
/// realize the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId {
    pub u: i32,
    pub v: i32,
}

impl LinkId {
    pub fn new(a: i32, b: i32) -> LinkId {
        if a <= b {
            LinkId { u: a, v: b }
        } else {
            LinkId { u: b, v: a }
        }
    }
}

impl std::fmt::Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.u, self.v)
    }
}

/// Per-port byte counters as reported by a switch, plus the link speed
/// if known. Counters are monotone within one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub speed_mbps: u32,
}

/// A simple path, stored as the ordered sequence of canonical links.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub id: i32,
    pub edges: Vec<LinkId>,
}

/// A traffic demand between two graph nodes, with the candidate path ids
/// the planner may choose from.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSpec {
    pub id: i32,
    pub s: i32,
    pub d: i32,
    pub demand_mbps: f64,
    pub cand_path_ids: Vec<i32>,
}

/// Link attributes consumed by the planner. All maps are partial; the
/// accessors apply the documented defaults.
#[derive(Debug, Clone, Default)]
pub struct GraphCaps {
    pub capacity_mbps: BTreeMap<LinkId, f64>,
    pub is_sdn: BTreeMap<LinkId, bool>,
    pub power_cost: BTreeMap<LinkId, f64>,
}

impl GraphCaps {
    pub fn cap(&self, e: &LinkId) -> f64 {
        self.capacity_mbps.get(e).copied().unwrap_or(0.0)
    }

    pub fn sdn(&self, e: &LinkId) -> bool {
        self.is_sdn.get(e).copied().unwrap_or(false)
    }

    /// Power cost defaults to 10% of capacity when not configured.
    pub fn power(&self, e: &LinkId) -> f64 {
        if let Some(p) = self.power_cost.get(e) {
            return *p;
        }
        let c = self.cap(e);
        if c > 0.0 {
            c * 0.1
        } else {
            1.0
        }
    }
}

/// Objective weights: energy (`ewr`) and load (`lwr`), summing to 1.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Weights {
    pub ewr: f64,
    pub lwr: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Weights { ewr: 0.5, lwr: 0.5 }
    }
}

/// Solver output: one chosen path per flow, on/off decision per link
/// (legacy links always 1), and the per-link load the assignment implies.
#[derive(Debug, Clone, Default)]
pub struct TeOutput {
    pub chosen_path: BTreeMap<i32, i32>,
    pub beta: BTreeMap<LinkId, i32>,
    pub load_mbps: BTreeMap<LinkId, f64>,
    pub objective: f64,
    pub optimal: bool,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_id_is_canonical() {
        assert_eq!(LinkId::new(3, 1), LinkId::new(1, 3));
        let e = LinkId::new(5, 2);
        assert!(e.u < e.v);
    }

    #[test]
    fn power_defaults_to_tenth_of_capacity() {
        let mut caps = GraphCaps::default();
        let e = LinkId::new(1, 2);
        caps.capacity_mbps.insert(e, 1000.0);
        assert_eq!(caps.power(&e), 100.0);
        caps.power_cost.insert(e, 7.0);
        assert_eq!(caps.power(&e), 7.0);
    }
}
