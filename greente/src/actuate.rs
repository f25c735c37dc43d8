//! Pushes a solved plan into the network: port on/off per link decision,
//! with barriers so each switch applies changes in order. A dead session
//! only loses its own updates; the rest of the plan still goes out.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::controller::OfController;
use crate::models::{LinkId, TeOutput};
use crate::topo::Edge;

/// Ports advertised when powering a link back on.
const UP_SPEED_MBPS: u32 = 10_000;

pub struct Actuator {
    pub ctl: Arc<OfController>,
}

impl Actuator {
    pub fn new(ctl: Arc<OfController>) -> Self {
        Actuator { ctl }
    }

    /// Apply every beta decision that maps onto a live edge. Assumes the
    /// switch id equals the graph node id on both sides.
    pub fn apply_beta(&self, plan: &TeOutput, alive: &[Edge]) {
        let mut ports: BTreeMap<LinkId, (u16, u16)> = BTreeMap::new();
        for e in alive {
            ports.insert(LinkId::new(e.u, e.v), (e.u_port, e.v_port));
        }

        for (&id, &beta) in &plan.beta {
            let (u_port, v_port) = match ports.get(&id) {
                Some(&p) => p,
                None => continue,
            };
            let up = beta == 1;
            let speed = if up { UP_SPEED_MBPS } else { 0 };

            if let Err(e) = self.ctl.port_mod(id.u, u_port, up, speed) {
                log::warn!("port_mod {}:{} failed: {}", id.u, u_port, e);
            }
            if let Err(e) = self.ctl.port_mod(id.v, v_port, up, speed) {
                log::warn!("port_mod {}:{} failed: {}", id.v, v_port, e);
            }
            if let Err(e) = self.ctl.barrier(id.u) {
                log::debug!("barrier {} failed: {}", id.u, e);
            }
            if let Err(e) = self.ctl.barrier(id.v) {
                log::debug!("barrier {} failed: {}", id.v, e);
            }
            log::debug!(
                "link {} -> {} (ports {}/{})",
                id,
                if up { "up" } else { "down" },
                u_port,
                v_port
            );
        }
    }
}
