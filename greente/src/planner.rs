//! Joint traffic-engineering / energy MILP.
//!
//! Decision variables: binary x[f,p] assigning each flow to one candidate
//! path, and binary beta[e] powering each SDN-controllable link on or
//! off. Legacy links are always on. The objective trades a
//! capacity-normalized path cost (weighted by `lwr`) against per-link
//! power cost (weighted by `ewr`).

use std::collections::{BTreeMap, BTreeSet};
use std::str::from_utf8;

use thiserror::Error;

use crate::models::{FlowSpec, GraphCaps, LinkId, Path, TeOutput, Weights};

#[derive(Debug, Error)]
pub enum PlannerError {
    #[error("flow {0} has no candidate paths")]
    NoCandidates(i32),
    #[error("solver setup failed")]
    Setup,
    #[error("no primal solution (status: {0})")]
    NoSolution(String),
    #[error("problem is infeasible")]
    Infeasible,
}

pub struct MilpTe {
    caps: GraphCaps,
    paths: BTreeMap<i32, Path>,
    flows: BTreeMap<i32, FlowSpec>,
    links: Vec<LinkId>,
    /// (flow, path, link) incidence.
    fp_use: BTreeSet<(i32, i32, LinkId)>,
}

impl MilpTe {
    pub fn new(caps: GraphCaps, paths: &[Path], flows: &[FlowSpec]) -> Self {
        let paths: BTreeMap<i32, Path> = paths.iter().map(|p| (p.id, p.clone())).collect();
        let flows: BTreeMap<i32, FlowSpec> = flows.iter().map(|f| (f.id, f.clone())).collect();
        let links: Vec<LinkId> = caps.capacity_mbps.keys().copied().collect();

        let mut fp_use = BTreeSet::new();
        for f in flows.values() {
            for &pid in &f.cand_path_ids {
                if let Some(p) = paths.get(&pid) {
                    for &e in &p.edges {
                        fp_use.insert((f.id, pid, e));
                    }
                }
            }
        }

        MilpTe {
            caps,
            paths,
            flows,
            links,
            fp_use,
        }
    }

    /// Build and solve; `time_limit_sec == 0` means unlimited. Returns an
    /// error whenever no applicable plan exists, so callers can never act
    /// on a partial solution.
    pub fn solve(&self, w: &Weights, time_limit_sec: f64) -> Result<TeOutput, PlannerError> {
        for f in self.flows.values() {
            if f.cand_path_ids.is_empty() {
                return Err(PlannerError::NoCandidates(f.id));
            }
        }

        // column layout: x_{f,p} first, then beta_e for SDN links (1-based)
        let mut x_col: BTreeMap<(i32, i32), usize> = BTreeMap::new();
        let mut be_col: BTreeMap<LinkId, usize> = BTreeMap::new();
        let mut col = 1usize;
        for f in self.flows.values() {
            for &pid in &f.cand_path_ids {
                x_col.insert((f.id, pid), col);
                col += 1;
            }
        }
        for &e in &self.links {
            if self.caps.sdn(&e) {
                be_col.insert(e, col);
                col += 1;
            }
        }
        let ncols = col - 1;

        let mut lp =
            lpsolve::Problem::new(0, ncols as i32).ok_or(PlannerError::Setup)?;
        unsafe {
            lpsolve_sys::set_verbose(lp.to_lprec(), lpsolve::Verbosity::Critical as i32);
        }

        // objective: lwr * sum_e(Df/Ce) on x, ewr * Pe on beta
        let mut obj = vec![0.0; ncols + 1];
        for f in self.flows.values() {
            let df = f.demand_mbps.max(0.0);
            for &pid in &f.cand_path_ids {
                let p = match self.paths.get(&pid) {
                    Some(p) => p,
                    None => continue,
                };
                let coef: f64 = p
                    .edges
                    .iter()
                    .map(|e| df / self.caps.cap(e).max(1e-9))
                    .sum();
                obj[x_col[&(f.id, pid)]] = w.lwr * coef;
            }
        }
        for (&e, &c) in &be_col {
            obj[c] = w.ewr * self.caps.power(&e).max(0.0);
        }
        lp.set_objective_function(&obj);

        // each flow picks exactly one path
        for f in self.flows.values() {
            let mut row = vec![0.0; ncols + 1];
            for &pid in &f.cand_path_ids {
                row[x_col[&(f.id, pid)]] = 1.0;
            }
            lp.add_constraint(&row, 1.0, lpsolve::ConstraintType::Eq);
        }

        // capacity, with on/off coupling on SDN links:
        //   sdn:    sum Df*x - Ce*beta <= 0
        //   legacy: sum Df*x <= Ce
        for &e in &self.links {
            let ce = self.caps.cap(&e);
            let mut row = vec![0.0; ncols + 1];
            for f in self.flows.values() {
                let df = f.demand_mbps.max(0.0);
                for &pid in &f.cand_path_ids {
                    if self.fp_use.contains(&(f.id, pid, e)) {
                        row[x_col[&(f.id, pid)]] = df;
                    }
                }
            }
            if let Some(&c) = be_col.get(&e) {
                row[c] = -ce;
                lp.add_constraint(&row, 0.0, lpsolve::ConstraintType::Le);
            } else {
                lp.add_constraint(&row, ce, lpsolve::ConstraintType::Le);
            }
        }

        // all decisions are binary
        unsafe {
            for c in 1..=ncols {
                lpsolve_sys::set_binary(lp.to_lprec(), c as i32, 1);
            }
            if time_limit_sec > 0.0 {
                lpsolve_sys::set_timeout(
                    lp.to_lprec(),
                    time_limit_sec.ceil() as std::os::raw::c_long,
                );
            }
        }

        if log::log_enabled!(log::Level::Debug) {
            let mut buffer = Vec::new();
            lp.write_lp(&mut buffer);
            if let Ok(text) = from_utf8(&buffer) {
                log::debug!("{}", text);
            }
        }

        let status = lp.solve();
        let (optimal, status_text) = match status {
            lpsolve::SolveStatus::Optimal => (true, "optimal"),
            lpsolve::SolveStatus::Suboptimal => (false, "feasible"),
            lpsolve::SolveStatus::Infeasible => return Err(PlannerError::Infeasible),
            other => return Err(PlannerError::NoSolution(format!("{:?}", other))),
        };

        let mut sol = vec![0.0; ncols];
        lp.get_solution_variables(&mut sol);
        let value = |c: usize| sol[c - 1];

        let mut out = TeOutput {
            optimal,
            status: status_text.to_owned(),
            ..Default::default()
        };
        out.objective = (1..=ncols).map(|c| obj[c] * value(c)).sum();

        // beta: rounded for SDN links, fixed 1 for legacy
        for &e in &self.links {
            let b = match be_col.get(&e) {
                Some(&c) => {
                    if value(c) >= 0.5 {
                        1
                    } else {
                        0
                    }
                }
                None => 1,
            };
            out.beta.insert(e, b);
        }

        // argmax x per flow; ascending pid iteration keeps the smallest id
        // on ties
        for f in self.flows.values() {
            let mut best_pid = -1;
            let mut best = -1.0;
            for &pid in &f.cand_path_ids {
                let v = value(x_col[&(f.id, pid)]);
                if v > best {
                    best = v;
                    best_pid = pid;
                }
            }
            out.chosen_path.insert(f.id, best_pid);
        }

        // per-link load from the fractional solution, for diagnostics
        for &e in &self.links {
            out.load_mbps.insert(e, 0.0);
        }
        for f in self.flows.values() {
            let df = f.demand_mbps.max(0.0);
            for &pid in &f.cand_path_ids {
                let x = value(x_col[&(f.id, pid)]);
                if x <= 1e-9 {
                    continue;
                }
                if let Some(p) = self.paths.get(&pid) {
                    for e in &p.edges {
                        *out.load_mbps.entry(*e).or_insert(0.0) += df * x;
                    }
                }
            }
        }

        log::info!(
            "plan: {} ({} flows, {} sdn links, objective {:.3})",
            out.status,
            self.flows.len(),
            be_col.len(),
            out.objective
        );
        Ok(out)
    }
}
