//! Hybrid SDN controller that jointly optimizes traffic engineering and
//! energy use: an OpenFlow 1.0 session manager feeds an LLDP topology
//! viewer and a counter-differencing traffic monitor; an EWMA forecaster
//! derives objective weights; a MILP picks one path per flow and decides
//! which SDN links to power down; the actuator pushes the plan back to
//! the switches.

pub mod actuate;
pub mod app;
pub mod config;
pub mod controller;
pub mod forecast;
pub mod logging;
pub mod models;
pub mod monitor;
pub mod paths;
pub mod planner;
pub mod topo;

pub use app::{AppConfig, AppPaths, HybridApp};
pub use controller::{LldpEvent, OfController, SwitchId};
pub use models::{FlowSpec, GraphCaps, LinkId, Path, PortStats, TeOutput, Weights};
