use std::time::Duration;

use structopt::StructOpt;

use greente::{logging, AppConfig, AppPaths, HybridApp};

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "greente", about = "Hybrid SDN TE/energy controller")]
struct Opts {
    /// OpenFlow listening port
    #[structopt(default_value = "6633")]
    port: u16,
    /// Topology description (JSON)
    #[structopt(long, default_value = "config/NSFNET.json")]
    graph: String,
    /// Demand set (CSV); demo flows are used when absent
    #[structopt(long, default_value = "config/flows.csv")]
    flows: String,
    /// Seconds between optimization cycles
    #[structopt(long, default_value = "5")]
    cycle_secs: u64,
    /// Candidate paths per flow pair
    #[structopt(long, default_value = "4")]
    k_paths: usize,
    /// MILP wall-clock limit in seconds (0 = unlimited)
    #[structopt(long, default_value = "10")]
    time_limit: f64,
    /// Stop after this many cycles (0 = run forever)
    #[structopt(long, default_value = "0")]
    cycles: u64,
    /// Write per-link telemetry to this CSV after every cycle
    #[structopt(long)]
    telemetry: Option<String>,
}

fn main() {
    logging::init_log();
    let opts = Opts::from_args();
    log::info!("starting greente on port {}", opts.port);

    let cfg = AppConfig {
        of_port: opts.port,
        paths: AppPaths {
            graph_json: opts.graph.clone(),
            flows_csv: opts.flows.clone(),
        },
        cycle: Duration::from_secs(opts.cycle_secs.max(1)),
        k_paths: opts.k_paths.max(1),
        time_limit_sec: opts.time_limit.max(0.0),
        max_cycles: opts.cycles,
        telemetry_csv: opts.telemetry.clone(),
    };

    let app = match HybridApp::new(cfg) {
        Ok(app) => app,
        Err(e) => {
            log::error!("[fatal] {:#}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = app.run() {
        log::error!("[fatal] {:#}", e);
        std::process::exit(1);
    }
}
