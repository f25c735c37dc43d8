//! Per-link traffic monitor.
//!
//! Differences raw byte counters into Mbps rates and utilizations, keeps
//! an append-only time series per link, and can block to compute window
//! averages. Counter resets (new session) produce a zero delta, never a
//! negative one.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::models::{LinkId, PortStats};

/// Produces one aggregated `LinkId -> PortStats` observation per call.
pub type StatsCollector = Box<dyn Fn() -> BTreeMap<LinkId, PortStats> + Send + Sync>;
/// Capacity in Mbps for a link; return 0 when unknown.
pub type CapacityFn = Box<dyn Fn(&LinkId) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkRate {
    pub rx_mbps: f64,
    pub tx_mbps: f64,
    /// (rx+tx)/capacity clamped to [0,1]; 0 when capacity is unknown.
    pub util: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub id: LinkId,
    pub t: Instant,
    pub wall: DateTime<Utc>,
    pub rate: LinkRate,
}

#[derive(Debug, Clone, Copy)]
struct LastCounter {
    rx_bytes: u64,
    tx_bytes: u64,
    t: Instant,
}

#[derive(Default)]
struct MonState {
    last_counters: BTreeMap<LinkId, LastCounter>,
    last_rates: BTreeMap<LinkId, LinkRate>,
    series: BTreeMap<LinkId, Vec<Sample>>,
}

pub struct Monitor {
    collect: StatsCollector,
    cap_mbps: CapacityFn,
    period_ms: AtomicU64,
    state: Mutex<MonState>,
    running: AtomicBool,
    bg: Mutex<Option<thread::JoinHandle<()>>>,
}

fn mbps_from_bytes_delta(dbytes: u64, dt_sec: f64) -> f64 {
    if dt_sec <= 0.0 {
        return 0.0;
    }
    8.0 * dbytes as f64 / dt_sec / 1e6
}

fn util_of(rx_mbps: f64, tx_mbps: f64, cap: f64) -> f64 {
    if cap > 0.0 {
        ((rx_mbps + tx_mbps) / cap).max(0.0).min(1.0)
    } else {
        0.0
    }
}

impl Monitor {
    pub fn new(collect: StatsCollector, cap_mbps: CapacityFn, period: Duration) -> Self {
        Monitor {
            collect,
            cap_mbps,
            period_ms: AtomicU64::new(period.as_millis() as u64),
            state: Mutex::new(MonState::default()),
            running: AtomicBool::new(false),
            bg: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms.load(SeqCst))
    }

    pub fn set_period(&self, p: Duration) {
        self.period_ms.store(p.as_millis() as u64, SeqCst);
    }

    /// Take one observation now and fold it into rates and the series.
    pub fn sample_once(&self) -> Vec<Sample> {
        let counters = (self.collect)();
        self.update(Instant::now(), Utc::now(), &counters)
    }

    fn update(
        &self,
        tnow: Instant,
        wall: DateTime<Utc>,
        counters: &BTreeMap<LinkId, PortStats>,
    ) -> Vec<Sample> {
        let mut out = Vec::with_capacity(counters.len());
        let mut state = self.state.lock().unwrap();
        for (&id, ps) in counters {
            let mut dt = 0.0;
            let mut drx = 0u64;
            let mut dtx = 0u64;
            if let Some(last) = state.last_counters.get(&id) {
                dt = tnow.duration_since(last.t).as_secs_f64();
                drx = ps.rx_bytes.saturating_sub(last.rx_bytes);
                dtx = ps.tx_bytes.saturating_sub(last.tx_bytes);
            }
            state.last_counters.insert(
                id,
                LastCounter {
                    rx_bytes: ps.rx_bytes,
                    tx_bytes: ps.tx_bytes,
                    t: tnow,
                },
            );

            let rx_mbps = mbps_from_bytes_delta(drx, dt);
            let tx_mbps = mbps_from_bytes_delta(dtx, dt);
            let rate = LinkRate {
                rx_mbps,
                tx_mbps,
                util: util_of(rx_mbps, tx_mbps, (self.cap_mbps)(&id)),
            };

            state.last_rates.insert(id, rate);
            let sample = Sample {
                id,
                t: tnow,
                wall,
                rate,
            };
            state.series.entry(id).or_default().push(sample);
            out.push(sample);
        }
        out
    }

    pub fn start(self: Arc<Self>) {
        if self.running.swap(true, SeqCst) {
            return;
        }
        let this = Arc::clone(&self);
        let handle = thread::Builder::new()
            .name("monitor-tick".to_owned())
            .spawn(move || {
                let mut next = Instant::now();
                while this.running.load(SeqCst) {
                    let now = Instant::now();
                    if now >= next {
                        let _ = this.sample_once();
                        next = now + this.period();
                    }
                    thread::sleep(Duration::from_millis(20));
                }
            })
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

    /// Blocking: sample at the configured period until `dur` has elapsed,
    /// then return the arithmetic mean rates with re-derived utilization.
    pub fn window_average(&self, dur: Duration) -> BTreeMap<LinkId, LinkRate> {
        let t_start = Instant::now();
        let mut sum_rx: BTreeMap<LinkId, f64> = BTreeMap::new();
        let mut sum_tx: BTreeMap<LinkId, f64> = BTreeMap::new();
        let mut cnt: BTreeMap<LinkId, u32> = BTreeMap::new();

        loop {
            for s in self.sample_once() {
                *sum_rx.entry(s.id).or_insert(0.0) += s.rate.rx_mbps;
                *sum_tx.entry(s.id).or_insert(0.0) += s.rate.tx_mbps;
                *cnt.entry(s.id).or_insert(0) += 1;
            }
            thread::sleep(self.period());
            if Instant::now().duration_since(t_start) >= dur {
                break;
            }
        }

        let mut avg = BTreeMap::new();
        for (id, c) in cnt {
            if c == 0 {
                continue;
            }
            let rx = sum_rx[&id] / c as f64;
            let tx = sum_tx[&id] / c as f64;
            avg.insert(
                id,
                LinkRate {
                    rx_mbps: rx,
                    tx_mbps: tx,
                    util: util_of(rx, tx, (self.cap_mbps)(&id)),
                },
            );
        }
        avg
    }

    pub fn last_rates_snapshot(&self) -> BTreeMap<LinkId, LinkRate> {
        self.state.lock().unwrap().last_rates.clone()
    }

    pub fn timeseries(&self, id: &LinkId) -> Vec<Sample> {
        self.state
            .lock()
            .unwrap()
            .series
            .get(id)
            .cloned()
            .unwrap_or_default()
    }

    /// Chronological rx+tx Mbps per link, for the forecaster.
    pub fn series_mbps(&self) -> BTreeMap<LinkId, Vec<f64>> {
        let state = self.state.lock().unwrap();
        state
            .series
            .iter()
            .map(|(id, v)| {
                (
                    *id,
                    v.iter().map(|s| s.rate.rx_mbps + s.rate.tx_mbps).collect(),
                )
            })
            .collect()
    }

    /// CSV export: `time_iso,u,v,rx_mbps,tx_mbps,util`. With a cap, only
    /// the most recent `max_points_per_link` rows per link are written.
    pub fn export_csv<P: AsRef<Path>>(
        &self,
        path: P,
        max_points_per_link: usize,
    ) -> anyhow::Result<()> {
        let mut f = File::create(path)?;
        writeln!(f, "time_iso,u,v,rx_mbps,tx_mbps,util")?;
        let state = self.state.lock().unwrap();
        for (id, vec) in &state.series {
            let start = if max_points_per_link > 0 && vec.len() > max_points_per_link {
                vec.len() - max_points_per_link
            } else {
                0
            };
            for s in &vec[start..] {
                writeln!(
                    f,
                    "{},{},{},{:.6},{:.6},{:.6}",
                    s.wall.to_rfc3339_opts(SecondsFormat::Secs, true),
                    id.u,
                    id.v,
                    s.rate.rx_mbps,
                    s.rate.tx_mbps,
                    s.rate.util
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_monitor(cap: f64) -> Monitor {
        Monitor::new(
            Box::new(BTreeMap::new),
            Box::new(move |_| cap),
            Duration::from_millis(100),
        )
    }

    fn stats(rx: u64, tx: u64) -> BTreeMap<LinkId, PortStats> {
        let mut m = BTreeMap::new();
        m.insert(
            LinkId::new(1, 2),
            PortStats {
                rx_bytes: rx,
                tx_bytes: tx,
                speed_mbps: 0,
            },
        );
        m
    }

    #[test]
    fn rates_from_counter_deltas() {
        let mon = fixed_monitor(1000.0);
        let t0 = Instant::now();
        let w = Utc::now();
        mon.update(t0, w, &stats(0, 0));
        let out = mon.update(t0 + Duration::from_secs(1), w, &stats(125_000_000, 0));
        assert_eq!(out.len(), 1);
        let r = out[0].rate;
        assert!((r.rx_mbps - 1000.0).abs() < 1e-6);
        assert!((r.util - 1.0).abs() < 1e-9);
    }

    #[test]
    fn counter_reset_yields_zero_not_negative() {
        let mon = fixed_monitor(1000.0);
        let t0 = Instant::now();
        let w = Utc::now();
        mon.update(t0, w, &stats(1_000_000, 1_000_000));
        let out = mon.update(t0 + Duration::from_secs(1), w, &stats(10, 10));
        let r = out[0].rate;
        assert_eq!(r.rx_mbps, 0.0);
        assert_eq!(r.tx_mbps, 0.0);
        assert_eq!(r.util, 0.0);
    }

    #[test]
    fn unknown_capacity_means_zero_util() {
        let mon = fixed_monitor(0.0);
        let t0 = Instant::now();
        let w = Utc::now();
        mon.update(t0, w, &stats(0, 0));
        let out = mon.update(t0 + Duration::from_secs(1), w, &stats(125_000_000, 0));
        assert!(out[0].rate.rx_mbps > 0.0);
        assert_eq!(out[0].rate.util, 0.0);
    }

    #[test]
    fn util_is_clamped() {
        let mon = fixed_monitor(100.0);
        let t0 = Instant::now();
        let w = Utc::now();
        mon.update(t0, w, &stats(0, 0));
        let out = mon.update(t0 + Duration::from_secs(1), w, &stats(125_000_000, 0));
        assert_eq!(out[0].rate.util, 1.0);
    }

    #[test]
    fn snapshot_and_series_accessors() {
        let mon = fixed_monitor(1000.0);
        let t0 = Instant::now();
        let w = Utc::now();
        mon.update(t0, w, &stats(0, 0));
        mon.update(t0 + Duration::from_secs(1), w, &stats(125_000_000, 0));

        let id = LinkId::new(1, 2);
        let rates = mon.last_rates_snapshot();
        assert!((rates[&id].rx_mbps - 1000.0).abs() < 1e-6);
        let series = mon.timeseries(&id);
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].rate.rx_mbps, 0.0);
        let mbps = mon.series_mbps();
        assert_eq!(mbps[&id].len(), 2);
        assert!(mon.timeseries(&LinkId::new(7, 8)).is_empty());
    }

    #[test]
    fn window_average_blocks_and_averages() {
        use std::sync::atomic::{AtomicU64, Ordering};
        let ticks = Arc::new(AtomicU64::new(0));
        let t2 = Arc::clone(&ticks);
        let collect: super::StatsCollector = Box::new(move || {
            let n = t2.fetch_add(1, Ordering::SeqCst);
            let mut m = BTreeMap::new();
            m.insert(
                LinkId::new(1, 2),
                PortStats {
                    rx_bytes: n * 125_000,
                    tx_bytes: 0,
                    speed_mbps: 0,
                },
            );
            m
        });
        let mon = Monitor::new(collect, Box::new(|_| 1000.0), Duration::from_millis(10));
        let avg = mon.window_average(Duration::from_millis(50));
        let r = avg[&LinkId::new(1, 2)];
        assert!(r.rx_mbps > 0.0);
        assert_eq!(r.tx_mbps, 0.0);
        assert!(r.util > 0.0 && r.util <= 1.0);
        assert!(ticks.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn csv_caps_points_per_link() {
        let mon = fixed_monitor(1000.0);
        let t0 = Instant::now();
        let w = Utc::now();
        for i in 0..5u64 {
            mon.update(
                t0 + Duration::from_secs(i),
                w,
                &stats(i * 1000, i * 1000),
            );
        }
        let dir = std::env::temp_dir().join("greente-monitor-test.csv");
        mon.export_csv(&dir, 2).unwrap();
        let text = std::fs::read_to_string(&dir).unwrap();
        let _ = std::fs::remove_file(&dir);
        assert_eq!(text.lines().count(), 1 + 2);
        assert!(text.starts_with("time_iso,u,v,rx_mbps,tx_mbps,util"));
    }
}
