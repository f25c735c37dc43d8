//! EWMA next-step forecaster with volatility-adaptive smoothing, plus the
//! mapping from predicted peak demand to the planner's objective weights.

use std::collections::BTreeMap;

use crate::models::{LinkId, Weights};

#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Base smoothing factor when adaptation is off.
    pub alpha: f64,
    pub adaptive_alpha: bool,
    /// Look-back window for the volatility estimate.
    pub adapt_window: usize,
    pub alpha_min: f64,
    pub alpha_max: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            alpha: 0.6,
            adaptive_alpha: true,
            adapt_window: 6,
            alpha_min: 0.3,
            alpha_max: 0.9,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PredSummary {
    pub next: BTreeMap<LinkId, f64>,
    pub peak: f64,
    pub mean: f64,
}

/// Smoothed next-step prediction. A single sample predicts itself; an
/// empty history predicts 0.
pub fn ewma_next(hist: &[f64], alpha: f64) -> f64 {
    let mut it = hist.iter();
    let mut s = match it.next() {
        Some(&h0) => h0,
        None => return 0.0,
    };
    for &h in it {
        s = alpha * h + (1.0 - alpha) * s;
    }
    s
}

/// Map the coefficient of variation over the last `win` samples into
/// [alpha_min, alpha_max]: the burstier the series, the more reactive the
/// smoothing.
pub fn adapt_alpha(hist: &[f64], alpha_min: f64, alpha_max: f64, win: usize) -> f64 {
    if !alpha_min.is_finite() || !alpha_max.is_finite() || alpha_min > alpha_max {
        return 0.6;
    }
    if hist.len() < win.max(2) {
        return ((alpha_min + alpha_max) * 0.5).max(0.0).min(1.0);
    }
    let n = win.min(hist.len());
    let tail = &hist[hist.len() - n..];
    let m = tail.iter().sum::<f64>() / n as f64;
    if m <= 0.0 {
        return alpha_min;
    }
    let var = tail.iter().map(|x| (x - m) * (x - m)).sum::<f64>() / (n - 1).max(1) as f64;
    let cov = var.sqrt() / m.max(1e-9);

    // cov around 0.3 counts as moderate volatility
    let x = cov / 0.3;
    let w = x / (1.0 + x);
    let a = alpha_min + (alpha_max - alpha_min) * w;
    a.max(alpha_min).min(alpha_max)
}

/// Per-link next-step predictions plus scalar peak and mean.
pub fn predict_next(cfg: &Config, hist_map: &BTreeMap<LinkId, Vec<f64>>) -> PredSummary {
    let mut out = PredSummary::default();
    if hist_map.is_empty() {
        return out;
    }
    let mut sum = 0.0;
    let mut cnt = 0usize;
    for (id, h) in hist_map {
        let a = if cfg.adaptive_alpha {
            adapt_alpha(h, cfg.alpha_min, cfg.alpha_max, cfg.adapt_window)
        } else {
            cfg.alpha
        };
        let pred = ewma_next(h, a);
        out.next.insert(*id, pred);
        out.peak = out.peak.max(pred);
        sum += pred;
        cnt += 1;
    }
    out.mean = if cnt > 0 { sum / cnt as f64 } else { 0.0 };
    out
}

/// Energy/load weights from predicted peak vs a capacity threshold. With
/// no meaningful threshold the objective stays energy-dominated.
pub fn weights_from_peak(predicted_peak_mbps: f64, threshold_mbps: f64) -> Weights {
    if threshold_mbps <= 0.0 {
        return Weights { ewr: 1.0, lwr: 0.0 };
    }
    weights_from_ratio(predicted_peak_mbps / threshold_mbps, 1.25)
}

/// Smooth S-shaped handover: `lwr = r^gamma / (1 + r^gamma)`.
pub fn weights_from_ratio(peak_over_thresh: f64, gamma: f64) -> Weights {
    let r = peak_over_thresh.max(0.0);
    let rg = r.powf(gamma.max(0.5));
    let lwr = rg / (1.0 + rg);
    Weights {
        ewr: 1.0 - lwr,
        lwr,
    }
}

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn peak(xs: &[f64]) -> f64 {
    xs.iter().cloned().fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ewma_boundaries() {
        assert_eq!(ewma_next(&[], 0.5), 0.0);
        assert_eq!(ewma_next(&[42.0], 0.5), 42.0);
        let v = ewma_next(&[10.0, 20.0], 0.5);
        assert!((v - 15.0).abs() < 1e-12);
    }

    #[test]
    fn constant_series_gets_alpha_min() {
        let h = vec![10.0; 6];
        let a = adapt_alpha(&h, 0.3, 0.9, 6);
        assert!((a - 0.3).abs() < 1e-12);
    }

    #[test]
    fn volatile_series_gets_high_alpha() {
        let h = vec![10.0, 30.0, 5.0, 40.0, 8.0, 50.0];
        let a = adapt_alpha(&h, 0.3, 0.9, 6);
        assert!(a > 0.7, "alpha = {}", a);
        assert!(a <= 0.9);
    }

    #[test]
    fn short_series_gets_midpoint() {
        let a = adapt_alpha(&[1.0], 0.3, 0.9, 6);
        assert!((a - 0.6).abs() < 1e-12);
    }

    #[test]
    fn weights_at_boundaries() {
        let w = weights_from_peak(0.0, 1000.0);
        assert!((w.ewr - 1.0).abs() < 1e-12);
        assert!((w.lwr - 0.0).abs() < 1e-12);

        let w = weights_from_peak(1_000_000.0, 1.0);
        assert!(w.lwr > 0.999);
        assert!(w.ewr < 0.001);

        // degenerate threshold
        let w = weights_from_peak(500.0, 0.0);
        assert_eq!(w.ewr, 1.0);
        assert_eq!(w.lwr, 0.0);
    }

    #[test]
    fn weights_sum_to_one() {
        for &r in &[0.0, 0.1, 0.5, 1.0, 2.0, 10.0] {
            let w = weights_from_ratio(r, 1.25);
            assert!((w.ewr + w.lwr - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn mean_and_peak_helpers() {
        assert_eq!(mean(&[]), 0.0);
        assert_eq!(peak(&[]), 0.0);
        assert!((mean(&[1.0, 2.0, 3.0]) - 2.0).abs() < 1e-12);
        assert_eq!(peak(&[1.0, 5.0, 3.0]), 5.0);
    }

    #[test]
    fn batch_prediction_summary() {
        let mut m = BTreeMap::new();
        m.insert(LinkId::new(1, 2), vec![100.0; 6]);
        m.insert(LinkId::new(2, 3), vec![300.0; 6]);
        let p = predict_next(&Config::default(), &m);
        assert_eq!(p.next.len(), 2);
        assert!((p.peak - 300.0).abs() < 1e-9);
        assert!((p.mean - 200.0).abs() < 1e-9);
    }
}
