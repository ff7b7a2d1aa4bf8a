//! Leaky-integrator event detection on the normalized measure.
//!
//! Above-median excursions feed an integrator that leaks a fixed amount
//! every frame and is then smoothed against its previous value. An event is
//! flagged whenever the smoothed integrator exceeds an adaptive threshold of
//! `median + k * MAD`, floored at a minimum for quiet streams.
//!
//! The flag is re-evaluated every frame with no latching, so it follows
//! the integrator across the threshold in both directions.

use backscatter_core::DetectorConfig;
use serde::{Deserialize, Serialize};

use crate::robust::RobustWindow;

/// Detector output for one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutput {
    /// Smoothed integrator value, never negative
    pub integrator: f64,

    /// Whether the integrator exceeds the threshold this frame
    pub event: bool,

    /// Adaptive threshold used for this frame
    pub threshold: f64,

    /// Running median of the detector history
    pub median: f64,

    /// Running MAD of the detector history (epsilon included)
    pub mad: f64,
}

/// Backscatter event detector
#[derive(Debug, Clone)]
pub struct EventDetector {
    config: DetectorConfig,
    history: RobustWindow,
    integrator: f64,
    last_integrator: f64,
}

impl EventDetector {
    /// Create a detector; `config` is expected to be validated already.
    pub fn new(config: DetectorConfig) -> Self {
        let history = RobustWindow::new(config.mad_window);

        Self {
            config,
            history,
            integrator: 0.0,
            last_integrator: 0.0,
        }
    }

    /// Feed one measure and evaluate the event rule
    pub fn update(&mut self, measure_z: f64) -> DetectorOutput {
        self.history.push(measure_z);

        let (median, mad) = match self.history.stats(self.config.epsilon) {
            Some(stats) => (stats.median, stats.mad),
            None => (measure_z, self.config.epsilon),
        };

        let threshold = self
            .config
            .min_threshold
            .max(median + self.config.threshold_mad_mult * mad);

        // Only above-baseline excursions accumulate
        let positive = (measure_z - median).max(0.0);
        let leaked = (self.integrator + positive - self.config.leak).max(0.0);

        let beta = self.config.integrator_alpha;
        self.integrator = (1.0 - beta) * self.last_integrator + beta * leaked;
        self.last_integrator = self.integrator;

        DetectorOutput {
            integrator: self.integrator,
            event: self.integrator > threshold,
            threshold,
            median,
            mad,
        }
    }

    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    pub fn history(&self) -> &RobustWindow {
        &self.history
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Clear the history and zero the integrator
    pub fn reset(&mut self) {
        self.history.clear();
        self.integrator = 0.0;
        self.last_integrator = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_update_is_quiet() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        let out = detector.update(3.0);

        // Single sample: median is the sample itself, nothing above it
        assert_eq!(out.median, 3.0);
        assert_eq!(out.integrator, 0.0);
        assert!(!out.event);
        assert_eq!(out.threshold, 4.0);
    }

    #[test]
    fn test_threshold_floor_on_flat_stream() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        for _ in 0..50 {
            let out = detector.update(0.0);
            assert!(out.mad < 1e-8);
            assert_eq!(out.threshold, 4.0);
            assert!(!out.event);
        }
    }

    #[test]
    fn test_adaptive_threshold_above_floor() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        let mut out = detector.update(0.0);
        for i in 0..40 {
            out = detector.update(if i % 2 == 0 { 10.0 } else { 20.0 });
        }
        // Threshold follows median + 6 * MAD once it exceeds the floor
        let expected = out.median + 6.0 * out.mad;
        assert!(expected > 4.0);
        assert!((out.threshold - expected).abs() < 1e-9);
    }

    #[test]
    fn test_integrator_accumulates_and_fires() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        for _ in 0..20 {
            detector.update(0.0);
        }

        let spike = detector.update(100.0);
        // 0.2 * (100 - 0.05)
        assert!((spike.integrator - 19.99).abs() < 1e-9);
        assert!(spike.event);
    }

    #[test]
    fn test_integrator_monotonic_decay_below_median() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        for _ in 0..100 {
            detector.update(1.0);
        }
        detector.update(60.0);
        let mut previous = detector.integrator();
        assert!(previous > 0.0);

        // Ones keep the majority of the window, so the median stays at 1.0
        for i in 0..90 {
            let out = detector.update(0.5 - (i % 3) as f64 * 0.1);
            assert!(out.integrator <= previous + 1e-12, "integrator rose at step {i}");
            assert!(out.integrator >= 0.0);
            previous = out.integrator;
        }
    }

    #[test]
    fn test_no_latching() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        for _ in 0..20 {
            detector.update(0.0);
        }

        let fired = detector.update(30.0);
        assert!(fired.event);

        // Without new excursions the leak eventually pulls it back down
        let cleared = (0..2000)
            .map(|_| detector.update(0.0))
            .any(|out| !out.event);
        assert!(cleared);
    }

    #[test]
    fn test_reset() {
        let mut detector = EventDetector::new(DetectorConfig::default());
        for i in 0..30 {
            detector.update(i as f64);
        }
        assert!(detector.integrator() > 0.0);

        detector.reset();
        assert_eq!(detector.integrator(), 0.0);
        assert!(detector.history().is_empty());
        assert_eq!(detector.update(3.0), EventDetector::new(DetectorConfig::default()).update(3.0));
    }
}
