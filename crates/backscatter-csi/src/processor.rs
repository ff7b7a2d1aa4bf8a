//! Per-vector CSI processing.
//!
//! Each incoming vector goes through four stages:
//!
//! 1. **Common-mode removal**: the median real and imaginary parts across
//!    all subcarriers are subtracted. Shared amplitude/phase drift goes away
//!    while a few outlier subcarriers cannot skew the offset.
//! 2. **Adaptive high-pass**: a complex EMA baseline tracks slow
//!    environmental drift and is subtracted, leaving event-scale changes.
//! 3. **Band metric**: amplitude energy plus phase-jitter energy between
//!    consecutive frames over a narrow band around the center subcarrier.
//! 4. **Robust normalization**: the metric is expressed as a MAD-scaled
//!    distance from the running median once enough history exists.

use std::ops::Range;

use backscatter_core::{CsiComplex, DetectorConfig, Error, Result};

use crate::robust::RobustWindow;

/// Output of one processing step
#[derive(Debug, Clone)]
pub struct ProcessedVector {
    /// Normalized measure once warmed up, otherwise the raw measure
    pub measure: f64,

    /// Band metric before normalization
    pub raw_measure: f64,

    /// Whether `measure` is MAD-normalized
    pub normalized: bool,

    /// High-passed vector, same length as the input
    pub filtered: Vec<CsiComplex>,

    /// Subcarrier indices the metric was computed over
    pub band: Range<usize>,

    /// Center subcarrier after clamping
    pub center_index: usize,
}

/// Stateful filter and normalizer for a single CSI stream
#[derive(Debug, Clone)]
pub struct VectorProcessor {
    config: DetectorConfig,
    band_half_width: usize,
    fixed_subcarriers: Option<usize>,
    n_subcarriers: Option<usize>,
    baseline: Option<Vec<CsiComplex>>,
    prev_filtered: Option<Vec<CsiComplex>>,
    history: RobustWindow,
    frames: u64,
}

impl VectorProcessor {
    /// Create a processor whose vector length is fixed by the first call.
    ///
    /// `config` is taken as-is; [`crate::BackscatterPipeline::new`] is the
    /// entry point that runs [`DetectorConfig::validate`] first.
    pub fn new(config: DetectorConfig) -> Self {
        let band_half_width = config.band_half_width();
        let history = RobustWindow::new(config.mad_window);

        Self {
            config,
            band_half_width,
            fixed_subcarriers: None,
            n_subcarriers: None,
            baseline: None,
            prev_filtered: None,
            history,
            frames: 0,
        }
    }

    /// Create a processor bound to `n_subcarriers` up front
    pub fn with_subcarriers(config: DetectorConfig, n_subcarriers: usize) -> Result<Self> {
        if n_subcarriers == 0 {
            return Err(Error::InvalidInput(
                "subcarrier count must be at least 1".into(),
            ));
        }

        let mut processor = Self::new(config);
        processor.fixed_subcarriers = Some(n_subcarriers);
        processor.n_subcarriers = Some(n_subcarriers);
        Ok(processor)
    }

    /// Process one CSI vector.
    ///
    /// `center_index` overrides the configured center for this call. Out of
    /// range centers are clamped to `[0, N - 1]`. A rejected vector leaves
    /// every piece of state untouched.
    pub fn process(
        &mut self,
        vector: &[CsiComplex],
        center_index: Option<usize>,
    ) -> Result<ProcessedVector> {
        self.check_input(vector)?;

        let n = vector.len();
        self.n_subcarriers = Some(n);
        self.frames += 1;

        let center = self.resolve_center(n, center_index);

        let detrended = Self::spatial_detrend(vector);
        let filtered = self.temporal_highpass(detrended);

        let band = self.band_range(n, center);
        let raw_measure = self.band_metric(&filtered, band.clone());

        self.history.push(raw_measure);

        let (measure, normalized) = if self.history.len() < self.config.min_history {
            (raw_measure, false)
        } else {
            match self.history.stats(self.config.epsilon) {
                Some(stats) => ((raw_measure - stats.median) / stats.mad, true),
                None => (raw_measure, false),
            }
        };

        if self.frames == self.config.min_history as u64 {
            tracing::debug!(
                frames = self.frames,
                "processor history warmed up, switching to robust normalization"
            );
        }

        self.prev_filtered = Some(filtered.clone());

        Ok(ProcessedVector {
            measure,
            raw_measure,
            normalized,
            filtered,
            band,
            center_index: center,
        })
    }

    fn check_input(&self, vector: &[CsiComplex]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("empty CSI vector".into()));
        }

        if let Some(expected) = self.n_subcarriers {
            if vector.len() != expected {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        if let Some(index) = vector.iter().position(|c| !c.re.is_finite() || !c.im.is_finite()) {
            return Err(Error::InvalidInput(format!(
                "non-finite sample at subcarrier {index}"
            )));
        }

        Ok(())
    }

    fn resolve_center(&self, n: usize, center_index: Option<usize>) -> usize {
        center_index
            .or(self.config.center_index)
            .map(|c| c.min(n - 1))
            .unwrap_or(n / 2)
    }

    /// Subtract the median real and imaginary parts from every subcarrier
    pub fn spatial_detrend(vector: &[CsiComplex]) -> Vec<CsiComplex> {
        let mut re: Vec<f64> = vector.iter().map(|c| c.re).collect();
        let mut im: Vec<f64> = vector.iter().map(|c| c.im).collect();

        let offset = CsiComplex::new(
            crate::robust::median_in_place(&mut re),
            crate::robust::median_in_place(&mut im),
        );

        vector.iter().map(|&c| c - offset).collect()
    }

    /// Remove the slow complex baseline.
    ///
    /// The first vector seeds the baseline and yields all zeros.
    fn temporal_highpass(&mut self, vector: Vec<CsiComplex>) -> Vec<CsiComplex> {
        let alpha = self.config.highpass_alpha;

        match self.baseline.as_mut() {
            Some(baseline) => baseline
                .iter_mut()
                .zip(vector.iter())
                .map(|(b, &x)| {
                    *b = *b * (1.0 - alpha) + x * alpha;
                    x - *b
                })
                .collect(),
            None => {
                let zeros = vec![CsiComplex::new(0.0, 0.0); vector.len()];
                self.baseline = Some(vector);
                zeros
            }
        }
    }

    fn band_range(&self, n: usize, center: usize) -> Range<usize> {
        let start = center.saturating_sub(self.band_half_width);
        let end = center
            .saturating_add(self.band_half_width)
            .saturating_add(1)
            .min(n);
        start..end
    }

    /// Amplitude energy plus weighted phase-jitter energy over the band
    fn band_metric(&self, filtered: &[CsiComplex], band: Range<usize>) -> f64 {
        let current = &filtered[band.clone()];
        let amplitude_energy: f64 = current.iter().map(|c| c.norm()).sum();

        let phase_energy: f64 = match &self.prev_filtered {
            Some(prev) if prev.len() == filtered.len() => current
                .iter()
                .zip(prev[band].iter())
                .map(|(c, p)| (c * p.conj()).arg().abs())
                .sum(),
            _ => 0.0,
        };

        amplitude_energy + 0.5 * self.band_half_width as f64 * phase_energy
    }

    /// Subcarrier count fixed for this instance, if established
    pub fn n_subcarriers(&self) -> Option<usize> {
        self.n_subcarriers
    }

    pub fn band_half_width(&self) -> usize {
        self.band_half_width
    }

    /// Current complex baseline, absent before the first vector
    pub fn baseline(&self) -> Option<&[CsiComplex]> {
        self.baseline.as_deref()
    }

    pub fn history(&self) -> &RobustWindow {
        &self.history
    }

    /// Vectors accepted since construction or the last reset
    pub fn frames_seen(&self) -> u64 {
        self.frames
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Restore the pre-first-call state.
    ///
    /// A length fixed through [`VectorProcessor::with_subcarriers`] is kept;
    /// a length learned from the first vector is forgotten.
    pub fn reset(&mut self) {
        self.n_subcarriers = self.fixed_subcarriers;
        self.baseline = None;
        self.prev_filtered = None;
        self.history.clear();
        self.frames = 0;
    }
}
