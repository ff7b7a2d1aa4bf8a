//! Detector configuration.
//!
//! Every tunable constant of the processing chain lives here and is handed
//! to each component at construction. Nothing is read from process-wide
//! state after that point.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};

/// Environment variable prefix used when layering overrides
pub const ENV_PREFIX: &str = "BACKSCATTER";

/// Complete detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// EMA smoothing factor for the complex high-pass baseline
    pub highpass_alpha: f64,

    /// Capacity of the median/MAD history windows
    pub mad_window: usize,

    /// Samples required before the processor normalizes its measure
    pub min_history: usize,

    /// Fixed per-frame decay of the leaky integrator
    pub leak: f64,

    /// Smoothing factor applied to the integrator output
    pub integrator_alpha: f64,

    /// Threshold multiplier on the detector MAD
    pub threshold_mad_mult: f64,

    /// Threshold floor for quiet streams
    pub min_threshold: f64,

    /// Additive guard on the MAD
    pub epsilon: f64,

    /// Channel bandwidth (MHz)
    pub channel_bw_mhz: f64,

    /// OFDM FFT size
    pub fft_size: usize,

    /// Half-width of the observation band around the center (MHz)
    pub obs_band_mhz: f64,

    /// Fixed center subcarrier; `None` selects `N / 2`
    pub center_index: Option<usize>,

    /// Capacity of the pipeline's diagnostic trace
    pub trace_window: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            highpass_alpha: 0.01,
            mad_window: 200,
            min_history: 10,
            leak: 0.05,
            integrator_alpha: 0.2,
            threshold_mad_mult: 6.0,
            min_threshold: 4.0,
            epsilon: 1e-9,
            channel_bw_mhz: 20.0,
            fft_size: 64,
            obs_band_mhz: 5.0,
            center_index: None,
            trace_window: 800,
        }
    }
}

impl DetectorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pin the observation band to a fixed subcarrier
    pub fn with_center_index(mut self, index: usize) -> Self {
        self.center_index = Some(index);
        self
    }

    /// Configure the radio parameters used to size the observation band
    pub fn with_band(mut self, channel_bw_mhz: f64, fft_size: usize, obs_band_mhz: f64) -> Self {
        self.channel_bw_mhz = channel_bw_mhz;
        self.fft_size = fft_size;
        self.obs_band_mhz = obs_band_mhz;
        self
    }

    /// Configure the detector sensitivity
    pub fn with_threshold(mut self, mad_mult: f64, min_threshold: f64) -> Self {
        self.threshold_mad_mult = mad_mult;
        self.min_threshold = min_threshold;
        self
    }

    pub fn with_mad_window(mut self, window: usize) -> Self {
        self.mad_window = window;
        self
    }

    /// Subcarrier spacing in MHz
    pub fn subcarrier_spacing_mhz(&self) -> f64 {
        self.channel_bw_mhz / self.fft_size as f64
    }

    /// Half-width of the observation band in subcarrier indices
    pub fn band_half_width(&self) -> usize {
        let offset = (self.obs_band_mhz / self.subcarrier_spacing_mhz()).round();
        if offset.is_finite() && offset > 0.0 {
            offset as usize
        } else {
            0
        }
    }

    /// Check that every parameter is inside its usable range
    pub fn validate(&self) -> Result<()> {
        let unit = |name: &str, value: f64| -> Result<()> {
            if value.is_finite() && value > 0.0 && value <= 1.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be in (0, 1], got {value}")))
            }
        };
        let non_negative = |name: &str, value: f64| -> Result<()> {
            if value.is_finite() && value >= 0.0 {
                Ok(())
            } else {
                Err(Error::Config(format!("{name} must be finite and >= 0, got {value}")))
            }
        };

        unit("highpass_alpha", self.highpass_alpha)?;
        unit("integrator_alpha", self.integrator_alpha)?;
        non_negative("leak", self.leak)?;
        non_negative("threshold_mad_mult", self.threshold_mad_mult)?;
        non_negative("min_threshold", self.min_threshold)?;
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            return Err(Error::Config(format!(
                "epsilon must be finite and > 0, got {}",
                self.epsilon
            )));
        }
        non_negative("obs_band_mhz", self.obs_band_mhz)?;

        if !(self.channel_bw_mhz.is_finite() && self.channel_bw_mhz > 0.0) {
            return Err(Error::Config(format!(
                "channel_bw_mhz must be positive, got {}",
                self.channel_bw_mhz
            )));
        }
        if self.fft_size == 0 {
            return Err(Error::Config("fft_size must be non-zero".into()));
        }
        if self.min_history == 0 {
            return Err(Error::Config("min_history must be non-zero".into()));
        }
        if self.mad_window < self.min_history {
            return Err(Error::Config(format!(
                "mad_window ({}) must hold at least min_history ({}) samples",
                self.mad_window, self.min_history
            )));
        }
        Ok(())
    }

    /// Load configuration from file, layered with `BACKSCATTER_*` environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}
