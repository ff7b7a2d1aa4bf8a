//! # Backscatter-CSI
//!
//! Streaming detection of short-lived backscatter events in WiFi Channel
//! State Information (CSI).
//!
//! Each radio frame delivers one complex vector with an I/Q sample per OFDM
//! subcarrier. Around a configured center subcarrier, a narrow band is
//! watched for fast amplitude and phase excursions that stand out from the
//! slowly drifting environment.
//!
//! ## Pipeline Stages
//!
//! 1. **Common-mode removal**: subtract median real/imag parts across subcarriers
//! 2. **High-pass**: subtract a slow complex EMA baseline
//! 3. **Band metric**: amplitude + phase-jitter energy around the center
//! 4. **Normalization**: robust z-score against a median/MAD window
//! 5. **Detection**: leaky, smoothed integrator against an adaptive threshold

pub mod acquisition;
pub mod detector;
pub mod packet;
pub mod pipeline;
pub mod processor;
pub mod robust;

pub use acquisition::*;
pub use detector::*;
pub use packet::*;
pub use pipeline::*;
pub use processor::*;
pub use robust::*;
