//! Complete backscatter detection pipeline.
//!
//! Drives one [`VectorProcessor`] and one [`EventDetector`] in sequence per
//! arriving vector and keeps a bounded trace of the results for plotting.
//! Frames must be fed in arrival order; the baseline, the phase difference
//! and the integrator all depend on it.

use std::collections::VecDeque;
use std::ops::Range;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

use backscatter_core::{CsiComplex, DetectorConfig, Result};
use serde::{Deserialize, Serialize};

use crate::acquisition::CsiAcquisition;
use crate::detector::EventDetector;
use crate::packet::CsiPacket;
use crate::processor::VectorProcessor;

/// Default capacity of the streaming output queue
pub const DEFAULT_OUTPUT_QUEUE_SIZE: usize = 1000;

/// Everything the pipeline produced for one frame
#[derive(Debug, Clone)]
pub struct Detection {
    /// Index of this frame among accepted frames, starting at 0
    pub frame_index: u64,

    /// Sequence number of the source packet, when there was one
    pub sequence_number: Option<u32>,

    /// Processor output (normalized once warmed up)
    pub measure: f64,
    pub raw_measure: f64,
    pub normalized: bool,

    /// High-passed vector, for diagnostics only
    pub filtered: Vec<CsiComplex>,

    /// Observation band used for the metric
    pub band: Range<usize>,

    /// Detector output
    pub integrator: f64,
    pub threshold: f64,
    pub event: bool,
}

/// One point of the diagnostic trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TracePoint {
    pub measure: f64,
    pub integrator: f64,
    pub threshold: f64,
    pub event: bool,
}

/// The main detection pipeline
pub struct BackscatterPipeline {
    config: DetectorConfig,
    processor: VectorProcessor,
    detector: EventDetector,
    trace: VecDeque<TracePoint>,
    frames_processed: u64,
    frames_rejected: u64,
    in_event: bool,
    output_queue_size: usize,
    is_running: Arc<RwLock<bool>>,
}

impl BackscatterPipeline {
    /// Build a pipeline after validating `config`
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        let processor = VectorProcessor::new(config.clone());
        Ok(Self::from_parts(config, processor))
    }

    /// Build a pipeline whose vector length is fixed up front
    pub fn with_subcarriers(config: DetectorConfig, n_subcarriers: usize) -> Result<Self> {
        config.validate()?;
        let processor = VectorProcessor::with_subcarriers(config.clone(), n_subcarriers)?;
        Ok(Self::from_parts(config, processor))
    }

    fn from_parts(config: DetectorConfig, processor: VectorProcessor) -> Self {
        let detector = EventDetector::new(config.clone());
        let trace = VecDeque::with_capacity(config.trace_window);

        Self {
            config,
            processor,
            detector,
            trace,
            frames_processed: 0,
            frames_rejected: 0,
            in_event: false,
            output_queue_size: DEFAULT_OUTPUT_QUEUE_SIZE,
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_output_queue_size(mut self, size: usize) -> Self {
        self.output_queue_size = size.max(1);
        self
    }

    /// Process one CSI vector.
    ///
    /// A rejected vector is counted and otherwise has no effect, so the
    /// caller can drop it and keep feeding the stream.
    pub fn process(
        &mut self,
        vector: &[CsiComplex],
        center_index: Option<usize>,
    ) -> Result<Detection> {
        let processed = match self.processor.process(vector, center_index) {
            Ok(processed) => processed,
            Err(e) => {
                self.frames_rejected += 1;
                return Err(e);
            }
        };

        let output = self.detector.update(processed.measure);
        let frame_index = self.frames_processed;
        self.frames_processed += 1;

        if output.event && !self.in_event {
            tracing::info!(
                frame = frame_index,
                integrator = output.integrator,
                threshold = output.threshold,
                "Backscatter event onset"
            );
        } else if !output.event && self.in_event {
            tracing::info!(frame = frame_index, "Backscatter event cleared");
        }
        self.in_event = output.event;

        tracing::debug!(
            frame = frame_index,
            measure = processed.measure,
            integrator = output.integrator,
            threshold = output.threshold,
            "Processed CSI frame"
        );

        self.record_trace(TracePoint {
            measure: processed.measure,
            integrator: output.integrator,
            threshold: output.threshold,
            event: output.event,
        });

        Ok(Detection {
            frame_index,
            sequence_number: None,
            measure: processed.measure,
            raw_measure: processed.raw_measure,
            normalized: processed.normalized,
            filtered: processed.filtered,
            band: processed.band,
            integrator: output.integrator,
            threshold: output.threshold,
            event: output.event,
        })
    }

    /// Process a packet with the configured center subcarrier
    pub fn process_packet(&mut self, packet: &CsiPacket) -> Result<Detection> {
        let mut detection = self.process(&packet.csi, None)?;
        detection.sequence_number = Some(packet.sequence_number);
        Ok(detection)
    }

    fn record_trace(&mut self, point: TracePoint) {
        if self.config.trace_window == 0 {
            return;
        }
        if self.trace.len() == self.config.trace_window {
            self.trace.pop_front();
        }
        self.trace.push_back(point);
    }

    /// Start the pipeline with an acquisition source.
    ///
    /// Processing happens on a spawned task with fresh state built from this
    /// pipeline's configuration. Rejected frames are logged and skipped.
    pub async fn start_streaming<A: CsiAcquisition + 'static>(
        &mut self,
        mut acquisition: A,
    ) -> Result<mpsc::Receiver<Detection>> {
        let (tx, rx) = mpsc::channel(self.output_queue_size);

        acquisition.start().await?;

        *self.is_running.write().await = true;
        let is_running = self.is_running.clone();

        let config = self.config.clone();
        let fixed_subcarriers = self.processor.n_subcarriers();

        tokio::spawn(async move {
            let processor = match fixed_subcarriers {
                Some(n) => VectorProcessor::with_subcarriers(config.clone(), n),
                None => Ok(VectorProcessor::new(config.clone())),
            };
            let mut pipeline = match processor {
                Ok(processor) => BackscatterPipeline::from_parts(config, processor),
                Err(e) => {
                    tracing::error!("Failed to build streaming pipeline: {}", e);
                    let _ = acquisition.stop().await;
                    *is_running.write().await = false;
                    return;
                }
            };

            loop {
                if !*is_running.read().await {
                    break;
                }

                match acquisition.recv().await {
                    Ok(Some(packet)) => match pipeline.process_packet(&packet) {
                        Ok(detection) => {
                            if tx.send(detection).await.is_err() {
                                break; // Receiver dropped
                            }
                        }
                        Err(e) => {
                            tracing::warn!(
                                sequence = packet.sequence_number,
                                "Dropping CSI frame: {}",
                                e
                            );
                        }
                    },
                    Ok(None) => {
                        tracing::debug!(
                            frames = pipeline.frames_processed(),
                            rejected = pipeline.frames_rejected(),
                            "Acquisition exhausted"
                        );
                        break;
                    }
                    Err(e) => {
                        tracing::error!("Acquisition error: {}", e);
                        break;
                    }
                }
            }

            let _ = acquisition.stop().await;
            *is_running.write().await = false;
        });

        Ok(rx)
    }

    /// Stop the pipeline
    pub async fn stop(&mut self) {
        *self.is_running.write().await = false;
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Get current configuration
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn processor(&self) -> &VectorProcessor {
        &self.processor
    }

    pub fn detector(&self) -> &EventDetector {
        &self.detector
    }

    /// Most recent results, oldest first
    pub fn trace(&self) -> impl Iterator<Item = &TracePoint> {
        self.trace.iter()
    }

    /// Export the trace as a JSON array for external plotting
    pub fn trace_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.trace)?)
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// Reset the pipeline state
    pub fn reset(&mut self) {
        self.processor.reset();
        self.detector.reset();
        self.trace.clear();
        self.frames_processed = 0;
        self.frames_rejected = 0;
        self.in_event = false;
    }
}
