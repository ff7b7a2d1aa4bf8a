//! CSI acquisition interfaces.
//!
//! Capturing frames from the radio is the job of an external reader; this
//! module only defines the seam the pipeline pulls from, plus a replay
//! source for recorded captures and tests.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;

use backscatter_core::{Error, Result};

use crate::packet::CsiPacket;

/// Trait for CSI acquisition backends
#[async_trait]
pub trait CsiAcquisition: Send + Sync {
    /// Start CSI capture
    async fn start(&mut self) -> Result<()>;

    /// Stop CSI capture
    async fn stop(&mut self) -> Result<()>;

    /// Check if capture is active
    fn is_running(&self) -> bool;

    /// Receive the next packet in arrival order; `None` once the source is exhausted
    async fn recv(&mut self) -> Result<Option<CsiPacket>>;

    /// Try to receive a packet without waiting
    fn try_recv(&mut self) -> Option<CsiPacket>;
}

/// Replays recorded CSI packets in their original order
pub struct ReplayAcquisition {
    packets: Vec<CsiPacket>,
    interval: Option<Duration>,
    is_running: bool,
    rx: Option<mpsc::Receiver<CsiPacket>>,
    skipped_lines: usize,
}

impl ReplayAcquisition {
    pub fn new(packets: Vec<CsiPacket>) -> Self {
        Self {
            packets,
            interval: None,
            is_running: false,
            rx: None,
            skipped_lines: 0,
        }
    }

    /// Build a replay from ESP32 serial output.
    ///
    /// Lines that are not CSI records (boot logs, partial reads) are skipped
    /// with a warning, the same way a live serial reader drops them.
    pub fn from_esp32_lines(text: &str) -> Self {
        let mut packets = Vec::new();
        let mut skipped_lines = 0;

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match CsiPacket::parse_esp32_line(line, index + 1) {
                Ok(packet) => packets.push(packet),
                Err(e) => {
                    tracing::warn!("Skipping CSI line: {}", e);
                    skipped_lines += 1;
                }
            }
        }

        let mut replay = Self::new(packets);
        replay.skipped_lines = skipped_lines;
        replay
    }

    /// Load a recorded ESP32 capture from disk
    pub async fn from_esp32_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Acquisition(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Ok(Self::from_esp32_lines(&text))
    }

    /// Pace the replay at a fixed frame interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Lines rejected while parsing a recorded capture
    pub fn skipped_lines(&self) -> usize {
        self.skipped_lines
    }
}

#[async_trait]
impl CsiAcquisition for ReplayAcquisition {
    async fn start(&mut self) -> Result<()> {
        if self.is_running {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(self.packets.len().max(1));
        self.rx = Some(rx);
        self.is_running = true;

        let packets = self.packets.clone();
        let interval = self.interval;
        tokio::spawn(async move {
            for packet in packets {
                if let Some(interval) = interval {
                    tokio::time::sleep(interval).await;
                }
                if tx.send(packet).await.is_err() {
                    break; // Receiver dropped
                }
            }
        });

        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.is_running = false;
        self.rx = None;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.is_running
    }

    async fn recv(&mut self) -> Result<Option<CsiPacket>> {
        match &mut self.rx {
            Some(rx) => Ok(rx.recv().await),
            None => Err(Error::Acquisition("Acquisition not started".into())),
        }
    }

    fn try_recv(&mut self) -> Option<CsiPacket> {
        self.rx.as_mut()?.try_recv().ok()
    }
}
