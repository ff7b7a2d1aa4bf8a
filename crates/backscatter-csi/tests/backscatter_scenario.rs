//! End-to-end detection scenarios with default constants.

use backscatter_core::{CsiComplex, DetectorConfig};
use backscatter_csi::{BackscatterPipeline, EventDetector, ReplayAcquisition, VectorProcessor};

const N_SUBCARRIERS: usize = 128;

/// Zero everywhere except the default observation band (center 64, ±16),
/// where every subcarrier carries `band_energy / 33` on the real axis.
fn band_frame(band_energy: f64) -> Vec<CsiComplex> {
    let center = N_SUBCARRIERS / 2;
    let mut frame = vec![CsiComplex::new(0.0, 0.0); N_SUBCARRIERS];
    for sample in &mut frame[center - 16..=center + 16] {
        *sample = CsiComplex::new(band_energy / 33.0, 0.0);
    }
    frame
}

#[test]
fn single_frame_burst_fires_and_drains() {
    let config = DetectorConfig::default();
    let mut processor = VectorProcessor::new(config.clone());
    let mut detector = EventDetector::new(config.clone());

    // Frame 1 seeds the baseline, frames 2-9 hold a stable band energy near 1.0
    for frame_no in 1..=9 {
        let frame = band_frame(if frame_no == 1 { 0.0 } else { 1.0 });
        let processed = processor.process(&frame, None).unwrap();
        let output = detector.update(processed.measure);

        assert!(!processed.normalized);
        if frame_no > 1 {
            assert!((processed.raw_measure - 1.0).abs() < 0.1);
        }
        assert!(!output.event, "no event expected on frame {frame_no}");
        assert!(output.integrator < 0.1);
    }

    // Frame 10: band amplitude 50x the quiet level
    let burst = processor.process(&band_frame(50.0), None).unwrap();
    assert!(burst.normalized);
    assert!(burst.measure > 100.0, "burst should stand far outside the MAD");

    let output = detector.update(burst.measure);
    assert!(output.integrator > 100.0, "integrator should jump on the burst");

    let mut fired_at = if output.event { Some(10) } else { None };
    let mut peak = output.integrator;
    let mut cleared_at = None;

    for frame_no in 11..=100_000u64 {
        let processed = processor.process(&band_frame(1.0), None).unwrap();
        let output = detector.update(processed.measure);
        assert!(output.integrator >= 0.0);
        peak = peak.max(output.integrator);

        if output.event && fired_at.is_none() {
            fired_at = Some(frame_no);
        }
        if fired_at.is_some() && !output.event {
            cleared_at = Some(frame_no);
            break;
        }
    }

    let fired_at = fired_at.expect("burst should raise an event");
    assert!(fired_at <= 13, "event should fire within three frames, fired at {fired_at}");

    // Smoothing scales the per-frame drain down to integrator_alpha * leak
    let cleared_at = cleared_at.expect("event should clear once the integrator drains");
    let drain_frames = peak / (config.integrator_alpha * config.leak);
    assert!(
        ((cleared_at - fired_at) as f64) < drain_frames * 1.25,
        "event took {} frames to clear, peak {peak}",
        cleared_at - fired_at
    );
}

#[test]
fn quiet_stream_never_fires() {
    let mut pipeline = BackscatterPipeline::new(DetectorConfig::default()).unwrap();

    for frame_no in 0..500 {
        let frame = band_frame(if frame_no == 0 { 0.0 } else { 1.0 });
        let detection = pipeline.process(&frame, None).unwrap();
        assert!(!detection.event, "unexpected event on frame {frame_no}");
        assert!(detection.integrator < detection.threshold);
    }
}

#[tokio::test]
async fn replayed_esp32_capture_streams_detections() {
    let mut capture = String::from("I (120) boot: ESP-IDF v5.1\n");
    for seq in 0..30u32 {
        let samples: Vec<String> = (0..64)
            .map(|i| {
                let re = 10 + ((seq as i32 * 7 + i * 3) % 5);
                let im = -4 + ((seq as i32 * 3 + i) % 3);
                format!("{re} {im}")
            })
            .collect();
        capture.push_str(&format!(
            "CSI_DATA,{seq},aa:bb:cc:dd:ee:ff,-58,11,\"[{}]\"\n",
            samples.join(" ")
        ));
    }

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("capture.txt");
    std::fs::write(&path, capture).unwrap();

    let replay = ReplayAcquisition::from_esp32_file(&path).await.unwrap();
    assert_eq!(replay.len(), 30);
    assert_eq!(replay.skipped_lines(), 1);

    let mut pipeline = BackscatterPipeline::new(DetectorConfig::default()).unwrap();
    let mut rx = pipeline.start_streaming(replay).await.unwrap();

    let mut sequences = Vec::new();
    while let Some(detection) = rx.recv().await {
        assert_eq!(detection.filtered.len(), 64);
        assert!(detection.integrator >= 0.0);
        sequences.push(detection.sequence_number.unwrap());
    }

    assert_eq!(sequences, (0..30).collect::<Vec<u32>>());
}
