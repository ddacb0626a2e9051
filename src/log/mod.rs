//! Session log lines shared by the library and the binary.

use crate::counts::CountSnapshot;
use crate::pipeline::{SessionReport, StopReason};

/// Install `env_logger`, defaulting to `default_filter` unless `RUST_LOG` is set.
pub fn init(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// `name: count` lines in first-seen order.
pub fn count_lines(counts: &CountSnapshot) -> Vec<String> {
    counts
        .iter()
        .map(|(name, count)| format!("{}: {}", name, count))
        .collect()
}

pub fn stop_reason_label(reason: StopReason) -> &'static str {
    match reason {
        StopReason::EndOfInput => "end of input",
        StopReason::UserCancel => "stopped by user",
    }
}

/// One-line tally of a finished session.
pub fn summary_line(report: &SessionReport) -> String {
    format!(
        "session finished ({}): {} frames, {} written, {} without detections, {} detections, {} persisted, {} dropped writes",
        stop_reason_label(report.stop_reason),
        report.frames_processed,
        report.frames_written,
        report.frames_without_detections,
        report.records.len(),
        report.persisted_writes,
        report.failed_writes
    )
}

/// Log the summary, then a warning per failure class that occurred.
pub fn log_report(report: &SessionReport) {
    log::info!("{}", summary_line(report));
    if report.source_failures > 0 {
        log::warn!("{} frames could not be decoded", report.source_failures);
    }
    if report.detector_failures > 0 {
        log::warn!(
            "detector failed on {} frames, counted as empty",
            report.detector_failures
        );
    }
    if report.failed_writes > 0 {
        log::warn!(
            "{} detections were counted but not persisted",
            report.failed_writes
        );
    }
    if report.skipped_boxes > 0 {
        log::info!("{} detections had boxes outside the frame", report.skipped_boxes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counts::CountAggregator;

    fn report(counts: CountSnapshot) -> SessionReport {
        SessionReport {
            stop_reason: StopReason::UserCancel,
            frames_processed: 4,
            frames_written: 4,
            frames_without_detections: 1,
            detector_failures: 0,
            source_failures: 0,
            persisted_writes: 2,
            failed_writes: 1,
            skipped_boxes: 0,
            counts,
            records: Vec::new(),
            export_path: None,
        }
    }

    #[test]
    fn count_lines_follow_first_seen_order() {
        let mut agg = CountAggregator::new();
        for name in ["person", "car", "person"] {
            agg.increment(name);
        }
        assert_eq!(count_lines(&agg.snapshot()), vec!["person: 2", "car: 1"]);
    }

    #[test]
    fn summary_mentions_stop_reason_and_drops() {
        let line = summary_line(&report(CountAggregator::new().snapshot()));
        assert!(line.starts_with("session finished (stopped by user): 4 frames"));
        assert!(line.ends_with("2 persisted, 1 dropped writes"));
    }
}
