//! The per-frame detection loop.
//!
//! A session runs until the source is exhausted or the user quits:
//!
//! 1. pull a frame (`Ok(None)` ends the session, `Err` skips the frame)
//! 2. detect (an error counts as "no detections", never retried)
//! 3. stamp every detection of the frame with one shared timestamp
//! 4. per detection, in detector order: count, persist (best effort), log
//! 5. annotate, write to the video sink, show
//! 6. honour a quit request before pulling the next frame
//!
//! Finalization (sink, store, record log) happens exactly once, from `run`
//! or from `Drop` if the loop never completed.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::PathBuf;

use crate::config::CounterConfig;
use crate::counts::{CountAggregator, CountSnapshot};
use crate::detect::{DetectorBackend, LabelMap, RawDetection};
use crate::export::export_records;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::output::FrameSink;
use crate::overlay::FrameAnnotator;
use crate::record::{BoundingBox, DetectionRecord, Timestamp};
use crate::storage::{DetectionStore, PersistenceSink, WriteOutcome};
use crate::ui::{CancelFlag, Display, DisplayControl, FrameSummary};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfInput,
    UserCancel,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Running,
    Stopped(StopReason),
}

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineOptions {
    /// Detections with a reported confidence below this are ignored.
    pub min_confidence: f32,
    /// Stop after this many processed frames.
    pub max_frames: Option<u64>,
    /// Consecutive source failures treated as end of input.
    pub max_consecutive_source_errors: u32,
    /// Where the record log goes at session end; `None` skips it.
    pub export_path: Option<PathBuf>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            max_frames: None,
            max_consecutive_source_errors: 30,
            export_path: None,
        }
    }
}

impl From<&CounterConfig> for PipelineOptions {
    fn from(cfg: &CounterConfig) -> Self {
        Self {
            min_confidence: cfg.pipeline.min_confidence,
            max_frames: cfg.pipeline.max_frames,
            max_consecutive_source_errors: cfg.pipeline.max_consecutive_source_errors,
            export_path: cfg.export_path.clone(),
        }
    }
}

/// The collaborators a session drives.
pub struct PipelineParts {
    pub source: Box<dyn FrameSource>,
    pub detector: Box<dyn DetectorBackend>,
    pub sink: Box<dyn FrameSink>,
    pub display: Box<dyn Display>,
}

/// Outcome of a finished session.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub stop_reason: StopReason,
    pub frames_processed: u64,
    pub frames_written: u64,
    pub frames_without_detections: u64,
    pub detector_failures: u64,
    pub source_failures: u64,
    pub persisted_writes: u64,
    pub failed_writes: u64,
    pub skipped_boxes: u64,
    pub counts: CountSnapshot,
    /// Every record of the session, in frame order then detector order.
    pub records: Vec<DetectionRecord>,
    /// Set when the record log was written.
    pub export_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
struct SessionStats {
    frames_processed: u64,
    frames_written: u64,
    frames_without_detections: u64,
    detector_failures: u64,
    source_failures: u64,
    consecutive_source_failures: u32,
    skipped_boxes: u64,
}

pub struct DetectionPipeline {
    source: Box<dyn FrameSource>,
    detector: Box<dyn DetectorBackend>,
    labels: LabelMap,
    sink: Box<dyn FrameSink>,
    display: Box<dyn Display>,
    persistence: PersistenceSink,
    counts: CountAggregator,
    annotator: FrameAnnotator,
    records: Vec<DetectionRecord>,
    options: PipelineOptions,
    clock: Box<dyn FnMut() -> Timestamp>,
    cancel: Option<CancelFlag>,
    warned_class_ids: HashSet<u32>,
    stats: SessionStats,
    state: State,
    export_written: Option<PathBuf>,
    finalized: bool,
}

impl DetectionPipeline {
    /// Connect the store, then assemble the session.
    ///
    /// A connection failure is returned before the detector or the source is
    /// touched.
    pub fn start<F>(connect: F, parts: PipelineParts, options: PipelineOptions) -> Result<Self>
    where
        F: FnOnce() -> Result<Box<dyn DetectionStore>>,
    {
        let store = connect().context("detection store unreachable, refusing to start")?;
        Ok(Self::new(store, parts, options))
    }

    /// Assemble a session around an already connected store.
    pub fn new(store: Box<dyn DetectionStore>, parts: PipelineParts, options: PipelineOptions) -> Self {
        let labels = parts.detector.labels().clone();
        let info = parts.source.info();
        log::info!(
            "session started: {}x{} @ {} fps, detector={} ({} classes)",
            info.width,
            info.height,
            info.fps,
            parts.detector.name(),
            labels.len()
        );
        Self {
            source: parts.source,
            detector: parts.detector,
            labels,
            sink: parts.sink,
            display: parts.display,
            persistence: PersistenceSink::new(store),
            counts: CountAggregator::new(),
            annotator: FrameAnnotator::default(),
            records: Vec::new(),
            options,
            clock: Box::new(Timestamp::now),
            cancel: None,
            warned_class_ids: HashSet::new(),
            stats: SessionStats::default(),
            state: State::Running,
            export_written: None,
            finalized: false,
        }
    }

    /// Replace the wall clock used to stamp frames.
    pub fn with_clock(mut self, clock: impl FnMut() -> Timestamp + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Also stop when `cancel` is set, whatever the display reports.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_annotator(mut self, annotator: FrameAnnotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Tallies so far.
    pub fn counts(&self) -> CountSnapshot {
        self.counts.snapshot()
    }

    /// Drive the session to completion, finalize, and report.
    pub fn run(mut self) -> SessionReport {
        let stop_reason = loop {
            if let State::Stopped(reason) = self.state {
                break reason;
            }
            if let Some(reason) = self.step() {
                self.state = State::Stopped(reason);
            }
        };

        match stop_reason {
            StopReason::EndOfInput => log::info!("video processing complete"),
            StopReason::UserCancel => log::info!("detection stopped by user"),
        }
        self.finalize();

        SessionReport {
            stop_reason,
            frames_processed: self.stats.frames_processed,
            frames_written: self.stats.frames_written,
            frames_without_detections: self.stats.frames_without_detections,
            detector_failures: self.stats.detector_failures,
            source_failures: self.stats.source_failures,
            persisted_writes: self.persistence.persisted(),
            failed_writes: self.persistence.failed_writes(),
            skipped_boxes: self.stats.skipped_boxes,
            counts: self.counts.snapshot(),
            records: std::mem::take(&mut self.records),
            export_path: self.export_written.take(),
        }
    }

    /// One loop iteration. `Some` when the session must stop.
    fn step(&mut self) -> Option<StopReason> {
        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => {
                self.stats.consecutive_source_failures = 0;
                frame
            }
            Ok(None) => return Some(StopReason::EndOfInput),
            Err(e) => {
                self.stats.source_failures += 1;
                self.stats.consecutive_source_failures += 1;
                log::warn!("skipping undecodable frame: {:#}", e);
                if self.stats.consecutive_source_failures >= self.options.max_consecutive_source_errors {
                    log::error!(
                        "{} consecutive source failures, treating stream as exhausted",
                        self.stats.consecutive_source_failures
                    );
                    return Some(StopReason::EndOfInput);
                }
                return None;
            }
        };
        self.process_frame(frame)
    }

    fn process_frame(&mut self, mut frame: Frame) -> Option<StopReason> {
        let raw = match self.detector.detect(&frame) {
            Ok(raw) => raw,
            Err(e) => {
                self.stats.detector_failures += 1;
                log::warn!(
                    "frame {}: detector failed, treating as no detections: {:#}",
                    frame.index,
                    e
                );
                Vec::new()
            }
        };

        let timestamp = (self.clock)();
        let first = self.records.len();
        for det in raw {
            if let Some(record) = self.build_record(det, timestamp, frame.index) {
                self.counts.increment(&record.class_name);
                if self.persistence.write(&record) == WriteOutcome::Dropped {
                    log::debug!(
                        "frame {}: {} counted but not persisted",
                        record.frame_index,
                        record.class_name
                    );
                }
                self.records.push(record);
            }
        }
        let frame_records = &self.records[first..];
        if frame_records.is_empty() {
            self.stats.frames_without_detections += 1;
            log::debug!("frame {}: no detections", frame.index);
        }

        match self.annotator.annotate(&mut frame, frame_records) {
            Ok(stats) => self.stats.skipped_boxes += stats.skipped as u64,
            Err(e) => log::warn!("frame {}: annotation failed: {:#}", frame.index, e),
        }

        match self.sink.write_frame(&frame) {
            Ok(()) => self.stats.frames_written += 1,
            Err(e) => log::warn!("frame {}: output video write failed: {:#}", frame.index, e),
        }

        self.stats.frames_processed += 1;
        let summary = FrameSummary {
            frame_index: frame.index,
            detections: frame_records.len(),
            total_detections: self.records.len() as u64,
        };
        let control = self.display.show(&frame, &summary);
        let cancelled = self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled);
        if control == DisplayControl::Quit || cancelled {
            return Some(StopReason::UserCancel);
        }
        if self
            .options
            .max_frames
            .is_some_and(|max| self.stats.frames_processed >= max)
        {
            log::info!("frame limit {} reached", self.stats.frames_processed);
            return Some(StopReason::EndOfInput);
        }
        None
    }

    fn build_record(&mut self, det: RawDetection, timestamp: Timestamp, frame_index: u64) -> Option<DetectionRecord> {
        if det
            .confidence
            .is_some_and(|conf| conf < self.options.min_confidence)
        {
            return None;
        }
        let class_name = match self.labels.get(det.class_id) {
            Some(name) => name.to_string(),
            None => {
                if self.warned_class_ids.insert(det.class_id) {
                    log::warn!(
                        "detector reported class id {} outside its {} labels",
                        det.class_id,
                        self.labels.len()
                    );
                }
                format!("class_{}", det.class_id)
            }
        };
        Some(DetectionRecord::new(
            class_name,
            timestamp,
            BoundingBox::from_f32(det.bbox),
            det.confidence,
            frame_index,
        ))
    }

    /// Release the display, the sink and the store, then write the record log.
    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;

        self.display.close();
        if let Err(e) = self.sink.finish() {
            log::error!("failed to finish output video: {:#}", e);
        }
        self.persistence.close();

        if let Some(path) = &self.options.export_path {
            match export_records(path, &self.records) {
                Ok(()) => self.export_written = Some(path.clone()),
                Err(e) => log::error!("record log not written: {:#}", e),
            }
        }
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.finalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScriptedBackend;
    use crate::ingest::{FrameRate, StreamInfo};
    use crate::output::NullSink;
    use crate::storage::InMemoryDetectionStore;
    use crate::ui::HeadlessDisplay;
    use anyhow::anyhow;
    use chrono::NaiveDate;

    struct FlakySource {
        remaining: Vec<Result<Option<Frame>>>,
    }

    impl FrameSource for FlakySource {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                width: 16,
                height: 16,
                fps: FrameRate::new(10, 1),
            }
        }

        fn next_frame(&mut self) -> Result<Option<Frame>> {
            if self.remaining.is_empty() {
                return Ok(None);
            }
            self.remaining.remove(0)
        }
    }

    fn fixed_clock() -> Timestamp {
        Timestamp::new(
            NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
        )
    }

    fn frame(index: u64) -> Result<Option<Frame>> {
        Ok(Some(Frame::filled(16, 16, index, [0, 0, 0])?))
    }

    fn pipeline(
        source: Vec<Result<Option<Frame>>>,
        detector: ScriptedBackend,
        options: PipelineOptions,
    ) -> DetectionPipeline {
        DetectionPipeline::new(
            Box::new(InMemoryDetectionStore::new()),
            PipelineParts {
                source: Box::new(FlakySource { remaining: source }),
                detector: Box::new(detector),
                sink: Box::new(NullSink::new()),
                display: Box::new(HeadlessDisplay::default()),
            },
            options,
        )
        .with_clock(fixed_clock)
    }

    #[test]
    fn low_confidence_and_unknown_classes() {
        let detector = ScriptedBackend::new(LabelMap::from_names(["car"]).unwrap()).then(vec![
            RawDetection::new(0, [1.0, 1.0, 5.0, 5.0], Some(0.2)),
            RawDetection::new(0, [1.0, 1.0, 5.0, 5.0], Some(0.9)),
            RawDetection::new(7, [1.0, 1.0, 5.0, 5.0], None),
        ]);
        let options = PipelineOptions {
            min_confidence: 0.5,
            ..PipelineOptions::default()
        };
        let report = pipeline(vec![frame(0)], detector, options).run();

        assert_eq!(report.counts.get("car"), 1);
        assert_eq!(report.counts.get("class_7"), 1);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn decode_errors_skip_frames_until_limit() {
        let source = vec![
            frame(0),
            Err(anyhow!("corrupt packet")),
            frame(2),
            Err(anyhow!("corrupt packet")),
            Err(anyhow!("corrupt packet")),
            frame(5),
        ];
        let options = PipelineOptions {
            max_consecutive_source_errors: 2,
            ..PipelineOptions::default()
        };
        let report = pipeline(source, ScriptedBackend::new(LabelMap::coco()), options).run();

        assert_eq!(report.stop_reason, StopReason::EndOfInput);
        assert_eq!(report.frames_processed, 2);
        assert_eq!(report.source_failures, 3);
    }

    #[test]
    fn frame_limit_ends_session() {
        let source = (0..5).map(frame).collect();
        let options = PipelineOptions {
            max_frames: Some(3),
            ..PipelineOptions::default()
        };
        let report = pipeline(source, ScriptedBackend::new(LabelMap::coco()), options).run();
        assert_eq!(report.stop_reason, StopReason::EndOfInput);
        assert_eq!(report.frames_processed, 3);
        assert_eq!(report.frames_written, 3);
        assert_eq!(report.frames_without_detections, 3);
    }
}
