//! Detection Counter
//!
//! This crate turns a video stream into per-class object counts, an annotated
//! output video, a detection store and a fixed-width record log.
//!
//! # Architecture
//!
//! Every frame goes through the same loop:
//!
//! 1. **Ingest**: a `FrameSource` yields the next RGB frame (or end of input).
//! 2. **Detect**: a `DetectorBackend` returns raw boxes with class ids.
//! 3. **Record**: boxes become `DetectionRecord`s sharing one frame timestamp.
//! 4. **Count / persist / log**: each record is tallied, written best-effort to
//!    the `DetectionStore` and appended to the in-memory session log.
//! 5. **Annotate / emit**: boxes and labels are drawn in a per-class color and
//!    the frame goes to the `FrameSink` and the `Display`.
//!
//! Only a store connection failure at startup aborts a session. Detector,
//! decode and per-record write failures are logged and absorbed.
//!
//! # Module Structure
//!
//! - `frame`: RGB pixel buffer shared by all collaborators
//! - `detect`: detector trait, label vocabulary, backends
//! - `ingest` / `output`: video sources and sinks
//! - `color`, `counts`, `record`, `storage`, `overlay`: per-record components
//! - `pipeline`: the session state machine
//! - `export`, `config`, `ui`, `log`: ambient plumbing

pub mod color;
pub mod config;
pub mod counts;
pub mod detect;
pub mod export;
pub mod frame;
pub mod ingest;
pub mod log;
pub mod output;
pub mod overlay;
pub mod pipeline;
pub mod record;
pub mod storage;
pub mod ui;

pub use color::{ColorAssigner, Rgb};
pub use counts::{CountAggregator, CountSnapshot};
pub use detect::{DetectorBackend, LabelMap, RawDetection, ScriptedBackend, StubBackend};
pub use frame::Frame;
pub use ingest::{FrameSource, StreamInfo};
pub use output::{FrameSink, NullSink, Y4mSink};
pub use overlay::{AnnotationStats, FrameAnnotator};
pub use pipeline::{DetectionPipeline, PipelineOptions, SessionReport, StopReason};
pub use record::{BoundingBox, DetectionRecord, Timestamp, TIMESTAMP_FORMAT};
pub use storage::{
    DetectionStore, InMemoryDetectionStore, PersistenceSink, SqliteDetectionStore, WriteOutcome,
};
pub use ui::{CancelFlag, Display, DisplayControl, FrameSummary, HeadlessDisplay};
