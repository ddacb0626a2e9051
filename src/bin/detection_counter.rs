//! detection_counter - count objects in a video stream.
//!
//! For every frame: detect, count per class, persist each detection, draw
//! boxes and labels, and write the annotated frame. At the end the per-class
//! totals are printed and the record log is exported.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use detection_counter::config::CounterConfig;
use detection_counter::detect::build_backend;
use detection_counter::ingest::open_source;
use detection_counter::pipeline::PipelineParts;
use detection_counter::ui::{Ui, UiMode};
use detection_counter::{
    log as session_log, CancelFlag, DetectionPipeline, DetectionStore, FrameSink, NullSink,
    PipelineOptions, SqliteDetectionStore, Y4mSink,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Count detected objects in a video stream")]
struct Args {
    /// Video file (.y4m, or any format with the ingest-file-ffmpeg feature) or stub://name.
    #[arg(long)]
    source: Option<String>,

    /// Annotated output video (.y4m). Empty string disables it.
    #[arg(long)]
    output: Option<String>,

    /// SQLite database receiving one row per detection.
    #[arg(long)]
    db_path: Option<String>,

    /// Fixed-width record log written at the end. Empty string disables it.
    #[arg(long)]
    export: Option<String>,

    /// Detector backend: stub or tract.
    #[arg(long)]
    detector: Option<String>,

    /// Model file for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Label file, one class name per line (defaults to COCO).
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Ignore detections below this confidence.
    #[arg(long)]
    min_confidence: Option<f32>,

    /// Stop after this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Terminal output: auto, plain or pretty.
    #[arg(long, env = "COUNTER_UI")]
    ui: Option<String>,
}

impl Args {
    fn apply(self, cfg: &mut CounterConfig) {
        if let Some(source) = self.source {
            cfg.source.path = source;
        }
        if let Some(output) = self.output {
            cfg.output_path = non_empty_path(output);
        }
        if let Some(db_path) = self.db_path {
            cfg.db_path = db_path;
        }
        if let Some(export) = self.export {
            cfg.export_path = non_empty_path(export);
        }
        if let Some(detector) = self.detector {
            cfg.detector.backend = detector;
        }
        if let Some(model) = self.model {
            cfg.detector.model_path = Some(model);
        }
        if let Some(labels) = self.labels {
            cfg.detector.labels_path = Some(labels);
        }
        if let Some(min_confidence) = self.min_confidence {
            cfg.pipeline.min_confidence = min_confidence;
        }
        if let Some(max_frames) = self.max_frames {
            cfg.pipeline.max_frames = Some(max_frames);
        }
        if let Some(ui) = self.ui {
            cfg.display_mode = ui;
        }
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn main() -> Result<()> {
    session_log::init("info");
    let args = Args::parse();

    let mut cfg = CounterConfig::load()?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let mode = UiMode::parse(&cfg.display_mode)
        .ok_or_else(|| anyhow!("unknown ui mode '{}'", cfg.display_mode))?;
    let ui = Ui::new(mode, std::io::stderr().is_terminal());

    let source = {
        let _stage = ui.stage("Open video source");
        open_source(&cfg.source)?
    };
    let info = source.info();

    let sink: Box<dyn FrameSink> = match &cfg.output_path {
        Some(path) => {
            let _stage = ui.stage("Create output video");
            Box::new(Y4mSink::create(path, info)?)
        }
        None => Box::new(NullSink::new()),
    };

    let detector = {
        let _stage = ui.stage("Load detector");
        build_backend(&cfg.detector)?
    };

    let cancel = CancelFlag::install_ctrlc()?;
    let display = ui.display(&cfg.source.path, cancel.clone());

    // Without a store nothing is read or detected.
    let db_path = cfg.db_path.clone();
    let pipeline = DetectionPipeline::start(
        || -> Result<Box<dyn DetectionStore>> {
            let _stage = ui.stage("Open detection store");
            Ok(Box::new(SqliteDetectionStore::open(&db_path)?))
        },
        PipelineParts {
            source,
            detector,
            sink,
            display,
        },
        PipelineOptions::from(&cfg),
    )?
    .with_cancel_flag(cancel);

    let report = pipeline.run();
    session_log::log_report(&report);

    println!("Total Object Counts:");
    for line in session_log::count_lines(&report.counts) {
        println!("{}", line);
    }
    if let Some(path) = &report.export_path {
        println!("Detections exported to {}", path.display());
    }
    if let Some(path) = &cfg.output_path {
        println!("Annotated video written to {}", path.display());
    }
    Ok(())
}
