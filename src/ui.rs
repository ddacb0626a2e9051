use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::frame::Frame;

/// Cooperative quit request, shared with a signal handler.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag set by Ctrl-C. Installs a process-wide handler; call once.
    pub fn install_ctrlc() -> Result<Self> {
        let flag = Self::new();
        let handler_flag = flag.clone();
        ctrlc::set_handler(move || {
            handler_flag.cancel();
        })
        .context("failed to install Ctrl-C handler")?;
        Ok(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayControl {
    Continue,
    Quit,
}

/// Per-frame facts handed to the display next to the annotated frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameSummary {
    pub frame_index: u64,
    pub detections: usize,
    pub total_detections: u64,
}

/// Display collaborator. Renders a frame and surfaces the user's quit request.
pub trait Display {
    fn show(&mut self, frame: &Frame, summary: &FrameSummary) -> DisplayControl;

    /// Tear down whatever `show` set up.
    fn close(&mut self) {}
}

/// No rendering; only the cancel flag can stop the run.
#[derive(Clone, Debug, Default)]
pub struct HeadlessDisplay {
    cancel: CancelFlag,
}

impl HeadlessDisplay {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, _frame: &Frame, _summary: &FrameSummary) -> DisplayControl {
        if self.cancel.is_cancelled() {
            DisplayControl::Quit
        } else {
            DisplayControl::Continue
        }
    }
}

/// Terminal spinner with the running frame and detection counts.
pub struct ProgressDisplay {
    spinner: ProgressBar,
    cancel: CancelFlag,
}

impl ProgressDisplay {
    pub fn new(source_name: &str, cancel: CancelFlag) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_draw_target(ProgressDrawTarget::stderr());
        spinner.enable_steady_tick(Duration::from_millis(120));
        let style = ProgressStyle::with_template("{spinner} {elapsed} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.set_message(format!("{source_name}: waiting for first frame… (Ctrl-C to stop)"));
        Self { spinner, cancel }
    }
}

impl Display for ProgressDisplay {
    fn show(&mut self, _frame: &Frame, summary: &FrameSummary) -> DisplayControl {
        self.spinner.set_message(format!(
            "frame {} | {} in frame | {} total (Ctrl-C to stop)",
            summary.frame_index, summary.detections, summary.total_detections
        ));
        if self.cancel.is_cancelled() {
            DisplayControl::Quit
        } else {
            DisplayControl::Continue
        }
    }

    fn close(&mut self) {
        self.spinner.finish_and_clear();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto" => Some(UiMode::Auto),
            "plain" => Some(UiMode::Plain),
            "pretty" => Some(UiMode::Pretty),
            _ => None,
        }
    }
}

/// Stage banners for startup and shutdown steps.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool) -> Self {
        Self { mode, is_tty }
    }

    pub fn use_pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty | UiMode::Auto => true,
                UiMode::Plain => false,
            }
    }

    /// Display matching the mode: spinner on a terminal, headless otherwise.
    pub fn display(&self, source_name: &str, cancel: CancelFlag) -> Box<dyn Display> {
        if self.use_pretty() {
            Box::new(ProgressDisplay::new(source_name, cancel))
        } else {
            Box::new(HeadlessDisplay::new(cancel))
        }
    }

    pub fn stage(&self, name: &str) -> StageGuard {
        if self.use_pretty() {
            let spinner = ProgressBar::new_spinner();
            spinner.set_draw_target(ProgressDrawTarget::stderr());
            spinner.enable_steady_tick(Duration::from_millis(120));
            let style = ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner());
            spinner.set_style(style);
            spinner.set_message(format!("{name}…"));
            StageGuard::new(name.to_string(), Some(spinner))
        } else {
            eprintln!("==> {}", name);
            StageGuard::new(name.to_string(), None)
        }
    }
}

pub struct StageGuard {
    name: String,
    start: Instant,
    spinner: Option<ProgressBar>,
}

impl StageGuard {
    fn new(name: String, spinner: Option<ProgressBar>) -> Self {
        Self {
            name,
            start: Instant::now(),
            spinner,
        }
    }
}

impl Drop for StageGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let message = format!("✔ {} ({})", self.name, format_duration(elapsed));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.as_secs() >= 1 {
        format!("{:.2}s", duration.as_secs_f64())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_display_follows_cancel_flag() {
        let cancel = CancelFlag::new();
        let mut display = HeadlessDisplay::new(cancel.clone());
        let frame = Frame::filled(2, 2, 0, [0, 0, 0]).unwrap();
        let summary = FrameSummary::default();

        assert_eq!(display.show(&frame, &summary), DisplayControl::Continue);
        cancel.cancel();
        assert_eq!(display.show(&frame, &summary), DisplayControl::Quit);
    }

    #[test]
    fn plain_mode_never_uses_spinners() {
        assert!(!Ui::new(UiMode::Plain, true).use_pretty());
        assert!(!Ui::new(UiMode::Pretty, false).use_pretty());
        assert!(Ui::new(UiMode::Auto, true).use_pretty());
        assert_eq!(UiMode::parse("plain"), Some(UiMode::Plain));
        assert_eq!(UiMode::parse("fancy"), None);
    }

    #[test]
    fn durations_format_compactly() {
        assert_eq!(format_duration(Duration::from_millis(42)), "42ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
    }
}
