use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiMode {
    Auto,
    Plain,
    Pretty,
}

impl UiMode {
    pub fn parse(flag: &str) -> Self {
        match flag {
            "plain" => UiMode::Plain,
            "pretty" => UiMode::Pretty,
            _ => UiMode::Auto,
        }
    }
}

/// Stderr progress for detection runs.
///
/// Pretty output (spinners, bars) only when stderr is a terminal; `--json`
/// runs keep it off in auto mode so stdout stays clean for piping.
#[derive(Clone, Debug)]
pub struct Ui {
    mode: UiMode,
    is_tty: bool,
    quiet_pretty: bool,
}

impl Ui {
    pub fn new(mode: UiMode, is_tty: bool, quiet_pretty: bool) -> Self {
        Self {
            mode,
            is_tty,
            quiet_pretty,
        }
    }

    fn pretty(&self) -> bool {
        self.is_tty
            && match self.mode {
                UiMode::Pretty => true,
                UiMode::Auto => !self.quiet_pretty,
                UiMode::Plain => false,
            }
    }

    /// Named step with a spinner; prints its duration when dropped.
    pub fn stage(&self, name: &str) -> StageGuard {
        if self.pretty() {
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

    /// Per-frame progress. A bar when the frame count is known, a running
    /// counter otherwise (live camera).
    pub fn frames(&self, expected: Option<u64>) -> FrameProgress {
        if !self.pretty() {
            return FrameProgress {
                bar: None,
                expected,
                started: Instant::now(),
            };
        }
        let bar = match expected {
            Some(total) => {
                let bar = ProgressBar::new(total);
                let style = ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {pos}/{len} frames ({percent}%) {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar());
                bar.set_style(style);
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.enable_steady_tick(Duration::from_millis(120));
                let style = ProgressStyle::with_template("{spinner} {pos} frames {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner());
                bar.set_style(style);
                bar
            }
        };
        bar.set_draw_target(ProgressDrawTarget::stderr());
        FrameProgress {
            bar: Some(bar),
            expected,
            started: Instant::now(),
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
        let message = format!("✔ {} ({})", self.name, format_duration(self.start.elapsed()));
        if let Some(spinner) = &self.spinner {
            spinner.finish_with_message(message);
        } else {
            eprintln!("{message}");
        }
    }
}

pub struct FrameProgress {
    bar: Option<ProgressBar>,
    expected: Option<u64>,
    started: Instant,
}

impl FrameProgress {
    /// Record one analyzed frame and the run's detection total so far.
    pub fn advance(&self, frames_done: u64, total_detections: u64) {
        match &self.bar {
            Some(bar) => {
                bar.set_position(frames_done);
                bar.set_message(format!("{total_detections} potholes"));
            }
            None => {
                let of = self
                    .expected
                    .map_or_else(String::new, |n| format!("/{n}"));
                eprintln!("frame {frames_done}{of}: {total_detections} potholes so far");
            }
        }
    }

    pub fn finish(self, frames_done: u64) {
        let message = format!(
            "✔ {} frames ({})",
            frames_done,
            format_duration(self.started.elapsed())
        );
        match &self.bar {
            Some(bar) => bar.finish_with_message(message),
            None => eprintln!("{message}"),
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
