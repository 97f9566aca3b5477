//! Download progress reporting.
//!
//! Sources surface transfer progress through a listener trait so the engine
//! stays presentation-free; the CLI plugs in an indicatif bar, tests and
//! non-interactive callers use the no-op listener.

use indicatif::{ProgressBar, ProgressStyle};

/// Callback surface for a single download.
pub trait ProgressListener: Send + Sync {
    /// Transfer is starting; `total` is the content length when the server
    /// reported one.
    fn started(&self, _total: Option<u64>) {}

    /// A chunk of `bytes` arrived.
    fn advanced(&self, _bytes: u64) {}

    /// Transfer finished (successfully or not).
    fn finished(&self) {}
}

/// Listener that ignores everything.
pub struct NoProgress;

impl ProgressListener for NoProgress {}

/// Terminal progress bar for interactive installs.
pub struct BarProgress {
    bar: ProgressBar,
}

impl BarProgress {
    pub fn new(label: &str) -> Self {
        let bar = ProgressBar::hidden();
        bar.set_message(label.to_string());
        Self { bar }
    }
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new("downloading")
    }
}

impl ProgressListener for BarProgress {
    fn started(&self, total: Option<u64>) {
        match total {
            Some(len) => {
                self.bar.set_length(len);
                self.bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("=>-"),
                );
            }
            None => {
                self.bar.set_style(
                    ProgressStyle::with_template("{msg} {spinner} {bytes}")
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
            }
        }
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn advanced(&self, bytes: u64) {
        self.bar.inc(bytes);
    }

    fn finished(&self) {
        self.bar.finish_and_clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_listener_accepts_all_events() {
        let listener = NoProgress;
        listener.started(Some(100));
        listener.advanced(50);
        listener.finished();
    }

    #[test]
    fn test_bar_progress_tracks_length() {
        let listener = BarProgress::new("test");
        listener.started(Some(10));
        listener.advanced(4);
        listener.advanced(6);
        listener.finished();
    }
}
