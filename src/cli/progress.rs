//! Terminal progress rendering
//!
//! A single indicatif bar fed from the download's progress callback. The
//! bar switches from spinner to bar form once a total is known (direct-mode
//! downloads of unknown length never learn one).

use indicatif::{ProgressBar, ProgressStyle};

use crate::app::DownloadStatus;

pub struct ProgressDisplay {
    bar: ProgressBar,
    sized: bool,
}

impl ProgressDisplay {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner} {bytes} downloaded ({bytes_per_sec})")
                .expect("static template"),
        );
        Self { bar, sized: false }
    }

    /// Feed one status report into the display.
    pub fn update(&mut self, status: &DownloadStatus) {
        if !self.sized && status.total_bytes > 0 {
            self.bar.set_length(status.total_bytes as u64);
            self.bar.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                )
                .expect("static template"),
            );
            self.sized = true;
        }
        self.bar.set_position(status.processed_bytes.max(0) as u64);
    }

    /// Complete the bar and leave it on screen.
    pub fn finish(&self) {
        self.bar.finish();
    }

    /// Stop drawing without claiming completion.
    pub fn abandon(&self) {
        self.bar.abandon();
    }
}

impl Default for ProgressDisplay {
    fn default() -> Self {
        Self::new()
    }
}
