use std::io::{self, IsTerminal, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::fmt::MakeWriter;

/// Live page/match counter drawn on stderr while a scan runs.
#[derive(Debug, Clone)]
pub struct ScanProgress {
    bar: ProgressBar,
    matched: Arc<AtomicUsize>,
    noun: Arc<str>,
}

impl ScanProgress {
    pub fn spinner(noun: &str) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {pos} pages scanned, {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message(format!("0 matching {noun}"));
        bar.enable_steady_tick(Duration::from_millis(120));
        Self {
            bar,
            matched: Arc::new(AtomicUsize::new(0)),
            noun: Arc::from(noun),
        }
    }

    /// Spinner when `enabled` and stderr is a terminal, hidden otherwise.
    pub fn for_terminal(enabled: bool, noun: &str) -> Self {
        if enabled && io::stderr().is_terminal() {
            Self::spinner(noun)
        } else {
            Self::hidden()
        }
    }

    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
            matched: Arc::new(AtomicUsize::new(0)),
            noun: Arc::from("records"),
        }
    }

    pub fn record_page(&self, matched: usize) {
        self.bar.inc(1);
        if matched > 0 {
            let total = self.matched.fetch_add(matched, Ordering::Relaxed) + matched;
            self.bar.set_message(format!("{total} matching {}", self.noun));
        }
    }

    pub fn pages(&self) -> u64 {
        self.bar.position()
    }

    pub fn matched(&self) -> usize {
        self.matched.load(Ordering::Relaxed)
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

/// Log sink that clears the spinner while a line is written so log output
/// and the spinner never share a terminal row.
pub struct ProgressWriter<W> {
    bar: ProgressBar,
    inner: W,
}

impl<W: Write> Write for ProgressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.write_all(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let inner = &mut self.inner;
        self.bar.suspend(|| inner.flush())
    }
}

impl<'a> MakeWriter<'a> for ScanProgress {
    type Writer = ProgressWriter<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        ProgressWriter {
            bar: self.bar.clone(),
            inner: io::stderr(),
        }
    }
}
