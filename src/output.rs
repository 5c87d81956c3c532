use std::io::{self, Write};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::fetch::ProgressSink;

#[derive(Debug, Clone, Serialize)]
pub struct FetchReport {
    pub name: String,
    pub action: String,
    pub records: usize,
    pub max_atoms: usize,
    pub cache_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InfoReport {
    pub name: String,
    pub source_url: String,
    pub records: usize,
    pub max_atoms: usize,
    pub created_at: String,
    pub cache_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleReport {
    pub index: usize,
    pub num_atoms: usize,
    pub atomic_numbers: Vec<i64>,
    pub coordinates: Vec<[f64; 3]>,
    pub property_value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearReport {
    pub name: String,
    pub cleared: bool,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Terminal download progress. Falls back to a spinner-style count while the
/// server has not reported a Content-Length.
pub struct DownloadProgress {
    bar: ProgressBar,
}

impl DownloadProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {wide_bar} {bytes}/{total_bytes} ({eta})",
            )
            .unwrap()
            .progress_chars("=> "),
        );
        Self { bar }
    }
}

impl Default for DownloadProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for DownloadProgress {
    fn on_progress(&self, received: u64, total: Option<u64>) {
        if let Some(total) = total {
            self.bar.set_length(total);
        }
        self.bar.set_position(received);
    }

    fn on_complete(&self) {
        self.bar.finish_and_clear();
    }
}
