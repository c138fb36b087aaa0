//! Append-only CSV sink for samples.
//!
//! Format: a `timestamp_ns,temperature_c` header written once when the file
//! is created, then one line per sample with the temperature in degrees
//! Celsius to three decimals.

use simtemp_core::{Result, Sample};
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const CSV_HEADER: &str = "timestamp_ns,temperature_c\n";

/// Format one sample as a CSV line.
pub fn csv_line(sample: &Sample) -> String {
    format!("{},{:.3}\n", sample.timestamp_ns, sample.temp_celsius())
}

#[derive(Debug)]
pub struct SampleRecorder {
    path: PathBuf,
    file: File,
    written: u64,
}

impl SampleRecorder {
    /// Open `path` for appending, writing the header if the file is new.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let existed = tokio::fs::try_exists(&path).await?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if !existed {
            file.write_all(CSV_HEADER.as_bytes()).await?;
        }
        debug!(path = %path.display(), new_file = !existed, "Recorder opened");

        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub async fn record(&mut self, sample: &Sample) -> Result<()> {
        self.file.write_all(csv_line(sample).as_bytes()).await?;
        self.written += 1;
        Ok(())
    }

    /// Flush buffered lines to disk.
    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_data().await?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Samples written through this recorder.
    pub fn written(&self) -> u64 {
        self.written
    }
}
