use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use dgs_core::{READING_FIELDS, Reading};
use tracing::{debug, error, info};

use crate::config::LogConfig;

/// Result of offering a reading to the [`BoundedLog`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutcome {
    Appended,
    /// Cap already reached, file untouched.
    Skipped,
    /// Write failed; the entry does not count towards the cap.
    Failed,
}

/// Append-only CSV log that stops accepting rows after a fixed count.
///
/// The count lives in memory only, so a new process starts from zero even when
/// the file already holds rows from an earlier run.
pub struct BoundedLog {
    path: PathBuf,
    max_entries: usize,
    written: usize,
}

impl BoundedLog {
    pub fn new(config: &LogConfig) -> Self {
        Self {
            path: config.path.clone(),
            max_entries: config.max_entries,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows appended by this instance.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn is_full(&self) -> bool {
        self.written >= self.max_entries
    }

    pub fn log_if_under_cap(&mut self, reading: &Reading) -> LogOutcome {
        if self.is_full() {
            return LogOutcome::Skipped;
        }

        if let Err(e) = self.append(reading) {
            error!(path = ?self.path, error = %e, "Failed to save to CSV");
            return LogOutcome::Failed;
        }

        self.written += 1;
        debug!("Logged to CSV ({}/{})", self.written, self.max_entries);

        if self.is_full() {
            info!(
                max_entries = self.max_entries,
                "CSV logging limit reached. No more entries will be saved."
            );
        }

        LogOutcome::Appended
    }

    fn append(&self, reading: &Reading) -> io::Result<()> {
        let write_header = !self.path.exists();

        let mut out = String::new();
        if write_header {
            out.push_str(&READING_FIELDS.join(","));
            out.push_str("\r\n");
        }
        out.push_str(&csv_row(reading));

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(out.as_bytes())?;
        file.flush()
    }
}

fn csv_row(reading: &Reading) -> String {
    // Floats use `{:?}` so whole numbers keep their decimal point.
    format!(
        "{},{},{:?},{:?},{:?},{},{},{}\r\n",
        reading.timestamp,
        escape_field(&reading.sensor_sn),
        reading.ppb,
        reading.temperature,
        reading.humidity,
        reading.adc_gas,
        reading.adc_temp,
        reading.adc_hum,
    )
}

fn escape_field(value: &str) -> String {
    if value.contains(['"', ',', '\r', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
