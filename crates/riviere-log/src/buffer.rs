use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use riviere_collector::{Collector, CollectorConfig, CollectorError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{LogError, Result};

/// Configuration for a [`LogBuffer`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// File the buffered lines are written to on flush.
    pub output: PathBuf,
    /// Sizing of the underlying collector.
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Append to an existing file instead of truncating it.
    #[serde(default)]
    pub append: bool,
}

impl LogConfig {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            collector: CollectorConfig::default(),
            append: false,
        }
    }

    pub fn with_append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    pub fn with_collector(mut self, collector: CollectorConfig) -> Self {
        self.collector = collector;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.output.as_os_str().is_empty() {
            return Err(LogError::InvalidConfig("output path is empty".into()));
        }
        self.collector.validate()?;
        Ok(())
    }
}

/// Log lines accepted from any number of threads and written out once.
///
/// [`log`](Self::log) never blocks other writers. [`flush`](Self::flush)
/// freezes the buffer and writes every line, one per row, in the order the
/// lines were collected. After a flush both operations fail with
/// [`CollectorError::AlreadyBuilt`](riviere_collector::CollectorError::AlreadyBuilt).
#[derive(Debug)]
pub struct LogBuffer {
    config: LogConfig,
    lines: Collector<String>,
}

impl LogBuffer {
    pub fn new(config: LogConfig) -> Result<Self> {
        config.validate()?;
        let lines = Collector::with_config(&config.collector)?;
        Ok(Self { config, lines })
    }

    /// Buffer one line.
    pub fn log(&self, message: impl Into<String>) -> Result<()> {
        match self.lines.add(message.into()) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!(output = %self.config.output.display(), "log line rejected after flush");
                Err(e.into())
            }
        }
    }

    /// Write every buffered line to the output file and return how many
    /// were written.
    ///
    /// The output is opened before the buffer is frozen, so a failure to
    /// create or open it leaves every line in place for a later retry.
    pub fn flush(&self) -> Result<usize> {
        if self.lines.is_built() {
            return Err(CollectorError::AlreadyBuilt.into());
        }
        let path = self.config.output.as_path();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        // Truncation waits until the build succeeds; a losing concurrent
        // flush must not clobber the winner's output.
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(self.config.append)
            .truncate(false)
            .open(path)?;

        let lines = self.lines.build()?;
        if !self.config.append {
            file.set_len(0)?;
        }
        let mut writer = BufWriter::new(file);

        debug!(lines = lines.estimate_size(), output = %path.display(), "flushing log buffer");
        let mut written = 0;
        for line in lines {
            writeln!(writer, "{line}")?;
            written += 1;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;

        info!(written, output = %path.display(), "log buffer flushed");
        Ok(written)
    }

    pub fn is_flushed(&self) -> bool {
        self.lines.is_built()
    }

    pub fn output(&self) -> &Path {
        &self.config.output
    }
}
