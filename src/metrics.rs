//! Scalar metrics written during training.
//!
//! Training code reports `(tag, value, step)` triples to a [`MetricsSink`]
//! and never reads them back. [`ScalarLogger`] keeps a CSV stream under the
//! run's log directory and exports everything as JSON at the end of a run.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;

pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl MetricsSink for NullSink {
    fn add_scalar(&mut self, _tag: &str, _value: f32, _step: usize) -> Result<()> {
        Ok(())
    }
}

/// Keeps every scalar in memory, in arrival order.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub scalars: Vec<(String, f32, usize)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values recorded under `tag`, in arrival order.
    pub fn values(&self, tag: &str) -> Vec<f32> {
        self.scalars
            .iter()
            .filter(|(t, _, _)| t == tag)
            .map(|(_, v, _)| *v)
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        self.scalars.push((tag.to_string(), value, step));
        Ok(())
    }
}

/// CSV scalar log (`step,tag,value,wall_time`) with a JSON export of the
/// full history, keyed by tag as `[[wall_time, step, value], ...]`.
pub struct ScalarLogger {
    log_dir: PathBuf,
    writer: BufWriter<File>,
    history: BTreeMap<String, Vec<(f64, usize, f32)>>,
}

impl ScalarLogger {
    pub fn new<P: AsRef<Path>>(log_dir: P) -> Result<Self> {
        let log_dir = log_dir.as_ref().to_path_buf();
        fs::create_dir_all(&log_dir)?;
        let mut writer = BufWriter::new(File::create(log_dir.join("scalars.csv"))?);
        writeln!(writer, "step,tag,value,wall_time")?;
        Ok(ScalarLogger {
            log_dir,
            writer,
            history: BTreeMap::new(),
        })
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    pub fn history(&self, tag: &str) -> Option<&[(f64, usize, f32)]> {
        self.history.get(tag).map(Vec::as_slice)
    }

    /// Write every scalar seen so far to `path` as JSON.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = BufWriter::new(File::create(path)?);
        serde_json::to_writer(file, &self.history)?;
        Ok(())
    }
}

fn wall_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl MetricsSink for ScalarLogger {
    fn add_scalar(&mut self, tag: &str, value: f32, step: usize) -> Result<()> {
        let wall = wall_time();
        writeln!(self.writer, "{},{},{},{}", step, tag, value, wall)?;
        self.history.entry(tag.to_string()).or_default().push((wall, step, value));
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
