//! Run directories and crash-safe checkpoint files.

use log::info;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{MaddpgError, Result};

/// Write `bytes` to a temporary sibling of `path`, then rename it into
/// place. A failed write never leaves a truncated file at `path`.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| MaddpgError::IoError(format!("{} is not a file path", path.display())))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(err) = fs::write(&tmp_path, bytes) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// `<model_root>/<env_id>/<model_name>/runN` with `logs/` and `incremental/`.
#[derive(Clone, Debug)]
pub struct RunDirectory {
    root: PathBuf,
    run_number: usize,
}

impl RunDirectory {
    /// Create the next run directory, numbered one past the largest
    /// existing `runN` (starting at `run1`).
    pub fn create<P: AsRef<Path>>(model_root: P, env_id: &str, model_name: &str) -> Result<Self> {
        let model_dir = model_root.as_ref().join(env_id).join(model_name);
        fs::create_dir_all(&model_dir)?;

        let mut largest = 0;
        for entry in fs::read_dir(&model_dir)? {
            let name = entry?.file_name();
            if let Some(n) = name.to_str().and_then(|s| s.strip_prefix("run")).and_then(|s| s.parse::<usize>().ok()) {
                largest = largest.max(n);
            }
        }

        let run_number = largest + 1;
        let root = model_dir.join(format!("run{}", run_number));
        fs::create_dir_all(root.join("logs"))?;
        fs::create_dir_all(root.join("incremental"))?;
        info!("run directory {}", root.display());
        Ok(RunDirectory { root, run_number })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_number(&self) -> usize {
        self.run_number
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn latest_model(&self) -> PathBuf {
        self.root.join("model.bin")
    }

    pub fn incremental_model(&self, episode: usize) -> PathBuf {
        self.root.join("incremental").join(format!("model_ep{}.bin", episode))
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }
}
