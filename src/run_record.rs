//! Record of the last script run.
//!
//! Stores the prompt, the script that was executed and how it ended, so the
//! last run can be inspected afterwards with `forge --last`.

use crate::executor::ExecutionOutcome;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// What happened the last time a prompt was run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// The prompt as typed.
    pub prompt: String,
    /// The script that was handed to the interpreter.
    pub script_text: String,
    /// Standard error output (if any).
    pub stderr: Option<String>,
    pub exit_code: i32,
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub timed_out: bool,
}

impl RunRecord {
    pub fn new(
        prompt: &str,
        script_text: &str,
        stderr: Option<String>,
        outcome: &ExecutionOutcome,
    ) -> Self {
        Self {
            prompt: prompt.to_string(),
            script_text: script_text.to_string(),
            stderr,
            exit_code: outcome.exit_code,
            cancelled: outcome.cancelled,
            timed_out: outcome.timed_out,
        }
    }

    /// Whether the run counts as failed: nonzero exit, interrupted, or any
    /// stderr output.
    pub fn failed(&self) -> bool {
        self.exit_code != 0 || self.cancelled || self.timed_out || self.stderr.is_some()
    }

    fn record_file_path() -> Result<PathBuf> {
        let config_dir = crate::config::Config::get_config_dir()?;
        Ok(config_dir.join("last_run.json"))
    }

    /// Saves the record to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::record_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Loads the last run record, if one was saved.
    pub fn load() -> Result<Option<Self>> {
        Self::load_from(&Self::record_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&content)?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i32) -> ExecutionOutcome {
        ExecutionOutcome { exit_code, cancelled: false, timed_out: false }
    }

    #[test]
    fn test_failed_by_exit_code_or_stderr() {
        let ok = RunRecord::new("box", "Write-Output 1", None, &outcome(0));
        assert!(!ok.failed());

        let nonzero = RunRecord::new("box", "exit 1", None, &outcome(1));
        assert!(nonzero.failed());

        let noisy = RunRecord::new("box", "x", Some("warning".to_string()), &outcome(0));
        assert!(noisy.failed());
    }

    #[test]
    fn test_interrupted_runs_are_failed() {
        let cancelled = ExecutionOutcome { exit_code: -1, cancelled: true, timed_out: false };
        assert!(RunRecord::new("box", "x", None, &cancelled).failed());
    }

    #[test]
    fn test_save_and_load_from() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_run.json");
        let record = RunRecord::new(
            "120x80x25 mm box",
            "$ErrorActionPreference = 'Stop'\n$model.SketchManager.InsertSketch($true)\n",
            Some("Exception calling \"NewDocument\"\n\tat line 12".to_string()),
            &outcome(1),
        );

        record.save_to(&path).unwrap();
        assert_eq!(RunRecord::load_from(&path).unwrap(), Some(record));
    }

    #[test]
    fn test_load_from_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(RunRecord::load_from(&dir.path().join("none.json")).unwrap(), None);
    }

    #[test]
    fn test_deserialize_without_interrupt_flags() {
        let json = r#"{
            "prompt": "top plane",
            "script_text": "Write-Output 'x'",
            "stderr": null,
            "exit_code": 0
        }"#;

        let record: RunRecord = serde_json::from_str(json).unwrap();
        assert!(!record.cancelled);
        assert!(!record.timed_out);
        assert!(!record.failed());
    }
}
