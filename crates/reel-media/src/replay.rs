//! Reproduction log: the recorded sequence of media operations
//! sufficient to replay a job's output deterministically.
//!
//! Every external media invocation appends one record. Each record is
//! written immediately as a standalone shell script; `finalize` writes
//! the consolidated human-readable document.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{MediaError, MediaResult};

/// One executed media operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpRecord {
    /// Position in execution order, starting at 1
    pub index: usize,
    /// Operation name (e.g., "stabilize_apply")
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// Program invoked
    pub program: String,
    /// Arguments, unquoted
    pub args: Vec<String>,
}

impl OpRecord {
    /// Shell-executable command line for this operation.
    pub fn command_line(&self) -> String {
        let mut parts = vec![shell_quote(&self.program)];
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }
}

/// Append-only, ordered log of every external media operation executed
/// for a render job.
#[derive(Debug)]
pub struct ReproductionLog {
    dir: PathBuf,
    ops: Mutex<Vec<OpRecord>>,
}

impl ReproductionLog {
    /// Create a log writing into `dir` (created if missing).
    pub fn create(dir: impl AsRef<Path>) -> MediaResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            ops: Mutex::new(Vec::new()),
        })
    }

    /// Directory the log writes into.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.ops.lock().map(|ops| ops.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append an operation and write its per-op shell script.
    pub fn record(
        &self,
        name: &str,
        description: &str,
        program: &str,
        args: &[String],
    ) -> MediaResult<()> {
        let mut ops = self
            .ops
            .lock()
            .map_err(|_| MediaError::internal("reproduction log poisoned"))?;

        let record = OpRecord {
            index: ops.len() + 1,
            name: name.to_string(),
            description: description.to_string(),
            program: program.to_string(),
            args: args.to_vec(),
        };

        let script_path = self
            .dir
            .join(format!("{:03}_{}.sh", record.index, record.name));
        let script = format!(
            "#!/bin/sh\n# {}\n{}\n",
            record.description,
            record.command_line()
        );
        fs::write(&script_path, script)?;

        ops.push(record);
        Ok(())
    }

    /// Write the consolidated operations document. Called when the job
    /// terminates, on success or failure.
    pub fn finalize(&self) -> MediaResult<PathBuf> {
        let ops = self
            .ops
            .lock()
            .map_err(|_| MediaError::internal("reproduction log poisoned"))?;

        let mut doc = String::from("# Reproduction log\n\n");
        doc.push_str(&format!("{} operations, in execution order.\n\n", ops.len()));
        for op in ops.iter() {
            doc.push_str(&format!(
                "## {:03} {}\n\n{}\n\n```sh\n{}\n```\n\n",
                op.index,
                op.name,
                op.description,
                op.command_line()
            ));
        }

        let path = self.dir.join("operations.md");
        fs::write(&path, doc)?;
        Ok(path)
    }
}

/// Quote an argument for POSIX shell.
fn shell_quote(s: &str) -> String {
    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,".contains(c))
    {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("input.mp4"), "input.mp4");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_record_writes_scripts_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ReproductionLog::create(tmp.path().join("replay")).unwrap();

        log.record(
            "extract_segment",
            "Extract clip 0 (92.0s-110.0s)",
            "ffmpeg",
            &["-y".into(), "-i".into(), "match.mp4".into(), "clip_000.mp4".into()],
        )
        .unwrap();
        log.record(
            "concat",
            "Concatenate 1 clips",
            "ffmpeg",
            &["-f".into(), "concat".into(), "reel.mp4".into()],
        )
        .unwrap();

        assert_eq!(log.len(), 2);
        assert!(log.dir().join("001_extract_segment.sh").exists());
        assert!(log.dir().join("002_concat.sh").exists());

        let script = fs::read_to_string(log.dir().join("001_extract_segment.sh")).unwrap();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("ffmpeg -y -i match.mp4 clip_000.mp4"));
    }

    #[test]
    fn test_finalize_writes_consolidated_doc() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ReproductionLog::create(tmp.path()).unwrap();
        log.record("probe", "Probe source", "ffprobe", &["match.mp4".into()])
            .unwrap();

        let doc_path = log.finalize().unwrap();
        let doc = fs::read_to_string(doc_path).unwrap();
        assert!(doc.contains("1 operations"));
        assert!(doc.contains("## 001 probe"));
        assert!(doc.contains("ffprobe match.mp4"));
    }

    #[test]
    fn test_finalize_empty_log() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ReproductionLog::create(tmp.path()).unwrap();
        assert!(log.is_empty());
        log.finalize().unwrap();
        assert!(tmp.path().join("operations.md").exists());
    }
}
