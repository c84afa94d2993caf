//! The job entity and its status state machine.
//!
//! A [`Job`] is both the unit of submitted work and, once a worker pushes it
//! back, the carrier of its result. Jobs travel as JSON with PascalCase field
//! names; binary payloads (`Infile`, `OutFile.Data`) are base64 encoded.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp, WorkerId};

/// Name the worker gives the job payload inside its scratch directory.
pub const INFILE_NAME: &str = "input.xml";

/// Output database produced by the default simulation command.
pub const DEFAULT_OUTFILE: &str = "cyclus.sqlite";

/// Fixed weight added to every job when sizing cache entries.
const JOB_OVERHEAD_BYTES: usize = 256;

// ---------------------------------------------------------------------------
// JobStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Complete,
    Failed,
}

impl JobStatus {
    /// Position in the lifecycle. Complete and Failed share the final rank.
    pub fn rank(self) -> u8 {
        match self {
            JobStatus::Queued => 0,
            JobStatus::Running => 1,
            JobStatus::Complete | JobStatus::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Whether a job currently in `self` may be recorded as `next`.
    ///
    /// Re-recording the same status is allowed; moving sideways between the
    /// two terminal states or backwards is not.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        next == self || next.rank() > self.rank()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// OutFile
// ---------------------------------------------------------------------------

/// A named output blob produced by a finished job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OutFile {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

impl OutFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// One unit of submitted work and, eventually, its result.
///
/// Every field except `Cmd` may be omitted from a submitted JSON body. A
/// body without an `Id` gets a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Job {
    #[serde(default)]
    pub id: JobId,
    /// Command line the worker executes, program first.
    #[serde(default)]
    pub cmd: Vec<String>,
    /// Opaque input payload, written to [`INFILE_NAME`] before the run.
    #[serde(default, with = "base64_bytes")]
    pub infile: Vec<u8>,
    /// Files the worker collects from its scratch directory after the run.
    #[serde(default)]
    pub outfile_names: Vec<String>,
    #[serde(default)]
    pub outfiles: Vec<OutFile>,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub submitted: Option<Timestamp>,
    #[serde(default)]
    pub started: Option<Timestamp>,
    #[serde(default)]
    pub finished: Option<Timestamp>,
    #[serde(default)]
    pub worker_id: Option<WorkerId>,
    /// Wall-clock limit for the run in seconds; zero means unlimited.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub note: String,
}

impl Job {
    pub fn new(cmd: Vec<String>, infile: impl Into<Vec<u8>>) -> Self {
        Self {
            id: JobId::new(),
            cmd,
            infile: infile.into(),
            outfile_names: Vec::new(),
            outfiles: Vec::new(),
            status: JobStatus::Queued,
            submitted: None,
            started: None,
            finished: None,
            worker_id: None,
            timeout_secs: 0,
            stdout: String::new(),
            stderr: String::new(),
            note: String::new(),
        }
    }

    /// Wrap a raw simulation input file into the default simulator job.
    pub fn with_default_cmd(infile: impl Into<Vec<u8>>) -> Self {
        let cmd = ["cyclus", "-o", DEFAULT_OUTFILE, INFILE_NAME]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let mut job = Self::new(cmd, infile);
        job.outfile_names.push(DEFAULT_OUTFILE.to_string());
        job
    }

    pub fn with_outfile_names(mut self, names: Vec<String>) -> Self {
        self.outfile_names = names;
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Reject jobs no worker could run.
    pub fn validate(&self) -> Result<(), CoreError> {
        match self.cmd.first() {
            None => Err(CoreError::Validation(
                "job command must not be empty".into(),
            )),
            Some(program) if program.trim().is_empty() => Err(CoreError::Validation(
                "job program name must not be blank".into(),
            )),
            Some(_) => Ok(()),
        }
    }

    /// Reject result sets that cannot be archived: every output file needs a
    /// non-empty name that no other output file uses.
    pub fn validate_outfiles(&self) -> Result<(), CoreError> {
        let mut seen = HashSet::with_capacity(self.outfiles.len());
        for file in &self.outfiles {
            if file.name.is_empty() {
                return Err(CoreError::Validation(format!(
                    "job {} has an output file without a name",
                    self.id
                )));
            }
            if !seen.insert(file.name.as_str()) {
                return Err(CoreError::Validation(format!(
                    "job {} has duplicate output file {:?}",
                    self.id, file.name
                )));
            }
        }
        Ok(())
    }

    /// Approximate in-memory weight, used to bound the result cache.
    pub fn size_bytes(&self) -> usize {
        let strings = |v: &[String]| v.iter().map(String::len).sum::<usize>();
        JOB_OVERHEAD_BYTES
            + self.infile.len()
            + strings(&self.cmd)
            + strings(&self.outfile_names)
            + self
                .outfiles
                .iter()
                .map(|f| f.name.len() + f.data.len())
                .sum::<usize>()
            + self.stdout.len()
            + self.stderr.len()
            + self.note.len()
    }

    pub fn outfile(&self, name: &str) -> Option<&OutFile> {
        self.outfiles.iter().find(|f| f.name == name)
    }

    pub fn status_view(&self) -> JobStatusView {
        JobStatusView {
            id: self.id,
            status: self.status,
        }
    }
}

/// The minimal `{Id, Status}` rendering served by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobStatusView {
    pub id: JobId,
    pub status: JobStatus,
}

// ---------------------------------------------------------------------------
// Beat
// ---------------------------------------------------------------------------

/// Liveness signal a worker sends periodically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Beat {
    pub worker_id: WorkerId,
    pub busy: bool,
    #[serde(default)]
    pub current_job: Option<JobId>,
}

/// Serde helper for base64 encoding of byte vectors.
mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    const ENGINE: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&ENGINE.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ENGINE.decode(s.as_bytes()).map_err(serde::de::Error::custom)
    }
}
