//! Runs a single job as an external command.
//!
//! Each run gets a fresh scratch directory holding the job's input file.
//! The command runs with that directory as its working directory, and the
//! files named in `outfile_names` are read back from it afterwards. The
//! directory is removed when the run ends.

use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use chrono::Utc;
use simfarm_core::job::INFILE_NAME;
use simfarm_core::{Job, JobStatus, OutFile};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// Why a run did not complete.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("job has no command")]
    EmptyCommand,

    #[error("preparing scratch directory: {0}")]
    Scratch(#[source] io::Error),

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("waiting for command: {0}")]
    Wait(#[source] io::Error),

    #[error("timed out after {0}s")]
    TimedOut(u64),

    #[error("command exited with {0}")]
    ExitStatus(String),

    #[error("output file {0:?} must be a plain relative path")]
    UnsafeOutfile(String),

    #[error("missing output files: {}", .0.join(", "))]
    MissingOutfiles(Vec<String>),

    #[error("reading output file {name}: {source}")]
    ReadOutfile {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Executes jobs in scratch directories below `work_dir`.
#[derive(Debug, Clone, Default)]
pub struct JobRunner {
    work_dir: Option<PathBuf>,
}

impl JobRunner {
    /// `None` places scratch directories in the system temp directory.
    pub fn new(work_dir: Option<PathBuf>) -> Self {
        Self { work_dir }
    }

    /// Run `job` and return it in a final state.
    ///
    /// Never fails: any problem is recorded as `Failed` with the reason in
    /// `note`. Captured stdout and stderr are kept either way.
    pub async fn run(&self, mut job: Job) -> Job {
        job.outfiles.clear();
        match self.execute(&mut job).await {
            Ok(()) => {
                job.status = JobStatus::Complete;
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, error = %e, "Job failed");
                job.status = JobStatus::Failed;
                job.note = e.to_string();
            }
        }
        job.finished = Some(Utc::now());
        job
    }

    async fn execute(&self, job: &mut Job) -> Result<(), RunError> {
        let (program, args) = job.cmd.split_first().ok_or(RunError::EmptyCommand)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix("simfarm-job-");
        let scratch = match &self.work_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(RunError::Scratch)?;

        tokio::fs::write(scratch.path().join(INFILE_NAME), &job.infile)
            .await
            .map_err(RunError::Scratch)?;

        tracing::info!(
            job_id = %job.id,
            program = %program,
            dir = %scratch.path().display(),
            "Running job",
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| RunError::Spawn {
            program: program.clone(),
            source,
        })?;

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        // On timeout `child` is dropped, which kills the process.
        let status = if job.timeout_secs > 0 {
            tokio::time::timeout(Duration::from_secs(job.timeout_secs), child.wait())
                .await
                .map_err(|_| RunError::TimedOut(job.timeout_secs))?
        } else {
            child.wait().await
        }
        .map_err(RunError::Wait)?;

        job.stdout = String::from_utf8_lossy(&stdout_task.await.unwrap_or_default()).into_owned();
        job.stderr = String::from_utf8_lossy(&stderr_task.await.unwrap_or_default()).into_owned();

        if !status.success() {
            return Err(RunError::ExitStatus(status.to_string()));
        }

        job.outfiles = collect_outfiles(scratch.path(), &job.outfile_names).await?;
        Ok(())
    }
}

/// Read every named file from `dir`, in order.
async fn collect_outfiles(dir: &Path, names: &[String]) -> Result<Vec<OutFile>, RunError> {
    let mut outfiles = Vec::with_capacity(names.len());
    let mut missing = Vec::new();

    for name in names {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(RunError::UnsafeOutfile(name.clone()));
        }

        match tokio::fs::read(dir.join(relative)).await {
            Ok(data) => outfiles.push(OutFile::new(name.clone(), data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => missing.push(name.clone()),
            Err(source) => {
                return Err(RunError::ReadOutfile {
                    name: name.clone(),
                    source,
                })
            }
        }
    }

    if missing.is_empty() {
        Ok(outfiles)
    } else {
        Err(RunError::MissingOutfiles(missing))
    }
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
