//! Background execution of file jobs with progress reporting
//!
//! Front ends that must stay responsive (a GUI event loop, a spinner) hand a
//! [`Job`] to [`spawn`] and poll the returned [`JobHandle`] for
//! [`JobEvent`]s. Progress arrives as increasing percentages, followed by
//! exactly one `Finished` or `Failed` event.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::{ErrorCategory, ErrorKind, KeysealError, Result};
use crate::file_ops::{self, DecryptOptions, EncryptOptions, EncryptedArtifacts};

/// A file operation with all of its paths resolved.
#[derive(Debug, Clone)]
pub enum Job {
    Encrypt {
        input: PathBuf,
        sealed_out: PathBuf,
        key_out: PathBuf,
        armor: bool,
    },
    Decrypt {
        input: PathBuf,
        key: PathBuf,
        output: PathBuf,
        max_age: Option<Duration>,
    },
}

impl Job {
    /// Encrypt `input`, writing artifacts next to it per `options.naming`.
    pub fn encrypt(input: PathBuf, options: &EncryptOptions) -> Result<Job> {
        Ok(Job::Encrypt {
            sealed_out: options.naming.encrypted_path(&input)?,
            key_out: options.naming.key_path(&input)?,
            input,
            armor: options.armor,
        })
    }

    /// Decrypt `input` with `key`, writing plaintext per `options.naming`.
    pub fn decrypt(input: PathBuf, key: PathBuf, options: &DecryptOptions) -> Result<Job> {
        Ok(Job::Decrypt {
            output: options.naming.decrypted_path(&input)?,
            input,
            key,
            max_age: options.max_age,
        })
    }

    fn run(self, progress: &mut dyn FnMut(u8)) -> Result<Outcome> {
        match self {
            Job::Encrypt {
                input,
                sealed_out,
                key_out,
                armor,
            } => {
                file_ops::encrypt_with_progress(&input, &sealed_out, &key_out, armor, progress)?;
                Ok(Outcome::Encrypted(EncryptedArtifacts {
                    sealed: sealed_out,
                    key: key_out,
                }))
            }
            Job::Decrypt {
                input,
                key,
                output,
                max_age,
            } => {
                file_ops::decrypt_with_progress(&input, &key, &output, max_age, progress)?;
                Ok(Outcome::Decrypted(output))
            }
        }
    }
}

/// What a successful job produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Encrypted(EncryptedArtifacts),
    Decrypted(PathBuf),
}

#[derive(Debug)]
pub enum JobEvent {
    /// Percentage complete, 0-100.
    Progress(u8),
    Finished(Outcome),
    Failed(KeysealError),
}

/// Handle to a job running on its own thread.
pub struct JobHandle {
    events: Receiver<JobEvent>,
    thread: JoinHandle<()>,
}

impl JobHandle {
    /// Events emitted by the job, in order.
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.events
    }

    /// Block until the job ends, discarding progress events.
    pub fn wait(self) -> Result<Outcome> {
        let mut result = None;
        for event in self.events.iter() {
            match event {
                JobEvent::Progress(_) => {}
                JobEvent::Finished(outcome) => result = Some(Ok(outcome)),
                JobEvent::Failed(err) => result = Some(Err(err)),
            }
        }

        if self.thread.join().is_err() {
            return Err(worker_died());
        }
        result.unwrap_or_else(|| Err(worker_died()))
    }
}

/// Run `job` on a new thread.
pub fn spawn(job: Job) -> Result<JobHandle> {
    let (tx, rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("keyseal-worker".to_string())
        .spawn(move || run_job(job, tx))
        .map_err(|e| {
            KeysealError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to spawn worker thread",
                e,
            )
        })?;
    Ok(JobHandle { events: rx, thread })
}

fn run_job(job: Job, tx: Sender<JobEvent>) {
    // Send errors mean the handle was dropped; the job still runs to
    // completion so no half-written artifacts are left behind.
    let mut report = |percent: u8| {
        let _ = tx.send(JobEvent::Progress(percent));
    };
    let event = match job.run(&mut report) {
        Ok(outcome) => JobEvent::Finished(outcome),
        Err(err) => {
            debug!(error = %err, "job failed");
            JobEvent::Failed(err)
        }
    };
    let _ = tx.send(event);
}

fn worker_died() -> KeysealError {
    KeysealError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        "worker thread exited without reporting a result",
    )
}
