//! Spoken (or logged) announcement of gesture events.

use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{AnnouncerConfig, AnnouncerKind};

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit { program: String, status: String },

    #[error("announcement queue is full, dropped {0:?}")]
    QueueFull(String),

    #[error("announcer has shut down")]
    Closed,
}

/// Best-effort announcement of a label. Callers log failures and move on.
pub trait Announcer: Send {
    fn announce(&self, text: &str) -> Result<(), AnnounceError>;
}

impl<A: Announcer + ?Sized> Announcer for Box<A> {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        (**self).announce(text)
    }
}

/// Writes announcements to the log only.
#[derive(Debug, Default)]
pub struct LogAnnouncer;

impl Announcer for LogAnnouncer {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        info!(text, "announce");
        Ok(())
    }
}

/// Runs an external text-to-speech program and waits for it to finish.
#[derive(Debug, Clone)]
pub struct CommandAnnouncer {
    program: String,
    args: Vec<String>,
    template: String,
}

impl CommandAnnouncer {
    pub fn new(program: impl Into<String>, args: Vec<String>, template: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args,
            template: template.into(),
        }
    }

    pub fn render(&self, label: &str) -> String {
        self.template.replace("{label}", label)
    }
}

impl Announcer for CommandAnnouncer {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        let spoken = self.render(text);
        debug!(program = %self.program, %spoken, "speaking");

        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&spoken)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|source| AnnounceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if status.success() {
            Ok(())
        } else {
            Err(AnnounceError::Exit {
                program: self.program.clone(),
                status: status.to_string(),
            })
        }
    }
}

/// Runs a blocking announcer on its own thread so frame capture never waits
/// on speech.
///
/// Announcements are delivered in the order they were queued. When the queue
/// is full the new announcement is dropped. [`BackgroundAnnouncer::cancel`]
/// discards everything still queued.
pub struct BackgroundAnnouncer {
    sender: Option<SyncSender<String>>,
    cancelled: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl BackgroundAnnouncer {
    pub fn spawn<A: Announcer + 'static>(inner: A, capacity: usize) -> std::io::Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<String>(capacity.max(1));
        let cancelled = Arc::new(AtomicBool::new(false));
        let worker_cancelled = cancelled.clone();

        let worker = std::thread::Builder::new()
            .name("announcer".into())
            .spawn(move || {
                for text in receiver {
                    if worker_cancelled.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Err(e) = inner.announce(&text) {
                        warn!(error = %e, "announcement failed");
                    }
                }
            })?;

        Ok(Self {
            sender: Some(sender),
            cancelled,
            worker: Some(worker),
        })
    }

    /// Drop queued announcements; the one currently playing finishes.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

impl Announcer for BackgroundAnnouncer {
    fn announce(&self, text: &str) -> Result<(), AnnounceError> {
        if self.cancelled.load(Ordering::SeqCst) {
            return Err(AnnounceError::Closed);
        }
        let sender = self.sender.as_ref().ok_or(AnnounceError::Closed)?;
        match sender.try_send(text.to_string()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(text)) => Err(AnnounceError::QueueFull(text)),
            Err(TrySendError::Disconnected(_)) => Err(AnnounceError::Closed),
        }
    }
}

impl Drop for BackgroundAnnouncer {
    fn drop(&mut self) {
        // closing the channel ends the worker loop once the queue drains
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("announcer thread panicked");
            }
        }
    }
}

/// Build the announcer described by the configuration.
pub fn from_config(config: &AnnouncerConfig) -> std::io::Result<Box<dyn Announcer>> {
    let inner: Box<dyn Announcer> = match config.kind {
        AnnouncerKind::Log => Box::new(LogAnnouncer),
        AnnouncerKind::Command => Box::new(CommandAnnouncer::new(
            config.program.clone(),
            config.args.clone(),
            config.template.clone(),
        )),
    };

    if config.background {
        Ok(Box::new(BackgroundAnnouncer::spawn(inner, config.queue_capacity)?))
    } else {
        Ok(inner)
    }
}
