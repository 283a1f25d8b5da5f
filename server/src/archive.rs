use async_trait::async_trait;
use dashmap::DashSet;
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tokio::{
    process::Command,
    sync::{mpsc, Mutex},
};

/// Browser window used for captures.
const VIEWPORT: (u32, u32) = (1920, 1080);

/// Upper bound for a single browser run; a hung page must not pin a worker.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(60);

// ── Types ──────────────────────────────────────────────────────────────────

/// A page to capture, saved as `<token>.png` and `<token>.pdf`.
#[derive(Debug, Clone)]
pub struct ArchiveTask {
    pub url: String,
    pub token: String,
}

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("failed to launch {bin}: {source}")]
    Launch {
        bin: String,
        #[source]
        source: io::Error,
    },

    #[error("{bin} exited with {status} while capturing {url}")]
    Browser {
        bin: String,
        url: String,
        status: std::process::ExitStatus,
    },

    #[error("capture of {0} timed out")]
    Timeout(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Something that can render a page to a screenshot and a PDF.
#[async_trait]
pub trait Capturer: Send + Sync + 'static {
    async fn capture(&self, url: &str, png: &Path, pdf: &Path) -> Result<(), ArchiveError>;
}

// ── Headless browser backend ───────────────────────────────────────────────

/// Captures pages with a Chromium-compatible browser in headless mode.
#[derive(Debug, Clone)]
pub struct ChromeCapturer {
    bin: String,
}

impl ChromeCapturer {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    async fn run(&self, url: &str, output_flag: String) -> Result<(), ArchiveError> {
        let mut command = Command::new(&self.bin);
        command
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--hide-scrollbars")
            .arg("--no-pdf-header-footer")
            .arg(format!("--window-size={},{}", VIEWPORT.0, VIEWPORT.1))
            .arg(output_flag)
            .arg(url)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let status = match tokio::time::timeout(CAPTURE_TIMEOUT, command.status()).await {
            Ok(status) => status.map_err(|source| ArchiveError::Launch {
                bin: self.bin.clone(),
                source,
            })?,
            Err(_) => return Err(ArchiveError::Timeout(url.to_owned())),
        };

        if !status.success() {
            return Err(ArchiveError::Browser {
                bin: self.bin.clone(),
                url: url.to_owned(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Capturer for ChromeCapturer {
    async fn capture(&self, url: &str, png: &Path, pdf: &Path) -> Result<(), ArchiveError> {
        self.run(url, format!("--screenshot={}", png.display()))
            .await?;
        self.run(url, format!("--print-to-pdf={}", pdf.display()))
            .await
    }
}

// ── Queue ──────────────────────────────────────────────────────────────────

/// Handle to the capture worker pool.
///
/// Cloning is cheap; every clone feeds the same workers. Tokens are tracked
/// while queued or in progress so a busy page is only captured once.
#[derive(Clone)]
pub struct ArchiveQueue {
    tx: mpsc::Sender<ArchiveTask>,
    pending: Arc<DashSet<String>>,
    folder: PathBuf,
}

impl ArchiveQueue {
    /// Spawn `workers` capture tasks writing into `folder`.
    /// Must be called from within a Tokio runtime.
    pub fn start(folder: PathBuf, workers: usize, capturer: Arc<dyn Capturer>) -> Self {
        let (tx, rx) = mpsc::channel(workers.max(1) * 16);
        let rx = Arc::new(Mutex::new(rx));
        let pending = Arc::new(DashSet::new());

        for id in 0..workers {
            tokio::spawn(worker(
                id,
                rx.clone(),
                capturer.clone(),
                pending.clone(),
                folder.clone(),
            ));
        }
        tracing::info!(
            "Started {} archive worker(s) writing to {}",
            workers,
            folder.display()
        );

        Self {
            tx,
            pending,
            folder,
        }
    }

    /// Queue a capture. Returns `false` if the token is already queued or
    /// being captured, or if the workers are gone.
    pub async fn enqueue(&self, task: ArchiveTask) -> bool {
        if !self.pending.insert(task.token.clone()) {
            return false;
        }
        let token = task.token.clone();
        if self.tx.send(task).await.is_err() {
            tracing::warn!("Archive workers stopped; dropping capture of '{}'", token);
            self.pending.remove(&token);
            return false;
        }
        true
    }

    pub fn is_pending(&self, token: &str) -> bool {
        self.pending.contains(token)
    }

    /// Path of an archive file such as `<token>.png`.
    pub fn file_path(&self, file_name: &str) -> PathBuf {
        self.folder.join(file_name)
    }

    /// Whether a screenshot for `token` already exists on disk.
    pub async fn has_capture(&self, token: &str) -> bool {
        tokio::fs::try_exists(self.file_path(&format!("{token}.png")))
            .await
            .unwrap_or(false)
    }
}

async fn worker(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<ArchiveTask>>>,
    capturer: Arc<dyn Capturer>,
    pending: Arc<DashSet<String>>,
    folder: PathBuf,
) {
    loop {
        // Hold the receiver only while waiting, not while capturing.
        let task = rx.lock().await.recv().await;
        let Some(task) = task else {
            break;
        };

        let png = folder.join(format!("{}.png", task.token));
        let pdf = folder.join(format!("{}.pdf", task.token));
        tracing::debug!("Worker {} capturing {} as '{}'", id, task.url, task.token);

        match capturer.capture(&task.url, &png, &pdf).await {
            Ok(()) => tracing::info!("Archived {} as '{}'", task.url, task.token),
            Err(e) => tracing::warn!("Failed to archive {}: {}", task.url, e),
        }
        pending.remove(&task.token);
    }
    tracing::debug!("Archive worker {} exiting", id);
}
