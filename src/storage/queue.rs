//! Named FIFO work queues.
//!
//! Messages are opaque strings (JSON work items in practice). `peek` never removes anything;
//! `receive` hands out the oldest message and `complete` acknowledges it.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::StorageError;

/// A message held by a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    /// Identifier used to acknowledge the message.
    pub id: String,
    /// Raw message body.
    pub body: String,
}

/// FIFO queue contract used by the admission gate and the workers.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Create the named queue when it does not exist yet.
    async fn create_if_missing(&self, queue: &str) -> Result<(), StorageError>;

    /// Return up to `limit` of the oldest messages without removing them.
    async fn peek(&self, queue: &str, limit: usize) -> Result<Vec<QueueMessage>, StorageError>;

    /// Append a message body to the queue.
    async fn enqueue(&self, queue: &str, body: &str) -> Result<(), StorageError>;

    /// Take the oldest message, if any. The message stays invisible to other receivers until
    /// it is completed or its lease expires.
    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>, StorageError>;

    /// Acknowledge a received message, removing it permanently.
    async fn complete(&self, queue: &str, message: &QueueMessage) -> Result<(), StorageError>;
}

/// Queue storing one file per message in a directory per queue.
///
/// File names start with a zero-padded nanosecond timestamp and a per-process sequence number,
/// so lexical order is arrival order.
/// Received messages are renamed with a `.lease` suffix until completed. A lease older than the
/// visibility timeout is renamed back, so a crashed worker's message is delivered again.
pub struct FilesystemQueue {
    root: PathBuf,
    sequence: AtomicU64,
    receive_lock: Mutex<()>,
    visibility_timeout: Duration,
}

const MESSAGE_EXTENSION: &str = "json";
const LEASE_EXTENSION: &str = "lease";
/// Lease duration used unless overridden.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

impl FilesystemQueue {
    /// Create a queue set rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: AtomicU64::new(0),
            receive_lock: Mutex::new(()),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
        }
    }

    /// Override how long a received message stays leased.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn queue_dir(&self, queue: &str) -> PathBuf {
        self.root.join(queue)
    }

    async fn list(&self, queue: &str, extension: &str) -> Result<Vec<PathBuf>, StorageError> {
        let dir = self.queue_dir(queue);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(StorageError::io(dir, source)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|source| StorageError::io(&dir, source))?
        {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(extension) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    async fn pending_files(&self, queue: &str) -> Result<Vec<PathBuf>, StorageError> {
        self.reclaim_expired(queue).await?;
        self.list(queue, MESSAGE_EXTENSION).await
    }

    /// Make messages whose lease outlived the visibility timeout receivable again.
    async fn reclaim_expired(&self, queue: &str) -> Result<(), StorageError> {
        for leased in self.list(queue, LEASE_EXTENSION).await? {
            let age = match tokio::fs::metadata(&leased).await {
                Ok(metadata) => metadata
                    .modified()
                    .ok()
                    .and_then(|modified| modified.elapsed().ok())
                    .unwrap_or_default(),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(StorageError::io(leased, source)),
            };
            if age < self.visibility_timeout {
                continue;
            }
            let pending = leased.with_extension(MESSAGE_EXTENSION);
            match tokio::fs::rename(&leased, &pending).await {
                Ok(()) => {
                    tracing::warn!(queue, path = %pending.display(), "Lease expired; message visible again");
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StorageError::io(leased, source)),
            }
        }
        Ok(())
    }

    async fn read_message(path: &PathBuf) -> Result<QueueMessage, StorageError> {
        let body = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| StorageError::io(path, source))?;
        let id = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(QueueMessage { id, body })
    }
}

#[async_trait]
impl WorkQueue for FilesystemQueue {
    async fn create_if_missing(&self, queue: &str) -> Result<(), StorageError> {
        let dir = self.queue_dir(queue);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StorageError::io(dir, source))
    }

    async fn peek(&self, queue: &str, limit: usize) -> Result<Vec<QueueMessage>, StorageError> {
        let mut messages = Vec::new();
        for path in self.pending_files(queue).await?.into_iter().take(limit) {
            match Self::read_message(&path).await {
                Ok(message) => messages.push(message),
                // Received by another worker between listing and reading.
                Err(StorageError::Io { source, .. })
                    if source.kind() == std::io::ErrorKind::NotFound => {}
                Err(error) => return Err(error),
            }
        }
        Ok(messages)
    }

    async fn enqueue(&self, queue: &str, body: &str) -> Result<(), StorageError> {
        self.create_if_missing(queue).await?;
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or_default();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let path = self.queue_dir(queue).join(format!(
            "{nanos:020}-{sequence:010}-{}.{MESSAGE_EXTENSION}",
            Uuid::new_v4()
        ));
        tokio::fs::write(&path, body)
            .await
            .map_err(|source| StorageError::io(&path, source))?;
        tracing::debug!(queue, path = %path.display(), "Enqueued message");
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>, StorageError> {
        let _guard = self.receive_lock.lock().await;
        let Some(path) = self.pending_files(queue).await?.into_iter().next() else {
            return Ok(None);
        };
        let message = Self::read_message(&path).await?;
        let leased = path.with_extension(LEASE_EXTENSION);
        tokio::fs::rename(&path, &leased)
            .await
            .map_err(|source| StorageError::io(&path, source))?;
        // Rewriting stamps the lease start into the modification time.
        tokio::fs::write(&leased, &message.body)
            .await
            .map_err(|source| StorageError::io(&leased, source))?;
        Ok(Some(message))
    }

    async fn complete(&self, queue: &str, message: &QueueMessage) -> Result<(), StorageError> {
        let leased = self
            .queue_dir(queue)
            .join(format!("{}.{LEASE_EXTENSION}", message.id));
        match tokio::fs::remove_file(&leased).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::io(leased, source)),
        }
    }
}

#[derive(Default)]
struct MemoryQueueState {
    queues: BTreeMap<String, VecDeque<QueueMessage>>,
    leased: BTreeMap<String, QueueMessage>,
}

/// In-memory queue set.
#[derive(Default)]
pub struct MemoryQueue {
    state: Mutex<MemoryQueueState>,
}

impl MemoryQueue {
    /// Create an empty queue set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in a queue.
    pub async fn len(&self, queue: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Whether the queue has no waiting messages.
    pub async fn is_empty(&self, queue: &str) -> bool {
        self.len(queue).await == 0
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn create_if_missing(&self, queue: &str) -> Result<(), StorageError> {
        self.state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default();
        Ok(())
    }

    async fn peek(&self, queue: &str, limit: usize) -> Result<Vec<QueueMessage>, StorageError> {
        let state = self.state.lock().await;
        Ok(state
            .queues
            .get(queue)
            .map(|messages| messages.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn enqueue(&self, queue: &str, body: &str) -> Result<(), StorageError> {
        let message = QueueMessage {
            id: Uuid::new_v4().to_string(),
            body: body.to_string(),
        };
        self.state
            .lock()
            .await
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(message);
        Ok(())
    }

    async fn receive(&self, queue: &str) -> Result<Option<QueueMessage>, StorageError> {
        let mut state = self.state.lock().await;
        let message = state
            .queues
            .get_mut(queue)
            .and_then(VecDeque::pop_front);
        if let Some(message) = &message {
            state.leased.insert(message.id.clone(), message.clone());
        }
        Ok(message)
    }

    async fn complete(&self, _queue: &str, message: &QueueMessage) -> Result<(), StorageError> {
        self.state.lock().await.leased.remove(&message.id);
        Ok(())
    }
}
