//! Session registry
//!
//! The single shared table of connected sessions. Every mutation and every
//! snapshot goes through one mutex; no I/O ever happens while it is held.
//! Senders work from a [`SessionRegistry::snapshot`] instead.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, MutexGuard, Notify};

/// Identity of one connection, unique for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased outbound half of a connection
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Outbound half of a connection behind its own lock.
///
/// Holding the lock gives exclusive use of the destination stream, so a
/// multi-part write (file header plus body) cannot be split by another
/// sender.
#[derive(Clone)]
pub struct Outbound {
    writer: Arc<Mutex<BoxedWriter>>,
}

impl Outbound {
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Take exclusive use of the stream
    pub async fn lock(&self) -> MutexGuard<'_, BoxedWriter> {
        self.writer.lock().await
    }

    /// Write all of `bytes` and flush
    pub async fn send(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }

    /// Shut down the write direction
    pub async fn close(&self) {
        let mut writer = self.lock().await;
        let _ = writer.shutdown().await;
    }
}

/// A registered connection
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    nickname: Arc<str>,
    outbound: Outbound,
    evicted: Arc<Notify>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// Tell the owning handler its connection is unusable
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    /// Resolves once [`Session::evict`] has been called
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Session {}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("nickname", &self.nickname)
            .finish_non_exhaustive()
    }
}

/// Registered sessions in join order
pub struct SessionRegistry {
    sessions: Mutex<Vec<Session>>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a session and return it
    pub async fn register(&self, outbound: Outbound, nickname: impl Into<String>) -> Session {
        let session = Session {
            id: SessionId(self.next_id.fetch_add(1, Ordering::Relaxed)),
            nickname: Arc::from(nickname.into()),
            outbound,
            evicted: Arc::new(Notify::new()),
        };

        self.sessions.lock().await.push(session.clone());
        session
    }

    /// Remove a session. Returns it only if it was still registered, so
    /// exactly one caller ends up announcing the departure.
    pub async fn unregister(&self, id: SessionId) -> Option<Session> {
        let mut sessions = self.sessions.lock().await;
        let index = sessions.iter().position(|s| s.id == id)?;
        Some(sessions.remove(index))
    }

    /// Point-in-time copy for iterating without the lock
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.lock().await.clone()
    }

    pub async fn contains(&self, id: SessionId) -> bool {
        self.sessions.lock().await.iter().any(|s| s.id == id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Nicknames in join order
    pub async fn nicknames(&self) -> Vec<String> {
        self.sessions
            .lock()
            .await
            .iter()
            .map(|s| s.nickname().to_string())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
