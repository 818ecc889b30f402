//! File transfer relay
//!
//! Receives a whole announced-length body from the sender, then forwards
//! header and body to each other session while holding that session's
//! outbound lock, so nothing else reaches the destination mid-file.

use std::sync::Arc;
use std::time::Duration;

use huddle_core::{LogEntry, RelayConfig};
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::frame::FrameReader;
use crate::protocol::FileHeader;
use crate::registry::{Session, SessionId};

/// Forwards file frames between sessions
pub struct FileRelay {
    broadcaster: Arc<Broadcaster>,
    max_file_size: u64,
    chunk_size: usize,
    chunk_timeout: Duration,
}

impl FileRelay {
    pub fn new(broadcaster: Arc<Broadcaster>, config: &RelayConfig) -> Self {
        Self {
            broadcaster,
            max_file_size: config.max_file_size,
            chunk_size: config.chunk_size,
            chunk_timeout: config.file_chunk_timeout(),
        }
    }

    /// Relay one file whose header was just read from `reader`.
    ///
    /// Returns the number of sessions that received the whole file. An
    /// oversized file is drained from `reader` and rejected with
    /// [`Error::FileTooLarge`]; the stream is left at the next frame.
    pub async fn relay<R>(
        &self,
        header: &FileHeader,
        reader: &mut FrameReader<R>,
        sender: SessionId,
    ) -> Result<usize>
    where
        R: AsyncRead + Unpin,
    {
        if header.size > self.max_file_size {
            reader.discard(header.size, self.chunk_size).await?;
            self.broadcaster.log().record(LogEntry::Rejected {
                nickname: header.sender.clone(),
                reason: format!("file {} too large ({} bytes)", header.filename, header.size),
            });
            return Err(Error::FileTooLarge {
                size: header.size,
                max: self.max_file_size,
            });
        }

        let body = reader.read_body(header.size, self.chunk_size).await?;

        let mut delivered = 0;
        for session in self.broadcaster.registry().snapshot().await {
            if session.id() == sender {
                continue;
            }
            match self.forward_to(&session, header, &body).await {
                Ok(()) => delivered += 1,
                Err(e) => self.broadcaster.drop_session(&session, &e).await,
            }
        }

        info!(
            filename = %header.filename,
            size = header.size,
            sender = %header.sender,
            recipients = delivered,
            "File relayed"
        );
        self.broadcaster.log().record(LogEntry::FileShared {
            sender: header.sender.clone(),
            filename: header.filename.clone(),
            size: header.size,
        });

        Ok(delivered)
    }

    async fn forward_to(&self, session: &Session, header: &FileHeader, body: &[u8]) -> Result<()> {
        let mut writer = session.outbound().lock().await;

        writer.write_all(header.as_bytes()).await?;
        for chunk in body.chunks(self.chunk_size) {
            tokio::time::timeout(self.chunk_timeout, writer.write_all(chunk))
                .await
                .map_err(|_| {
                    warn!(nickname = %session.nickname(), "File chunk send timed out");
                    Error::Timeout
                })??;
        }
        writer.flush().await?;

        Ok(())
    }
}
