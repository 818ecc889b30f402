//! Fan-out of one payload to every other session
//!
//! Works from a registry snapshot, one destination at a time. A destination
//! whose send fails is unregistered and evicted, and the remaining sessions
//! get a synthesized leave notice; the broadcast itself carries on.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use huddle_core::{ChatLog, LogEntry};
use tracing::{debug, info, warn};

use crate::protocol::{Frame, Payload};
use crate::registry::{Session, SessionId, SessionRegistry};

/// Delivers payloads to registered sessions
pub struct Broadcaster {
    registry: Arc<SessionRegistry>,
    log: Arc<ChatLog>,
}

impl Broadcaster {
    pub fn new(registry: Arc<SessionRegistry>, log: Arc<ChatLog>) -> Self {
        Self { registry, log }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub fn log(&self) -> &ChatLog {
        &self.log
    }

    /// Send `payload` to every session except `exclude`.
    ///
    /// Returns how many sessions received it. Leave notices for sessions
    /// dropped along the way are delivered before returning.
    pub async fn deliver(&self, payload: Payload, exclude: Option<SessionId>) -> usize {
        let mut queue = VecDeque::from([(payload, exclude)]);
        let mut delivered = None;

        while let Some((payload, exclude)) = queue.pop_front() {
            let bytes = payload.render();
            let mut count = 0;

            for session in self.registry.snapshot().await {
                if Some(session.id()) == exclude {
                    continue;
                }
                match session.outbound().send(&bytes).await {
                    Ok(()) => count += 1,
                    Err(e) => {
                        if let Some(notice) = self.remove_failed(&session, &e).await {
                            queue.push_back((notice.to_payload(), None));
                        }
                    }
                }
            }

            // Only the first payload's reach is reported
            if delivered.is_none() {
                delivered = Some(count);
            }
        }

        delivered.unwrap_or(0)
    }

    /// Drop a session whose connection failed outside of [`deliver`](Self::deliver)
    /// and announce its departure.
    pub async fn drop_session(&self, session: &Session, error: &(dyn fmt::Display + Sync)) {
        if let Some(notice) = self.remove_failed(session, error).await {
            self.deliver(notice.to_payload(), None).await;
        }
    }

    /// Unregister and evict. Yields the leave notice if this call removed it.
    async fn remove_failed(
        &self,
        session: &Session,
        error: &(dyn fmt::Display + Sync),
    ) -> Option<Frame> {
        warn!(
            session = %session.id(),
            nickname = %session.nickname(),
            error = %error,
            "Send failed, dropping session"
        );

        let Some(removed) = self.registry.unregister(session.id()).await else {
            debug!(session = %session.id(), "Session already gone");
            return None;
        };
        removed.evict();

        let nickname = removed.nickname().to_string();
        info!(nickname = %nickname, "Peer dropped");
        self.log.record(LogEntry::Left {
            nickname: nickname.clone(),
        });

        Some(Frame::LeaveNotice { nickname })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Outbound;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn broadcaster() -> Broadcaster {
        Broadcaster::new(Arc::new(SessionRegistry::new()), Arc::new(ChatLog::disabled()))
    }

    async fn join(b: &Broadcaster, nickname: &str) -> (Session, DuplexStream) {
        let (server_side, client_side) = tokio::io::duplex(64 * 1024);
        let session = b.registry().register(Outbound::new(server_side), nickname).await;
        (session, client_side)
    }

    async fn read_text(stream: &mut DuplexStream) -> String {
        let mut buf = vec![0u8; 4096];
        let n = tokio::time::timeout(Duration::from_secs(1), stream.read(&mut buf))
            .await
            .expect("timed out waiting for data")
            .unwrap();
        String::from_utf8(buf[..n].to_vec()).unwrap()
    }

    async fn assert_silent(stream: &mut DuplexStream) {
        let mut buf = [0u8; 64];
        let result =
            tokio::time::timeout(Duration::from_millis(50), stream.read(&mut buf)).await;
        assert!(result.is_err(), "expected no data");
    }

    #[tokio::test]
    async fn test_deliver_skips_sender() {
        let b = broadcaster();
        let (alice, mut alice_rx) = join(&b, "alice").await;
        let (_bob, mut bob_rx) = join(&b, "bob").await;
        let (_carol, mut carol_rx) = join(&b, "carol").await;

        let delivered = b
            .deliver(Payload::Text("alice: hi".into()), Some(alice.id()))
            .await;

        assert_eq!(delivered, 2);
        assert!(read_text(&mut bob_rx).await.ends_with("] alice: hi"));
        assert!(read_text(&mut carol_rx).await.ends_with("] alice: hi"));
        assert_silent(&mut alice_rx).await;
    }

    #[tokio::test]
    async fn test_deliver_without_exclusion_reaches_everyone() {
        let b = broadcaster();
        let (_alice, mut alice_rx) = join(&b, "alice").await;
        let (_bob, mut bob_rx) = join(&b, "bob").await;

        let delivered = b.deliver(Payload::Binary(b"raw".to_vec()), None).await;

        assert_eq!(delivered, 2);
        assert_eq!(read_text(&mut alice_rx).await, "raw");
        assert_eq!(read_text(&mut bob_rx).await, "raw");
    }

    #[tokio::test]
    async fn test_failed_destination_is_dropped_and_announced() {
        let b = broadcaster();
        let (alice, mut alice_rx) = join(&b, "alice").await;
        let (bob, bob_rx) = join(&b, "bob").await;
        let (_carol, mut carol_rx) = join(&b, "carol").await;

        // Bob's peer is gone; writes to his stream fail
        drop(bob_rx);

        let delivered = b
            .deliver(Payload::Text("alice: hi".into()), Some(alice.id()))
            .await;

        assert_eq!(delivered, 1);
        assert!(!b.registry().contains(bob.id()).await);

        // Both writes are already buffered, so one read sees them in order
        let carol_saw = read_text(&mut carol_rx).await;
        let chat_at = carol_saw.find("] alice: hi").unwrap();
        let notice_at = carol_saw.find("] bob left the chat!").unwrap();
        assert!(chat_at < notice_at);
        assert!(read_text(&mut alice_rx).await.ends_with("] bob left the chat!"));

        tokio::time::timeout(Duration::from_secs(1), bob.evicted())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_drop_session_announces_once() {
        let b = broadcaster();
        let (bob, _bob_rx) = join(&b, "bob").await;
        let (_carol, mut carol_rx) = join(&b, "carol").await;

        b.drop_session(&bob, &"boom").await;
        b.drop_session(&bob, &"boom").await;

        assert!(read_text(&mut carol_rx).await.ends_with("] bob left the chat!"));
        assert_silent(&mut carol_rx).await;
    }

    #[tokio::test]
    async fn test_deliver_to_empty_registry() {
        let b = broadcaster();
        assert_eq!(b.deliver(Payload::Text("nobody".into()), None).await, 0);
    }
}
