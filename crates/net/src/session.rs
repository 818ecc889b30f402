//! Per-connection session handling
//!
//! Each connection moves through three states:
//!
//! - Handshake: send `NICK`, read one reply as the nickname. Failure or an
//!   empty reply closes the connection without registering.
//! - Active: announce the join to the sessions already present, register,
//!   then read and dispatch frames until the peer leaves.
//! - Closed: unregister, announce the departure, release the connection.

use std::fmt;
use std::sync::Arc;

use huddle_core::{ChatLog, LogEntry, RelayConfig};
use tokio::io::AsyncRead;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::file_relay::FileRelay;
use crate::frame::FrameReader;
use crate::protocol::{Frame, Payload, NICK};
use crate::registry::{Outbound, Session, SessionRegistry};

/// State shared by every session handler of one server
pub struct Relay {
    broadcaster: Arc<Broadcaster>,
    files: FileRelay,
    nickname_read_limit: usize,
}

impl Relay {
    pub fn new(config: &RelayConfig, log: Arc<ChatLog>) -> Self {
        let broadcaster = Arc::new(Broadcaster::new(Arc::new(SessionRegistry::new()), log));
        Self {
            files: FileRelay::new(broadcaster.clone(), config),
            broadcaster,
            nickname_read_limit: config.nickname_read_limit,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.broadcaster.registry()
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }
}

/// Why an active session ended
#[derive(Debug)]
enum Departure {
    PeerClosed,
    Failed(Error),
    Evicted,
    Shutdown,
}

impl fmt::Display for Departure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Departure::PeerClosed => write!(f, "peer closed"),
            Departure::Failed(e) => write!(f, "{}", e),
            Departure::Evicted => write!(f, "evicted after send failure"),
            Departure::Shutdown => write!(f, "server shutdown"),
        }
    }
}

/// Drives one connection from handshake to close
pub struct SessionHandler<R> {
    relay: Arc<Relay>,
    reader: FrameReader<R>,
    outbound: Outbound,
    peer: String,
}

impl<R: AsyncRead + Unpin> SessionHandler<R> {
    pub fn new(relay: Arc<Relay>, reader: R, outbound: Outbound, peer: impl fmt::Display) -> Self {
        Self {
            relay,
            reader: FrameReader::new(reader),
            outbound,
            peer: peer.to_string(),
        }
    }

    /// Run the session to completion
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        let handshake = tokio::select! {
            result = self.handshake() => result,
            _ = shutdown.recv() => Err(Error::Handshake("server shutting down".into())),
        };
        let nickname = match handshake {
            Ok(nickname) => nickname,
            Err(e) => {
                debug!(peer = %self.peer, error = %e, "Handshake failed");
                self.outbound.close().await;
                return;
            }
        };

        let session = self.join(nickname).await;
        let departure = self.serve(&session, &mut shutdown).await;
        self.leave(&session, departure).await;
    }

    async fn handshake(&mut self) -> Result<String> {
        self.outbound.send(NICK.as_bytes()).await?;

        let reply = self
            .reader
            .read_reply(self.relay.nickname_read_limit)
            .await?
            .ok_or_else(|| Error::Handshake("connection closed before nickname".into()))?;
        let nickname = String::from_utf8(reply)
            .map_err(|_| Error::Handshake("nickname is not valid UTF-8".into()))?;

        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(Error::Handshake("empty nickname".into()));
        }
        Ok(nickname.to_string())
    }

    /// Announce to everyone already present, then register
    async fn join(&mut self, nickname: String) -> Session {
        let notice = Frame::JoinNotice {
            nickname: nickname.clone(),
        };
        self.relay.broadcaster().deliver(notice.to_payload(), None).await;

        let session = self
            .relay
            .registry()
            .register(self.outbound.clone(), nickname)
            .await;

        info!(peer = %self.peer, session = %session.id(), nickname = %session.nickname(), "Peer joined");
        self.relay.broadcaster().log().record(LogEntry::Joined {
            nickname: session.nickname().to_string(),
        });
        session
    }

    /// Read and dispatch frames until the session ends.
    ///
    /// Eviction and shutdown only interrupt the wait for the next frame. A
    /// chat delivery or file relay already in progress runs to completion.
    async fn serve(
        &mut self,
        session: &Session,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Departure {
        loop {
            let next = tokio::select! {
                result = self.reader.read_frame() => result,
                _ = session.evicted() => return Departure::Evicted,
                _ = shutdown.recv() => return Departure::Shutdown,
            };

            let frame = match next {
                Ok(Some(frame)) => frame,
                Ok(None) => return Departure::PeerClosed,
                Err(e) if e.is_protocol() => {
                    self.reject(session, &e);
                    continue;
                }
                Err(e) => return Departure::Failed(e),
            };

            if let Err(e) = self.dispatch(session, frame).await {
                return Departure::Failed(e);
            }
        }
    }

    async fn dispatch(&mut self, session: &Session, frame: Frame) -> Result<()> {
        match frame {
            Frame::Chat { text } => {
                if text.trim() == NICK {
                    self.reject(session, &Error::Protocol("reserved control text".into()));
                    return Ok(());
                }
                self.relay
                    .broadcaster()
                    .deliver(Payload::Text(text.clone()), Some(session.id()))
                    .await;
                self.relay.broadcaster().log().record(LogEntry::Chat { text });
            }
            Frame::FileHeader(header) => {
                match self.relay.files.relay(&header, &mut self.reader, session.id()).await {
                    Ok(_) => {}
                    Err(e) if e.is_protocol() => self.reject(session, &e),
                    Err(e) => return Err(e),
                }
            }
            Frame::JoinNotice { .. } | Frame::LeaveNotice { .. } => {
                debug!(session = %session.id(), "Ignoring server-only frame");
            }
        }
        Ok(())
    }

    fn reject(&self, session: &Session, error: &Error) {
        warn!(session = %session.id(), nickname = %session.nickname(), error = %error, "Frame rejected");
        self.relay.broadcaster().log().record(LogEntry::Rejected {
            nickname: session.nickname().to_string(),
            reason: error.to_string(),
        });
    }

    async fn leave(&mut self, session: &Session, departure: Departure) {
        if let Some(removed) = self.relay.registry().unregister(session.id()).await {
            let notice = Frame::LeaveNotice {
                nickname: removed.nickname().to_string(),
            };
            self.relay.broadcaster().deliver(notice.to_payload(), None).await;

            info!(session = %session.id(), nickname = %session.nickname(), reason = %departure, "Peer disconnected");
            self.relay.broadcaster().log().record(LogEntry::Left {
                nickname: removed.nickname().to_string(),
            });
        } else {
            debug!(session = %session.id(), reason = %departure, "Session already removed");
        }

        self.outbound.close().await;
    }
}
