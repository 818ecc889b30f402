//! Headless relay client
//!
//! Speaks the same wire protocol as the desktop client: answers the `NICK`
//! handshake, sends `<nickname>: <message>` chat lines and file transfers,
//! and surfaces everything the server relays as [`ClientEvent`]s.

use std::net::SocketAddr;
use std::time::Duration;

use huddle_core::{DEFAULT_MAX_FILE_SIZE, MAX_CHUNK_SIZE};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::frame::FrameReader;
use crate::protocol::{FileHeader, Frame, NICK};

/// Per-chunk timeout while sending a file body
const FILE_CHUNK_TIMEOUT: Duration = Duration::from_secs(10);

/// Something the server relayed to us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Chat line or join/leave notice, timestamp included
    Text(String),
    /// A complete file from another session
    File { header: FileHeader, data: Vec<u8> },
    /// A file announced larger than we accept; its bytes were skipped
    FileSkipped { header: FileHeader },
}

/// Client handle for one relay connection
pub struct Client {
    nickname: String,
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    max_file_size: u64,
}

impl Client {
    /// Connect and complete the nickname handshake
    pub async fn connect(addr: SocketAddr, nickname: &str) -> Result<Self> {
        info!(addr = %addr, nickname = %nickname, "Connecting to server");

        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = FrameReader::new(reader);

        match reader.read_raw(NICK.len()).await? {
            Some(bytes) if bytes == NICK.as_bytes() => {}
            Some(_) => return Err(Error::Handshake("expected NICK request".into())),
            None => return Err(Error::ConnectionClosed),
        }

        writer.write_all(format!("{}\n", nickname).as_bytes()).await?;
        writer.flush().await?;

        Ok(Self {
            nickname: nickname.to_string(),
            reader,
            writer,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        })
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    /// Largest inbound or outbound file this client handles
    pub fn set_max_file_size(&mut self, max: u64) {
        self.max_file_size = max;
    }

    /// Send a chat message as `<nickname>: <message>`
    pub async fn send_chat(&mut self, message: &str) -> Result<()> {
        let line = format!("{}: {}", self.nickname, message);
        if line.trim() == NICK {
            return Err(Error::Protocol("reserved control text".into()));
        }
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Send a file: header line, then the body in chunks
    pub async fn send_file(&mut self, filename: &str, data: &[u8]) -> Result<()> {
        let size = data.len() as u64;
        if size > self.max_file_size {
            return Err(Error::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        let header = FileHeader::new(filename, size, &self.nickname)?;
        self.writer.write_all(header.as_bytes()).await?;

        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            tokio::time::timeout(FILE_CHUNK_TIMEOUT, self.writer.write_all(chunk))
                .await
                .map_err(|_| Error::Timeout)??;
        }
        self.writer.flush().await?;

        debug!(filename = %filename, size = size, "File sent");
        Ok(())
    }

    /// Wait for the next relayed event. `None` once the server hangs up.
    pub async fn next_event(&mut self) -> Result<Option<ClientEvent>> {
        loop {
            let frame = match self.reader.read_frame().await {
                Ok(Some(frame)) => frame,
                Ok(None) => return Ok(None),
                Err(e) if e.is_protocol() => {
                    warn!(error = %e, "Dropping malformed frame");
                    continue;
                }
                Err(e) => return Err(e),
            };

            match frame {
                Frame::Chat { text } if text.trim() == NICK => continue,
                Frame::Chat { text } => return Ok(Some(ClientEvent::Text(text))),
                Frame::FileHeader(header) => {
                    if header.size > self.max_file_size {
                        self.reader.discard(header.size, MAX_CHUNK_SIZE).await?;
                        return Ok(Some(ClientEvent::FileSkipped { header }));
                    }
                    let data = self.reader.read_body(header.size, MAX_CHUNK_SIZE).await?;
                    return Ok(Some(ClientEvent::File { header, data }));
                }
                Frame::JoinNotice { .. } | Frame::LeaveNotice { .. } => continue,
            }
        }
    }

    /// Close the connection
    pub async fn disconnect(mut self) {
        let _ = self.writer.shutdown().await;
        debug!(nickname = %self.nickname, "Disconnected from server");
    }
}
