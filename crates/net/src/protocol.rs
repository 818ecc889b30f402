//! Wire protocol types
//!
//! Two sub-protocols share each TCP stream:
//!
//! - Chat: UTF-8 text `<nickname>: <message>`, one socket read per frame.
//! - File: ASCII header `FILE:<filename>:<filesize>:<sender>`, optionally
//!   terminated by `\n`, followed by exactly `<filesize>` raw bytes.
//!
//! The server asks for a nickname with the bare control text `NICK`.

use chrono::Local;

use crate::error::{Error, Result};

/// Control signal sent by the server to request a nickname
pub const NICK: &str = "NICK";

/// Prefix identifying a file header frame
pub const FILE_TAG: &[u8] = b"FILE:";

/// Maximum bytes consumed by one frame read
pub const READ_BUFFER_SIZE: usize = 8192;

/// Parsed file transfer header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub filename: String,
    pub size: u64,
    pub sender: String,
    /// Header bytes exactly as received, forwarded verbatim
    raw: Vec<u8>,
}

impl FileHeader {
    /// Build a newline-terminated header for sending
    pub fn new(filename: &str, size: u64, sender: &str) -> Result<Self> {
        if filename.contains(':') || sender.contains(':') {
            return Err(Error::Protocol(
                "File name and sender must not contain ':'".into(),
            ));
        }
        let raw = format!("FILE:{}:{}:{}\n", filename, size, sender).into_bytes();
        Self::parse(&raw)
    }

    /// Parse header bytes (tag included, optional line terminator)
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| Error::Protocol("File header is not valid UTF-8".into()))?;
        let fields: Vec<&str> = text.trim_end_matches(['\r', '\n']).split(':').collect();

        let [tag, filename, size, sender] = fields.as_slice() else {
            return Err(Error::Protocol(format!(
                "File header has {} fields, expected 4",
                fields.len()
            )));
        };
        if *tag != "FILE" {
            return Err(Error::Protocol("File header missing FILE tag".into()));
        }
        let size = size
            .parse::<u64>()
            .map_err(|_| Error::Protocol(format!("Invalid file size: {:?}", size)))?;

        Ok(Self {
            filename: filename.to_string(),
            size,
            sender: sender.to_string(),
            raw: raw.to_vec(),
        })
    }

    /// Header bytes as they appear on the wire
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

/// One logical protocol unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Chat { text: String },
    FileHeader(FileHeader),
    JoinNotice { nickname: String },
    LeaveNotice { nickname: String },
}

impl Frame {
    /// Outbound form of this frame
    pub fn to_payload(&self) -> Payload {
        match self {
            Frame::Chat { text } => Payload::Text(text.clone()),
            Frame::FileHeader(header) => Payload::Binary(header.as_bytes().to_vec()),
            Frame::JoinNotice { nickname } => {
                Payload::Text(format!("{} joined the chat!", nickname))
            }
            Frame::LeaveNotice { nickname } => {
                Payload::Text(format!("{} left the chat!", nickname))
            }
        }
    }
}

/// Bytes headed for a destination session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Gets a `[HH:MM:SS] ` prefix on delivery
    Text(String),
    /// Sent verbatim
    Binary(Vec<u8>),
}

impl Payload {
    /// Render the wire bytes, stamping text with the current local time
    pub fn render(&self) -> Vec<u8> {
        match self {
            Payload::Text(text) => timestamped(text).into_bytes(),
            Payload::Binary(bytes) => bytes.clone(),
        }
    }
}

/// Prefix `text` with `[HH:MM:SS] `
pub fn timestamped(text: &str) -> String {
    format!("[{}] {}", Local::now().format("%H:%M:%S"), text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_parse() {
        let header = FileHeader::parse(b"FILE:report.pdf:5:alice").unwrap();
        assert_eq!(header.filename, "report.pdf");
        assert_eq!(header.size, 5);
        assert_eq!(header.sender, "alice");
        assert_eq!(header.as_bytes(), b"FILE:report.pdf:5:alice");
    }

    #[test]
    fn test_header_terminator_not_in_sender() {
        let header = FileHeader::parse(b"FILE:a.txt:12:bob\r\n").unwrap();
        assert_eq!(header.sender, "bob");
        assert_eq!(header.as_bytes(), b"FILE:a.txt:12:bob\r\n");
    }

    #[test]
    fn test_header_field_count_enforced() {
        assert!(FileHeader::parse(b"FILE:a:b.txt:12:bob").is_err());
        assert!(FileHeader::parse(b"FILE:a.txt:12").is_err());
    }

    #[test]
    fn test_header_size_must_be_numeric() {
        assert!(FileHeader::parse(b"FILE:a.txt:twelve:bob").is_err());
        assert!(FileHeader::parse(b"FILE:a.txt:-3:bob").is_err());
    }

    #[test]
    fn test_new_header_rejects_colons() {
        assert!(FileHeader::new("c:\\evil", 1, "bob").is_err());
        let header = FileHeader::new("notes.txt", 42, "bob").unwrap();
        assert_eq!(header.as_bytes(), b"FILE:notes.txt:42:bob\n");
    }

    #[test]
    fn test_notice_payloads() {
        let join = Frame::JoinNotice {
            nickname: "bob".into(),
        };
        assert_eq!(join.to_payload(), Payload::Text("bob joined the chat!".into()));

        let leave = Frame::LeaveNotice {
            nickname: "bob".into(),
        };
        assert_eq!(leave.to_payload(), Payload::Text("bob left the chat!".into()));
    }

    #[test]
    fn test_text_render_is_timestamped() {
        let rendered = Payload::Text("alice: hi".into()).render();
        let rendered = String::from_utf8(rendered).unwrap();

        // "[HH:MM:SS] alice: hi"
        assert_eq!(rendered.len(), "[00:00:00] alice: hi".len());
        assert!(rendered.starts_with('['));
        assert_eq!(&rendered[9..], "] alice: hi");
    }

    #[test]
    fn test_binary_render_is_verbatim() {
        let payload = Payload::Binary(vec![0, 159, 146, 150]);
        assert_eq!(payload.render(), vec![0, 159, 146, 150]);
    }
}
