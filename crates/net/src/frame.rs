//! Frame classification and reading
//!
//! Chat frames have no length prefix: one read is one frame. A file header
//! is the first read that starts with `FILE:`, cut at the first `\n` when
//! there is one. Bytes past that cut belong to the file body and are kept
//! for the next body read, so a sender that writes header and body back to
//! back stays in sync.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};
use crate::protocol::{FileHeader, Frame, FILE_TAG, READ_BUFFER_SIZE};

/// Classify the raw bytes of one frame
pub fn classify(bytes: &[u8]) -> Result<Frame> {
    if bytes.starts_with(FILE_TAG) {
        return FileHeader::parse(bytes).map(Frame::FileHeader);
    }

    let text = std::str::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("Chat payload is not valid UTF-8: {}", e)))?;
    Ok(Frame::Chat {
        text: text.to_string(),
    })
}

/// Length up to and including the first `\n`, or all of `bytes`
fn line_len(bytes: &[u8]) -> usize {
    match bytes.iter().position(|&b| b == b'\n') {
        Some(pos) => pos + 1,
        None => bytes.len(),
    }
}

fn map_eof(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::Io(e)
    }
}

/// Reads frames and fixed-length bodies from one inbound stream
pub struct FrameReader<R> {
    reader: R,
    /// Bytes already read from the stream but not yet consumed
    pending: Vec<u8>,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            buf: vec![0u8; READ_BUFFER_SIZE],
        }
    }

    /// One read of at most `limit` bytes, served from leftovers first.
    /// `None` means the peer closed the stream.
    pub async fn read_raw(&mut self, limit: usize) -> Result<Option<Vec<u8>>> {
        if !self.pending.is_empty() {
            let take = limit.min(self.pending.len());
            return Ok(Some(self.pending.drain(..take).collect()));
        }

        let limit = limit.min(self.buf.len());
        let n = self.reader.read(&mut self.buf[..limit]).await.map_err(map_eof)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }

    /// Read and classify the next frame. `Ok(None)` on peer close;
    /// `Err` with [`Error::is_protocol`] when only this frame is bad.
    ///
    /// Cancel safe: dropping the future before it resolves consumes nothing.
    pub async fn read_frame(&mut self) -> Result<Option<Frame>> {
        let Some(mut bytes) = self.read_raw(READ_BUFFER_SIZE).await? else {
            return Ok(None);
        };

        if bytes.starts_with(FILE_TAG) {
            let rest = bytes.split_off(line_len(&bytes));
            self.unread(rest);
        }

        classify(&bytes).map(Some)
    }

    /// One read cut at the first `\n` (the nickname reply). Anything after it
    /// is kept for the next read.
    pub async fn read_reply(&mut self, limit: usize) -> Result<Option<Vec<u8>>> {
        let Some(mut bytes) = self.read_raw(limit).await? else {
            return Ok(None);
        };
        let rest = bytes.split_off(line_len(&bytes));
        self.unread(rest);
        Ok(Some(bytes))
    }

    /// Put bytes back in front of anything still pending
    fn unread(&mut self, mut bytes: Vec<u8>) {
        if bytes.is_empty() {
            return;
        }
        bytes.append(&mut self.pending);
        self.pending = bytes;
    }

    /// Up to `max` body bytes. A closed stream is an error here.
    pub async fn read_chunk(&mut self, max: usize) -> Result<Vec<u8>> {
        match self.read_raw(max).await? {
            Some(chunk) => Ok(chunk),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Exactly `size` bytes, read `chunk_size` at a time
    pub async fn read_body(&mut self, size: u64, chunk_size: usize) -> Result<Vec<u8>> {
        let mut body = Vec::with_capacity(size as usize);
        let mut remaining = size;
        while remaining > 0 {
            let want = chunk_size.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let chunk = self.read_chunk(want).await?;
            remaining -= chunk.len() as u64;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }

    /// Consume and drop exactly `size` bytes
    pub async fn discard(&mut self, size: u64, chunk_size: usize) -> Result<()> {
        let mut remaining = size;
        while remaining > 0 {
            let want = chunk_size.min(usize::try_from(remaining).unwrap_or(usize::MAX));
            let chunk = self.read_chunk(want).await?;
            remaining -= chunk.len() as u64;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn test_classify_chat() {
        let frame = classify(b"alice: hi").unwrap();
        assert_eq!(
            frame,
            Frame::Chat {
                text: "alice: hi".into()
            }
        );
    }

    #[test]
    fn test_classify_file_header() {
        match classify(b"FILE:report.pdf:5:alice").unwrap() {
            Frame::FileHeader(h) => {
                assert_eq!(h.filename, "report.pdf");
                assert_eq!(h.size, 5);
            }
            other => panic!("Expected file header, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_invalid_utf8_is_protocol_error() {
        let err = classify(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert!(err.is_protocol());
    }

    #[tokio::test]
    async fn test_header_and_body_in_one_read() {
        let mut reader = FrameReader::new(Cursor::new(b"FILE:a.txt:5:bob\nhello".to_vec()));

        let header = match reader.read_frame().await.unwrap() {
            Some(Frame::FileHeader(h)) => h,
            other => panic!("Expected file header, got {:?}", other),
        };
        assert_eq!(header.as_bytes(), b"FILE:a.txt:5:bob\n");

        let body = reader.read_body(header.size, 8192).await.unwrap();
        assert_eq!(body, b"hello");
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_body_chunks_are_bounded() {
        let mut data = b"FILE:big.bin:20000:bob\n".to_vec();
        data.extend(std::iter::repeat(7u8).take(20000));
        let mut reader = FrameReader::new(Cursor::new(data));

        reader.read_frame().await.unwrap();
        let first = reader.read_chunk(8192).await.unwrap();
        assert!(first.len() <= 8192);

        let rest = reader.read_body(20000 - first.len() as u64, 8192).await.unwrap();
        assert_eq!(first.len() + rest.len(), 20000);
    }

    #[tokio::test]
    async fn test_reply_keeps_bytes_after_newline() {
        let mut reader = FrameReader::new(Cursor::new(b"alice\nalice: hi".to_vec()));

        assert_eq!(reader.read_reply(1024).await.unwrap().unwrap(), b"alice\n");
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::Chat {
                text: "alice: hi".into()
            })
        );
    }

    #[tokio::test]
    async fn test_short_body_is_connection_error() {
        let mut reader = FrameReader::new(Cursor::new(b"FILE:a.txt:10:bob\nhel".to_vec()));
        reader.read_frame().await.unwrap();

        let err = reader.read_body(10, 8192).await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_discard_keeps_stream_aligned() {
        let (mut tx, rx) = tokio::io::duplex(64 * 1024);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"FILE:huge.iso:6:bob\nabc").await.unwrap();
        let header = match reader.read_frame().await.unwrap() {
            Some(Frame::FileHeader(h)) => h,
            other => panic!("Expected file header, got {:?}", other),
        };

        tx.write_all(b"def").await.unwrap();
        reader.discard(header.size, 8192).await.unwrap();

        tx.write_all(b"bob: still here").await.unwrap();
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::Chat {
                text: "bob: still here".into()
            })
        );
    }

    #[tokio::test]
    async fn test_one_read_is_one_chat_frame() {
        let (mut tx, rx) = tokio::io::duplex(1024);
        let mut reader = FrameReader::new(rx);

        tx.write_all(b"alice: one").await.unwrap();
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::Chat {
                text: "alice: one".into()
            })
        );

        tx.write_all(b"alice: two").await.unwrap();
        assert_eq!(
            reader.read_frame().await.unwrap(),
            Some(Frame::Chat {
                text: "alice: two".into()
            })
        );

        drop(tx);
        assert!(reader.read_frame().await.unwrap().is_none());
    }
}
