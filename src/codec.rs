//! SMTP transparency for message data ([RFC 5321, section 4.5.2](https://tools.ietf.org/html/rfc5321#section-4.5.2))

use std::io;

use crate::runtime::{Write, WriteExt};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Position {
    LineStart,
    AfterCr,
    InLine,
}

/// Dot-stuffs message data that may arrive in arbitrary chunks
#[derive(Clone, Copy, Debug)]
pub struct ClientCodec {
    position: Position,
}

impl Default for ClientCodec {
    fn default() -> Self {
        ClientCodec {
            position: Position::LineStart,
        }
    }
}

impl ClientCodec {
    /// Creates a new client codec
    pub fn new() -> Self {
        ClientCodec::default()
    }

    /// Writes `frame`, doubling every dot that starts a line.
    pub async fn encode<W: Write + Unpin>(&mut self, frame: &[u8], mut buf: W) -> io::Result<()> {
        let mut start = 0;
        for (idx, byte) in frame.iter().enumerate() {
            if *byte == b'.' && self.position == Position::LineStart {
                buf.write_all(&frame[start..=idx]).await?;
                start = idx;
            }
            self.position = match (self.position, *byte) {
                (_, b'\r') => Position::AfterCr,
                (Position::AfterCr, b'\n') => Position::LineStart,
                _ => Position::InLine,
            };
        }
        buf.write_all(&frame[start..]).await
    }

    /// Writes the end-of-data marker, terminating the last line first if needed.
    pub async fn finish<W: Write + Unpin>(&mut self, mut buf: W) -> io::Result<()> {
        let marker: &[u8] = match self.position {
            Position::LineStart => b".\r\n",
            Position::AfterCr => b"\n.\r\n",
            Position::InLine => b"\r\n.\r\n",
        };
        self.position = Position::LineStart;
        buf.write_all(marker).await
    }
}
