#![allow(missing_docs)]

use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};

use pin_project::pin_project;
use tokio::io::ReadBuf;

use crate::runtime::{Read, Write};

/// In-memory stand-in for a server connection.
///
/// Reads are served from a script of canned replies, writes are recorded.
#[pin_project]
#[derive(Clone, Debug, Default)]
pub struct MockStream {
    #[pin]
    replies: Cursor<Vec<u8>>,
    #[pin]
    written: Cursor<Vec<u8>>,
}

impl MockStream {
    pub fn new() -> MockStream {
        MockStream::default()
    }

    /// A stream that will answer with `replies`, then report end of file
    pub fn with_vec(replies: Vec<u8>) -> MockStream {
        MockStream {
            replies: Cursor::new(replies),
            written: Cursor::new(Vec::new()),
        }
    }

    /// Appends to the replies not read yet
    pub fn push_reply(&mut self, reply: &[u8]) {
        self.replies.get_mut().extend_from_slice(reply);
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.written.get_ref().clone()
    }

    /// Everything written so far, as text
    pub fn written_string(&self) -> String {
        String::from_utf8_lossy(self.written.get_ref()).into_owned()
    }
}

impl Read for MockStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().replies.poll_read(cx, buf)
    }
}

impl Write for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().written.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().written.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().written.poll_shutdown(cx)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use crate::async_test;
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};

    async_test! { test_records_writes, {
        let mut mock = MockStream::new();
        mock.write_all(b"NOOP\r\n").await.unwrap();
        mock.write_all(b"QUIT\r\n").await.unwrap();
        assert_eq!(mock.written(), b"NOOP\r\nQUIT\r\n".to_vec());
        assert_eq!(mock.written_string(), "NOOP\r\nQUIT\r\n");
    }}

    async_test! { test_replies_then_eof, {
        let mut mock = MockStream::with_vec(b"250 ok\r\n".to_vec());
        let mut replies = Vec::new();
        mock.read_to_end(&mut replies).await.unwrap();
        assert_eq!(replies, b"250 ok\r\n".to_vec());
        assert_eq!(mock.read(&mut [0; 8]).await.unwrap(), 0);
    }}

    async_test! { test_push_reply_keeps_unread, {
        let mut mock = BufReader::new(MockStream::with_vec(b"220 hi\r\n".to_vec()));
        let mut line = String::new();
        mock.read_line(&mut line).await.unwrap();
        assert_eq!(line, "220 hi\r\n");

        mock.get_mut().push_reply(b"250 ok\r\n");
        line.clear();
        mock.read_line(&mut line).await.unwrap();
        assert_eq!(line, "250 ok\r\n");
    }}
}
