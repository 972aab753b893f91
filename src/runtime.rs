pub use tokio::{
    io::AsyncBufReadExt as BufReadExt,
    io::AsyncRead as Read,
    io::AsyncWrite as Write,
    io::AsyncWriteExt as WriteExt,
    io::BufReader,
    net::TcpStream,
    time::{error::Elapsed as TimeoutError, timeout},
};

use std::{future::Future, io::Error as IoError, io::ErrorKind, io::Result as IoResult, time::Duration};

/// Bounds an IO future by `dur`, turning the deadline into `ErrorKind::TimedOut`
pub async fn io_timeout<F, T>(dur: Duration, f: F) -> IoResult<T>
where
    F: Future<Output = IoResult<T>>,
{
    match timeout(dur, f).await {
        Ok(r) => r,
        Err(e) => Err(IoError::new(ErrorKind::TimedOut, e)),
    }
}

/// Like [`io_timeout`], but a `None` deadline waits forever
pub async fn maybe_timeout<F, T>(dur: Option<Duration>, f: F) -> IoResult<T>
where
    F: Future<Output = IoResult<T>>,
{
    match dur {
        Some(dur) => io_timeout(dur, f).await,
        None => f.await,
    }
}
