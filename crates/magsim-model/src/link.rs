//! Byte-stream plumbing for the model link.
//!
//! The client does not care what carries its lines. Anything implementing
//! `AsyncRead + AsyncWrite + Unpin + Send` works:
//! - `tokio::net::TcpStream` (the real model process)
//! - `tokio::io::DuplexStream` (tests and the in-process fake model)
//!
//! A [`ModelConnector`] opens a fresh stream each time the client needs one,
//! which is what lets the client throw a suspect connection away after a
//! timeout and start over.

use async_trait::async_trait;
use magsim_core::error::{SimError, SimResult};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::TcpStream;

/// Trait alias for model stream I/O.
pub trait ModelStreamIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ModelStreamIO for T {}

/// Type-erased model stream.
pub type DynStream = Box<dyn ModelStreamIO>;

/// A connected, line-buffered link.
pub type Link = BufReader<DynStream>;

/// Opens streams to the model.
#[async_trait]
pub trait ModelConnector: Send + Sync {
    /// Open a new stream.
    async fn connect(&self) -> SimResult<DynStream>;

    /// Human-readable endpoint for logs.
    fn endpoint(&self) -> String;
}

/// Connects to the model over TCP.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
}

impl TcpConnector {
    /// Connector for `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            addr: format!("{host}:{port}"),
        }
    }
}

#[async_trait]
impl ModelConnector for TcpConnector {
    async fn connect(&self) -> SimResult<DynStream> {
        let stream = TcpStream::connect(&self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(Box::new(stream))
    }

    fn endpoint(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

/// Read one reply line, bounded by `max_bytes`.
///
/// EOF before any byte is a disconnect; EOF in the middle of a line is also
/// treated as a disconnect since the reply is incomplete.
pub async fn read_line_bounded<R>(reader: &mut R, max_bytes: usize) -> SimResult<String>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let n = (&mut *reader)
        .take(max_bytes as u64)
        .read_line(&mut line)
        .await?;

    if n == 0 {
        return Err(SimError::ModelDisconnected);
    }
    if !line.ends_with('\n') {
        if n >= max_bytes {
            return Err(SimError::ModelProtocol(format!(
                "reply exceeds {max_bytes} bytes"
            )));
        }
        return Err(SimError::ModelDisconnected);
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_read_line_with_duplex() {
        let (mut host, device) = tokio::io::duplex(64);
        let stream: DynStream = Box::new(device);
        let mut link: Link = BufReader::new(stream);

        host.write_all(b"{\"result\":[]}\n").await.unwrap();
        let line = read_line_bounded(&mut link, 1024).await.unwrap();
        assert_eq!(line, "{\"result\":[]}\n");
    }

    #[tokio::test]
    async fn test_eof_is_disconnect() {
        let (host, device) = tokio::io::duplex(64);
        drop(host);
        let stream: DynStream = Box::new(device);
        let mut link: Link = BufReader::new(stream);
        assert!(matches!(
            read_line_bounded(&mut link, 1024).await,
            Err(SimError::ModelDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_partial_line_then_eof_is_disconnect() {
        let (mut host, device) = tokio::io::duplex(64);
        host.write_all(b"{\"resu").await.unwrap();
        drop(host);
        let stream: DynStream = Box::new(device);
        let mut link: Link = BufReader::new(stream);
        assert!(matches!(
            read_line_bounded(&mut link, 1024).await,
            Err(SimError::ModelDisconnected)
        ));
    }

    #[tokio::test]
    async fn test_oversized_reply_rejected() {
        let (mut host, device) = tokio::io::duplex(256);
        host.write_all(&[b'x'; 100]).await.unwrap();
        let stream: DynStream = Box::new(device);
        let mut link: Link = BufReader::new(stream);
        assert!(matches!(
            read_line_bounded(&mut link, 32).await,
            Err(SimError::ModelProtocol(_))
        ));
    }

    #[test]
    fn test_tcp_endpoint() {
        assert_eq!(
            TcpConnector::new("127.0.0.1", 12312).endpoint(),
            "tcp://127.0.0.1:12312"
        );
    }
}
