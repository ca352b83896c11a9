//! Per-connection bidirectional relay.
//!
//! For one accepted client connection: dial the rule's destination, copy
//! bytes both ways until each side reaches end-of-stream, then tear both
//! sockets down together.
//!
//! Half-close semantics: end-of-stream on one direction shuts down the
//! write side of the opposite socket, so the surviving direction keeps
//! draining in-flight data. An error in either direction cancels the other
//! immediately.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Default timeout for dialing the destination.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(2);

/// Copy buffer size per direction.
const COPY_BUF_SIZE: usize = 8192;

/// Errors that end a single relay. Never escalated past the relay task.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The destination could not be dialed (refused, unreachable, timeout).
    #[error("dial {dest}: {source}")]
    Dial {
        dest: String,
        #[source]
        source: io::Error,
    },

    /// A mid-stream socket error in either direction.
    #[error("relay i/o: {0}")]
    Io(#[from] io::Error),
}

/// Bytes copied in each direction by a finished relay.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelayStats {
    pub client_to_dest: u64,
    pub dest_to_client: u64,
}

/// Dial `dest` and relay `client` against it until both directions finish.
///
/// Owns the client socket: it is closed on return in every case, dial
/// failure included. The client learns about an unreachable destination by
/// its connection closing promptly instead of hanging.
pub async fn run(
    mut client: TcpStream,
    dest: &str,
    dial_timeout: Duration,
) -> Result<RelayStats, RelayError> {
    let mut upstream = dial(dest, dial_timeout).await?;
    let stats = copy_bidirectional(&mut client, &mut upstream).await?;
    Ok(stats)
}

/// Connect to the destination, failing fast on timeout.
async fn dial(dest: &str, dial_timeout: Duration) -> Result<TcpStream, RelayError> {
    match timeout(dial_timeout, TcpStream::connect(dest)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(source)) => Err(RelayError::Dial {
            dest: dest.to_string(),
            source,
        }),
        Err(_) => Err(RelayError::Dial {
            dest: dest.to_string(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connect timeout"),
        }),
    }
}

/// Copy bytes both ways until each side reaches end-of-stream.
///
/// The first error cancels the surviving direction; both sockets are then
/// dropped exactly once by the caller.
async fn copy_bidirectional(
    client: &mut TcpStream,
    upstream: &mut TcpStream,
) -> io::Result<RelayStats> {
    let (mut client_read, mut client_write) = client.split();
    let (mut upstream_read, mut upstream_write) = upstream.split();

    let (client_to_dest, dest_to_client) = tokio::try_join!(
        copy_half(&mut client_read, &mut upstream_write),
        copy_half(&mut upstream_read, &mut client_write),
    )?;

    Ok(RelayStats {
        client_to_dest,
        dest_to_client,
    })
}

/// Copy one direction until end-of-stream, then half-close the sink.
async fn copy_half<R, W>(read: &mut R, write: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;
    loop {
        match read.read(&mut buf).await? {
            0 => break,
            n => {
                write.write_all(&buf[..n]).await?;
                total += n as u64;
            }
        }
    }
    write.shutdown().await?;
    Ok(total)
}
