//! FlashFT Client
//!
//! The sending side of a transfer. It writes the header, streams the file
//! verbatim and then shuts down its write half, which is how the receiver
//! learns the file is complete. There is no reply to wait for.
//!
//! ## Example
//!
//! ```no_run
//! use flashft::client;
//!
//! # async fn demo() -> Result<(), flashft::client::ClientError> {
//! let summary = client::send_file("127.0.0.1:7878", "reports/q3.csv").await?;
//! println!("sent {} bytes of {}", summary.payload_bytes, summary.header);
//! # Ok(())
//! # }
//! ```

use crate::protocol::{FileHeader, HeaderError};
use bytes::Bytes;
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};

/// Errors that can occur while sending a file.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// I/O error (network or local file)
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// The filename cannot be carried by the header
    #[error("invalid header: {0}")]
    Header(#[from] HeaderError),

    /// The source path has no final component to use as a name
    #[error("path has no file name: {0}")]
    NoFileName(String),
}

/// What was sent in one transfer.
#[derive(Debug, Clone)]
pub struct TransferSummary {
    /// The header that opened the transfer
    pub header: FileHeader,
    /// Payload bytes streamed after the header
    pub payload_bytes: u64,
}

impl TransferSummary {
    /// Total bytes put on the wire, header included.
    pub fn total_bytes(&self) -> u64 {
        self.header.encoded_len() as u64 + self.payload_bytes
    }
}

/// Sends the file at `path`, named after its final path component.
pub async fn send_file(
    addr: impl ToSocketAddrs,
    path: impl AsRef<Path>,
) -> Result<TransferSummary, ClientError> {
    let path = path.as_ref();
    let name = file_name_bytes(path)?;
    let header = FileHeader::new(name)?;

    let mut file = File::open(path).await?;
    info!(path = %path.display(), "Sending file");
    send_with_header(addr, header, &mut file).await
}

/// Sends everything `reader` yields under the filename `name`.
pub async fn send_reader<R>(
    addr: impl ToSocketAddrs,
    name: impl Into<Bytes>,
    reader: &mut R,
) -> Result<TransferSummary, ClientError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let header = FileHeader::new(name)?;
    send_with_header(addr, header, reader).await
}

async fn send_with_header<R>(
    addr: impl ToSocketAddrs,
    header: FileHeader,
    reader: &mut R,
) -> Result<TransferSummary, ClientError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut stream = TcpStream::connect(addr).await?;
    let peer = stream.peer_addr()?;
    debug!(server = %peer, file = %header, "Connected");

    stream.write_all(&header.encode()).await?;
    // io::copy keeps writing until the socket has accepted every byte
    let payload_bytes = tokio::io::copy(reader, &mut stream).await?;
    stream.shutdown().await?;

    info!(
        server = %peer,
        file = %header,
        bytes = payload_bytes,
        "File sent"
    );

    Ok(TransferSummary {
        header,
        payload_bytes,
    })
}

#[cfg(unix)]
fn file_name_bytes(path: &Path) -> Result<Bytes, ClientError> {
    use std::os::unix::ffi::OsStrExt;

    path.file_name()
        .map(|name| Bytes::copy_from_slice(name.as_bytes()))
        .ok_or_else(|| ClientError::NoFileName(path.display().to_string()))
}

#[cfg(not(unix))]
fn file_name_bytes(path: &Path) -> Result<Bytes, ClientError> {
    path.file_name()
        .map(|name| Bytes::from(name.to_string_lossy().into_owned()))
        .ok_or_else(|| ClientError::NoFileName(path.display().to_string()))
}
