//! # Shared Endpoint Plumbing
//!
//! The error type common to the PMU, PDC and splitter endpoints, and the
//! read loop both sides of a connection use: pull bytes from the socket
//! into a [`FrameDecoder`], drop undecodable frames with a log line, and
//! hand complete frames (with their verbatim wire bytes) to the caller.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::warn;

use crate::ieee_c37_118::codec::{Frame, FrameDecoder};
use crate::ieee_c37_118::common::FrameError;
use crate::ieee_c37_118::config::ConfigIndex;

/// Outbound frames queued per connection before a slow consumer is dropped.
pub(crate) const CLIENT_QUEUE_DEPTH: usize = 64;

/// Errors raised by the endpoint layer.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    #[error("connection lost")]
    ConnectionLost,

    #[error("timed out waiting for {0}")]
    Timeout(String),

    #[error("endpoint not ready: {0}")]
    NotReady(String),
}

pub type Result<T> = std::result::Result<T, EndpointError>;

/// Reads the next decodable frame from `stream`.
///
/// Codec errors are a side channel, not a reason to drop the connection:
/// the offending frame is consumed, a warning is logged and reading
/// continues. `Ok(None)` reports a clean close by the peer; only transport
/// errors surface as `Err`.
pub(crate) async fn read_frame<R>(
    stream: &mut R,
    decoder: &mut FrameDecoder,
    context: &mut ConfigIndex,
) -> std::io::Result<Option<(Frame, Bytes)>>
where
    R: AsyncRead + Unpin,
{
    loop {
        match decoder.next_frame_raw(context) {
            Ok(Some(pair)) => return Ok(Some(pair)),
            Ok(None) => {
                let n = stream.read_buf(decoder.buffer_mut()).await?;
                if n == 0 {
                    return Ok(None);
                }
            }
            Err(err) => {
                warn!("dropping undecodable frame: {err}");
            }
        }
    }
}
