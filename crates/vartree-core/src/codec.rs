// vartree
// SPDX-License-Identifier: MPL-2.0

//! Wire codec & framing (spec.md §4.1). A 4-byte big-endian length prefix
//! followed by that many bytes of UTF-8 JSON. Reads exactly one frame at a
//! time; never partial-reads across a frame boundary.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use vartree_types::VartreeError;

/// Default oversize cap: 16 MiB (spec.md §4.1, §6).
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// Outcome of reading one frame.
pub enum Frame {
    Payload(Vec<u8>),
    /// The peer closed the stream cleanly between frames.
    Eof,
}

/// Reads exactly one length-prefixed frame from `reader`.
///
/// Returns `Ok(Frame::Eof)` only if the stream ended precisely at a frame
/// boundary (zero bytes of the length prefix were read). Any other
/// truncation, or a length exceeding `max_frame_bytes`, is a transport
/// error and the caller must close the connection (spec.md §4.1).
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_bytes: u32,
) -> Result<Frame, VartreeError> {
    let mut len_buf = [0u8; 4];
    match read_exact_or_eof(reader, &mut len_buf).await? {
        ReadOutcome::Eof => return Ok(Frame::Eof),
        ReadOutcome::Filled => {}
    }
    let len = u32::from_be_bytes(len_buf);
    if len > max_frame_bytes {
        return Err(VartreeError::Transport(format!(
            "frame length {len} exceeds cap {max_frame_bytes}"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| VartreeError::Transport(format!("truncated frame: {e}")))?;
    Ok(Frame::Payload(payload))
}

/// Writes one length-prefixed frame to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), VartreeError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| VartreeError::Transport("payload too large to frame".to_owned()))?;
    writer
        .write_all(&len.to_be_bytes())
        .await
        .map_err(|e| VartreeError::Transport(e.to_string()))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| VartreeError::Transport(e.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|e| VartreeError::Transport(e.to_string()))
}

enum ReadOutcome {
    Eof,
    Filled,
}

async fn read_exact_or_eof<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<ReadOutcome, VartreeError> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .await
            .map_err(|e| VartreeError::Transport(e.to_string()))?;
        if n == 0 {
            if filled == 0 {
                return Ok(ReadOutcome::Eof);
            }
            return Err(VartreeError::Transport(
                "connection closed mid-frame".to_owned(),
            ));
        }
        filled += n;
    }
    Ok(ReadOutcome::Filled)
}
