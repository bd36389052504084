//! Checksummed string framing.
//!
//! Every character on the wire, control or payload, is one UTF-16 code
//! unit sent big-endian. A string travels as a frame:
//!
//! ```text
//! +-----+---------------------+-----+-----------------------+
//! | STX | payload code units  | ETX | LRC (i32 big-endian)  |
//! +-----+---------------------+-----+-----------------------+
//! ```
//!
//! The LRC is the XOR of all payload code units. The receiver answers every
//! frame with a single `ACK` or `NACK`; a `NACK` makes the sender retransmit
//! the whole frame until the attempt budget runs out.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Start of text.
pub const STX: u16 = 2;
/// End of text.
pub const ETX: u16 = 3;
/// End of transmission, a cooperative shutdown from the peer.
pub const EOT: u16 = 4;
/// Enquiry, opens a session.
pub const ENQ: u16 = 5;
/// Positive acknowledgment.
pub const ACK: u16 = 6;
/// Negative acknowledgment.
pub const NACK: u16 = 21;

/// Longest payload accepted, in code units.
pub const MAX_FRAME_LEN: usize = 4096;

/// Failure of a single read or write primitive.
#[derive(Debug, thiserror::Error)]
pub enum PrimitiveError {
    /// No data arrived within the read timeout.
    #[error("read timed out")]
    TimedOut,

    /// Any other I/O failure, including a closed connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of a framed exchange.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// No data arrived within the read timeout.
    #[error("read timed out")]
    TimedOut,

    /// Any other I/O failure.
    #[error("I/O error: {0}")]
    Io(std::io::Error),

    /// The attempt budget reached zero.
    #[error("out of attempts")]
    OutOfAttempts,

    /// The peer sent EOT and is ending the session.
    #[error("received EOT")]
    ReceivedEot,

    /// The payload ran past `MAX_FRAME_LEN` without an `ETX`.
    #[error("frame exceeds the maximum length")]
    TooLong,
}

impl From<PrimitiveError> for FrameError {
    fn from(e: PrimitiveError) -> Self {
        match e {
            PrimitiveError::TimedOut => FrameError::TimedOut,
            PrimitiveError::Io(e) => FrameError::Io(e),
        }
    }
}

// =============================================================================
// Primitives
// =============================================================================

fn classify(e: std::io::Error) -> PrimitiveError {
    match e.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => PrimitiveError::TimedOut,
        _ => PrimitiveError::Io(e),
    }
}

/// Read one control character.
pub async fn read_control_char<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<u16, PrimitiveError> {
    match tokio::time::timeout(timeout, reader.read_u16()).await {
        Ok(Ok(c)) => Ok(c),
        Ok(Err(e)) => Err(classify(e)),
        Err(_) => Err(PrimitiveError::TimedOut),
    }
}

/// Read one big-endian 32-bit integer.
pub async fn read_int32<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<i32, PrimitiveError> {
    match tokio::time::timeout(timeout, reader.read_i32()).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(classify(e)),
        Err(_) => Err(PrimitiveError::TimedOut),
    }
}

/// Write one control character and flush.
pub async fn write_control_char<W: AsyncWrite + Unpin>(
    writer: &mut W,
    c: u16,
) -> Result<(), PrimitiveError> {
    writer.write_u16(c).await.map_err(classify)?;
    writer.flush().await.map_err(classify)
}

/// Write one big-endian 32-bit integer and flush.
pub async fn write_int32<W: AsyncWrite + Unpin>(
    writer: &mut W,
    value: i32,
) -> Result<(), PrimitiveError> {
    writer.write_i32(value).await.map_err(classify)?;
    writer.flush().await.map_err(classify)
}

/// Longitudinal redundancy check: XOR of all UTF-16 code units.
pub fn lrc(payload: &str) -> i32 {
    lrc_units(payload.encode_utf16())
}

fn lrc_units(units: impl IntoIterator<Item = u16>) -> i32 {
    units.into_iter().fold(0i32, |acc, c| acc ^ i32::from(c))
}

/// Encode `payload` as a complete frame, checksum included.
pub fn encode_frame(payload: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() * 2 + 8);
    buf.extend_from_slice(&STX.to_be_bytes());
    for unit in payload.encode_utf16() {
        buf.extend_from_slice(&unit.to_be_bytes());
    }
    buf.extend_from_slice(&ETX.to_be_bytes());
    buf.extend_from_slice(&lrc(payload).to_be_bytes());
    buf
}

/// Decrement the budget; `true` once it is exhausted.
fn spend_attempt(attempts: &mut u32) -> bool {
    *attempts = attempts.saturating_sub(1);
    *attempts == 0
}

// =============================================================================
// Framed strings
// =============================================================================

/// Send `payload` as a frame and wait for the peer's acknowledgment.
///
/// Anything other than `ACK` costs one attempt and triggers a retransmit of
/// the entire frame.
pub async fn send_framed_string<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    payload: &str,
    attempts: &mut u32,
    timeout: Duration,
) -> Result<(), FrameError> {
    let frame = encode_frame(payload);
    loop {
        stream.write_all(&frame).await.map_err(classify)?;
        stream.flush().await.map_err(classify)?;

        match read_control_char(stream, timeout).await? {
            ACK => return Ok(()),
            EOT => return Err(FrameError::ReceivedEot),
            other => {
                debug!("Frame not acknowledged (got {}), {} attempts left", other, attempts.saturating_sub(1));
                if spend_attempt(attempts) {
                    return Err(FrameError::OutOfAttempts);
                }
            }
        }
    }
}

/// Receive one frame, verifying its checksum.
///
/// Stray characters before `STX` are answered with `NACK`, as are frames
/// whose checksum does not match; both cost one attempt. A payload longer
/// than `MAX_FRAME_LEN` is refused with `NACK` and fails the exchange.
pub async fn receive_framed_string<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut S,
    attempts: &mut u32,
    timeout: Duration,
) -> Result<String, FrameError> {
    loop {
        loop {
            match read_control_char(stream, timeout).await? {
                STX => break,
                EOT => return Err(FrameError::ReceivedEot),
                _ => {
                    write_control_char(stream, NACK).await?;
                    if spend_attempt(attempts) {
                        return Err(FrameError::OutOfAttempts);
                    }
                }
            }
        }

        let mut units = Vec::new();
        loop {
            match read_control_char(stream, timeout).await? {
                ETX => break,
                _ if units.len() == MAX_FRAME_LEN => {
                    write_control_char(stream, NACK).await?;
                    return Err(FrameError::TooLong);
                }
                c => units.push(c),
            }
        }

        let checksum = read_int32(stream, timeout).await?;
        if checksum == lrc_units(units.iter().copied()) {
            write_control_char(stream, ACK).await?;
            return Ok(String::from_utf16_lossy(&units));
        }

        debug!("Checksum mismatch, requesting retransmit");
        write_control_char(stream, NACK).await?;
        if spend_attempt(attempts) {
            return Err(FrameError::OutOfAttempts);
        }
    }
}
