//! Fixed-width frame codec.
//!
//! # Wire format
//!
//! ```text
//! PER FILE (Sender -> Server):
//!   [5 bytes BE: file_size]            0 = end of session, nothing follows
//!   <- [1 byte: UPLOAD_APPROVED | NOT_ENOUGH_FREE_SPACE]
//!   [2 bytes BE: name_len]             only after UPLOAD_APPROVED
//!   [name_len bytes: file name UTF-8]
//!   [file_size bytes: raw file data]
//!   <- [1 byte: FILE_SAVED | UNKNOWN_ERROR]
//! ```
//!
//! Frames carry no tag byte; their meaning comes from their position in
//! the exchange. The pure `encode_*`/`decode_*` functions never touch a
//! stream. The async helpers read exactly one frame using `read_exact`,
//! which keeps reading across short reads and fails with
//! [`std::io::ErrorKind::UnexpectedEof`] when the stream ends first.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::response::ResponseCode;
use crate::{MAX_NAME_LEN, MAX_SIZE_FIELD, NAME_LEN_FIELD_LEN, SENTINEL_SIZE, SIZE_FIELD_LEN};

/// Encodes a file size into the 5-byte size frame.
///
/// `size` must not exceed [`MAX_SIZE_FIELD`]; callers validate upstream.
pub fn encode_size(size: u64) -> [u8; SIZE_FIELD_LEN] {
    debug_assert!(size <= MAX_SIZE_FIELD, "size {size} overflows the size frame");
    let wide = size.to_be_bytes();
    let mut out = [0u8; SIZE_FIELD_LEN];
    out.copy_from_slice(&wide[8 - SIZE_FIELD_LEN..]);
    out
}

/// Decodes a 5-byte size frame.
pub fn decode_size(frame: &[u8; SIZE_FIELD_LEN]) -> u64 {
    let mut wide = [0u8; 8];
    wide[8 - SIZE_FIELD_LEN..].copy_from_slice(frame);
    u64::from_be_bytes(wide)
}

/// Encodes a file name length into the 2-byte frame.
pub fn encode_name_len(len: u16) -> [u8; NAME_LEN_FIELD_LEN] {
    len.to_be_bytes()
}

/// Decodes a 2-byte file name length frame.
pub fn decode_name_len(frame: &[u8; NAME_LEN_FIELD_LEN]) -> u16 {
    u16::from_be_bytes(*frame)
}

/// Writes a size frame. Does not flush.
pub async fn write_size<W: AsyncWrite + Unpin>(
    writer: &mut W,
    size: u64,
) -> Result<(), ProtocolError> {
    if size > MAX_SIZE_FIELD {
        return Err(ProtocolError::SizeOutOfRange(size));
    }
    writer.write_all(&encode_size(size)).await?;
    Ok(())
}

/// Reads a size frame. A return value of [`SENTINEL_SIZE`] ends the session.
pub async fn read_size<R: AsyncRead + Unpin>(reader: &mut R) -> Result<u64, ProtocolError> {
    let mut frame = [0u8; SIZE_FIELD_LEN];
    reader.read_exact(&mut frame).await?;
    Ok(decode_size(&frame))
}

/// Writes the end-of-session marker (size = 0). Does not flush.
pub async fn write_sentinel<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<(), ProtocolError> {
    write_size(writer, SENTINEL_SIZE).await
}

/// Writes the name length frame followed by the UTF-8 name. Does not flush.
pub async fn write_name<W: AsyncWrite + Unpin>(
    writer: &mut W,
    name: &str,
) -> Result<(), ProtocolError> {
    let bytes = name.as_bytes();
    if bytes.len() > MAX_NAME_LEN {
        return Err(ProtocolError::NameTooLong(bytes.len()));
    }

    writer.write_all(&encode_name_len(bytes.len() as u16)).await?;
    writer.write_all(bytes).await?;
    Ok(())
}

/// Reads the name length frame and the name itself.
///
/// `buf` is reused across calls to avoid a fresh allocation per file.
pub async fn read_name<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> Result<String, ProtocolError> {
    let mut frame = [0u8; NAME_LEN_FIELD_LEN];
    reader.read_exact(&mut frame).await?;
    let len = decode_name_len(&frame) as usize;

    buf.clear();
    buf.resize(len, 0);
    reader.read_exact(buf).await?;

    std::str::from_utf8(buf)
        .map(str::to_owned)
        .map_err(|e| ProtocolError::InvalidName(format!("not valid UTF-8: {e}")))
}

/// Writes a response byte and flushes.
pub async fn write_response<W: AsyncWrite + Unpin>(
    writer: &mut W,
    code: ResponseCode,
) -> Result<(), ProtocolError> {
    writer.write_u8(code.as_byte()).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads a response byte.
pub async fn read_response<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<ResponseCode, ProtocolError> {
    let byte = reader.read_u8().await?;
    ResponseCode::try_from(byte)
}
