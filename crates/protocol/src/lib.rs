//! Binary wire protocol shared by the storage server and the queued sender.
//!
//! # Wire format
//!
//! See [`wire`] module for the frame layout.

pub mod error;
pub mod response;
pub mod wire;

pub use error::{ProtocolError, is_disconnect_kind};
pub use response::ResponseCode;

/// Width of the size frame in bytes.
pub const SIZE_FIELD_LEN: usize = 5;

/// Width of the file name length frame in bytes.
pub const NAME_LEN_FIELD_LEN: usize = 2;

/// Largest value the 5-byte size frame can carry.
pub const MAX_SIZE_FIELD: u64 = (1 << (8 * SIZE_FIELD_LEN)) - 1;

/// Largest encoded file name, in bytes.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;

/// Upload size limit (1 TiB). Files must be strictly smaller.
pub const MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024 * 1024;

/// Size frame value that ends a session.
pub const SENTINEL_SIZE: u64 = 0;

/// Default chunk size for body transfer (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Returns `true` if a file of `size` bytes may be offered for upload.
///
/// Zero is reserved as the end-of-session sentinel, so empty files are
/// never representable.
pub fn is_transferable_size(size: u64) -> bool {
    size != SENTINEL_SIZE && size < MAX_FILE_SIZE
}
