use std::fmt;

use crate::error::ProtocolError;

/// One-byte outcome sent by the server after the admission check and
/// after the body transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResponseCode {
    UploadApproved = 0,
    NotEnoughFreeSpace = 1,
    FileSaved = 2,
    UnknownError = 3,
}

impl ResponseCode {
    /// Wire value of this code.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ResponseCode {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(Self::UploadApproved),
            1 => Ok(Self::NotEnoughFreeSpace),
            2 => Ok(Self::FileSaved),
            3 => Ok(Self::UnknownError),
            other => Err(ProtocolError::InvalidResponse(other)),
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UploadApproved => "UPLOAD_APPROVED",
            Self::NotEnoughFreeSpace => "NOT_ENOUGH_FREE_SPACE",
            Self::FileSaved => "FILE_SAVED",
            Self::UnknownError => "UNKNOWN_ERROR",
        };
        f.write_str(name)
    }
}
