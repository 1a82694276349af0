// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

use crate::error::MboxError;

/// Bytes carried by one mailbox transaction.
pub const FRAME_LEN: usize = 14;

/// One fixed-size mailbox payload. No length or type field; interpretation
/// is agreed between the two peers.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Frame([u8; FRAME_LEN]);

impl Frame {
    pub const fn new(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }

    pub fn into_bytes(self) -> [u8; FRAME_LEN] {
        self.0
    }
}

impl From<[u8; FRAME_LEN]> for Frame {
    fn from(bytes: [u8; FRAME_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Frame {
    type Error = MboxError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        <[u8; FRAME_LEN]>::try_from(bytes)
            .map(Self)
            .map_err(|_| MboxError::InvalidArgument("frame must be exactly 14 bytes"))
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::{Frame, FRAME_LEN};
    use crate::MboxError;

    #[test]
    fn try_from_requires_exact_length() {
        let bytes = [7u8; FRAME_LEN + 1];
        assert!(Frame::try_from(&bytes[..FRAME_LEN]).is_ok());
        assert!(matches!(
            Frame::try_from(&bytes[..]),
            Err(MboxError::InvalidArgument(_))
        ));
        assert!(Frame::try_from(&bytes[..3]).is_err());
    }

    #[test]
    fn debug_is_hex() {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[0] = 0xab;
        assert_eq!(format!("{:?}", Frame::new(bytes)), "Frame(ab00000000000000000000000000)");
    }
}
