// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-opener control surface over a shared [`MboxHost`].
//!
//! Every opener gets its own cancel token, so interrupting one reader does
//! not disturb the others. Frames themselves are not isolated: whichever
//! reader drains first receives the frame.

use std::sync::Arc;

use log::debug;
use nexus_hal::Mapper;

use crate::error::{MboxError, Result};
use crate::frame::{Frame, FRAME_LEN};
use crate::readiness::CancelToken;
use crate::transport::MboxHost;

/// Writes the one-byte attention signal. Payload: exactly one byte.
pub const OP_ATTENTION: u32 = 0;

/// One open handle on the mailbox.
pub struct MboxHandle<M: Mapper> {
    host: Arc<MboxHost<M>>,
    cancel: CancelToken,
}

impl<M: Mapper> MboxHandle<M> {
    pub fn open(host: &Arc<MboxHost<M>>) -> Self {
        Self { host: Arc::clone(host), cancel: host.cancel_token() }
    }

    /// Blocks for the next frame and copies it into the front of `buf`.
    ///
    /// Returns the number of bytes copied (always [`FRAME_LEN`]). After an
    /// interruption the handle is re-armed, so the next read blocks again.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let dst = buf
            .get_mut(..FRAME_LEN)
            .ok_or(MboxError::InvalidArgument("read buffer shorter than a frame"))?;
        match self.host.receive(&self.cancel) {
            Ok(frame) => {
                dst.copy_from_slice(frame.as_bytes());
                Ok(FRAME_LEN)
            }
            Err(MboxError::Interrupted) => {
                self.cancel.reset();
                Err(MboxError::Interrupted)
            }
            Err(err) => Err(err),
        }
    }

    /// Sends the first [`FRAME_LEN`] bytes of `buf`; the rest is ignored.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let src = buf
            .get(..FRAME_LEN)
            .ok_or(MboxError::InvalidArgument("write buffer shorter than a frame"))?;
        self.host.send(&Frame::try_from(src)?)?;
        Ok(FRAME_LEN)
    }

    /// True when a read would not block.
    pub fn poll(&self) -> Result<bool> {
        self.host.query_readiness()
    }

    /// Interrupts a read blocked on this handle.
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// Dispatches an operation by id. Replies are empty for every known op.
    pub fn control(&self, op: u32, payload: &[u8]) -> Result<Vec<u8>> {
        match op {
            OP_ATTENTION => {
                let [value] = payload else {
                    return Err(MboxError::InvalidArgument("attention takes one byte"));
                };
                self.host.signal_attention(*value)?;
                Ok(Vec::new())
            }
            other => {
                debug!("{}: unknown control op {other}", self.host.name());
                Err(MboxError::InvalidArgument("unknown control op"))
            }
        }
    }
}
