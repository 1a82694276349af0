// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use nexus_hal::HalError;
use thiserror::Error;

/// Result alias used across the mailbox transport.
pub type Result<T> = core::result::Result<T, MboxError>;

/// Errors surfaced by the mailbox transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MboxError {
    /// A blocking receive was cancelled before a frame arrived; retry.
    #[error("receive interrupted")]
    Interrupted,
    /// The transport has been torn down.
    #[error("transport closed")]
    Closed,
    /// Caller supplied an unusable buffer, payload or operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Resource discovery did not report a register window.
    #[error("register window missing from platform resources")]
    MissingWindow,
    /// The reported register window cannot hold the register file.
    #[error("register window too small: {0:#x} bytes")]
    WindowTooSmall(u64),
    /// The mapping service rejected the register window.
    #[error("failed to map register window: {0}")]
    Map(#[source] HalError),
    /// The poll timer thread could not be started.
    #[error("failed to start poll timer: {0}")]
    Timer(String),
    /// Configuration could not be parsed or is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),
}
