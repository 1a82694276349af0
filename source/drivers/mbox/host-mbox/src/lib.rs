// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-side byte mailbox transport over a 16-slot shared register window
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: Unit tests per module, `tests/transport.rs`, `tests/readiness.rs`, `tests/handle.rs`
//!
//! The local side receives fixed 14-byte frames written by a peer, sends
//! frames back through the same slots, and can raise a one-byte attention
//! signal. Readiness comes from a shared interrupt line when the platform
//! provides one and from a periodic poll otherwise.
//!
//! Platform services (register mapping, interrupt lines) are injected through
//! the `nexus-hal` traits. The `sim` feature adds an in-process device model
//! for host tests.

#![forbid(unsafe_code)]

mod config;
mod error;
mod frame;
mod handle;
mod readiness;
pub mod regs;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod transport;

pub use config::{MboxConfig, MAX_POLL_MS};
pub use error::{MboxError, Result};
pub use frame::{Frame, FRAME_LEN};
pub use handle::{MboxHandle, OP_ATTENTION};
pub use readiness::{CancelToken, ReadinessMode};
pub use transport::{MboxHost, MboxResources};
