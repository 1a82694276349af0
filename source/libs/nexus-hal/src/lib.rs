// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Hardware access traits shared by user drivers (register windows, mapping, shared IRQs)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 3 unit tests, `tests/bus.rs`
//!
//! PUBLIC API:
//!   - Bus: byte/word access to a mapped register window
//!   - MmioWindow: volatile `Bus` over a mapped pointer
//!   - Mapper: maps a physical `Region` into a `Bus` window
//!   - IrqController / IrqHandler / IrqReturn: shared-line interrupt registration

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::sync::Arc;
use core::ptr::NonNull;

use thiserror::Error;

/// Errors reported by platform collaborators.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HalError {
    /// The physical range could not be mapped.
    #[error("unable to map region {base:#x}+{size:#x}")]
    MapFailed {
        /// Physical base of the rejected region.
        base: u64,
        /// Size of the rejected region.
        size: u64,
    },
    /// No interrupt line exists for the device.
    #[error("interrupt line unavailable")]
    IrqUnavailable,
    /// The line exists but a handler could not be installed.
    #[error("interrupt line {0} busy")]
    IrqBusy(u32),
}

/// Basic bus access trait shared by user drivers.
///
/// Every call is one ordered access to the device. Implementations must not
/// buffer, reorder or coalesce accesses.
pub trait Bus: Send + Sync {
    fn read8(&self, offset: usize) -> u8;
    fn write8(&self, offset: usize, value: u8);
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);
}

impl<B: Bus + ?Sized> Bus for Arc<B> {
    fn read8(&self, offset: usize) -> u8 {
        (**self).read8(offset)
    }

    fn write8(&self, offset: usize, value: u8) {
        (**self).write8(offset, value)
    }

    fn read32(&self, offset: usize) -> u32 {
        (**self).read32(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        (**self).write32(offset, value)
    }
}

/// Physical address range handed out by resource discovery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub base: u64,
    pub size: u64,
}

impl Region {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// One past the last byte, saturating at `u64::MAX`.
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }
}

/// Mapping service turning a physical range into an addressable window.
pub trait Mapper {
    type Window: Bus + 'static;

    fn map(&self, region: Region) -> Result<Self::Window, HalError>;

    /// Releases a window obtained from [`Mapper::map`].
    fn unmap(&self, window: Self::Window) {
        drop(window);
    }
}

/// Result of running a handler on a (possibly shared) interrupt line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IrqReturn {
    /// The interrupt was raised by another device on the line.
    None,
    /// The interrupt belonged to this handler.
    Handled,
}

/// Interrupt-context callback. Must be short and must never sleep; it may
/// contend briefly on a lock whose holders only keep it across a register
/// access.
pub trait IrqHandler: Send + Sync {
    fn handle(&self, line: u32) -> IrqReturn;
}

/// Installs and removes handlers on shared interrupt lines.
pub trait IrqController: Send + Sync {
    fn request_shared(
        &self,
        line: u32,
        name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), HalError>;

    /// Removes the handler; once this returns the handler is no longer invoked.
    fn free(&self, line: u32);
}

/// Volatile register window over memory mapped by the platform.
pub struct MmioWindow {
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the window only performs volatile accesses to device memory whose
// validity is guaranteed by the `from_raw` contract for the window's lifetime.
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// Wraps `len` bytes of mapped device memory starting at `base`.
    ///
    /// # Safety
    ///
    /// `base..base + len` must stay mapped, readable and writable for as long
    /// as the returned window (or anything holding it) is alive.
    pub unsafe fn from_raw(base: NonNull<u8>, len: usize) -> Self {
        Self { base, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check(&self, offset: usize, width: usize) {
        assert!(
            offset.checked_add(width).is_some_and(|end| end <= self.len),
            "register offset {offset:#x} outside {:#x}-byte window",
            self.len
        );
        assert!(offset % width == 0, "unaligned {width}-byte access at {offset:#x}");
    }
}

impl Bus for MmioWindow {
    fn read8(&self, offset: usize) -> u8 {
        self.check(offset, 1);
        // SAFETY: bounds checked above; mapping validity is the constructor's contract.
        unsafe { self.base.as_ptr().add(offset).read_volatile() }
    }

    fn write8(&self, offset: usize, value: u8) {
        self.check(offset, 1);
        // SAFETY: see `read8`.
        unsafe { self.base.as_ptr().add(offset).write_volatile(value) }
    }

    fn read32(&self, offset: usize) -> u32 {
        self.check(offset, 4);
        // SAFETY: bounds and alignment checked above.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().read_volatile() }
    }

    fn write32(&self, offset: usize, value: u32) {
        self.check(offset, 4);
        // SAFETY: see `read32`.
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().write_volatile(value) }
    }
}
