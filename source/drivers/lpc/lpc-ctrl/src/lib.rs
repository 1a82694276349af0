// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: LPC host-window remap control (HICR7/HICR8) over a reserved memory region
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests below, `tests/remap.rs`
//!
//! Points the peer's LPC firmware window at a 64 KiB-aligned slice of the
//! reserved region, or back at the reset window. No protocol state: every
//! operation is a pair of register writes or a range check.
//!
//! PUBLIC API:
//!   - LpcCtrl::attach / size / map / unmap / mmap_region
//!   - LpcCtrl::control: opcode dispatch (OP_SIZE, OP_MAP, OP_UNMAP)

#![forbid(unsafe_code)]

use byteorder::{ByteOrder, LittleEndian};
use log::{error, info};
use nexus_hal::{Bus, HalError, Mapper, Region};
use thiserror::Error;

pub const DEVICE_NAME: &str = "lpc-ctrl";

/// Host controller interface register 7: window base and host address.
pub const HICR7: usize = 0x88;
/// Host controller interface register 8: window size mask.
pub const HICR8: usize = 0x8c;

/// Bytes the control register mapping must cover.
pub const CTRL_WINDOW_SIZE: u64 = (HICR8 + 4) as u64;

/// HICR7 value of the reset window.
pub const HICR7_RESET: u32 = (0x3000 << 16) | 0x0e00;
/// HICR8 value of the reset window (32 MiB).
pub const HICR8_RESET: u32 = (!(0x0200u32 - 1) << 16) | (0x0200 - 1);

/// Window granularity in bytes.
pub const WINDOW_ALIGN: u32 = 0x1_0000;

/// Reply: reserved region size, u64 little endian.
pub const OP_SIZE: u32 = 0;
/// Payload: host address then size, both u32 little endian.
pub const OP_MAP: u32 = 1;
/// No payload; restores the reset window.
pub const OP_UNMAP: u32 = 2;

const MAP_PAYLOAD_LEN: usize = 8;

pub type Result<T> = core::result::Result<T, LpcError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LpcError {
    #[error("control register window missing from platform resources")]
    MissingResource,
    #[error("control register window too small: {0:#x} bytes")]
    WindowTooSmall(u64),
    #[error("reserved memory region missing")]
    MissingReservedMemory,
    /// HICR7 carries the region base in 32 bits.
    #[error("reserved memory at {0:#x} is above the 32-bit LPC window base")]
    ReservedMemoryOutOfRange(u64),
    #[error("failed to map control registers: {0}")]
    Map(#[source] HalError),
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Platform resources for the controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LpcResources {
    /// Control register block holding HICR7/HICR8.
    pub ctrl: Option<Region>,
    /// Reserved memory the host window is carved from.
    pub memory_region: Option<Region>,
}

/// Host address range to expose through the LPC firmware window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LpcMapping {
    pub host_addr: u32,
    pub size: u32,
}

impl LpcMapping {
    /// Decodes an `OP_MAP` payload.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() != MAP_PAYLOAD_LEN {
            return Err(LpcError::InvalidArgument("map payload must be 8 bytes"));
        }
        Ok(Self {
            host_addr: LittleEndian::read_u32(&payload[..4]),
            size: LittleEndian::read_u32(&payload[4..]),
        })
    }

    fn check_alignment(&self) -> Result<()> {
        if self.host_addr % WINDOW_ALIGN != 0 {
            return Err(LpcError::InvalidArgument("host address not 64 KiB aligned"));
        }
        if self.size == 0 || self.size % WINDOW_ALIGN != 0 {
            return Err(LpcError::InvalidArgument("size not a non-zero multiple of 64 KiB"));
        }
        Ok(())
    }

    fn hicr7(&self, base: u32) -> u32 {
        base | (self.host_addr >> 16)
    }

    fn hicr8(&self) -> u32 {
        !(self.size.wrapping_sub(1)) | (self.size >> 16).wrapping_sub(1)
    }
}

/// LPC control device bound to one reserved memory region.
pub struct LpcCtrl<M: Mapper> {
    mapper: M,
    regs: Option<M::Window>,
    base: u32,
    size: u64,
}

impl<M: Mapper> LpcCtrl<M> {
    pub fn attach(resources: &LpcResources, mapper: M) -> Result<Self> {
        info!("{DEVICE_NAME}: found lpc control device");
        let ctrl = resources.ctrl.ok_or_else(|| {
            error!("{DEVICE_NAME}: unable to find resources");
            LpcError::MissingResource
        })?;
        if ctrl.size < CTRL_WINDOW_SIZE {
            error!("{DEVICE_NAME}: control window {:#x} bytes too small", ctrl.size);
            return Err(LpcError::WindowTooSmall(ctrl.size));
        }
        let memory = resources.memory_region.ok_or_else(|| {
            error!("{DEVICE_NAME}: didn't find reserved memory");
            LpcError::MissingReservedMemory
        })?;
        let base = u32::try_from(memory.base)
            .map_err(|_| LpcError::ReservedMemoryOutOfRange(memory.base))?;
        let regs = mapper.map(ctrl).map_err(LpcError::Map)?;
        info!("{DEVICE_NAME}: loaded at {base:#010x} ({:#010x})", memory.size);
        Ok(Self { mapper, regs: Some(regs), base, size: memory.size })
    }

    /// Size of the reserved region in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Programs the firmware window onto `mapping`.
    ///
    /// Misaligned requests fail before any register is written.
    pub fn map(&self, mapping: LpcMapping) -> Result<()> {
        if let Err(err) = mapping.check_alignment() {
            error!(
                "{DEVICE_NAME}: misaligned window request {:#010x}, {:#010x}",
                mapping.host_addr, mapping.size
            );
            return Err(err);
        }
        self.write(HICR7, mapping.hicr7(self.base));
        self.write(HICR8, mapping.hicr8());
        Ok(())
    }

    /// Restores the reset window.
    pub fn unmap(&self) {
        self.write(HICR7, HICR7_RESET);
        self.write(HICR8, HICR8_RESET);
    }

    /// Physical range backing a user mapping of `len` bytes at `offset`
    /// into the reserved region.
    pub fn mmap_region(&self, offset: u64, len: u64) -> Result<Region> {
        let end = offset.checked_add(len).filter(|end| *end <= self.size);
        if len == 0 || end.is_none() {
            return Err(LpcError::InvalidArgument("mapping outside reserved memory"));
        }
        Ok(Region::new(u64::from(self.base) + offset, len))
    }

    /// Dispatches a control operation by id.
    pub fn control(&self, op: u32, payload: &[u8]) -> Result<Vec<u8>> {
        match op {
            OP_SIZE => {
                let mut reply = vec![0u8; 8];
                LittleEndian::write_u64(&mut reply, self.size);
                Ok(reply)
            }
            OP_MAP => {
                self.map(LpcMapping::decode(payload)?)?;
                Ok(Vec::new())
            }
            OP_UNMAP => {
                self.unmap();
                Ok(Vec::new())
            }
            _ => Err(LpcError::InvalidArgument("unknown control op")),
        }
    }

    fn write(&self, offset: usize, value: u32) {
        if let Some(regs) = &self.regs {
            regs.write32(offset, value);
        }
    }
}

impl<M: Mapper> Drop for LpcCtrl<M> {
    fn drop(&mut self) {
        if let Some(regs) = self.regs.take() {
            self.mapper.unmap(regs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_window_constants() {
        assert_eq!(HICR7_RESET, 0x3000_0e00);
        assert_eq!(HICR8_RESET, 0xfe00_01ff);
    }

    #[test]
    fn smallest_window_encoding() {
        let mapping = LpcMapping { host_addr: 0, size: 0x1_0000 };
        mapping.check_alignment().expect("aligned");
        assert_eq!(mapping.hicr7(0x9800_0000), 0x9800_0000);
        assert_eq!(mapping.hicr8(), 0xffff_0000);
    }

    #[test]
    fn full_window_encoding() {
        let mapping = LpcMapping { host_addr: 0x0fff_0000, size: 0x0200_0000 };
        assert_eq!(mapping.hicr7(0x9800_0000), 0x9800_0fff);
        assert_eq!(mapping.hicr8(), 0xfe00_01ff);
    }

    #[test]
    fn alignment_rules() {
        let ok = |host_addr, size| LpcMapping { host_addr, size }.check_alignment().is_ok();
        assert!(ok(0, 0x1_0000));
        assert!(!ok(0, 0x1_0001));
        assert!(!ok(0x8000, 0x1_0000));
        assert!(!ok(0x1_0000, 0));
    }

    #[test]
    fn decode_requires_exact_payload() {
        let payload = [0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x02, 0x00];
        assert_eq!(
            LpcMapping::decode(&payload),
            Ok(LpcMapping { host_addr: 0x1_0000, size: 0x2_0000 })
        );
        assert!(LpcMapping::decode(&payload[..7]).is_err());
    }
}
