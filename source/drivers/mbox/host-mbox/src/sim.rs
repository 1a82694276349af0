// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process model of the mailbox register file for host testing
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//!
//! MODELLED BEHAVIOUR:
//!   - Local control: RECV is W1C and clearing it also drops MASK; writing
//!     MASK latches it; writing SEND latches it until the peer collects.
//!   - Status registers are W1C; every other register is plain storage.
//!   - The peer cannot deliver while RECV is still set (send lock-out).
//!   - A delivery raises the shared interrupt line unless MASK is latched.
//!
//! The model is also the platform: it maps its own window and owns one
//! shared interrupt line.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use nexus_hal::{Bus, HalError, IrqController, IrqHandler, IrqReturn, Mapper, Region};
use parking_lot::Mutex;

use crate::frame::{Frame, FRAME_LEN};
use crate::regs::{data_slot, Ctrl, BMC_CTRL, STATUS_0, STATUS_1, WINDOW_SIZE};
use crate::transport::MboxResources;

/// Physical base the model reports for its register window.
pub const SIM_BASE: u64 = 0x1e78_9000;
/// Interrupt line the model reports.
pub const SIM_IRQ: u32 = 17;

struct SimInner {
    regs: Mutex<[u8; WINDOW_SIZE]>,
    handler: Mutex<Option<Arc<dyn IrqHandler>>>,
    live_windows: AtomicUsize,
    register_writes: AtomicUsize,
    fail_map: AtomicBool,
    irq_busy: AtomicBool,
}

/// Simulated mailbox device and platform.
#[derive(Clone)]
pub struct SimMailbox {
    inner: Arc<SimInner>,
}

impl Default for SimMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl SimMailbox {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SimInner {
                regs: Mutex::new([0; WINDOW_SIZE]),
                handler: Mutex::new(None),
                live_windows: AtomicUsize::new(0),
                register_writes: AtomicUsize::new(0),
                fail_map: AtomicBool::new(false),
                irq_busy: AtomicBool::new(false),
            }),
        }
    }

    /// Resources as enumerated with the interrupt line wired.
    pub fn resources(&self) -> MboxResources {
        MboxResources {
            registers: Some(Region::new(SIM_BASE, WINDOW_SIZE as u64)),
            irq: Some(SIM_IRQ),
        }
    }

    /// Resources as enumerated on boards without the interrupt line.
    pub fn resources_without_irq(&self) -> MboxResources {
        MboxResources { irq: None, ..self.resources() }
    }

    /// Makes the next `map` calls fail.
    pub fn set_fail_map(&self, fail: bool) {
        self.inner.fail_map.store(fail, Ordering::SeqCst);
    }

    /// Makes `request_shared` reject handlers.
    pub fn set_irq_busy(&self, busy: bool) {
        self.inner.irq_busy.store(busy, Ordering::SeqCst);
    }

    /// Windows currently mapped and not yet unmapped.
    pub fn live_windows(&self) -> usize {
        self.inner.live_windows.load(Ordering::SeqCst)
    }

    /// Register writes issued through mapped windows so far.
    pub fn register_writes(&self) -> usize {
        self.inner.register_writes.load(Ordering::SeqCst)
    }

    pub fn irq_installed(&self) -> bool {
        self.inner.handler.lock().is_some()
    }

    pub fn ctrl(&self) -> Ctrl {
        Ctrl::from_bits_retain(self.inner.regs.lock()[BMC_CTRL])
    }

    /// Copy of the whole register file.
    pub fn snapshot(&self) -> [u8; WINDOW_SIZE] {
        *self.inner.regs.lock()
    }

    /// Raw hardware-side store, bypassing register semantics.
    pub fn poke(&self, offset: usize, value: u8) {
        self.inner.regs.lock()[offset] = value;
    }

    /// Peer places `frame` and raises RECV. Returns `false` while the
    /// previous frame is still unacknowledged.
    pub fn peer_deliver(&self, frame: &Frame) -> bool {
        let masked = {
            let mut regs = self.inner.regs.lock();
            let ctrl = Ctrl::from_bits_retain(regs[BMC_CTRL]);
            if ctrl.contains(Ctrl::RECV) {
                return false;
            }
            for (index, byte) in frame.as_bytes().iter().enumerate() {
                regs[data_slot(index)] = *byte;
            }
            regs[BMC_CTRL] = (ctrl | Ctrl::RECV).bits();
            ctrl.contains(Ctrl::MASK)
        };
        if !masked {
            self.fire_irq();
        }
        true
    }

    /// Peer drains a frame signalled with SEND, clearing the latch.
    pub fn peer_collect(&self) -> Option<Frame> {
        let mut regs = self.inner.regs.lock();
        let ctrl = Ctrl::from_bits_retain(regs[BMC_CTRL]);
        if !ctrl.contains(Ctrl::SEND) {
            return None;
        }
        let mut bytes = [0u8; FRAME_LEN];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = regs[data_slot(index)];
        }
        regs[BMC_CTRL] = (ctrl - Ctrl::SEND).bits();
        Some(Frame::new(bytes))
    }

    /// Another device on the shared line raises the interrupt.
    pub fn raise_foreign_irq(&self) -> Option<IrqReturn> {
        let handler = self.inner.handler.lock().clone();
        handler.map(|handler| handler.handle(SIM_IRQ))
    }

    fn fire_irq(&self) {
        let handler = self.inner.handler.lock().clone();
        if let Some(handler) = handler {
            handler.handle(SIM_IRQ);
        }
    }
}

/// Mapped view of the simulated register file.
pub struct SimWindow {
    inner: Arc<SimInner>,
}

impl SimWindow {
    fn store(&self, offset: usize, value: u8) {
        self.inner.register_writes.fetch_add(1, Ordering::SeqCst);
        let mut regs = self.inner.regs.lock();
        match offset {
            BMC_CTRL => {
                let written = Ctrl::from_bits_retain(value);
                let mut ctrl = Ctrl::from_bits_retain(regs[BMC_CTRL]);
                if written.contains(Ctrl::RECV) {
                    ctrl.remove(Ctrl::RECV | Ctrl::MASK);
                }
                if written.contains(Ctrl::MASK) {
                    ctrl.insert(Ctrl::MASK);
                }
                if written.contains(Ctrl::SEND) {
                    ctrl.insert(Ctrl::SEND);
                }
                regs[BMC_CTRL] = ctrl.bits();
            }
            STATUS_0 | STATUS_1 => regs[offset] &= !value,
            _ => regs[offset] = value,
        }
    }
}

impl Drop for SimWindow {
    fn drop(&mut self) {
        self.inner.live_windows.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Bus for SimWindow {
    fn read8(&self, offset: usize) -> u8 {
        self.inner.regs.lock()[offset]
    }

    fn write8(&self, offset: usize, value: u8) {
        self.store(offset, value);
    }

    fn read32(&self, offset: usize) -> u32 {
        let regs = self.inner.regs.lock();
        u32::from_le_bytes([regs[offset], regs[offset + 1], regs[offset + 2], regs[offset + 3]])
    }

    fn write32(&self, offset: usize, value: u32) {
        for (lane, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.store(offset + lane, byte);
        }
    }
}

impl Mapper for SimMailbox {
    type Window = SimWindow;

    fn map(&self, region: Region) -> Result<SimWindow, HalError> {
        if self.inner.fail_map.load(Ordering::SeqCst)
            || region.base != SIM_BASE
            || region.size > WINDOW_SIZE as u64
        {
            return Err(HalError::MapFailed { base: region.base, size: region.size });
        }
        self.inner.live_windows.fetch_add(1, Ordering::SeqCst);
        Ok(SimWindow { inner: Arc::clone(&self.inner) })
    }
}

impl IrqController for SimMailbox {
    fn request_shared(
        &self,
        line: u32,
        _name: &str,
        handler: Arc<dyn IrqHandler>,
    ) -> Result<(), HalError> {
        if line != SIM_IRQ {
            return Err(HalError::IrqUnavailable);
        }
        let mut slot = self.inner.handler.lock();
        if self.inner.irq_busy.load(Ordering::SeqCst) || slot.is_some() {
            return Err(HalError::IrqBusy(line));
        }
        *slot = Some(handler);
        Ok(())
    }

    fn free(&self, line: u32) {
        if line == SIM_IRQ {
            self.inner.handler.lock().take();
        }
    }
}
