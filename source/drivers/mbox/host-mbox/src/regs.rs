// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! Register file layout and typed accessors. No protocol state lives here.

use bitflags::bitflags;
use nexus_hal::Bus;

use crate::frame::{Frame, FRAME_LEN};

/// Register slots in the window, 4-byte stride.
pub const NUM_REGS: usize = 16;
pub const REG_STRIDE: usize = 4;

pub const DATA_0: usize = 0x00;
/// Data slot carrying the out-of-band attention byte.
pub const ATTENTION_SLOT: usize = 15;
pub const STATUS_0: usize = 0x40;
pub const STATUS_1: usize = 0x44;
/// Local (BMC side) control register.
pub const BMC_CTRL: usize = 0x48;
/// Peer (host side) control register; owned by the remote end.
pub const HOST_CTRL: usize = 0x4c;
/// Interrupt enables for data slots 0-7.
pub const INTERRUPT_0: usize = 0x50;
/// Interrupt enables for data slots 8-15.
pub const INTERRUPT_1: usize = 0x54;

/// Bytes the mapped window must cover.
pub const WINDOW_SIZE: usize = INTERRUPT_1 + REG_STRIDE;

bitflags! {
    /// Bits of the local control register.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Ctrl: u8 {
        /// Peer placed a frame in the data slots. W1C; clearing also unmasks.
        const RECV = 0x80;
        /// RECV interrupts suppressed until acknowledged.
        const MASK = 0x02;
        /// Local side signals the peer that a frame is ready.
        const SEND = 0x01;
    }
}

/// Byte offset of data slot `index`.
pub const fn data_slot(index: usize) -> usize {
    DATA_0 + index * REG_STRIDE
}

/// Typed view over a mapped register window.
pub(crate) struct Registers<'a, B: Bus + ?Sized> {
    bus: &'a B,
}

impl<'a, B: Bus + ?Sized> Registers<'a, B> {
    pub(crate) fn new(bus: &'a B) -> Self {
        Self { bus }
    }

    pub(crate) fn ctrl(&self) -> Ctrl {
        Ctrl::from_bits_retain(self.bus.read8(BMC_CTRL))
    }

    pub(crate) fn recv_pending(&self) -> bool {
        self.ctrl().contains(Ctrl::RECV)
    }

    /// Reads the payload slots in ascending offset order.
    pub(crate) fn read_frame(&self) -> Frame {
        let mut bytes = [0u8; FRAME_LEN];
        for (index, byte) in bytes.iter_mut().enumerate() {
            *byte = self.bus.read8(data_slot(index));
        }
        Frame::new(bytes)
    }

    /// Writes the payload slots in ascending offset order.
    pub(crate) fn write_frame(&self, frame: &Frame) {
        for (index, byte) in frame.as_bytes().iter().enumerate() {
            self.bus.write8(data_slot(index), *byte);
        }
    }

    pub(crate) fn raise_send(&self) {
        self.bus.write8(BMC_CTRL, Ctrl::SEND.bits());
    }

    /// Suppresses further RECV interrupts while leaving RECV itself set.
    pub(crate) fn mask_recv(&self) {
        self.bus.write8(BMC_CTRL, Ctrl::MASK.bits());
    }

    /// Clears RECV and removes the mask in a single write.
    ///
    /// Never split this into separate clear and unmask writes: an edge
    /// arriving between them would be lost.
    pub(crate) fn acknowledge_and_rearm(&self) {
        self.bus.write8(BMC_CTRL, Ctrl::RECV.bits());
    }

    pub(crate) fn write_attention(&self, value: u8) {
        self.bus.write8(data_slot(ATTENTION_SLOT), value);
    }

    /// Clean slate before relying on the RECV interrupt: register-level
    /// enables set to `enable` (one bit per data slot), stale status swept,
    /// RECV cleared.
    pub(crate) fn reset_for_interrupts(&self, enable: u16) {
        let [low, high] = enable.to_le_bytes();
        self.bus.write8(INTERRUPT_0, low);
        self.bus.write8(INTERRUPT_1, high);
        self.bus.write8(STATUS_0, 0xff);
        self.bus.write8(STATUS_1, 0xff);
        self.acknowledge_and_rearm();
    }
}
