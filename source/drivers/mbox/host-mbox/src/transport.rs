// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Mailbox transport lifecycle plus frame receive/send and attention paths
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: `tests/transport.rs`, `tests/readiness.rs`
//!
//! CONCURRENCY:
//!   - `receive`/`try_receive` serialize the drain-and-acknowledge sequence;
//!     concurrent receivers never split one frame between them.
//!   - `send` and `signal_attention` do not take the drain lock. Attention
//!     uses a slot outside the payload, so it never disturbs a frame.
//!   - Teardown wakes blocked receivers with `Closed` before unmapping.

use std::sync::Arc;

use log::{debug, info, warn};
use nexus_hal::{Bus, IrqController, Mapper, Region};
use parking_lot::{Mutex, RwLock};

use crate::config::MboxConfig;
use crate::error::{MboxError, Result};
use crate::frame::Frame;
use crate::readiness::{CancelToken, IrqGate, PollTimer, ReadinessMode, WakeQueue};
use crate::regs::{Registers, WINDOW_SIZE};

/// Platform resources reported by bus enumeration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MboxResources {
    /// Physical register window.
    pub registers: Option<Region>,
    /// Interrupt line, if the platform wires one.
    pub irq: Option<u32>,
}

/// State reachable from interrupt context, the poll timer and callers.
pub(crate) struct Shared<B> {
    window: RwLock<Option<B>>,
    pub(crate) queue: Arc<WakeQueue>,
    drain: Mutex<()>,
}

impl<B: Bus> Shared<B> {
    fn new(window: B) -> Self {
        Self {
            window: RwLock::new(Some(window)),
            queue: Arc::new(WakeQueue::default()),
            drain: Mutex::new(()),
        }
    }

    fn with_regs<T>(&self, f: impl FnOnce(&Registers<'_, B>) -> T) -> Result<T> {
        let window = self.window.read();
        let bus = window.as_ref().ok_or(MboxError::Closed)?;
        Ok(f(&Registers::new(bus)))
    }

    /// Non-blocking variant for interrupt context; `None` while teardown
    /// holds the window or after it is gone.
    pub(crate) fn try_with_regs<T>(&self, f: impl FnOnce(&Registers<'_, B>) -> T) -> Option<T> {
        let window = self.window.try_read()?;
        let bus = window.as_ref()?;
        Some(f(&Registers::new(bus)))
    }

    fn recv_pending(&self) -> Result<bool> {
        self.with_regs(|regs| regs.recv_pending())
    }

    /// Drains the payload and acknowledges it if RECV is still set.
    fn drain(&self) -> Result<Option<Frame>> {
        let _exclusive = self.drain.lock();
        self.with_regs(|regs| {
            // Re-check under the lock: a concurrent receiver may have won.
            if !regs.recv_pending() {
                return None;
            }
            let frame = regs.read_frame();
            regs.acknowledge_and_rearm();
            Some(frame)
        })
    }

    fn take_window(&self) -> Option<B> {
        self.window.write().take()
    }
}

struct IrqBinding {
    line: u32,
    controller: Arc<dyn IrqController>,
}

/// One physical mailbox. Created at attach, torn down by [`MboxHost::detach`]
/// or on drop. Share it behind an `Arc` between consumers.
pub struct MboxHost<M: Mapper> {
    name: String,
    mode: ReadinessMode,
    shared: Arc<Shared<M::Window>>,
    mapper: M,
    irq: Mutex<Option<IrqBinding>>,
    timer: Mutex<Option<PollTimer>>,
}

impl<M: Mapper> MboxHost<M> {
    /// Maps the register window and installs a readiness source.
    ///
    /// An interrupt is used when the platform reports one and the controller
    /// accepts the handler; otherwise the transport degrades to polling.
    /// Only missing or unmappable registers (or a poll thread that cannot
    /// start) fail bring-up, after releasing whatever was acquired.
    pub fn attach(
        config: MboxConfig,
        resources: &MboxResources,
        mapper: M,
        irqs: Arc<dyn IrqController>,
    ) -> Result<Self> {
        config.validate()?;
        let name = config.device_name.clone();
        info!("{name}: found mbox host device");

        let region = resources.registers.ok_or_else(|| {
            warn!("{name}: unable to find resources");
            MboxError::MissingWindow
        })?;
        if region.size < WINDOW_SIZE as u64 {
            return Err(MboxError::WindowTooSmall(region.size));
        }
        let window = mapper.map(region).map_err(MboxError::Map)?;
        let shared = Arc::new(Shared::new(window));

        let irq = resources.irq.and_then(|line| {
            let gate = Arc::new(IrqGate::new(Arc::clone(&shared)));
            match irqs.request_shared(line, &name, gate) {
                Ok(()) => Some(IrqBinding { line, controller: Arc::clone(&irqs) }),
                Err(err) => {
                    warn!("{name}: unable to request IRQ {line}: {err}");
                    None
                }
            }
        });

        let (mode, timer) = match &irq {
            Some(binding) => {
                // Window was mapped above and nothing has torn it down yet.
                shared.with_regs(|regs| regs.reset_for_interrupts(config.data_irq_enable))?;
                info!("{name}: using IRQ {}", binding.line);
                (ReadinessMode::Interrupt { line: binding.line }, None)
            }
            None => {
                info!("{name}: no IRQ; using timer");
                let timer = PollTimer::start(
                    &name,
                    Arc::clone(&shared.queue),
                    config.poll_initial_delay(),
                    config.poll_interval(),
                );
                match timer {
                    Ok(timer) => (ReadinessMode::Timer, Some(timer)),
                    Err(err) => {
                        shared.queue.close();
                        if let Some(window) = shared.take_window() {
                            mapper.unmap(window);
                        }
                        return Err(err);
                    }
                }
            }
        };

        Ok(Self {
            name,
            mode,
            shared,
            mapper,
            irq: Mutex::new(irq),
            timer: Mutex::new(timer),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn readiness_mode(&self) -> ReadinessMode {
        self.mode
    }

    /// Readiness events delivered so far (interrupts owned plus timer ticks).
    pub fn wakeups(&self) -> u64 {
        self.shared.queue.wakeups()
    }

    /// Token able to interrupt receives blocked on this transport.
    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(Arc::clone(&self.shared.queue))
    }

    /// Blocks until the peer delivers a frame, then drains and acknowledges it.
    ///
    /// Fails with [`MboxError::Interrupted`] when `cancel` fires first; in
    /// that case no register is touched and the pending frame, if any
    /// arrives later, is still there for the next receive.
    pub fn receive(&self, cancel: &CancelToken) -> Result<Frame> {
        if !cancel.belongs_to(&self.shared.queue) {
            return Err(MboxError::InvalidArgument("cancel token from another transport"));
        }
        loop {
            self.shared.queue.wait_until(cancel, || self.shared.recv_pending())?;
            if let Some(frame) = self.shared.drain()? {
                debug!("{}: received {frame:?}", self.name);
                return Ok(frame);
            }
        }
    }

    /// Drains a pending frame without blocking.
    pub fn try_receive(&self) -> Result<Option<Frame>> {
        self.shared.drain()
    }

    /// Peeks at RECV without consuming anything.
    pub fn query_readiness(&self) -> Result<bool> {
        self.shared.recv_pending()
    }

    /// Writes `frame` into the payload slots and raises SEND. Does not wait
    /// for the peer.
    pub fn send(&self, frame: &Frame) -> Result<()> {
        self.shared.with_regs(|regs| {
            regs.write_frame(frame);
            regs.raise_send();
        })?;
        debug!("{}: sent {frame:?}", self.name);
        Ok(())
    }

    /// Writes the one-byte out-of-band attention signal.
    pub fn signal_attention(&self, value: u8) -> Result<()> {
        self.shared.with_regs(|regs| regs.write_attention(value))
    }

    /// Tears the transport down: blocked receivers fail with `Closed`, the
    /// poll timer is stopped and joined, the IRQ is released, and the
    /// register window is unmapped last. Safe to call more than once.
    pub fn detach(&self) {
        self.shared.queue.close();
        if let Some(timer) = self.timer.lock().take() {
            timer.stop();
        }
        if let Some(binding) = self.irq.lock().take() {
            binding.controller.free(binding.line);
        }
        if let Some(window) = self.shared.take_window() {
            self.mapper.unmap(window);
            info!("{}: detached", self.name);
        }
    }
}

impl<M: Mapper> Drop for MboxHost<M> {
    fn drop(&mut self) {
        self.detach();
    }
}
