// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Readiness sources for the mailbox (shared-line IRQ gate or poll timer)
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Stable
//! TEST_COVERAGE: 6 unit tests, `tests/readiness.rs`
//!
//! Both sources feed one [`WakeQueue`]. Receivers re-check RECV after every
//! wake, so a timer tick or a foreign interrupt on the shared line is never
//! mistaken for data, and callers cannot tell which source is active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, trace};
use nexus_hal::{Bus, IrqHandler, IrqReturn};
use parking_lot::{Condvar, Mutex};

use crate::error::{MboxError, Result};
use crate::transport::Shared;

/// Which readiness source the transport selected at attach time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadinessMode {
    /// RECV edges arrive on a shared interrupt line.
    Interrupt { line: u32 },
    /// No interrupt; a periodic tick wakes receivers unconditionally.
    Timer,
}

#[derive(Default)]
struct WaitState {
    wakeups: u64,
    closed: bool,
}

/// Wake primitive shared by the readiness source and blocked receivers.
#[derive(Default)]
pub(crate) struct WakeQueue {
    state: Mutex<WaitState>,
    cond: Condvar,
}

impl WakeQueue {
    /// Records one readiness event and wakes every waiter.
    pub(crate) fn wake_all(&self) {
        let mut state = self.state.lock();
        state.wakeups = state.wakeups.wrapping_add(1);
        drop(state);
        self.cond.notify_all();
    }

    /// Wakes waiters without counting a readiness event.
    fn nudge(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }

    /// Fails every current and future wait with [`MboxError::Closed`].
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        drop(state);
        self.cond.notify_all();
    }

    pub(crate) fn wakeups(&self) -> u64 {
        self.state.lock().wakeups
    }

    /// Blocks until `ready` reports true.
    ///
    /// `ready` runs with the queue lock held, and every waker takes that lock
    /// before notifying, so an event landing between the check and the sleep
    /// cannot be missed.
    pub(crate) fn wait_until<F>(&self, cancel: &CancelToken, mut ready: F) -> Result<()>
    where
        F: FnMut() -> Result<bool>,
    {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(MboxError::Closed);
            }
            if ready()? {
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(MboxError::Interrupted);
            }
            self.cond.wait(&mut state);
        }
    }
}

/// Interrupts a blocking receive from another thread.
///
/// A cancelled token stays cancelled until [`CancelToken::reset`]; every
/// receive using it fails with [`MboxError::Interrupted`] while no frame is
/// pending.
#[derive(Clone)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    queue: Arc<WakeQueue>,
}

impl CancelToken {
    pub(crate) fn new(queue: Arc<WakeQueue>) -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)), queue }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.queue.nudge();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub(crate) fn belongs_to(&self, queue: &Arc<WakeQueue>) -> bool {
        Arc::ptr_eq(&self.queue, queue)
    }
}

/// Interrupt-context half of the interrupt variant: gate on RECV, mask, wake.
///
/// Never touches the payload slots and never blocks.
pub(crate) struct IrqGate<B> {
    shared: Arc<Shared<B>>,
}

impl<B> IrqGate<B> {
    pub(crate) fn new(shared: Arc<Shared<B>>) -> Self {
        Self { shared }
    }
}

impl<B: Bus + 'static> IrqHandler for IrqGate<B> {
    fn handle(&self, line: u32) -> IrqReturn {
        let ours = self.shared.try_with_regs(|regs| {
            if !regs.recv_pending() {
                return false;
            }
            // RECV stays set until the frame is drained; only mask it.
            regs.mask_recv();
            true
        });
        if ours != Some(true) {
            trace!("irq {line}: not ours");
            return IrqReturn::None;
        }
        self.shared.queue.wake_all();
        IrqReturn::Handled
    }
}

/// Timer variant: wakes the queue after `initial`, then every `interval`.
pub(crate) struct PollTimer {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<JoinHandle<()>>,
}

impl PollTimer {
    pub(crate) fn start(
        name: &str,
        queue: Arc<WakeQueue>,
        initial: Duration,
        interval: Duration,
    ) -> Result<Self> {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name(format!("{name}-poll"))
            .spawn(move || run_ticks(&thread_stop, &queue, initial, interval))
            .map_err(|err| MboxError::Timer(err.to_string()))?;
        Ok(Self { stop, thread: Some(thread) })
    }

    /// Cancels the timer and waits for the tick thread to exit; no tick
    /// fires once this returns.
    pub(crate) fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let (stopped, cond) = &*self.stop;
        *stopped.lock() = true;
        cond.notify_all();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!("poll timer thread panicked");
            }
        }
    }
}

impl Drop for PollTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_ticks(stop: &(Mutex<bool>, Condvar), queue: &WakeQueue, initial: Duration, interval: Duration) {
    let (stopped, cond) = stop;
    let mut deadline = next_deadline(Instant::now(), initial);
    loop {
        let mut guard = stopped.lock();
        while !*guard {
            if cond.wait_until(&mut guard, deadline).timed_out() {
                break;
            }
        }
        if *guard {
            return;
        }
        drop(guard);
        queue.wake_all();
        // Fixed rate: the next expiry is relative to the previous one.
        deadline = next_deadline(deadline, interval);
    }
}

/// `from + delay`, or an immediate tick if the sum is not representable.
fn next_deadline(from: Instant, delay: Duration) -> Instant {
    from.checked_add(delay).unwrap_or_else(Instant::now)
}
