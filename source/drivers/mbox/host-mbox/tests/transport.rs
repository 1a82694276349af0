// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Transport lifecycle, receive/send and attention against the in-process device model.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mbox_host::regs::{data_slot, Ctrl, ATTENTION_SLOT};
use mbox_host::sim::{SimMailbox, SIM_IRQ};
use mbox_host::{Frame, MboxConfig, MboxError, MboxHost, MboxResources, ReadinessMode, FRAME_LEN};
use nexus_hal::Region;
use proptest::prelude::*;

fn attach(sim: &SimMailbox, resources: &MboxResources) -> mbox_host::Result<MboxHost<SimMailbox>> {
    MboxHost::attach(MboxConfig::default(), resources, sim.clone(), Arc::new(sim.clone()))
}

fn frame(seed: u8) -> Frame {
    let mut bytes = [0u8; FRAME_LEN];
    for (i, b) in bytes.iter_mut().enumerate() {
        *b = seed.wrapping_add(i as u8);
    }
    Frame::new(bytes)
}

#[test]
fn attach_prefers_interrupt_and_clears_recv() {
    let sim = SimMailbox::new();
    sim.poke(mbox_host::regs::BMC_CTRL, Ctrl::RECV.bits());
    let host = attach(&sim, &sim.resources()).expect("attach");
    assert_eq!(host.readiness_mode(), ReadinessMode::Interrupt { line: SIM_IRQ });
    assert!(sim.irq_installed());
    assert_eq!(sim.ctrl(), Ctrl::empty());
    assert_eq!(sim.live_windows(), 1);
}

#[test]
fn blocked_receive_gets_delivered_frame() {
    let sim = SimMailbox::new();
    let host = Arc::new(attach(&sim, &sim.resources()).expect("attach"));
    let receiver = {
        let host = Arc::clone(&host);
        thread::spawn(move || host.receive(&host.cancel_token()))
    };
    thread::sleep(Duration::from_millis(20));
    assert!(sim.peer_deliver(&frame(0x10)));
    assert_eq!(receiver.join().unwrap(), Ok(frame(0x10)));
    assert_eq!(sim.ctrl(), Ctrl::empty());
}

#[test]
fn frames_arrive_in_order_exactly_once() {
    let sim = SimMailbox::new();
    let host = attach(&sim, &sim.resources()).expect("attach");
    let token = host.cancel_token();
    for seed in 0..5u8 {
        assert!(sim.peer_deliver(&frame(seed)));
        assert_eq!(host.receive(&token), Ok(frame(seed)));
        assert_eq!(host.try_receive(), Ok(None));
    }
}

#[test]
fn receive_after_drain_blocks_until_next_frame() {
    let sim = SimMailbox::new();
    let host = Arc::new(attach(&sim, &sim.resources()).expect("attach"));
    assert!(sim.peer_deliver(&frame(0x20)));
    assert_eq!(host.receive(&host.cancel_token()), Ok(frame(0x20)));

    let token = host.cancel_token();
    let receiver = {
        let host = Arc::clone(&host);
        let token = token.clone();
        thread::spawn(move || host.receive(&token))
    };
    thread::sleep(Duration::from_millis(30));
    assert!(!receiver.is_finished());
    token.cancel();
    assert_eq!(receiver.join().unwrap(), Err(MboxError::Interrupted));
}

#[test]
fn send_fills_payload_then_raises_send() {
    let sim = SimMailbox::new();
    let host = attach(&sim, &sim.resources()).expect("attach");
    host.send(&frame(0x40)).expect("send");
    assert!(sim.ctrl().contains(Ctrl::SEND));
    assert_eq!(sim.peer_collect(), Some(frame(0x40)));
    assert!(!sim.ctrl().contains(Ctrl::SEND));
}

#[test]
fn attention_leaves_payload_untouched() {
    let sim = SimMailbox::new();
    let host = attach(&sim, &sim.resources()).expect("attach");
    assert!(sim.peer_deliver(&frame(0x70)));
    host.signal_attention(0xa5).expect("attention");
    assert_eq!(sim.snapshot()[data_slot(ATTENTION_SLOT)], 0xa5);
    assert_eq!(host.receive(&host.cancel_token()), Ok(frame(0x70)));
}

#[test]
fn cancelled_receive_touches_no_register() {
    let sim = SimMailbox::new();
    let host = Arc::new(attach(&sim, &sim.resources()).expect("attach"));
    let token = host.cancel_token();
    let before = sim.snapshot();
    let writes = sim.register_writes();
    let receiver = {
        let host = Arc::clone(&host);
        let token = token.clone();
        thread::spawn(move || host.receive(&token))
    };
    thread::sleep(Duration::from_millis(20));
    token.cancel();
    assert_eq!(receiver.join().unwrap(), Err(MboxError::Interrupted));
    assert_eq!(sim.snapshot(), before);
    assert_eq!(sim.register_writes(), writes);

    // A later frame is still delivered to a fresh receive.
    token.reset();
    assert!(sim.peer_deliver(&frame(1)));
    assert_eq!(host.receive(&token), Ok(frame(1)));
}

#[test]
fn foreign_token_rejected() {
    let sim = SimMailbox::new();
    let host = attach(&sim, &sim.resources()).expect("attach");
    let other_sim = SimMailbox::new();
    let other = attach(&other_sim, &other_sim.resources()).expect("attach");
    assert!(matches!(
        host.receive(&other.cancel_token()),
        Err(MboxError::InvalidArgument(_))
    ));
}

#[test]
fn detach_wakes_receivers_and_unmaps() {
    let sim = SimMailbox::new();
    let host = Arc::new(attach(&sim, &sim.resources()).expect("attach"));
    let receiver = {
        let host = Arc::clone(&host);
        thread::spawn(move || host.receive(&host.cancel_token()))
    };
    thread::sleep(Duration::from_millis(20));
    host.detach();
    assert_eq!(receiver.join().unwrap(), Err(MboxError::Closed));
    assert_eq!(sim.live_windows(), 0);
    assert!(!sim.irq_installed());
    assert_eq!(host.send(&frame(0)), Err(MboxError::Closed));
    assert_eq!(host.query_readiness(), Err(MboxError::Closed));
    host.detach();
}

#[test]
fn drop_releases_everything() {
    let sim = SimMailbox::new();
    let host = attach(&sim, &sim.resources_without_irq()).expect("attach");
    assert_eq!(sim.live_windows(), 1);
    drop(host);
    assert_eq!(sim.live_windows(), 0);
    assert!(!sim.irq_installed());
}

#[test]
fn missing_or_small_window_fails_attach() {
    let sim = SimMailbox::new();
    let none = MboxResources { registers: None, irq: Some(SIM_IRQ) };
    assert!(matches!(attach(&sim, &none), Err(MboxError::MissingWindow)));
    let small = MboxResources {
        registers: Some(Region::new(mbox_host::sim::SIM_BASE, 0x40)),
        irq: None,
    };
    assert!(matches!(attach(&sim, &small), Err(MboxError::WindowTooSmall(0x40))));
    assert_eq!(sim.live_windows(), 0);
    assert!(!sim.irq_installed());
}

#[test]
fn map_failure_fails_attach() {
    let sim = SimMailbox::new();
    sim.set_fail_map(true);
    assert!(matches!(attach(&sim, &sim.resources()), Err(MboxError::Map(_))));
    assert!(!sim.irq_installed());
}

#[test]
fn busy_irq_falls_back_to_timer() {
    let sim = SimMailbox::new();
    sim.set_irq_busy(true);
    let host = attach(&sim, &sim.resources()).expect("attach");
    assert_eq!(host.readiness_mode(), ReadinessMode::Timer);
    assert!(!sim.irq_installed());
    assert!(sim.peer_deliver(&frame(9)));
    assert_eq!(host.receive(&host.cancel_token()), Ok(frame(9)));
}

#[test]
fn concurrent_receivers_split_frames_not_bytes() {
    let sim = SimMailbox::new();
    let host = Arc::new(attach(&sim, &sim.resources()).expect("attach"));
    let (tx, rx) = mpsc::channel();
    let tokens: Vec<_> = (0..2).map(|_| host.cancel_token()).collect();
    let receivers: Vec<_> = tokens
        .iter()
        .cloned()
        .map(|token| {
            let host = Arc::clone(&host);
            let tx = tx.clone();
            thread::spawn(move || tx.send(host.receive(&token)).unwrap())
        })
        .collect();
    thread::sleep(Duration::from_millis(20));
    assert!(sim.peer_deliver(&frame(0x33)));

    let first = rx.recv_timeout(Duration::from_secs(5)).expect("one receiver wins");
    assert_eq!(first, Ok(frame(0x33)));
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    tokens.iter().for_each(|token| token.cancel());
    let second = rx.recv_timeout(Duration::from_secs(5)).expect("loser interrupted");
    assert_eq!(second, Err(MboxError::Interrupted));
    for receiver in receivers {
        receiver.join().unwrap();
    }
}

proptest! {
    #[test]
    fn any_frame_survives_the_window(bytes in any::<[u8; FRAME_LEN]>()) {
        let sim = SimMailbox::new();
        let host = attach(&sim, &sim.resources()).unwrap();
        prop_assert!(sim.peer_deliver(&Frame::new(bytes)));
        prop_assert_eq!(host.try_receive().unwrap(), Some(Frame::new(bytes)));
        host.send(&Frame::new(bytes)).unwrap();
        prop_assert_eq!(sim.peer_collect(), Some(Frame::new(bytes)));
    }
}
