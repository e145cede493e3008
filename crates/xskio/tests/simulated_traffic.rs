#![cfg(feature = "simulator")]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use xskio::engine::{Discard, NoOutbound};
use xskio::simulator::{SimBackend, SimError, SimPeer};
use xskio::{BindingRegistry, Engine, OutboundQueue, PacketRef, Poller, XskBuilder};

fn builder(frames: u32, ring: u32, batch: u32) -> XskBuilder {
    XskBuilder::new("sim0")
        .ifindex(1)
        .frame_size(2048)
        .frame_count(frames)
        .ring_size(ring)
        .batch_size(batch)
        .registry(BindingRegistry::new())
}

fn sim_engine(builder: XskBuilder) -> (Engine<SimBackend>, SimPeer) {
    let backend = SimBackend::new();
    let peer = backend.peer();
    let engine = builder.build_engine(backend).expect("Failed to build engine");
    (engine, peer)
}

#[test]
fn test_received_packets_reach_the_sink() {
    let (mut engine, peer) = sim_engine(builder(64, 16, 8));

    for payload in [b"alpha".as_slice(), b"beta".as_slice(), b"gamma".as_slice()] {
        peer.deliver(payload).expect("Failed to deliver");
    }
    assert_eq!(peer.snapshot().fill.len(), 13);

    let mut seen = Vec::new();
    let mut sink = |packet: PacketRef<'_>| seen.push(packet.data().to_vec());
    let step = engine.step(&mut sink, &mut NoOutbound).unwrap();

    assert_eq!(step.received, 3);
    assert_eq!(step.recycled, 3);
    assert_eq!(seen, vec![b"alpha".to_vec(), b"beta".to_vec(), b"gamma".to_vec()]);

    // Every frame went straight back to the kernel.
    let snapshot = peer.snapshot();
    assert_eq!(snapshot.fill.len(), 16);
    assert!(snapshot.rx.is_empty());
    assert_eq!(engine.pool().available(), 48);
    assert_eq!(engine.stats().rx_bytes, 14);
}

#[test]
fn test_outbound_payloads_are_sent_and_completed() {
    let (mut engine, peer) = sim_engine(builder(64, 16, 8));
    let outbound = OutboundQueue::new(16);
    for i in 0..3u8 {
        outbound.push(vec![i; 60]).unwrap();
    }

    let mut source = &outbound;
    let step = engine.step(&mut Discard, &mut source).unwrap();
    assert_eq!(step.transmitted, 3);
    assert_eq!(peer.kicks(), 1);
    assert_eq!(engine.pool().available(), 45);

    let sent = peer.transmit(16);
    assert_eq!(sent, vec![vec![0u8; 60], vec![1u8; 60], vec![2u8; 60]]);

    let step = engine.step(&mut Discard, &mut source).unwrap();
    assert_eq!(step.completed, 3);
    assert_eq!(step.transmitted, 0);
    assert_eq!(engine.pool().available(), 48);
    // Nothing left in the TX ring, so no further kick.
    assert_eq!(peer.kicks(), 1);

    let stats = engine.stats();
    assert_eq!(stats.tx_packets, 3);
    assert_eq!(stats.tx_bytes, 180);
    assert_eq!(stats.completions, 3);
}

#[test]
fn test_full_tx_ring_defers_the_rest() {
    let (mut engine, peer) = sim_engine(builder(64, 16, 8).tx_size(4));
    let outbound = OutboundQueue::new(16);
    for i in 0..10u8 {
        outbound.push(vec![i; 10]).unwrap();
    }
    let mut source = &outbound;

    assert_eq!(engine.step(&mut Discard, &mut source).unwrap().transmitted, 4);
    assert_eq!(outbound.len(), 6);

    // The ring stays full until the peer drains it; nothing is lost meanwhile.
    let step = engine.step(&mut Discard, &mut source).unwrap();
    assert_eq!(step.transmitted, 0);
    assert!(!step.pool_exhausted);
    assert_eq!(outbound.len(), 6);

    let mut sent = Vec::new();
    while sent.len() < 10 {
        sent.extend(peer.transmit(8));
        engine.step(&mut Discard, &mut source).unwrap();
    }
    let expected: Vec<Vec<u8>> = (0..10u8).map(|i| vec![i; 10]).collect();
    assert_eq!(sent, expected);
}

#[test]
fn test_pool_exhaustion_waits_for_completions() {
    let (mut engine, peer) = sim_engine(builder(8, 8, 8).fill_size(4));
    let outbound = OutboundQueue::new(8);
    for i in 0..6u8 {
        outbound.push(vec![i; 32]).unwrap();
    }
    let mut source = &outbound;

    let step = engine.step(&mut Discard, &mut source).unwrap();
    assert_eq!(step.transmitted, 4);
    assert!(step.pool_exhausted);
    assert_eq!(engine.pool().available(), 0);
    assert_eq!(engine.stats().tx_starved, 1);
    assert_eq!(outbound.len(), 2);

    assert_eq!(peer.transmit(8).len(), 4);

    let step = engine.step(&mut Discard, &mut source).unwrap();
    assert_eq!(step.completed, 4);
    assert_eq!(step.transmitted, 2);
    assert!(!step.pool_exhausted);
    assert!(outbound.is_empty());
    assert_eq!(engine.pool().available(), 2);
}

#[test]
fn test_idle_step_with_every_frame_in_fill_reports_starvation() {
    let (mut engine, peer) = sim_engine(builder(8, 8, 8));
    assert_eq!(peer.snapshot().fill.len(), 8);
    assert_eq!(engine.pool().available(), 0);

    // Nothing is queued, yet no frame is there to offer the source either.
    let step = engine.step(&mut Discard, &mut NoOutbound).unwrap();
    assert!(step.is_idle());
    assert!(step.pool_exhausted);
    assert_eq!(engine.stats().tx_starved, 1);
}

#[test]
fn test_need_wakeup_gates_kicks() {
    let backend = SimBackend::with_need_wakeup();
    let peer = backend.peer();
    let mut engine = builder(64, 16, 8).build_engine(backend).unwrap();
    let outbound = OutboundQueue::new(4);
    let mut source = &outbound;

    outbound.push(vec![0xAA; 20]).unwrap();
    assert_eq!(engine.step(&mut Discard, &mut source).unwrap().transmitted, 1);
    assert_eq!(peer.kicks(), 0);
    assert_eq!(peer.rx_wakeups(), 0);

    peer.set_need_wakeup(true);
    outbound.push(vec![0xBB; 20]).unwrap();
    assert_eq!(engine.step(&mut Discard, &mut source).unwrap().transmitted, 1);
    assert_eq!(peer.kicks(), 1);
    assert_eq!(peer.rx_wakeups(), 1);
}

#[test]
fn test_oversize_payload_is_dropped() {
    let (mut engine, peer) = sim_engine(builder(64, 16, 8));

    let mut calls = 0;
    let mut source = |frame: &mut [u8]| {
        calls += 1;
        (calls == 1).then(|| frame.len() + 1)
    };
    let step = engine.step(&mut Discard, &mut source).unwrap();

    assert_eq!(step.transmitted, 0);
    assert_eq!(engine.stats().tx_oversize, 1);
    assert_eq!(engine.pool().available(), 48);
    assert!(peer.snapshot().tx.is_empty());
}

#[test]
fn test_drop_when_fill_ring_is_empty() {
    let (mut engine, peer) = sim_engine(builder(64, 8, 8).fill_size(4));

    for _ in 0..4 {
        peer.deliver(b"x").unwrap();
    }
    assert_eq!(peer.deliver(b"x"), Err(SimError::FillRingEmpty));

    assert_eq!(engine.step(&mut Discard, &mut NoOutbound).unwrap().received, 4);
    assert!(peer.deliver(b"x").is_ok());
}

#[test]
fn test_poller_strategies_stop_on_request() {
    for poller in [Poller::Busy, Poller::Wait, Poller::Adaptive] {
        let (mut engine, _peer) = sim_engine(builder(64, 16, 8).poller(poller));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_clone = Arc::clone(&stop);

        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stop_clone.store(true, Ordering::Relaxed);
        });

        engine
            .run(&stop, &mut Discard, &mut NoOutbound)
            .expect("Engine run failed");
        stopper.join().unwrap();
        assert!(engine.stats().steps > 0);
    }
}

#[test]
fn test_echo_against_concurrent_peer() {
    const PACKETS: usize = 5000;

    let (mut engine, peer) = sim_engine(builder(256, 64, 16).poller(Poller::Busy));
    let stop = Arc::new(AtomicBool::new(false));

    let nic = {
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(20);
            let mut next = 0u32;
            let mut echoed = Vec::with_capacity(PACKETS);

            while echoed.len() < PACKETS && Instant::now() < deadline {
                if (next as usize) < PACKETS {
                    match peer.deliver(&next.to_le_bytes()) {
                        Ok(_) => next += 1,
                        Err(SimError::FillRingEmpty | SimError::RxRingFull) => thread::yield_now(),
                        Err(e) => panic!("unexpected drop: {e}"),
                    }
                }
                echoed.extend(peer.transmit(32));
            }

            stop.store(true, Ordering::Relaxed);
            echoed
        })
    };

    let outbound = OutboundQueue::new(PACKETS);
    let mut received = 0usize;
    let mut sink = |packet: PacketRef<'_>| {
        received += 1;
        outbound.push(packet.data().to_vec()).unwrap();
    };
    let mut source = &outbound;
    engine.run(&stop, &mut sink, &mut source).unwrap();

    let echoed = nic.join().unwrap();
    let expected: Vec<Vec<u8>> = (0..PACKETS as u32).map(|i| i.to_le_bytes().to_vec()).collect();
    assert_eq!(received, PACKETS);
    assert_eq!(echoed, expected);

    let report = engine.shutdown();
    assert_eq!(report.in_tx, 0);
    assert_eq!(report.leaked, report.in_fill as usize);
}
