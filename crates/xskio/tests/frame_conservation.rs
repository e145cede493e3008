#![cfg(feature = "simulator")]

//! Every frame is in exactly one place between steps: the pool, or one of
//! the four rings.

use std::collections::HashMap;

use proptest::prelude::*;
use xskio::engine::Discard;
use xskio::simulator::{SimBackend, SimError, SimPeer};
use xskio::{BindingRegistry, Engine, OutboundQueue, XskBuilder};

const FRAMES: u32 = 32;
const RING: u32 = 8;

#[derive(Debug, Clone)]
enum Op {
    Deliver(u8),
    Transmit(u8),
    Queue(u8),
    Step,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (1u8..8).prop_map(Op::Deliver),
        (1u8..8).prop_map(Op::Transmit),
        (1u8..8).prop_map(Op::Queue),
        Just(Op::Step),
    ]
}

fn assert_conserved(engine: &Engine<SimBackend>, peer: &SimPeer) {
    let layout = engine.pool().layout();
    let snapshot = peer.snapshot();

    for (name, len) in [
        ("fill", snapshot.fill.len()),
        ("comp", snapshot.comp.len()),
        ("rx", snapshot.rx.len()),
        ("tx", snapshot.tx.len()),
    ] {
        assert!(len <= RING as usize, "{name} ring holds {len} of {RING}");
    }

    let mut location: HashMap<u64, &'static str> = HashMap::new();
    let mut place = |frame: u64, here: &'static str| {
        assert_eq!(layout.frame_base(frame), Some(frame), "{frame:#x} in {here} is not a frame");
        if let Some(before) = location.insert(frame, here) {
            panic!("frame {frame:#x} is in both {before} and {here}");
        }
    };

    for frame in engine.pool().free_frames() {
        place(frame, "pool");
    }
    for frame in snapshot.fill {
        place(frame, "fill");
    }
    for frame in snapshot.comp {
        place(frame, "comp");
    }
    for desc in snapshot.rx {
        place(layout.frame_base(desc.addr).unwrap(), "rx");
    }
    for desc in snapshot.tx {
        place(desc.addr, "tx");
    }

    assert_eq!(location.len(), FRAMES as usize, "frames went missing");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn frames_are_conserved(ops in prop::collection::vec(op(), 1..200)) {
        let backend = SimBackend::new();
        let peer = backend.peer();
        let mut engine = XskBuilder::new("sim0")
            .ifindex(1)
            .frame_size(2048)
            .frame_count(FRAMES)
            .ring_size(RING)
            .batch_size(4)
            .registry(BindingRegistry::new())
            .build_engine(backend)
            .unwrap();
        let outbound = OutboundQueue::new(64);
        let mut source = &outbound;
        let mut seq = 0u32;

        assert_conserved(&engine, &peer);
        for op in ops {
            match op {
                Op::Deliver(n) => {
                    for _ in 0..n {
                        match peer.deliver(&seq.to_le_bytes()) {
                            Ok(_) => seq += 1,
                            Err(SimError::FillRingEmpty | SimError::RxRingFull) => break,
                            Err(e) => panic!("unexpected drop: {e}"),
                        }
                    }
                }
                Op::Transmit(n) => {
                    peer.transmit(u32::from(n));
                }
                Op::Queue(n) => {
                    for i in 0..n {
                        let _ = outbound.push(vec![i; 64]);
                    }
                }
                Op::Step => {
                    engine.step(&mut Discard, &mut source).unwrap();
                }
            }
            assert_conserved(&engine, &peer);
        }

        let report = engine.shutdown();
        prop_assert_eq!(report.leaked, (report.in_fill + report.in_tx) as usize);
    }
}
