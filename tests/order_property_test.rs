//! Property tests: replay order, close ordering and save stability for
//! arbitrary traffic

use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use tempfile::TempDir;

use wsvcr::cassette::{Cassette, Direction};
use wsvcr::transport::LoopbackSocket;
use wsvcr::{InterceptionClient, Payload, ReplayScheduling, Socket};

#[derive(Debug, Clone)]
enum Op {
    Send(Payload),
    Receive(Payload),
}

fn payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        "[ -~]{0,16}".prop_map(Payload::Text),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Payload::Binary),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![payload().prop_map(Op::Send), payload().prop_map(Op::Receive)]
}

fn record(temp_dir: &TempDir, ops: &[Op]) -> Cassette {
    let cassette = Arc::new(Mutex::new(
        Cassette::open(temp_dir.path(), "prop").unwrap(),
    ));
    let socket = LoopbackSocket::new();
    let peer = socket.clone();
    let client = InterceptionClient::recording(Arc::clone(&cassette), socket).unwrap();

    for op in ops {
        match op {
            Op::Send(payload) => client.send(payload.clone()).unwrap(),
            Op::Receive(payload) => peer.deliver(payload.clone()),
        }
    }
    drop(client);
    drop(peer);

    Arc::try_unwrap(cassette).unwrap().into_inner().unwrap()
}

proptest! {
    #[test]
    fn received_frames_replay_in_recorded_order(ops in prop::collection::vec(op(), 0..40)) {
        let temp_dir = TempDir::new().unwrap();
        let recorded = record(&temp_dir, &ops);
        prop_assert_eq!(recorded.len(), ops.len());
        recorded.save().unwrap();

        let expected: Vec<Payload> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Receive(payload) => Some(payload.clone()),
                Op::Send(_) => None,
            })
            .collect();

        let replay = Arc::new(Mutex::new(Cassette::open(temp_dir.path(), "prop").unwrap()));
        let client = InterceptionClient::<LoopbackSocket>::replaying(
            replay,
            ReplayScheduling::Lazy,
            false,
        )
        .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        client.on_message(move |payload| sink.lock().unwrap().push(payload.clone()));

        // Sends interleaved with the pump must not disturb delivery order
        for op in &ops {
            if let Op::Send(payload) = op {
                client.send(payload.clone()).unwrap();
            }
        }
        prop_assert_eq!(client.deliver_all().unwrap(), expected.len());

        prop_assert_eq!(&*seen.lock().unwrap(), &expected);
        prop_assert!(client.deliver_next().is_err());
    }

    #[test]
    fn eager_replay_closes_after_last_message(ops in prop::collection::vec(op(), 0..40)) {
        let temp_dir = TempDir::new().unwrap();
        let recorded = record(&temp_dir, &ops);
        recorded.save().unwrap();

        let mut expected: Vec<String> = ops
            .iter()
            .filter_map(|op| match op {
                Op::Receive(payload) => Some(format!("msg:{payload}")),
                Op::Send(_) => None,
            })
            .collect();
        expected.push("close".to_string());

        let replay = Arc::new(Mutex::new(Cassette::open(temp_dir.path(), "prop").unwrap()));
        let client = InterceptionClient::<LoopbackSocket>::replaying(
            replay,
            ReplayScheduling::Eager,
            false,
        )
        .unwrap();

        // Subscribe close first; it must still arrive last
        let log = Arc::new(Mutex::new(Vec::new()));
        let closes = Arc::clone(&log);
        client.on_close(move |_| closes.lock().unwrap().push("close".to_string()));
        let messages = Arc::clone(&log);
        client.on_message(move |payload| messages.lock().unwrap().push(format!("msg:{payload}")));

        prop_assert_eq!(&*log.lock().unwrap(), &expected);
    }

    #[test]
    fn repeated_save_is_byte_identical(ops in prop::collection::vec(op(), 0..20)) {
        let temp_dir = TempDir::new().unwrap();
        let recorded = record(&temp_dir, &ops);

        let path = recorded.save().unwrap();
        let first = std::fs::read(&path).unwrap();
        recorded.save().unwrap();
        let second = std::fs::read(&path).unwrap();
        prop_assert_eq!(first, second);

        let reloaded = Cassette::open(temp_dir.path(), "prop").unwrap();
        prop_assert_eq!(reloaded.entries(), recorded.entries());
        prop_assert_eq!(
            reloaded.entries().iter().filter(|f| f.direction == Direction::Sent).count(),
            ops.iter().filter(|op| matches!(op, Op::Send(_))).count()
        );
    }
}
