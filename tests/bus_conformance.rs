//! Conformance tests for the bus transfer protocol, driven through the
//! cooperative runtime.

use std::cell::RefCell;
use std::rc::Rc;

use taskbus::test_utils::init_test_logging;
use taskbus::{assert_with_log, test_complete, test_phase};
use taskbus::{Bus, BusError, Message, Runtime, RuntimeConfig};

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::new())
}

#[test]
fn blocked_recv_resumes_on_send() {
    init_test_logging();
    test_phase!("blocked_recv_resumes_on_send");
    let bus = Bus::new();
    let channel = bus.open(1);
    let mut runtime = runtime();

    let got = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&got);
    let receiver = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(receiver.recv(channel).await);
    });

    runtime.run_until_quiescent();
    let still_waiting = got.borrow().is_none();
    assert_with_log!(still_waiting, "receiver parked on empty channel", true, still_waiting);
    assert_eq!(runtime.live_tasks(), 1);

    let sender = bus.clone();
    runtime.spawn(async move {
        sender.send(channel, 7).await.expect("send");
    });
    runtime.run_until_quiescent();

    assert_eq!(*got.borrow(), Some(Ok(7)));
    assert_eq!(runtime.live_tasks(), 0);
    test_complete!("blocked_recv_resumes_on_send");
}

#[test]
fn blocked_send_resumes_on_recv() {
    init_test_logging();
    test_phase!("blocked_send_resumes_on_recv");
    let bus = Bus::new();
    let channel = bus.open(1);
    bus.try_send(channel, 1).expect("fill");
    let mut runtime = runtime();

    let done = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&done);
    let sender = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(sender.send(channel, 2).await);
    });

    runtime.run_until_quiescent();
    let still_waiting = done.borrow().is_none();
    assert_with_log!(still_waiting, "sender parked on full channel", true, still_waiting);

    assert_eq!(bus.try_recv(channel), Ok(1));
    runtime.run_until_quiescent();

    assert_eq!(*done.borrow(), Some(Ok(())));
    assert_eq!(bus.try_recv(channel), Ok(2));
    assert_eq!(runtime.live_tasks(), 0);
    test_complete!("blocked_send_resumes_on_recv");
}

#[test]
fn close_wakes_every_blocked_receiver() {
    init_test_logging();
    test_phase!("close_wakes_every_blocked_receiver");
    let bus = Bus::new();
    let channel = bus.open(1);
    let mut runtime = runtime();

    let results = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..3 {
        let sink = Rc::clone(&results);
        let receiver = bus.clone();
        runtime.spawn(async move {
            let outcome = receiver.recv(channel).await;
            sink.borrow_mut().push(outcome);
        });
    }

    runtime.run_until_quiescent();
    assert_eq!(runtime.live_tasks(), 3);

    bus.close(channel);
    runtime.run_until_quiescent();

    assert_eq!(
        *results.borrow(),
        vec![Err(BusError::NoChannel); 3],
        "every receiver observes the closure"
    );
    let live = runtime.live_tasks();
    assert_with_log!(live == 0, "no task left suspended", 0, live);
    test_complete!("close_wakes_every_blocked_receiver");
}

#[test]
fn close_wakes_blocked_senders_too() {
    init_test_logging();
    test_phase!("close_wakes_blocked_senders_too");
    let bus = Bus::new();
    let channel = bus.open(0);
    let mut runtime = runtime();

    let results = Rc::new(RefCell::new(Vec::new()));
    for value in 0..2 {
        let sink = Rc::clone(&results);
        let sender = bus.clone();
        runtime.spawn(async move {
            let outcome = sender.send(channel, value).await;
            sink.borrow_mut().push(outcome);
        });
    }

    runtime.run_until_quiescent();
    assert_eq!(runtime.live_tasks(), 2);

    bus.close(channel);
    runtime.run_until_quiescent();

    assert_eq!(*results.borrow(), vec![Err(BusError::NoChannel); 2]);
    assert_eq!(runtime.live_tasks(), 0);
    test_complete!("close_wakes_blocked_senders_too");
}

#[test]
fn blocked_senders_complete_in_fifo_order() {
    init_test_logging();
    test_phase!("blocked_senders_complete_in_fifo_order");
    let bus = Bus::new();
    let channel = bus.open(1);
    bus.try_send(channel, 0).expect("fill");
    let mut runtime = runtime();

    for value in [10, 20, 30] {
        let sender = bus.clone();
        runtime.spawn(async move {
            sender.send(channel, value).await.expect("send");
        });
    }

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let receiver = bus.clone();
    runtime.spawn(async move {
        for _ in 0..4 {
            sink.borrow_mut().push(receiver.recv(channel).await.expect("recv"));
        }
    });

    runtime.run_until_quiescent();

    let order = received.borrow().clone();
    assert_with_log!(
        order == vec![0, 10, 20, 30],
        "senders drained in suspension order",
        vec![0, 10, 20, 30],
        order
    );
    assert_eq!(runtime.live_tasks(), 0);
    test_complete!("blocked_senders_complete_in_fifo_order");
}

#[test]
fn send_many_blocks_then_transfers_partially() {
    init_test_logging();
    test_phase!("send_many_blocks_then_transfers_partially");
    let bus = Bus::new();
    let channel = bus.open(2);
    bus.try_send_many(channel, &[1, 2]).expect("fill");
    let mut runtime = runtime();

    let accepted = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&accepted);
    let sender = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(sender.send_many(channel, &[3, 4, 5]).await);
    });

    runtime.run_until_quiescent();
    assert!(accepted.borrow().is_none());

    let mut buf = [0; 2];
    assert_eq!(bus.try_recv_many(channel, &mut buf), Ok(2));
    runtime.run_until_quiescent();

    // Room for two opened up; the third message stays with the caller.
    assert_eq!(*accepted.borrow(), Some(Ok(2)));
    assert_eq!(bus.channel_len(channel), Some(2));
    assert_eq!(bus.try_recv(channel), Ok(3));
    assert_eq!(bus.try_recv(channel), Ok(4));
    test_complete!("send_many_blocks_then_transfers_partially");
}

#[test]
fn completed_send_wakes_next_sender_while_room_remains() {
    init_test_logging();
    test_phase!("completed_send_wakes_next_sender_while_room_remains");
    let bus = Bus::new();
    let channel = bus.open(4);
    bus.try_send_many(channel, &[0, 1, 2, 3]).expect("fill");
    let mut runtime = runtime();

    for value in [10, 20] {
        let sender = bus.clone();
        runtime.spawn(async move {
            sender.send(channel, value).await.expect("send");
        });
    }
    runtime.run_until_quiescent();
    assert_eq!(runtime.live_tasks(), 2);

    // One drain wakes the first sender; the second is woken by the first
    // sender's own completion, with no further receiver involvement.
    let mut buf = [0; 4];
    assert_eq!(bus.try_recv_many(channel, &mut buf), Ok(4));
    runtime.run_until_quiescent();

    assert_eq!(runtime.live_tasks(), 0);
    assert_eq!(bus.try_recv(channel), Ok(10));
    assert_eq!(bus.try_recv(channel), Ok(20));
    test_complete!("completed_send_wakes_next_sender_while_room_remains");
}

#[test]
fn completed_recv_wakes_next_receiver_while_data_remains() {
    init_test_logging();
    test_phase!("completed_recv_wakes_next_receiver_while_data_remains");
    let bus = Bus::new();
    let channel = bus.open(4);
    let mut runtime = runtime();

    let deliveries = Rc::new(RefCell::new(Vec::new()));
    for _ in 0..2 {
        let sink = Rc::clone(&deliveries);
        let receiver = bus.clone();
        runtime.spawn(async move {
            let mut buf = [0; 2];
            let n = receiver.recv_many(channel, &mut buf).await.expect("recv");
            sink.borrow_mut().push(buf[..n].to_vec());
        });
    }
    runtime.run_until_quiescent();
    assert_eq!(runtime.live_tasks(), 2);

    // One send wakes only the first receiver; its completion leaves data
    // behind and chain-wakes the second.
    assert_eq!(bus.try_send_many(channel, &[1, 2, 3, 4]), Ok(4));
    runtime.run_until_quiescent();

    assert_eq!(*deliveries.borrow(), vec![vec![1, 2], vec![3, 4]]);
    assert_eq!(runtime.live_tasks(), 0);
    test_complete!("completed_recv_wakes_next_receiver_while_data_remains");
}

#[test]
fn vectorized_round_trip_through_tasks() {
    init_test_logging();
    test_phase!("vectorized_round_trip_through_tasks");
    let bus = Bus::new();
    let channel = bus.open(3);
    let mut runtime = runtime();

    let values: Vec<Message> = (100..110).collect();
    let producer = bus.clone();
    let to_send = values.clone();
    runtime.spawn(async move {
        let mut sent = 0;
        while sent < to_send.len() {
            sent += producer
                .send_many(channel, &to_send[sent..])
                .await
                .expect("send");
        }
    });

    let received = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&received);
    let consumer = bus.clone();
    let total = values.len();
    runtime.spawn(async move {
        while sink.borrow().len() < total {
            let mut buf = [0; 4];
            let n = consumer.recv_many(channel, &mut buf).await.expect("recv");
            sink.borrow_mut().extend_from_slice(&buf[..n]);
        }
    });

    runtime.run_until_quiescent();

    assert_eq!(*received.borrow(), values);
    assert_eq!(runtime.live_tasks(), 0);
    assert_eq!(bus.channel_len(channel), Some(0));
    test_complete!("vectorized_round_trip_through_tasks");
}

#[test]
fn broadcast_blocks_until_every_channel_has_room() {
    init_test_logging();
    test_phase!("broadcast_blocks_until_every_channel_has_room");
    let bus = Bus::new();
    let open_a = bus.open(1);
    let full_b = bus.open(1);
    bus.try_send(full_b, 99).expect("fill b");
    let mut runtime = runtime();

    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    let caster = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(caster.broadcast(5).await);
    });

    runtime.run_until_quiescent();
    assert!(outcome.borrow().is_none());
    // Atomicity while blocked: the empty channel stays empty.
    assert_eq!(bus.channel_len(open_a), Some(0));

    // Draining the full channel re-triggers the whole-bus retry.
    assert_eq!(bus.try_recv(full_b), Ok(99));
    runtime.run_until_quiescent();

    assert_eq!(*outcome.borrow(), Some(Ok(())));
    assert_eq!(bus.try_recv(open_a), Ok(5));
    assert_eq!(bus.try_recv(full_b), Ok(5));
    test_complete!("broadcast_blocks_until_every_channel_has_room");
}

#[test]
fn broadcast_retry_rechecks_channels_opened_meanwhile() {
    init_test_logging();
    test_phase!("broadcast_retry_rechecks_channels_opened_meanwhile");
    let bus = Bus::new();
    let blocker = bus.open(1);
    bus.try_send(blocker, 1).expect("fill");
    let mut runtime = runtime();

    let outcome = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&outcome);
    let caster = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(caster.broadcast(5).await);
    });
    runtime.run_until_quiescent();
    assert!(outcome.borrow().is_none());

    // A channel opened while the broadcaster sleeps is part of the retry.
    let late = bus.open(2);
    assert_eq!(bus.try_recv(blocker), Ok(1));
    runtime.run_until_quiescent();

    assert_eq!(*outcome.borrow(), Some(Ok(())));
    assert_eq!(bus.try_recv(blocker), Ok(5));
    assert_eq!(bus.try_recv(late), Ok(5));
    test_complete!("broadcast_retry_rechecks_channels_opened_meanwhile");
}

#[test]
fn waiter_woken_by_close_observes_no_channel() {
    init_test_logging();
    test_phase!("waiter_woken_by_close_observes_no_channel");
    let bus = Bus::new();
    let channel = bus.open(1);
    let mut runtime = runtime();

    let result = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&result);
    let receiver = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(receiver.recv(channel).await);
    });
    runtime.run_until_quiescent();

    bus.close(channel);
    runtime.run_until_quiescent();

    assert_eq!(*result.borrow(), Some(Err(BusError::NoChannel)));
    test_complete!("waiter_woken_by_close_observes_no_channel");
}

#[test]
fn waiter_woken_into_reused_slot_joins_the_new_channel() {
    init_test_logging();
    test_phase!("waiter_woken_into_reused_slot_joins_the_new_channel");
    let bus = Bus::new();
    let channel = bus.open(1);
    let mut runtime = runtime();

    let result = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&result);
    let receiver = bus.clone();
    runtime.spawn(async move {
        *sink.borrow_mut() = Some(receiver.recv(channel).await);
    });
    runtime.run_until_quiescent();

    // Close and reopen before the woken waiter runs: its stale handle now
    // names the replacement channel, so the retry parks there instead of
    // failing: the documented same-integer, different-identity hazard.
    bus.close(channel);
    let replacement = bus.open(1);
    assert_eq!(replacement, channel);
    runtime.run_until_quiescent();

    assert!(result.borrow().is_none());
    assert_eq!(runtime.live_tasks(), 1);

    bus.try_send(replacement, 42).expect("send on replacement");
    runtime.run_until_quiescent();
    assert_eq!(*result.borrow(), Some(Ok(42)));
    test_complete!("waiter_woken_into_reused_slot_joins_the_new_channel");
}
