//! Exactly-once cleanup under racing terminations and late completions

mod common;

use std::time::Duration;

use common::*;
use rtcall_session_core::loopback::LoopbackHub;
use rtcall_session_core::{CallEvent, CallStatus, MediaKind, TerminationReason, UserId};

#[tokio::test]
async fn test_simultaneous_hangups_end_each_side_once() {
    init_tracing();
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());

    connect(&alice, &bob, MediaKind::Audio).await;
    drain(&mut alice.events);
    drain(&mut bob.events);

    let (a, b) = tokio::join!(alice.session.end_call(), bob.session.end_call());
    // The loser of the race may already be idle
    assert!(a.is_ok() || b.is_ok());

    wait_for_status(&alice.session, CallStatus::Idle).await;
    wait_for_status(&bob.session, CallStatus::Idle).await;
    settle().await;

    assert_eq!(count_ended(&drain(&mut alice.events)), 1);
    assert_eq!(count_ended(&drain(&mut bob.events)), 1);
    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    eventually(|| bob.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.endpoint.media.released_count(), 1);
    assert_eq!(bob.endpoint.media.released_count(), 1);
}

#[tokio::test]
async fn test_stop_after_accept_releases_late_capture() {
    let hub = LoopbackHub::new();
    let alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());
    bob.endpoint.media.hold_acquisitions();

    let call_id = alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;
    bob.session.accept_call().await.unwrap();
    assert_eq!(bob.session.snapshot().status, CallStatus::Connected);

    // The relay force-terminates the call while the microphone is still pending
    assert!(hub.stop_call(&UserId::from("bob"), &call_id));
    let CallEvent::CallEnded(record) =
        wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::RemoteStopped);
    assert_eq!(bob.session.snapshot().status, CallStatus::Idle);

    bob.endpoint.media.release_acquisitions(1);
    eventually(|| bob.endpoint.media.acquired_count() == 1).await;
    eventually(|| bob.endpoint.media.live_streams() == 0).await;
    settle().await;

    // The late stream never revived the session
    assert_eq!(bob.session.snapshot().status, CallStatus::Idle);
    assert_eq!(count_ended(&drain(&mut bob.events)), 0);
    assert!(!hub.events_from(&UserId::from("bob")).contains(&"accept-call".to_string()));

    // Closing bob's channel tears down the caller's side as well
    wait_for_status(&alice.session, CallStatus::Idle).await;
}

#[tokio::test]
async fn test_hangup_while_capture_pending_releases_stream() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let _bob = peer(&hub, "bob", test_config());
    alice.endpoint.media.hold_acquisitions();

    alice.session.start_call("bob", MediaKind::Video).await.unwrap();
    alice.session.end_call().await.unwrap();
    assert_eq!(alice.session.snapshot().status, CallStatus::Idle);

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::LocalHangup);

    alice.endpoint.media.open_gate();
    eventually(|| alice.endpoint.media.acquired_count() == 1).await;
    eventually(|| alice.endpoint.media.live_streams() == 0).await;

    // Nothing reached the relay: call-user was never sent
    assert!(hub.relayed().is_empty());
}

#[tokio::test]
async fn test_ring_timeout_fires_once() {
    let hub = LoopbackHub::new();
    let config = test_config().with_ring_timeout(Duration::from_millis(150));
    let mut alice = peer(&hub, "alice", config);

    // No such user: placement fails fast, so hold capture to stay ringing
    alice.endpoint.media.hold_acquisitions();
    alice.session.start_call("nobody", MediaKind::Audio).await.unwrap();
    assert_eq!(alice.session.armed_timers(), 1);

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::Timeout);
    assert_eq!(alice.session.armed_timers(), 0);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(count_ended(&drain(&mut alice.events)), 0);
    alice.endpoint.media.open_gate();
    eventually(|| alice.endpoint.media.live_streams() == 0 && alice.endpoint.media.acquired_count() == 1).await;
}

#[tokio::test]
async fn test_connected_call_outlives_ring_timeout() {
    let hub = LoopbackHub::new();
    let config = test_config().with_ring_timeout(Duration::from_millis(400));
    let alice = peer(&hub, "alice", config.clone());
    let bob = peer(&hub, "bob", config);

    connect(&alice, &bob, MediaKind::Audio).await;
    tokio::time::sleep(Duration::from_millis(600)).await;

    assert_eq!(alice.session.snapshot().status, CallStatus::Connected);
    assert_eq!(bob.session.snapshot().status, CallStatus::Connected);
    assert_eq!(alice.session.armed_timers(), 0);
    assert_eq!(bob.session.armed_timers(), 0);
}

#[tokio::test]
async fn test_back_to_back_calls_reuse_session() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    for _ in 0..3 {
        connect(&alice, &bob, MediaKind::Audio).await;
        bob.session.end_call().await.unwrap();
        wait_for_status(&alice.session, CallStatus::Idle).await;
        wait_for_status(&bob.session, CallStatus::Idle).await;
    }
    settle().await;

    assert_eq!(count_ended(&drain(&mut alice.events)), 3);
    eventually(|| alice.endpoint.media.live_streams() == 0 && bob.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.endpoint.media.acquired_count(), 3);
    assert_eq!(alice.endpoint.media.attached_count(), 0);
    assert!(alice.endpoint.tones.active_tones().is_empty());
}

#[tokio::test]
async fn test_transport_error_mid_call_reports_duration() {
    init_tracing();
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());
    let alice_id = UserId::from("alice");

    connect(&alice, &bob, MediaKind::Audio).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain(&mut alice.events);

    assert_eq!(hub.fail_channel(&alice_id, "ice connection failed"), 1);
    wait_for_status(&alice.session, CallStatus::Idle).await;
    wait_for_status(&bob.session, CallStatus::Idle).await;
    settle().await;

    let events = drain(&mut alice.events);
    assert_eq!(ended_reasons(&events), vec![TerminationReason::TransportError]);
    let error = events
        .iter()
        .find_map(|e| match e {
            CallEvent::CallFailed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .expect("transport errors are reported");
    assert!(error.contains("ice connection failed"), "unexpected error: {}", error);

    // The peer is told how long the call lasted
    let end_call = hub
        .relayed()
        .into_iter()
        .find(|m| m.from == alice_id && m.event == "end-call")
        .expect("end-call was sent");
    assert!(end_call.payload["duration"].as_u64().unwrap() >= 1);
    assert_eq!(ended_reasons(&drain(&mut bob.events)), vec![TerminationReason::RemoteEnded]);

    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.endpoint.media.released_count(), 1);
    assert_eq!(alice.session.armed_timers(), 0);
}

#[tokio::test]
async fn test_transport_error_while_ringing_sends_nothing() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());
    let alice_id = UserId::from("alice");

    alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;
    eventually(|| hub.events_from(&alice_id) == vec!["call-user".to_string()]).await;

    assert_eq!(hub.fail_channel(&alice_id, "dtls failed"), 1);
    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::TransportError);
    assert_eq!(record.duration_secs, 0);
    assert_eq!(hub.events_from(&alice_id), vec!["call-user".to_string()]);
    eventually(|| alice.endpoint.media.live_streams() == 0).await;
}

#[tokio::test]
async fn test_channel_closed_without_notice_ends_after_grace() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());
    let alice_id = UserId::from("alice");

    let call_id = alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;
    bob.session.accept_call().await.unwrap();
    wait_until(&alice.session, |s| s.status == CallStatus::Connected && s.remote_stream_attached).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    drain(&mut alice.events);

    // The relay drops bob; his side closes the channel and tells alice nothing
    assert!(hub.stop_call(&UserId::from("bob"), &call_id));
    wait_for_status(&bob.session, CallStatus::Idle).await;

    wait_for_status(&alice.session, CallStatus::Idle).await;
    settle().await;
    let events = drain(&mut alice.events);
    assert_eq!(ended_reasons(&events), vec![TerminationReason::TransportClosed]);
    assert!(events.iter().any(|e| matches!(e, CallEvent::CallFailed { .. })));

    let end_call = hub
        .relayed()
        .into_iter()
        .find(|m| m.from == alice_id && m.event == "end-call")
        .expect("a dropped call still reports its duration");
    assert!(end_call.payload["duration"].as_u64().unwrap() >= 1);
    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.session.armed_timers(), 0);
}

#[tokio::test]
async fn test_shutdown_releases_capture_resolving_at_the_same_time() {
    for _ in 0..5 {
        let hub = LoopbackHub::new();
        let alice = peer(&hub, "alice", test_config());
        let _bob = peer(&hub, "bob", test_config());
        alice.endpoint.media.hold_acquisitions();

        alice.session.start_call("bob", MediaKind::Video).await.unwrap();
        alice.endpoint.media.open_gate();
        alice.session.shutdown().await.unwrap();

        eventually(|| !alice.session.is_running()).await;
        eventually(|| alice.endpoint.media.acquired_count() == 1).await;
        eventually(|| alice.endpoint.media.live_streams() == 0).await;
        assert_eq!(alice.session.snapshot().status, CallStatus::Idle);
    }
}
