//! End-to-end call flows between loopback peers

mod common;

use std::time::Duration;

use common::*;
use pretty_assertions::assert_eq;
use rtcall_session_core::loopback::LoopbackHub;
use rtcall_session_core::{
    CallDirection, CallError, CallEvent, CallStatus, MediaKind, TerminationReason, UserId,
};
use serde_json::json;

#[tokio::test]
async fn test_outgoing_call_connects_and_hangs_up() {
    init_tracing();
    let hub = LoopbackHub::new();
    let alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());

    let call_id = alice.session.start_call("bob", MediaKind::Video).await.unwrap();
    let ringing = alice.session.snapshot();
    assert_eq!(ringing.status, CallStatus::Ringing);
    assert_eq!(ringing.call_id.as_ref(), Some(&call_id));
    assert_eq!(ringing.direction, Some(CallDirection::Outgoing));
    assert_eq!(alice.session.armed_timers(), 1);

    let incoming = wait_for_status(&bob.session, CallStatus::Ringing).await;
    assert_eq!(incoming.incoming_caller, Some(UserId::from("alice")));
    assert_eq!(incoming.call_id.as_ref(), Some(&call_id));
    assert_eq!(incoming.media_kind, MediaKind::Video);

    bob.session.accept_call().await.unwrap();
    let connected = wait_until(&alice.session, |s| s.status == CallStatus::Connected && s.remote_stream_attached).await;
    assert!(connected.started_at.is_some());
    wait_until(&bob.session, |s| s.remote_stream_attached).await;

    // Connecting stops the ringback and disarms both timers
    eventually(|| alice.endpoint.tones.active_tones().is_empty()).await;
    eventually(|| bob.endpoint.tones.active_tones().is_empty()).await;
    assert_eq!(alice.session.armed_timers(), 0);
    assert_eq!(bob.session.armed_timers(), 0);
    assert!(alice.endpoint.media.attached_remote(&call_id).is_some());

    alice.session.end_call().await.unwrap();
    wait_for_status(&alice.session, CallStatus::Idle).await;
    wait_for_status(&bob.session, CallStatus::Idle).await;

    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    eventually(|| bob.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.endpoint.media.attached_count(), 0);

    assert_eq!(
        hub.events_from(&UserId::from("alice")),
        vec!["call-user".to_string(), "end-call".to_string()]
    );
    assert_eq!(hub.events_from(&UserId::from("bob")), vec!["accept-call".to_string()]);

    // The callee learns of the hangup from the notice, not from the closed channel
    settle().await;
    let events = drain(&mut bob.events);
    assert_eq!(ended_reasons(&events), vec![TerminationReason::RemoteEnded]);
    assert!(!events.iter().any(|e| matches!(e, CallEvent::CallFailed { .. })));
}

#[tokio::test]
async fn test_remote_hangup_is_never_a_transport_failure() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    for _ in 0..5 {
        connect(&alice, &bob, MediaKind::Audio).await;
        drain(&mut alice.events);
        bob.session.end_call().await.unwrap();
        wait_for_status(&alice.session, CallStatus::Idle).await;
        wait_for_status(&bob.session, CallStatus::Idle).await;

        let events = drain(&mut alice.events);
        assert!(!events.iter().any(|e| matches!(e, CallEvent::CallFailed { .. })));
        assert_eq!(ended_reasons(&events), vec![TerminationReason::RemoteEnded]);
    }

    settle().await;
    assert!(drain(&mut alice.events).is_empty());
    assert_eq!(alice.session.armed_timers(), 0);
}

#[tokio::test]
async fn test_status_sequence_for_answered_call() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    connect(&alice, &bob, MediaKind::Audio).await;
    alice.session.end_call().await.unwrap();
    wait_for_status(&alice.session, CallStatus::Idle).await;
    settle().await;

    let events = drain(&mut alice.events);
    let transitions: Vec<(CallStatus, CallStatus)> = events
        .iter()
        .filter_map(|e| match e {
            CallEvent::StatusChanged { from, to, .. } => Some((*from, *to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            (CallStatus::Idle, CallStatus::Ringing),
            (CallStatus::Ringing, CallStatus::Connected),
            (CallStatus::Connected, CallStatus::Ended),
            (CallStatus::Ended, CallStatus::Idle),
        ]
    );
    assert_eq!(count_ended(&events), 1);
    // A local hangup is not a failure
    assert!(!events.iter().any(|e| matches!(e, CallEvent::CallFailed { .. })));
}

#[tokio::test]
async fn test_call_record_reports_duration() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    connect(&alice, &bob, MediaKind::Audio).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    alice.session.end_call().await.unwrap();

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::LocalHangup);
    assert_eq!(record.direction, CallDirection::Outgoing);
    assert_eq!(record.remote_user, UserId::from("bob"));
    assert!(record.started_at.is_some());
    assert!(record.duration_secs >= 1);
}

#[tokio::test]
async fn test_decline_ends_both_sides() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());

    alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;
    bob.session.decline_call().await.unwrap();

    let CallEvent::CallEnded(callee_record) =
        wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(callee_record.reason, TerminationReason::LocalDecline);

    wait_for_status(&alice.session, CallStatus::Idle).await;
    settle().await;
    let events = drain(&mut alice.events);
    assert!(!events.iter().any(|e| matches!(e, CallEvent::CallFailed { .. })));
    let caller_record = events
        .iter()
        .find_map(|e| match e {
            CallEvent::CallEnded(record) => Some(record.clone()),
            _ => None,
        })
        .expect("caller should report the call");
    assert_eq!(caller_record.reason, TerminationReason::RemoteDeclined);
    assert_eq!(caller_record.duration_secs, 0);
    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    assert!(hub.events_from(&UserId::from("bob")).contains(&"decline-call".to_string()));
}

#[tokio::test]
async fn test_unanswered_call_times_out_as_missed() {
    let hub = LoopbackHub::new();
    let config = test_config().with_ring_timeout(Duration::from_millis(300));
    let mut alice = peer(&hub, "alice", config.clone());
    let bob = peer(&hub, "bob", config);

    alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::Timeout);
    wait_for_status(&bob.session, CallStatus::Idle).await;

    assert!(hub.events_from(&UserId::from("alice")).contains(&"missed-call".to_string()));
    assert!(hub.events_from(&UserId::from("bob")).is_empty());
    eventually(|| alice.endpoint.tones.active_tones().is_empty()).await;
    eventually(|| bob.endpoint.tones.active_tones().is_empty()).await;
}

#[tokio::test]
async fn test_incoming_ring_timeout_sends_nothing() {
    let hub = LoopbackHub::new();
    let config = test_config().with_ring_timeout(Duration::from_millis(200));
    let mut bob = peer(&hub, "bob", config);

    hub.inject(
        &UserId::from("bob"),
        "incoming-call",
        json!({ "from": "ghost", "to": "bob", "callId": "c-1", "callType": "audio" }),
    )
    .unwrap();

    let event = wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::IncomingCall { .. })).await;
    assert_eq!(
        event,
        CallEvent::IncomingCall {
            call_id: "c-1".into(),
            from: UserId::from("ghost"),
            media_kind: MediaKind::Audio,
        }
    );

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::Timeout);
    assert_eq!(record.direction, CallDirection::Incoming);
    assert!(hub.relayed().is_empty());
    assert_eq!(bob.session.snapshot().status, CallStatus::Idle);
}

#[tokio::test]
async fn test_notice_for_another_call_is_ignored() {
    let hub = LoopbackHub::new();
    let mut bob = peer(&hub, "bob", test_config());
    let bob_id = UserId::from("bob");

    hub.inject(
        &bob_id,
        "incoming-call",
        json!({ "from": "ghost", "to": "bob", "callId": "c-1" }),
    )
    .unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;

    hub.inject(&bob_id, "call-ended", json!({ "from": "ghost", "to": "bob", "callId": "c-0" }))
        .unwrap();
    settle().await;
    assert_eq!(bob.session.snapshot().status, CallStatus::Ringing);
    assert_eq!(count_ended(&drain(&mut bob.events)), 0);

    hub.inject(&bob_id, "call-ended", json!({ "from": "ghost", "to": "bob", "callId": "c-1" }))
        .unwrap();
    let CallEvent::CallEnded(record) =
        wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::RemoteEnded);
}

#[tokio::test]
async fn test_duplicate_incoming_notice_is_ignored() {
    let hub = LoopbackHub::new();
    let mut bob = peer(&hub, "bob", test_config());
    let bob_id = UserId::from("bob");
    let payload = json!({ "from": "ghost", "to": "bob", "callId": "c-1" });

    hub.inject(&bob_id, "incoming-call", payload.clone()).unwrap();
    hub.inject(&bob_id, "incoming-call", payload).unwrap();
    wait_for_status(&bob.session, CallStatus::Ringing).await;
    settle().await;

    let incoming = drain(&mut bob.events)
        .into_iter()
        .filter(|e| matches!(e, CallEvent::IncomingCall { .. }))
        .count();
    assert_eq!(incoming, 1);
    // A duplicate is not a second caller, so nothing is declined
    assert!(hub.relayed().is_empty());
}

#[tokio::test]
async fn test_capture_denied_fails_outgoing_call() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let _bob = peer(&hub, "bob", test_config());
    alice.endpoint.media.deny_permission(true);

    alice.session.start_call("bob", MediaKind::Video).await.unwrap();

    let failed = wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallFailed { .. })).await;
    let CallEvent::CallFailed { error, .. } = failed else {
        unreachable!()
    };
    assert!(error.contains("denied"), "unexpected error: {}", error);

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::CaptureDenied);
    wait_for_status(&alice.session, CallStatus::Idle).await;
    assert!(hub.relayed().is_empty());
    assert_eq!(alice.session.armed_timers(), 0);
}

#[tokio::test]
async fn test_unreachable_peer_fails_placement() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());

    alice.session.start_call("nobody", MediaKind::Audio).await.unwrap();

    wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallFailed { .. })).await;
    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::PlacementFailed);
    assert!(hub.relayed().is_empty());
    eventually(|| alice.endpoint.media.live_streams() == 0).await;
    assert_eq!(alice.endpoint.media.acquired_count(), 1);
}

#[tokio::test]
async fn test_busy_callee_rejects_second_caller() {
    let hub = LoopbackHub::new();
    let alice = peer(&hub, "alice", test_config());
    let mut bob = peer(&hub, "bob", test_config());
    let carol = peer(&hub, "carol", test_config());

    connect(&alice, &bob, MediaKind::Audio).await;
    drain(&mut bob.events);

    carol.session.start_call("bob", MediaKind::Audio).await.unwrap();
    let rejected = wait_for_event(&mut bob.events, |e| matches!(e, CallEvent::BusyRejected { .. })).await;
    assert!(matches!(rejected, CallEvent::BusyRejected { ref from, .. } if from.as_str() == "carol"));

    wait_for_status(&carol.session, CallStatus::Idle).await;
    assert_eq!(bob.session.snapshot().status, CallStatus::Connected);
    assert_eq!(bob.session.snapshot().remote_user, Some(UserId::from("alice")));
    assert_eq!(hub.events_from(&UserId::from("bob")), vec!["accept-call", "decline-call"]);
    eventually(|| carol.endpoint.media.live_streams() == 0).await;
}

#[tokio::test]
async fn test_commands_rejected_outside_their_state() {
    let hub = LoopbackHub::new();
    let alice = peer(&hub, "alice", test_config());
    let _bob = peer(&hub, "bob", test_config());

    assert!(matches!(
        alice.session.accept_call().await,
        Err(CallError::InvalidState { .. })
    ));
    assert!(matches!(
        alice.session.end_call().await,
        Err(CallError::InvalidState { .. })
    ));
    assert!(matches!(
        alice.session.start_call("alice", MediaKind::Audio).await,
        Err(CallError::InvalidTarget { .. })
    ));
    assert!(matches!(
        alice.session.start_call("  ", MediaKind::Audio).await,
        Err(CallError::InvalidTarget { .. })
    ));

    alice.session.start_call("bob", MediaKind::Audio).await.unwrap();
    assert!(matches!(
        alice.session.start_call("bob", MediaKind::Audio).await,
        Err(CallError::SessionBusy { .. })
    ));
    // Only the called side answers
    assert!(matches!(
        alice.session.accept_call().await,
        Err(CallError::InvalidState { .. })
    ));
}

#[tokio::test]
async fn test_toggle_mute_flips_local_audio() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    assert!(!alice.session.toggle_mute().await.unwrap());

    connect(&alice, &bob, MediaKind::Audio).await;
    assert!(alice.session.toggle_mute().await.unwrap());
    assert!(alice.session.snapshot().muted);
    wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::MuteChanged { muted: true, .. })).await;

    assert!(!alice.session.toggle_mute().await.unwrap());
    assert!(!alice.session.snapshot().muted);
}

#[tokio::test]
async fn test_unlock_audio_resumes_output_once() {
    let hub = LoopbackHub::new();
    let alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    alice.session.unlock_audio().await.unwrap();
    alice.session.unlock_audio().await.unwrap();
    connect(&alice, &bob, MediaKind::Audio).await;
    settle().await;

    assert_eq!(alice.endpoint.tones.resume_count(), 1);
    // Answering is a user gesture too
    assert_eq!(bob.endpoint.tones.resume_count(), 1);
}

#[tokio::test]
async fn test_shutdown_ends_active_call() {
    let hub = LoopbackHub::new();
    let mut alice = peer(&hub, "alice", test_config());
    let bob = peer(&hub, "bob", test_config());

    connect(&alice, &bob, MediaKind::Audio).await;
    alice.session.shutdown().await.unwrap();

    let CallEvent::CallEnded(record) =
        wait_for_event(&mut alice.events, |e| matches!(e, CallEvent::CallEnded(_))).await
    else {
        unreachable!()
    };
    assert_eq!(record.reason, TerminationReason::Shutdown);
    wait_for_status(&bob.session, CallStatus::Idle).await;
    eventually(|| !alice.session.is_running()).await;
    eventually(|| alice.endpoint.media.live_streams() == 0).await;

    assert!(matches!(
        alice.session.start_call("bob", MediaKind::Audio).await,
        Err(CallError::Shutdown)
    ));
}
