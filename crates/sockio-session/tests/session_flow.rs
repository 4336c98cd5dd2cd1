//! End-to-end session behavior over an in-memory transport pair.
//!
//! The test holds the peer end and speaks raw wire frames to the session.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use serde_json::json;
use sockio_core::{MessageType, decode};
use sockio_session::{Client, OverflowSet, Session, SessionConfig, SessionError, ShutdownCause};
use sockio_transport::{KeepaliveParams, MemoryTransport, Transport};
use tokio::sync::{Notify, mpsc};

const HANDSHAKE: &str =
    r#"0{"sid":"lv_VI97HAXpY6yYWAAAC","upgrades":["websocket"],"pingInterval":25000,"pingTimeout":60000}"#;

fn client() -> Client {
    Client::default().with_overflow_sink(Arc::new(OverflowSet::new()))
}

fn capped_client(limit: usize) -> Client {
    Client::new(SessionConfig {
        max_concurrent_dispatch: Some(limit),
        ..SessionConfig::default()
    })
    .with_overflow_sink(Arc::new(OverflowSet::new()))
}

fn pair() -> (MemoryTransport, MemoryTransport) {
    MemoryTransport::pair(KeepaliveParams::default())
}

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

/// Next frame from the session that is not a heartbeat.
async fn next_frame(peer: &MemoryTransport) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), peer.receive_frame())
            .await
            .unwrap()
            .unwrap();
        if frame != "2" {
            return frame;
        }
    }
}

// ── Handshake and lifecycle ─────────────────────────────────────────────────

#[tokio::test]
async fn handshake_sets_id_and_fires_connect() {
    let client = client();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = client.on_connect(move |s: &Session| {
        let _ = tx.send(s.id());
    });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    assert_eq!(session.id(), "");

    peer.send_frame(HANDSHAKE).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), "lv_VI97HAXpY6yYWAAAC");
    assert_eq!(session.id(), "lv_VI97HAXpY6yYWAAAC");
    let header = session.header().unwrap();
    assert_eq!(header.upgrades, vec!["websocket".to_string()]);
    assert_eq!(header.ping_interval, Duration::from_millis(25_000));

    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn duplicate_handshake_is_ignored() {
    let client = client();
    let connects = Arc::new(AtomicUsize::new(0));
    {
        let connects = connects.clone();
        let _ = client.on_connect(move |_s| {
            let _ = connects.fetch_add(1, Ordering::SeqCst);
        });
    }
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(HANDSHAKE).await.unwrap();
    peer.send_frame(r#"0{"sid":"second"}"#).await.unwrap();
    peer.send_frame("2").await.unwrap();
    assert_eq!(next_frame(&peer).await, "3");

    assert_eq!(session.id(), "lv_VI97HAXpY6yYWAAAC");
    assert_eq!(connects.load(Ordering::SeqCst), 1);
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn peer_close_packet_shuts_down_once() {
    let client = client();
    let disconnects = Arc::new(AtomicUsize::new(0));
    {
        let disconnects = disconnects.clone();
        let _ = client.on_disconnect(move |_s| {
            let _ = disconnects.fetch_add(1, Ordering::SeqCst);
        });
    }
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(HANDSHAKE).await.unwrap();
    peer.send_frame("1").await.unwrap();

    tasks.join().await.unwrap();
    assert!(!session.is_alive());
    assert_eq!(session.shutdown_cause(), Some(ShutdownCause::PeerClosed));
    session.close();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn peer_dropping_transport_is_a_clean_close() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.close();
    tasks.join().await.unwrap();
    assert_eq!(session.shutdown_cause(), Some(ShutdownCause::PeerClosed));
}

#[tokio::test]
async fn local_close_is_seen_by_peer() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    session.close();
    let err = peer.receive_frame().await.unwrap_err();
    assert!(err.is_expected_closure());
    tasks.join().await.unwrap();
    assert_eq!(session.shutdown_cause(), Some(ShutdownCause::Local));
}

#[tokio::test]
async fn concurrent_close_fires_disconnect_once() {
    let client = client();
    let disconnects = Arc::new(AtomicUsize::new(0));
    {
        let disconnects = disconnects.clone();
        let _ = client.on_disconnect(move |_s| {
            let _ = disconnects.fetch_add(1, Ordering::SeqCst);
        });
    }
    let (transport, _peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    let closers: Vec<_> = (0..16)
        .map(|_| {
            let session = session.clone();
            tokio::spawn(async move { session.close() })
        })
        .collect();
    for closer in closers {
        closer.await.unwrap();
    }
    tasks.join().await.unwrap();
    assert_eq!(disconnects.load(Ordering::SeqCst), 1);
}

// ── Protocol failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn undecodable_frame_is_fatal() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame("4").await.unwrap();
    assert_matches!(tasks.join().await, Err(SessionError::Decode(_)));
    assert_matches!(session.shutdown_cause(), Some(ShutdownCause::Protocol(_)));
}

#[tokio::test]
async fn invalid_handshake_is_fatal() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame("0not json").await.unwrap();
    assert_matches!(tasks.join().await, Err(SessionError::Handshake(_)));
    assert_matches!(session.shutdown_cause(), Some(ShutdownCause::Handshake(_)));
}

#[tokio::test]
async fn empty_packet_and_pong_are_ignored() {
    let client = client();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = client.on("tick", move |_s: Session, n: u32| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(n);
        }
    });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame("40").await.unwrap();
    peer.send_frame("3").await.unwrap();
    peer.send_frame(r#"42["tick",1]"#).await.unwrap();
    assert_eq!(rx.recv().await, Some(1));
    assert!(session.is_alive());
    session.close();
    tasks.join().await.unwrap();
}

// ── Events and heartbeats ───────────────────────────────────────────────────

#[tokio::test]
async fn inbound_emit_reaches_handler() {
    let client = client();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = client.on("greet", move |_s: Session, text: String| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(text);
        }
    });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(HANDSHAKE).await.unwrap();
    peer.send_frame(r#"42["greet","hi"]"#).await.unwrap();
    assert_eq!(rx.recv().await.unwrap(), "hi");
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn outbound_emit_reaches_peer() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    session.emit("chat", &json!({"text": "yo"})).unwrap();
    session.emit_bare("leave").unwrap();
    assert_eq!(next_frame(&peer).await, r#"42["chat",{"text":"yo"}]"#);
    assert_eq!(next_frame(&peer).await, r#"42["leave"]"#);
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame("2").await.unwrap();
    assert_eq!(next_frame(&peer).await, "3");
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn keepalive_follows_negotiated_interval() {
    let client = client();
    let (transport, peer) = MemoryTransport::pair(KeepaliveParams {
        interval: Duration::from_millis(500),
        timeout: Duration::from_secs(5),
    });
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(r#"0{"sid":"k","pingInterval":2000,"pingTimeout":5000}"#)
        .await
        .unwrap();

    // The first ping may still use the transport default.
    assert_eq!(peer.receive_frame().await.unwrap(), "2");
    let first = tokio::time::Instant::now();
    assert_eq!(peer.receive_frame().await.unwrap(), "2");
    assert!(first.elapsed() >= Duration::from_millis(2000));

    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn handler_panic_does_not_kill_session() {
    let client = client();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _ = client.on_bare("boom", |_s: Session| async {
        panic!("handler exploded");
    });
    let _ = client.on_bare("after", move |_s: Session| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(());
        }
    });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect_serialized(transport).unwrap();
    peer.send_frame(r#"42["boom"]"#).await.unwrap();
    peer.send_frame(r#"42["after"]"#).await.unwrap();
    rx.recv().await.unwrap();
    assert!(session.is_alive());
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn serialized_dispatch_preserves_arrival_order() {
    let client = client();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        let _ = client.on("step", move |_s: Session, n: u64| {
            let seen = seen.clone();
            async move {
                // Earlier messages sleep longer; order must still hold.
                tokio::time::sleep(Duration::from_millis(20 - n * 2)).await;
                seen.lock().push(n);
            }
        });
    }
    let (transport, peer) = pair();
    let (session, tasks) = client.connect_serialized(transport).unwrap();
    for n in 0..10 {
        peer.send_frame(&format!(r#"42["step",{n}]"#)).await.unwrap();
    }
    eventually(|| seen.lock().len() == 10).await;
    assert_eq!(*seen.lock(), (0..10).collect::<Vec<u64>>());
    session.close();
    tasks.join().await.unwrap();
}

// ── Acknowledgments ─────────────────────────────────────────────────────────

#[tokio::test]
async fn ack_round_trip() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.ack("sum", &[1, 2], Duration::from_secs(5)).await })
    };
    let request = decode(&next_frame(&peer).await).unwrap();
    assert_eq!(request.kind, MessageType::AckRequest);
    assert_eq!(request.method, "sum");
    assert_eq!(request.args, "[1,2]");

    peer.send_frame(&format!("43{}[3]", request.ack_id)).await.unwrap();
    assert_eq!(call.await.unwrap().unwrap(), "3");
    assert_eq!(session.pending_acks(), 0);
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn peer_ack_request_is_answered() {
    let client = client();
    let _ = client.on_ack("sum", |_s: Session, nums: Vec<i64>| async move { nums.iter().sum::<i64>() });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(r#"427["sum",[1,2]]"#).await.unwrap();
    assert_eq!(next_frame(&peer).await, "437[3]");
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn concurrent_acks_use_distinct_ids() {
    const CALLS: u64 = 16;
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    let calls: Vec<_> = (0..CALLS)
        .map(|n| {
            let session = session.clone();
            tokio::spawn(async move { (n, session.ack("echo", &n, Duration::from_secs(5)).await) })
        })
        .collect();

    let mut ids = HashSet::new();
    for _ in 0..CALLS {
        let request = decode(&next_frame(&peer).await).unwrap();
        assert_eq!(request.kind, MessageType::AckRequest);
        assert!(ids.insert(request.ack_id), "duplicate ack id {}", request.ack_id);
        peer.send_frame(&format!("43{}[{}]", request.ack_id, request.args))
            .await
            .unwrap();
    }

    for call in calls {
        let (n, reply) = call.await.unwrap();
        assert_eq!(reply.unwrap(), n.to_string());
    }
    assert_eq!(session.pending_acks(), 0);
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ack_timeout_fires_after_deadline_and_leaves_no_entry() {
    let client = client();
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    let started = tokio::time::Instant::now();
    let result = session.ack("slow", &(), Duration::from_secs(2)).await;
    assert_matches!(result, Err(SessionError::AckTimeout(d)) if d == Duration::from_secs(2));
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(session.pending_acks(), 0);

    // The request itself did go out.
    let request = decode(&peer.receive_frame().await.unwrap()).unwrap();
    assert_eq!(request.kind, MessageType::AckRequest);
    // A late reply is dropped without disturbing the session.
    peer.send_frame(&format!("43{}[1]", request.ack_id)).await.unwrap();
    assert!(session.is_alive());

    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn close_resolves_pending_ack() {
    let client = client();
    let (transport, _peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    let call = {
        let session = session.clone();
        tokio::spawn(async move { session.ack("never", &(), Duration::from_secs(60)).await })
    };
    eventually(|| session.pending_acks() == 1).await;
    client.close();
    assert_matches!(call.await.unwrap(), Err(SessionError::Closed));
    assert_matches!(session.ack("late", &(), Duration::from_secs(1)).await, Err(SessionError::Closed));
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn argless_ack_request_is_answered() {
    let client = client();
    let _ = client.on_ack_bare("now", |_s: Session| async { "tick" });
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    peer.send_frame(r#"427["now"]"#).await.unwrap();
    assert_eq!(next_frame(&peer).await, r#"437["tick"]"#);
    session.close();
    tasks.join().await.unwrap();
}

/// A handler that requests an ack from the peer and reports the outcome.
fn register_nested(client: &Client) -> mpsc::UnboundedReceiver<Result<String, String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let _ = client.on_bare("nested", move |s: Session| {
        let tx = tx.clone();
        async move {
            let reply = s.ack("inner", &1, Duration::from_secs(2)).await;
            let _ = tx.send(reply.map_err(|e| e.to_string()));
        }
    });
    rx
}

#[tokio::test]
async fn nested_ack_completes_while_dispatch_cap_is_held() {
    let client = capped_client(1);
    let mut outcome = register_nested(&client);
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();

    peer.send_frame(r#"42["nested"]"#).await.unwrap();
    let request = decode(&next_frame(&peer).await).unwrap();
    assert_eq!(request.method, "inner");
    peer.send_frame(&format!(r#"43{}["ok"]"#, request.ack_id)).await.unwrap();
    peer.send_frame("2").await.unwrap();

    assert_eq!(next_frame(&peer).await, "3");
    assert_eq!(outcome.recv().await.unwrap(), Ok("\"ok\"".to_string()));
    assert_eq!(session.pending_acks(), 0);
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn serialized_handler_can_await_ack() {
    let client = client();
    let mut outcome = register_nested(&client);
    let (transport, peer) = pair();
    let (session, tasks) = client.connect_serialized(transport).unwrap();

    peer.send_frame(r#"42["nested"]"#).await.unwrap();
    let request = decode(&next_frame(&peer).await).unwrap();
    peer.send_frame(&format!("43{}[7]", request.ack_id)).await.unwrap();

    assert_eq!(outcome.recv().await.unwrap(), Ok("7".to_string()));
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn dispatch_cap_bounds_running_handlers() {
    const JOBS: usize = 6;
    let client = capped_client(2);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicUsize::new(0));
    {
        let (running, peak, done) = (running.clone(), peak.clone(), done.clone());
        let _ = client.on_bare("work", move |_s: Session| {
            let (running, peak, done) = (running.clone(), peak.clone(), done.clone());
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                let _ = running.fetch_sub(1, Ordering::SeqCst);
                let _ = done.fetch_add(1, Ordering::SeqCst);
            }
        });
    }
    let (transport, peer) = pair();
    let (session, tasks) = client.connect(transport).unwrap();
    for _ in 0..JOBS {
        peer.send_frame(r#"42["work"]"#).await.unwrap();
    }

    eventually(|| done.load(Ordering::SeqCst) == JOBS).await;
    let peak = peak.load(Ordering::SeqCst);
    assert!((1..=2).contains(&peak), "peak concurrency {peak}");
    session.close();
    tasks.join().await.unwrap();
}

#[tokio::test]
async fn queued_messages_still_run_after_close() {
    let client = client();
    let gate = Arc::new(Notify::new());
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let (started_tx, mut started) = mpsc::unbounded_channel();
    {
        let (gate, seen) = (gate.clone(), seen.clone());
        let _ = client.on("job", move |_s: Session, n: u32| {
            let (gate, seen, started_tx) = (gate.clone(), seen.clone(), started_tx.clone());
            async move {
                if n == 0 {
                    let _ = started_tx.send(());
                    gate.notified().await;
                }
                seen.lock().push(n);
            }
        });
    }
    let (transport, peer) = pair();
    let (session, tasks) = client.connect_serialized(transport).unwrap();

    peer.send_frame(r#"42["job",0]"#).await.unwrap();
    started.recv().await.unwrap();
    peer.send_frame(r#"42["job",1]"#).await.unwrap();
    peer.send_frame(r#"42["job",2]"#).await.unwrap();
    eventually(|| session.inbound_len() == 2).await;

    session.close();
    gate.notify_one();
    eventually(|| seen.lock().len() == 3).await;
    assert_eq!(*seen.lock(), vec![0, 1, 2]);
    tasks.join().await.unwrap();
}
