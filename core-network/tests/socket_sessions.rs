use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use bridge_traits::network::NetworkHandle;
use bytes::Bytes;
use core_network::{BoundNetworkRegistry, SessionState, SocketError, SocketManager};
use core_runtime::config::SocketSettings;
use core_runtime::events::{BridgeEvent, EventBus, EventChannel, EventStream, SocketEventKind};
use futures_util::FutureExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

fn bound_manager(settings: SocketSettings) -> (SocketManager, EventStream) {
    let registry = BoundNetworkRegistry::new();
    registry.set(NetworkHandle::new(1, "lo").with_local_addr(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    let bus = EventBus::new(1024);
    let events = bus.stream(EventChannel::Socket);
    (SocketManager::new(registry, bus, settings), events)
}

async fn next_kind(events: &mut EventStream, socket_id: &str) -> SocketEventKind {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a socket event")
            .unwrap();
        if let BridgeEvent::Socket(event) = event {
            if event.socket_id == socket_id {
                return event.kind;
            }
        }
    }
}

fn nothing_pending(events: &mut EventStream) -> bool {
    events.recv().now_or_never().is_none()
}

async fn open_to_peer(sockets: &SocketManager, socket_id: &str) -> TcpStream {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let ack = sockets.open(socket_id, "127.0.0.1", port, None).unwrap();
    let (peer, _) = listener.accept().await.unwrap();
    assert_eq!(ack.opened().await.as_deref(), Some(socket_id));
    peer
}

#[tokio::test]
async fn test_received_bytes_become_data_events() {
    let (sockets, mut events) = bound_manager(SocketSettings::default());
    let mut peer = open_to_peer(&sockets, "printer").await;
    assert_eq!(sockets.session_state("printer"), Some(SessionState::Open));

    peer.write_all(b"hello").await.unwrap();

    let mut received = Vec::new();
    while received.len() < 5 {
        match next_kind(&mut events, "printer").await {
            SocketEventKind::Data { data } => received.extend_from_slice(&data),
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(received, b"hello");

    sockets.close("printer").await;
}

#[tokio::test]
async fn test_reads_are_chunked_by_receive_buffer() {
    let settings = SocketSettings {
        receive_buffer_size: 4,
        ..SocketSettings::default()
    };
    let (sockets, mut events) = bound_manager(settings);
    let mut peer = open_to_peer(&sockets, "s").await;

    peer.write_all(b"0123456789").await.unwrap();

    let mut received = Vec::new();
    while received.len() < 10 {
        match next_kind(&mut events, "s").await {
            SocketEventKind::Data { data } => {
                assert!(data.len() <= 4);
                received.extend_from_slice(&data);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(received, b"0123456789");

    sockets.close("s").await;
}

#[tokio::test]
async fn test_sends_reach_the_wire_in_order() {
    let (sockets, _events) = bound_manager(SocketSettings::default());
    let mut peer = open_to_peer(&sockets, "s").await;

    let mut expected = Vec::new();
    for i in 0..50u8 {
        let chunk = vec![i; 100];
        expected.extend_from_slice(&chunk);
        sockets.send("s", Bytes::from(chunk)).unwrap();
    }

    let mut received = vec![0u8; expected.len()];
    timeout(WAIT, peer.read_exact(&mut received)).await.unwrap().unwrap();
    assert_eq!(received, expected);

    sockets.close("s").await;
}

#[tokio::test]
async fn test_close_emits_single_disconnected_and_frees_id() {
    let (sockets, mut events) = bound_manager(SocketSettings::default());
    let mut peer = open_to_peer(&sockets, "s").await;

    assert!(sockets.close("s").await);

    // Acknowledged close means the id is free and the event is out.
    assert_eq!(sockets.session_state("s"), None);
    assert_eq!(next_kind(&mut events, "s").await, SocketEventKind::Disconnected);

    let mut buf = [0u8; 1];
    let read = timeout(WAIT, peer.read(&mut buf)).await.unwrap().unwrap();
    assert_eq!(read, 0);

    assert!(sockets.close("s").await);
    assert!(nothing_pending(&mut events));
}

#[tokio::test]
async fn test_remote_eof_ends_session() {
    let (sockets, mut events) = bound_manager(SocketSettings::default());
    let peer = open_to_peer(&sockets, "s").await;

    drop(peer);

    assert_eq!(next_kind(&mut events, "s").await, SocketEventKind::Disconnected);
    timeout(WAIT, async {
        while sockets.session_state("s").is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let err = sockets.send("s", Bytes::from_static(b"x")).unwrap_err();
    assert!(matches!(err, SocketError::NoConnection(_)));
}

#[tokio::test]
async fn test_id_is_reusable_after_close() {
    let (sockets, _events) = bound_manager(SocketSettings::default());
    let _first = open_to_peer(&sockets, "s").await;
    sockets.close("s").await;

    let _second = open_to_peer(&sockets, "s").await;
    assert_eq!(sockets.active_sessions(), vec!["s".to_string()]);

    sockets.close_all().await;
    assert!(sockets.active_sessions().is_empty());
}

#[tokio::test]
async fn test_open_twice_is_rejected() {
    let (sockets, _events) = bound_manager(SocketSettings::default());
    let _peer = open_to_peer(&sockets, "s").await;

    let err = sockets.open("s", "127.0.0.1", 9, None).unwrap_err();
    assert!(matches!(err, SocketError::InUse(_)));

    sockets.close("s").await;
}

#[tokio::test]
async fn test_no_bound_network() {
    let sockets = SocketManager::new(
        BoundNetworkRegistry::new(),
        EventBus::new(16),
        SocketSettings::default(),
    );

    let err = sockets.open("s", "127.0.0.1", 9, None).unwrap_err();

    assert!(matches!(err, SocketError::NoBoundNetwork));
    assert!(sockets.active_sessions().is_empty());
}

#[tokio::test]
async fn test_connect_failure_emits_error_only() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let (sockets, mut events) = bound_manager(SocketSettings::default());

    let ack = sockets.open("s", "127.0.0.1", port, None).unwrap();

    assert!(matches!(
        next_kind(&mut events, "s").await,
        SocketEventKind::Error { .. }
    ));
    assert_eq!(ack.opened().await, None);
    assert_eq!(sockets.session_state("s"), None);
    assert!(nothing_pending(&mut events));
}

#[tokio::test]
async fn test_send_queue_full() {
    let settings = SocketSettings {
        send_queue_capacity: 1,
        ..SocketSettings::default()
    };
    let (sockets, _events) = bound_manager(settings);
    // The peer never reads, so the send worker eventually blocks on a full
    // kernel buffer and the queue fills up.
    let _peer = open_to_peer(&sockets, "s").await;

    let chunk = Bytes::from(vec![0u8; 1024 * 1024]);
    let mut rejected = None;
    for _ in 0..256 {
        if let Err(e) = sockets.send("s", chunk.clone()) {
            rejected = Some(e);
            break;
        }
        tokio::task::yield_now().await;
    }

    let err = rejected.expect("queue never filled");
    assert!(matches!(err, SocketError::QueueFull(_)));
    assert_eq!(
        err.to_string(),
        "Failed to add write queue, queue or connection may be closed."
    );

    sockets.close("s").await;
}

#[tokio::test]
async fn test_peer_reset_emits_error_then_disconnected() {
    let (sockets, mut events) = bound_manager(SocketSettings::default());
    let peer = open_to_peer(&sockets, "s").await;

    // A zero linger turns the close into a reset.
    peer.set_linger(Some(Duration::ZERO)).unwrap();
    drop(peer);

    assert!(matches!(
        next_kind(&mut events, "s").await,
        SocketEventKind::Error { .. }
    ));
    assert_eq!(next_kind(&mut events, "s").await, SocketEventKind::Disconnected);
    assert!(nothing_pending(&mut events));
}

#[tokio::test]
async fn test_sends_to_reset_peer_end_session_once() {
    let (sockets, mut events) = bound_manager(SocketSettings::default());
    let peer = open_to_peer(&sockets, "s").await;
    peer.set_linger(Some(Duration::ZERO)).unwrap();
    drop(peer);

    let chunk = Bytes::from(vec![1u8; 64 * 1024]);
    for _ in 0..16 {
        if sockets.send("s", chunk.clone()).is_err() {
            break;
        }
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        next_kind(&mut events, "s").await,
        SocketEventKind::Error { .. }
    ));
    assert_eq!(next_kind(&mut events, "s").await, SocketEventKind::Disconnected);

    timeout(WAIT, async {
        while sockets.session_state("s").is_some() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let err = sockets.send("s", chunk).unwrap_err();
    assert!(matches!(err, SocketError::NoConnection(_)));
    assert!(nothing_pending(&mut events));
}

#[tokio::test]
async fn test_connect_timeout_emits_error() {
    // With a backlog of one and nobody accepting, further SYNs are dropped.
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(1).unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut backlog = Vec::new();
    for _ in 0..8 {
        if let Ok(Ok(stream)) =
            timeout(Duration::from_millis(100), TcpStream::connect(("127.0.0.1", port))).await
        {
            backlog.push(stream);
        }
    }
    let (sockets, mut events) = bound_manager(SocketSettings::default());

    let ack = sockets
        .open("s", "127.0.0.1", port, Some(Duration::from_millis(300)))
        .unwrap();

    match next_kind(&mut events, "s").await {
        SocketEventKind::Error { message } => assert!(message.contains("timed out")),
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(ack.opened().await, None);
    assert_eq!(sockets.session_state("s"), None);
    assert!(nothing_pending(&mut events));
    drop(listener);
}
