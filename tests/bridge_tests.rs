mod common;

use common::{close_count, feed, written, MockOpener};
use remote_uart::core::session::Direction;
use remote_uart::infrastructure::transport::{memory_pair, MemoryFrame, MemoryPeer};
use remote_uart::{
    dispatch, BridgeContext, ConnectionParams, DeviceId, DeviceRegistry, DirectionExit, DispatchOutcome,
    RemoteUartError, SessionState,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

const WAIT: Duration = Duration::from_secs(2);

fn context(opener: Arc<MockOpener>, poll_delay: Duration) -> BridgeContext {
    BridgeContext::new(Arc::new(DeviceRegistry::new()), opener, poll_delay)
}

fn start(ctx: &BridgeContext, device: &str, baud_rate: u32) -> (JoinHandle<DispatchOutcome>, MemoryPeer) {
    let (connection, peer) = memory_pair();
    let ctx = ctx.clone();
    let params = ConnectionParams::new(device, baud_rate);
    let handle = tokio::spawn(async move { dispatch(&ctx, params, connection).await });
    (handle, peer)
}

async fn wait_for_state(ctx: &BridgeContext, device: &str, state: SessionState) {
    let device = DeviceId::new(device);
    let deadline = Instant::now() + WAIT;
    while ctx.registry.state_of(&device) != Some(state) {
        assert!(Instant::now() < deadline, "'{}' never reached {}", device, state);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

/// Drain frames until the connection is closed, returning what arrived before.
async fn frames_until_close(peer: &mut MemoryPeer) -> Vec<MemoryFrame> {
    let mut frames = Vec::new();
    loop {
        match peer.recv_timeout(WAIT).await {
            Some(MemoryFrame::Close) | None => return frames,
            Some(frame) => frames.push(frame),
        }
    }
}

#[tokio::test]
async fn test_unavailable_device_is_rejected_and_not_registered() {
    let opener = Arc::new(MockOpener::new().fail("/dev/ttyFAKE0"));
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (handle, mut peer) = start(&ctx, "/dev/ttyFAKE0", 9600);

    let frames = frames_until_close(&mut peer).await;
    assert_eq!(frames.len(), 1);
    match &frames[0] {
        MemoryFrame::Diagnostic(text) => {
            assert!(text.contains("/dev/ttyFAKE0"));
            assert!(text.contains("unavailable"));
        }
        other => panic!("expected a diagnostic, got {:?}", other),
    }

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, DispatchOutcome::Rejected(RemoteUartError::DeviceUnavailable { .. })));
    assert!(!ctx.registry.contains(&DeviceId::new("/dev/ttyFAKE0")));
    assert!(ctx.registry.is_empty());
    assert_eq!(opener.open_count(), 1);
}

#[tokio::test]
async fn test_concurrent_clients_on_same_device() {
    let opener = Arc::new(MockOpener::with_open_delay(Duration::from_millis(100)));
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (mut first, first_peer) = start(&ctx, "COM3", 115200);
    let (mut second, second_peer) = start(&ctx, "COM3", 115200);

    // The loser is refused without waiting on the device.
    let (loser, winner, mut loser_peer, winner_peer) = tokio::select! {
        outcome = &mut first => (outcome.unwrap(), second, first_peer, second_peer),
        outcome = &mut second => (outcome.unwrap(), first, second_peer, first_peer),
    };
    assert!(matches!(loser, DispatchOutcome::Rejected(RemoteUartError::DeviceBusy { .. })));

    let frames = frames_until_close(&mut loser_peer).await;
    assert!(matches!(&frames[..], [MemoryFrame::Diagnostic(text)] if text.contains("busy")));

    wait_for_state(&ctx, "COM3", SessionState::Active).await;
    assert_eq!(ctx.registry.len(), 1);
    assert_eq!(opener.open_count(), 1);

    // The winner is unaffected by the refused client.
    assert!(winner_peer.send(b"AT\r".to_vec()));
    let device = opener.device("COM3");
    let deadline = Instant::now() + WAIT;
    while written(&device) != b"AT\r" {
        assert!(Instant::now() < deadline);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    winner_peer.close();
    let outcome = tokio::time::timeout(WAIT, winner).await.unwrap().unwrap();
    assert!(matches!(outcome, DispatchOutcome::Completed(_)));
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_device_write_error_tears_down_session() {
    let opener = Arc::new(MockOpener::new());
    opener.device("COM3").lock().unwrap().fail_writes = true;
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (handle, mut peer) = start(&ctx, "COM3", 115200);
    wait_for_state(&ctx, "COM3", SessionState::Active).await;
    assert!(peer.send(b"reboot\n".to_vec()));

    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    let report = match outcome {
        DispatchOutcome::Completed(report) => report,
        other => panic!("expected a completed session, got {:?}", other),
    };
    assert_eq!(report.ended_by, Direction::NetworkToDevice);
    assert!(matches!(report.exit, DirectionExit::Failed(RemoteUartError::DeviceIo(_))));
    assert_eq!(report.bytes_to_device, 0);

    assert_eq!(close_count(&opener.device("COM3")), 1);
    assert!(ctx.registry.is_empty());
    assert_eq!(peer.recv_timeout(WAIT).await, Some(MemoryFrame::Close));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_both_directions_failing_tear_down_once() {
    for _ in 0..50 {
        let opener = Arc::new(MockOpener::new());
        let device = opener.device("COM3");
        device.lock().unwrap().fail_writes = true;
        feed(&device, b"boot: ");
        feed(&device, b"panic\r\n");
        let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

        // The write fails on the device while the device output has nowhere to go.
        let (handle, peer) = start(&ctx, "COM3", 115200);
        assert!(peer.send(b"reset\r".to_vec()));
        drop(peer);

        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        match outcome {
            DispatchOutcome::Completed(report) => {
                assert!(matches!(report.exit, DirectionExit::Failed(_) | DirectionExit::Closed));
                assert_eq!(report.bytes_to_device, 0);
            }
            other => panic!("expected a completed session, got {:?}", other),
        }
        assert_eq!(close_count(&device), 1);
        assert!(ctx.registry.is_empty());

        // The released lease must not evict the next holder.
        device.lock().unwrap().fail_writes = false;
        let (handle, peer) = start(&ctx, "COM3", 115200);
        wait_for_state(&ctx, "COM3", SessionState::Active).await;
        assert_eq!(ctx.registry.len(), 1);
        peer.close();
        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(matches!(outcome, DispatchOutcome::Completed(_)));
        assert_eq!(close_count(&device), 2);
        assert!(ctx.registry.is_empty());
    }
}

#[tokio::test]
async fn test_network_close_tears_down_within_poll_interval() {
    let poll_delay = Duration::from_millis(500);
    let opener = Arc::new(MockOpener::new());
    let ctx = context(Arc::clone(&opener), poll_delay);

    let (handle, peer) = start(&ctx, "/dev/ttyUSB0", 115200);
    wait_for_state(&ctx, "/dev/ttyUSB0", SessionState::Active).await;

    let closed_at = Instant::now();
    peer.close();
    let outcome = tokio::time::timeout(poll_delay, handle)
        .await
        .expect("teardown took longer than one poll interval")
        .unwrap();
    assert!(closed_at.elapsed() < poll_delay);

    match outcome {
        DispatchOutcome::Completed(report) => {
            assert_eq!(report.ended_by, Direction::NetworkToDevice);
            assert!(matches!(report.exit, DirectionExit::Closed));
        }
        other => panic!("expected a completed session, got {:?}", other),
    }
    assert_eq!(close_count(&opener.device("/dev/ttyUSB0")), 1);
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_network_bytes_written_in_order() {
    let opener = Arc::new(MockOpener::new());
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (handle, peer) = start(&ctx, "COM3", 115200);
    wait_for_state(&ctx, "COM3", SessionState::Active).await;

    let mut expected = Vec::new();
    for i in 0..200u32 {
        let chunk: Vec<u8> = (0..(i % 7 + 1)).map(|j| (i * 7 + j) as u8).collect();
        expected.extend_from_slice(&chunk);
        assert!(peer.send(chunk));
    }

    let device = opener.device("COM3");
    let deadline = Instant::now() + WAIT;
    while written(&device).len() < expected.len() {
        assert!(Instant::now() < deadline, "device received {} bytes", written(&device).len());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    assert_eq!(written(&device), expected);
    assert_eq!(device.lock().unwrap().writes, 200);

    peer.close();
    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    match outcome {
        DispatchOutcome::Completed(report) => assert_eq!(report.bytes_to_device, expected.len() as u64),
        other => panic!("expected a completed session, got {:?}", other),
    }
}

#[tokio::test]
async fn test_device_bytes_forwarded_without_empty_frames() {
    let opener = Arc::new(MockOpener::new());
    let device = opener.device("COM3");
    feed(&device, b"U-Boot 2023.04\r\n");
    feed(&device, b"");
    feed(&device, b"DRAM: ");
    feed(&device, b"");
    feed(&device, b"512 MiB\r\n");
    let expected = b"U-Boot 2023.04\r\nDRAM: 512 MiB\r\n".to_vec();

    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));
    let (handle, mut peer) = start(&ctx, "COM3", 115200);

    let mut frames = Vec::new();
    let mut received = Vec::new();
    while received.len() < expected.len() {
        match peer.recv_timeout(WAIT).await {
            Some(MemoryFrame::Data(data)) => {
                received.extend_from_slice(&data);
                frames.push(data);
            }
            other => panic!("unexpected frame {:?}", other),
        }
    }
    assert_eq!(received, expected);
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|frame| !frame.is_empty()));

    // Idle polls keep happening without producing frames.
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(device.lock().unwrap().reads > 5);
    assert!(peer.recv_timeout(Duration::from_millis(20)).await.is_none());

    peer.close();
    let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
    match outcome {
        DispatchOutcome::Completed(report) => assert_eq!(report.bytes_to_network, expected.len() as u64),
        other => panic!("expected a completed session, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_parameters_never_touch_registry() {
    let opener = Arc::new(MockOpener::new());
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (connection, mut peer) = memory_pair();
    let params = ConnectionParams::from_request_target("/?baudrate=9600");
    let outcome = dispatch(&ctx, params, connection).await;

    assert!(matches!(outcome, DispatchOutcome::Rejected(RemoteUartError::Protocol(_))));
    let frames = frames_until_close(&mut peer).await;
    assert!(matches!(&frames[..], [MemoryFrame::Diagnostic(text)] if text.contains("uartPort")));
    assert_eq!(opener.open_count(), 0);
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn test_device_reusable_after_session_ends() {
    let opener = Arc::new(MockOpener::new());
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    for _ in 0..3 {
        let (handle, peer) = start(&ctx, "COM3", 115200);
        wait_for_state(&ctx, "COM3", SessionState::Active).await;
        peer.close();
        let outcome = tokio::time::timeout(WAIT, handle).await.unwrap().unwrap();
        assert!(!outcome.is_rejected());
        assert!(ctx.registry.is_empty());
    }
    assert_eq!(opener.open_count(), 3);
    assert_eq!(close_count(&opener.device("COM3")), 3);
}

#[tokio::test]
async fn test_shutdown_cancels_active_sessions() {
    let opener = Arc::new(MockOpener::new());
    let ctx = context(Arc::clone(&opener), Duration::from_millis(1));

    let (first, mut first_peer) = start(&ctx, "COM3", 115200);
    let (second, mut second_peer) = start(&ctx, "COM4", 9600);
    wait_for_state(&ctx, "COM3", SessionState::Active).await;
    wait_for_state(&ctx, "COM4", SessionState::Active).await;

    ctx.shutdown.cancel();

    for handle in [first, second] {
        match tokio::time::timeout(WAIT, handle).await.unwrap().unwrap() {
            DispatchOutcome::Completed(report) => assert!(matches!(report.exit, DirectionExit::Cancelled)),
            other => panic!("expected a completed session, got {:?}", other),
        }
    }
    assert_eq!(first_peer.recv_timeout(WAIT).await, Some(MemoryFrame::Close));
    assert_eq!(second_peer.recv_timeout(WAIT).await, Some(MemoryFrame::Close));
    assert!(ctx.registry.is_empty());
}
