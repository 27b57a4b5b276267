// canplayer/tests/cansocket.rs
//
// Tests against a live SocketCAN interface.
//
// Most of these need a 'vcan0' interface to be up, and only run with the
// "vcan_tests" feature:
//
//   $ sudo ip link add dev vcan0 type vcan
//   $ sudo ip link set up vcan0
//   $ cargo test --features=vcan_tests
//

use canplayer::{CanSocket, SocketBus};

#[cfg(feature = "vcan_tests")]
use canplayer::{
    embedded_can::{Frame as EmbeddedFrame, StandardId},
    Bus, Frame, ReplayConfig, Replayer, ShouldRetry, SocketOptions,
};

#[cfg(feature = "vcan_tests")]
use serial_test::serial;

#[cfg(feature = "vcan_tests")]
use std::time::Duration;

// The virtual CAN interface to use for tests.
#[cfg(feature = "vcan_tests")]
const VCAN: &str = "vcan0";

#[cfg(feature = "vcan_tests")]
fn frame(id: u16, data: &[u8]) -> Frame {
    Frame::new(StandardId::new(id).unwrap(), data).unwrap()
}

#[test]
fn test_nonexistant_device() {
    assert!(CanSocket::open("invalid").is_err());
    assert!(SocketBus::open("invalid", 500_000).is_err());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_timeout() {
    let sock = CanSocket::open(VCAN).unwrap();
    // Filter out _any_ traffic
    sock.set_filter_drop_all().unwrap();
    sock.set_read_timeout(Duration::from_millis(100)).unwrap();

    assert!(sock.read_frame().should_retry());
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_enable_own_loopback() {
    let sock = CanSocket::open(VCAN).unwrap();
    sock.set_loopback(true).unwrap();
    sock.set_recv_own_msgs(true).unwrap();
    sock.set_read_timeout(Duration::from_secs(1)).unwrap();

    let sent = frame(0x123, &[1, 2, 3]);
    sock.write_frame(&sent).unwrap();

    let echo = sock.read_frame().unwrap();
    assert!(echo.is_rx());
    assert!(echo.matches(&sent));
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_bus_recv_timeout_is_none() {
    let mut bus = SocketBus::open(VCAN, 500_000).unwrap();
    bus.socket().set_filter_drop_all().unwrap();

    assert!(bus.recv(Duration::from_millis(50)).unwrap().is_none());
    assert_eq!(bus.stats().total_messages, 0);
}

#[test]
#[serial]
#[cfg(feature = "vcan_tests")]
fn vcan_loopback_replay() {
    let bus = SocketBus::open(VCAN, 500_000).unwrap();
    bus.set_receive_own_messages(true).unwrap();

    let frames = vec![
        frame(0x100, &[1]).with_timestamp(0.0),
        frame(0x101, &[1, 2]).with_timestamp(0.001),
        frame(0x102, &[1, 2, 3]).with_timestamp(0.002),
    ];

    let config = ReplayConfig::default().with_loopback_test(true);
    let summary = Replayer::new(bus, config)
        .unwrap()
        .run(frames.into_iter().map(Ok::<_, canplayer::Error>))
        .unwrap();

    assert_eq!(summary.messages, 3);
    assert_eq!(summary.mismatched, 0);
    assert_eq!(summary.timed_out, 0);
    assert_eq!(summary.error_rate_pct, 0.0);
    assert!(summary.bus_utilization_pct > 0.0);
}
