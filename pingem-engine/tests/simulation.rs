//! End-to-end engine scenarios over in-memory packet I/O.
//!
//! These tests drive the dispatcher with prebuilt frames and observe the
//! replies a recording sink receives, under tokio's paused clock so the
//! simulated delays are exact and the tests run instantly.

use std::{collections::VecDeque, io, net::Ipv4Addr, sync::Arc};

use bytes::Bytes;
use ipnetwork::Ipv4Network;
use parking_lot::Mutex;
use pnet::packet::{ethernet::EthernetPacket, ipv4::Ipv4Packet, Packet};
use pnet::util::MacAddr;
use tokio::time::{sleep, Duration, Instant};

use pingem_engine::{CaptureDispatcher, NetworkProfile, ProfileTable, ReplyScheduler, SimStats};
use pingem_net::{FrameSink, FrameSource, LocalIdentity};
use pingem_wire::{build_echo_request, ReplyFrame};

const LOCAL_IP: Ipv4Addr = Ipv4Addr::new(10, 0, 3, 254);

fn local_mac() -> MacAddr {
    MacAddr::new(0x02, 0xaa, 0xbb, 0xcc, 0xdd, 0xee)
}

fn requester_mac() -> MacAddr {
    MacAddr::new(0x02, 0x11, 0x22, 0x33, 0x44, 0x55)
}

fn target_net() -> Ipv4Network {
    "10.0.0.0/22".parse().unwrap()
}

fn request_frame(src_ip: Ipv4Addr, dst_ip: Ipv4Addr, sequence: u16) -> Bytes {
    build_echo_request(requester_mac(), local_mac(), src_ip, dst_ip, 0x1234, sequence, b"ping")
}

fn request_to(dst_ip: Ipv4Addr) -> Bytes {
    request_frame(Ipv4Addr::new(10, 0, 0, 100), dst_ip, 1)
}

/// Hands out a fixed set of frames, then reports the channel closed.
struct StaticSource {
    frames: VecDeque<Bytes>,
}

impl StaticSource {
    fn new(frames: impl IntoIterator<Item = Bytes>) -> Self {
        Self { frames: frames.into_iter().collect() }
    }
}

impl FrameSource for StaticSource {
    fn next_frame(&mut self) -> io::Result<Option<Bytes>> {
        Ok(self.frames.pop_front())
    }
}

/// Records, per transmitted reply, its network-layer source (the simulated
/// host) and the instant it left.
#[derive(Clone, Default)]
struct RecordingSink {
    replies: Arc<Mutex<Vec<(Ipv4Addr, Instant)>>>,
}

impl RecordingSink {
    fn replies(&self) -> Vec<(Ipv4Addr, Instant)> {
        self.replies.lock().clone()
    }
}

impl FrameSink for RecordingSink {
    fn transmit(&self, frame: ReplyFrame) -> io::Result<()> {
        let sealed = frame.seal();
        let ether = EthernetPacket::new(&sealed).expect("reply is an ethernet frame");
        let ip = Ipv4Packet::new(ether.payload()).expect("reply carries an ipv4 packet");
        self.replies.lock().push((ip.get_source(), Instant::now()));
        Ok(())
    }
}

/// Fails every transmit, as if the interface disappeared.
struct FailingSink;

impl FrameSink for FailingSink {
    fn transmit(&self, _frame: ReplyFrame) -> io::Result<()> {
        Err(io::Error::other("interface gone"))
    }
}

fn engine(table: ProfileTable, sink: Arc<dyn FrameSink>) -> (CaptureDispatcher, Arc<SimStats>) {
    let identity = LocalIdentity { ip: LOCAL_IP, mac: local_mac() };
    let stats = Arc::new(SimStats::default());
    let scheduler = Arc::new(ReplyScheduler::new(
        Arc::new(table),
        identity,
        sink,
        Arc::clone(&stats),
        Some(9),
    ));
    let dispatcher = CaptureDispatcher::new(scheduler, identity, target_net(), Arc::clone(&stats));
    (dispatcher, stats)
}

fn close_to(elapsed: Duration, expected_ms: u64) -> bool {
    let expected = Duration::from_millis(expected_ms);
    let slack = Duration::from_millis(1);
    elapsed + slack >= expected && elapsed <= expected + slack
}

#[tokio::test(start_paused = true)]
async fn replies_complete_in_delay_order_not_arrival_order() {
    let mut table = ProfileTable::default();
    let hosts: Vec<Ipv4Addr> = (1..=100).map(|i| Ipv4Addr::new(10, 0, 0, i)).collect();
    for (index, host) in hosts.iter().enumerate() {
        // Host 1 is the slowest, host 100 the fastest.
        let median = (100 - index) as f64 * 10.0;
        table.insert(*host, NetworkProfile::new(median, 0.0, None));
    }

    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(table, Arc::new(sink.clone()));

    let mut source = StaticSource::new(hosts.iter().map(|host| request_to(*host)));
    let start = Instant::now();
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(1100)).await;

    assert_eq!(stats.received(), 100);
    assert_eq!(stats.replied(), 100);

    let replies = sink.replies();
    let order: Vec<Ipv4Addr> = replies.iter().map(|(addr, _)| *addr).collect();
    let expected: Vec<Ipv4Addr> = hosts.iter().rev().copied().collect();
    assert_eq!(order, expected, "replies must arrive fastest-host first");

    for (addr, at) in &replies {
        let median_ms = (100 - (addr.octets()[3] as u64 - 1)) * 10;
        assert!(
            close_to(*at - start, median_ms),
            "reply from {addr} at {:?}, expected about {median_ms}ms",
            *at - start
        );
    }
}

#[tokio::test(start_paused = true)]
async fn profiled_destination_stays_inside_the_jitter_window() {
    let host = Ipv4Addr::new(10, 0, 0, 5);
    let mut table = ProfileTable::default();
    table.insert(host, NetworkProfile::new(50.0, 10.0, Some(0.0)));

    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(table, Arc::new(sink.clone()));

    let frames = (0..100).map(|seq| request_frame(Ipv4Addr::new(10, 0, 0, 100), host, seq));
    let mut source = StaticSource::new(frames);
    let start = Instant::now();
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(100)).await;

    assert_eq!(stats.replied(), 100);
    for (_, at) in sink.replies() {
        let elapsed = at - start;
        assert!(
            elapsed >= Duration::from_millis(39) && elapsed <= Duration::from_millis(61),
            "delay {elapsed:?} outside the 40-60ms window"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn unprofiled_destination_replies_immediately() {
    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(ProfileTable::default(), Arc::new(sink.clone()));

    let mut source = StaticSource::new([request_to(Ipv4Addr::new(10, 0, 0, 7))]);
    let start = Instant::now();
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(1)).await;

    assert_eq!(stats.replied(), 1);
    let replies = sink.replies();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].0, Ipv4Addr::new(10, 0, 0, 7));
    assert_eq!(replies[0].1 - start, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn negative_median_destination_never_replies() {
    let host = Ipv4Addr::new(10, 0, 0, 9);
    let mut table = ProfileTable::default();
    table.insert(host, NetworkProfile::new(-1.0, 0.0, None));

    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(table, Arc::new(sink.clone()));

    let frames = (0..50).map(|seq| request_frame(Ipv4Addr::new(10, 0, 0, 100), host, seq));
    let mut source = StaticSource::new(frames);
    dispatcher.run(&mut source);
    sleep(Duration::from_secs(10)).await;

    assert!(sink.replies().is_empty());
    assert_eq!(stats.received(), 50);
    assert_eq!(stats.dropped(), 50);
    assert_eq!(stats.replied(), 0);
}

#[tokio::test(start_paused = true)]
async fn self_originated_requests_are_ignored() {
    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(ProfileTable::default(), Arc::new(sink.clone()));

    let mut source =
        StaticSource::new([request_frame(LOCAL_IP, Ipv4Addr::new(10, 0, 0, 5), 1)]);
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(1)).await;

    assert!(sink.replies().is_empty());
    assert_eq!(stats.received(), 0);
}

#[tokio::test(start_paused = true)]
async fn requests_outside_the_target_network_are_ignored() {
    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(ProfileTable::default(), Arc::new(sink.clone()));

    let mut source = StaticSource::new([request_to(Ipv4Addr::new(192, 168, 1, 1))]);
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(1)).await;

    assert!(sink.replies().is_empty());
    assert_eq!(stats.received(), 0);
}

#[tokio::test(start_paused = true)]
async fn transmit_failures_are_contained_per_request() {
    let (dispatcher, stats) = engine(ProfileTable::default(), Arc::new(FailingSink));

    let frames = (0..5).map(|seq| request_frame(Ipv4Addr::new(10, 0, 0, 100), Ipv4Addr::new(10, 0, 0, 7), seq));
    let mut source = StaticSource::new(frames);
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(1)).await;

    // Every task ran to completion and reported its own failure; none of
    // them took the engine down with it.
    assert_eq!(stats.received(), 5);
    assert_eq!(stats.failed(), 5);
    assert_eq!(stats.replied(), 0);
}

#[tokio::test(start_paused = true)]
async fn counters_account_for_every_request_under_loss() {
    let host = Ipv4Addr::new(10, 0, 0, 42);
    let mut table = ProfileTable::default();
    table.insert(host, NetworkProfile::new(10.0, 0.0, Some(0.5)));

    let sink = RecordingSink::default();
    let (dispatcher, stats) = engine(table, Arc::new(sink.clone()));

    let frames = (0..400).map(|seq| request_frame(Ipv4Addr::new(10, 0, 0, 100), host, seq));
    let mut source = StaticSource::new(frames);
    dispatcher.run(&mut source);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(stats.received(), 400);
    assert_eq!(stats.replied() + stats.dropped(), 400);
    let dropped = stats.dropped();
    assert!(
        (140..=260).contains(&dropped),
        "dropped {dropped}/400 is implausible for a 50% loss rate"
    );
    assert_eq!(sink.replies().len() as u64, stats.replied());
}
