use super::recording_api::{RecordingApi, ack_wire, wire};
use crate::net::{NetEvent, NodeId};
use crate::proto::segment::flags;
use crate::proto::{CongestionPhase, SenderState, TcpConfig, TcpSender};
use crate::sim::SimTime;
use std::io::Cursor;

/// MSS = 10
fn small_cfg() -> TcpConfig {
    TcpConfig {
        mtu: 34,
        ..TcpConfig::default()
    }
}

fn sender_with(data: Vec<u8>, cfg: TcpConfig) -> TcpSender {
    TcpSender::new(NodeId(0), NodeId(1), Box::new(Cursor::new(data)), cfg)
}

/// 完成握手：SYN 在 t=0 发出，SYN|ACK 在 t=2ms 到达（回显 ts=0）。
fn establish(data: Vec<u8>, cfg: TcpConfig) -> (TcpSender, RecordingApi) {
    let mut s = sender_with(data, cfg);
    let mut api = RecordingApi::default();
    assert!(s.open(&mut api));
    api.take_segments();
    api.take_timers();

    api.now = SimTime::from_millis(2);
    s.on_segment(&wire(0, 1, flags::SYN | flags::ACK, 0, &[]), &mut api);
    assert_eq!(s.state(), SenderState::Established);
    (s, api)
}

fn timeout_checks(timers: &[(SimTime, NetEvent)]) -> Vec<(SimTime, u32, u32)> {
    timers
        .iter()
        .filter_map(|(at, ev)| match ev {
            NetEvent::TimeoutCheck { seq, len, .. } => Some((*at, *seq, *len)),
            _ => None,
        })
        .collect()
}

#[test]
fn open_sends_syn_and_arms_timer() {
    let mut s = sender_with(vec![1; 30], small_cfg());
    let mut api = RecordingApi::default();

    assert!(s.open(&mut api));
    assert_eq!(s.state(), SenderState::SynSent);

    let segs = api.take_segments();
    assert_eq!(segs.len(), 1);
    assert!(segs[0].is_syn());
    assert!(!segs[0].is_ack());
    assert_eq!(segs[0].seq, 0);

    let timers = timeout_checks(&api.take_timers());
    assert_eq!(timers, vec![(SimTime::from_secs(1), 0, 0)]);
}

#[test]
fn open_without_route_stays_closed() {
    let mut s = sender_with(vec![1; 30], small_cfg());
    let mut api = RecordingApi {
        routable: false,
        ..RecordingApi::default()
    };

    assert!(!s.open(&mut api));
    assert_eq!(s.state(), SenderState::Closed);
    assert!(api.timers.is_empty());
}

#[test]
fn handshake_reply_with_wrong_ack_is_refused() {
    let mut s = sender_with(vec![1; 30], small_cfg());
    let mut api = RecordingApi::default();
    s.open(&mut api);
    api.take_segments();

    s.on_segment(&wire(0, 5, flags::SYN | flags::ACK, 0, &[]), &mut api);
    assert_eq!(s.state(), SenderState::SynSent);

    // 只有 ACK 没有 SYN 同样被拒绝
    s.on_segment(&wire(0, 1, flags::ACK, 0, &[]), &mut api);
    assert_eq!(s.state(), SenderState::SynSent);
    assert!(api.take_segments().is_empty());
}

#[test]
fn handshake_acks_and_sends_first_window() {
    let (s, mut api) = establish((0..100u8).collect(), small_cfg());

    let segs = api.take_segments();
    assert_eq!(segs.len(), 2, "handshake ACK + one segment for cwnd=1");
    assert!(segs[0].is_ack() && segs[0].is_empty());
    assert_eq!((segs[0].seq, segs[0].ack), (1, 1));

    let data = &segs[1];
    assert_eq!(data.seq, 1);
    assert_eq!(data.ack, 1);
    assert_eq!(data.payload, (0..10u8).collect::<Vec<_>>());
    // 时间戳在发送时刻写入
    assert_eq!(data.timestamp, SimTime::from_millis(2).0);

    // RTO 初值 = 2 * 握手 RTT
    assert_eq!(s.timeout(), SimTime::from_millis(4));
    assert_eq!(s.total_segments(), 10);
    assert_eq!(s.cwnd(), 1);
}

#[test]
fn window_is_capped_by_receiver_window() {
    let cfg = TcpConfig {
        init_cwnd: 50,
        window_segments: 4,
        ..small_cfg()
    };
    let (s, mut api) = establish(vec![7; 200], cfg);

    let data: Vec<_> = api
        .take_segments()
        .into_iter()
        .filter(|seg| !seg.is_empty())
        .collect();
    assert_eq!(data.len(), 4);
    assert_eq!(s.last_sent(), 4);
}

#[test]
fn slow_start_grows_cwnd_per_new_ack() {
    let (mut s, mut api) = establish(vec![7; 100], small_cfg());
    api.take_segments();

    api.now = SimTime::from_millis(3);
    s.on_segment(&ack_wire(11, SimTime::from_millis(2).0), &mut api);

    assert_eq!(s.last_ack(), 1);
    assert_eq!(s.cwnd(), 2);
    assert_eq!(s.phase(), CongestionPhase::SlowStart);
    let seqs: Vec<u32> = api.take_segments().iter().map(|seg| seg.seq).collect();
    assert_eq!(seqs, vec![11, 21]);
}

#[test]
fn slow_start_switches_to_congestion_avoidance_at_ssthresh() {
    let cfg = TcpConfig {
        window_segments: 2,
        ..small_cfg()
    };
    let (mut s, mut api) = establish(vec![7; 100], cfg);
    assert_eq!(s.ssthresh(), 2);

    s.on_segment(&ack_wire(11, 0), &mut api);
    assert_eq!(s.cwnd(), 2);
    assert_eq!(s.phase(), CongestionPhase::CongestionAvoidance);

    // 拥塞避免：累计 cwnd 个新 ACK 才 +1
    s.on_segment(&ack_wire(21, 0), &mut api);
    assert_eq!(s.cwnd(), 2);
    s.on_segment(&ack_wire(31, 0), &mut api);
    assert_eq!(s.cwnd(), 3);
}

#[test]
fn three_duplicate_acks_trigger_one_fast_retransmit() {
    let cfg = TcpConfig {
        init_cwnd: 4,
        ..small_cfg()
    };
    let (mut s, mut api) = establish(vec![7; 100], cfg);
    api.take_segments();
    assert_eq!(s.last_sent(), 4);

    s.on_segment(&ack_wire(1, 0), &mut api);
    s.on_segment(&ack_wire(1, 0), &mut api);
    assert!(api.take_segments().is_empty());
    assert_eq!(s.phase(), CongestionPhase::SlowStart);

    s.on_segment(&ack_wire(1, 0), &mut api);
    let segs = api.take_segments();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].seq, 1);
    assert_eq!(segs[0].len(), 10);

    assert_eq!(s.phase(), CongestionPhase::FastRecovery);
    assert_eq!(s.ssthresh(), 4);
    assert_eq!(s.cwnd(), 2);
    assert_eq!(s.stats().retransmissions, 1);
    assert_eq!(s.stats().duplicate_acks, 3);

    // 第 4 个重复 ACK：窗口膨胀但不再重传
    s.on_segment(&ack_wire(1, 0), &mut api);
    assert_eq!(s.cwnd(), 3);
    assert!(api.take_segments().is_empty());
    assert_eq!(s.stats().retransmissions, 1);

    // 新 ACK 退出快速恢复
    s.on_segment(&ack_wire(41, 0), &mut api);
    assert_eq!(s.last_ack(), 4);
    assert_eq!(s.phase(), CongestionPhase::CongestionAvoidance);
    assert_eq!(s.cwnd(), 2);
    let seqs: Vec<u32> = api.take_segments().iter().map(|seg| seg.seq).collect();
    assert_eq!(seqs, vec![41, 51]);
}

#[test]
fn delayed_ack_causes_exactly_one_retransmission() {
    let (mut s, mut api) = establish(vec![7; 100], small_cfg());
    api.take_segments();

    let timers = timeout_checks(&api.take_timers());
    assert!(timers.contains(&(SimTime::from_millis(6), 1, 10)));

    api.now = SimTime::from_millis(6);
    s.on_timeout(1, 10, &mut api);
    let segs = api.take_segments();
    assert_eq!(segs.len(), 1);
    assert_eq!(segs[0].seq, 1);
    assert_eq!(segs[0].timestamp, SimTime::from_millis(6).0);
    assert_eq!(s.stats().retransmissions, 1);
    assert_eq!(s.cwnd(), 1);
    assert_eq!(s.ssthresh(), 2);
    assert_eq!(s.phase(), CongestionPhase::SlowStart);
    assert_eq!(s.timeout(), SimTime::from_millis(8));

    api.now = SimTime::from_millis(7);
    s.on_segment(&ack_wire(11, SimTime::from_millis(6).0), &mut api);
    assert_eq!(s.last_ack(), 1);
    api.take_segments();

    // 之后的超时检查被守卫挡住
    api.now = SimTime::from_millis(14);
    s.on_timeout(1, 10, &mut api);
    assert!(api.take_segments().is_empty());
    assert_eq!(s.stats().retransmissions, 1);
}

#[test]
fn every_queued_check_for_new_head_retransmits_it_once() {
    let cfg = TcpConfig {
        init_cwnd: 2,
        ..small_cfg()
    };
    let (mut s, mut api) = establish(vec![7; 100], cfg);
    api.take_segments();
    let mut pending = timeout_checks(&api.take_timers());

    // 第 1 段在 3ms 被确认，第 2 段的 ACK 一直不到
    api.now = SimTime::from_millis(3);
    s.on_segment(&ack_wire(11, SimTime::from_millis(2).0), &mut api);
    assert_eq!(s.last_ack(), 1);
    api.take_segments();

    let horizon = SimTime::from_millis(7);
    let mut fired = 0;
    let mut resent = 0;
    loop {
        pending.extend(timeout_checks(&api.take_timers()));
        pending.retain(|&(at, seq, _)| seq == 11 && at <= horizon);
        pending.sort();
        if pending.is_empty() {
            break;
        }
        let (at, seq, len) = pending.remove(0);
        api.now = at;
        s.on_timeout(seq, len, &mut api);
        fired += 1;
        resent += api.take_segments().iter().filter(|seg| seg.seq == 11).count();
    }

    // 发送时的检查与确认后重新计时的检查都在 7ms 之前
    assert!(fired >= 2);
    assert_eq!(resent, 1);
    assert_eq!(s.stats().retransmissions, 1);
    assert_eq!(s.cwnd(), 1);
}

#[test]
fn corrupted_segment_is_counted_and_ignored() {
    let (mut s, mut api) = establish(vec![7; 100], small_cfg());
    api.take_segments();

    let mut bytes = ack_wire(11, 0);
    bytes[5] ^= 0xff;
    s.on_segment(&bytes, &mut api);

    assert_eq!(s.stats().checksum_failures, 1);
    assert_eq!(s.last_ack(), 0);
    assert!(api.take_segments().is_empty());
}

#[test]
fn teardown_goes_through_fin_wait_and_time_wait() {
    let (mut s, mut api) = establish(b"hello".to_vec(), small_cfg());
    api.take_segments();
    api.take_timers();

    s.on_segment(&ack_wire(6, 0), &mut api);
    assert_eq!(s.state(), SenderState::FinWait1);
    let segs = api.take_segments();
    assert_eq!(segs.len(), 1);
    assert!(segs[0].is_fin() && segs[0].is_ack());
    assert_eq!(segs[0].seq, 6);

    // 对端确认了 FIN：FIN 超时不再重传
    s.on_segment(&ack_wire(7, 0), &mut api);
    s.on_timeout(6, 0, &mut api);
    assert!(api.take_segments().is_empty());

    api.now = SimTime::from_millis(5);
    s.on_segment(&wire(1, 7, flags::FIN | flags::ACK, 0, &[]), &mut api);
    assert_eq!(s.state(), SenderState::TimeWait);
    let segs = api.take_segments();
    assert_eq!(segs.len(), 1);
    assert!(segs[0].is_ack() && !segs[0].is_fin());
    assert_eq!((segs[0].seq, segs[0].ack), (7, 2));

    let tw: Vec<SimTime> = api
        .take_timers()
        .into_iter()
        .filter_map(|(at, ev)| matches!(ev, NetEvent::TimeWait { .. }).then_some(at))
        .collect();
    assert_eq!(tw, vec![SimTime::from_millis(5).saturating_add(SimTime::from_secs(2))]);

    api.now = tw[0];
    s.on_time_wait(&mut api);
    assert!(s.is_closed());
    assert!(s.is_done());
    assert_eq!(s.closed_at(), Some(tw[0]));
    assert_eq!(s.stats().bytes_sent, 5);
}

#[test]
fn empty_input_sends_fin_right_after_handshake() {
    let (s, mut api) = establish(Vec::new(), small_cfg());
    let segs = api.take_segments();
    assert_eq!(segs.len(), 2);
    assert!(segs[1].is_fin());
    assert_eq!(segs[1].seq, 1);
    assert_eq!(s.state(), SenderState::FinWait1);
}

#[test]
fn syn_retries_back_off_and_give_up() {
    let cfg = TcpConfig {
        max_retries: 2,
        ..small_cfg()
    };
    let mut s = sender_with(vec![1; 30], cfg);
    let mut api = RecordingApi::default();
    s.open(&mut api);
    api.take_segments();

    s.on_timeout(0, 0, &mut api);
    assert_eq!(s.timeout(), SimTime::from_secs(2));
    s.on_timeout(0, 0, &mut api);
    assert_eq!(s.timeout(), SimTime::from_secs(4));
    assert_eq!(api.take_segments().len(), 2);
    assert_eq!(s.state(), SenderState::SynSent);

    s.on_timeout(0, 0, &mut api);
    assert!(api.take_segments().is_empty());
    assert!(s.is_closed());
    assert!(s.is_aborted());
    assert!(!s.is_done());
}
