//! TCP 发送端
//!
//! 连接状态机：`Closed → SynSent → Established → FinWait1 → TimeWait → Closed`。
//! 拥塞控制（Reno 风格：慢启动 / 拥塞避免 / 快速恢复）只在 `Established` 中生效。
//!
//! 序列号空间与段序号空间：
//! - SYN 占用 seq 0，数据从 seq 1 开始；第 k 段（从 1 计）覆盖
//!   `[1 + (k-1)*mss, 1 + k*mss)`，FIN 的 seq 为 `1 + total_bytes`。
//! - `last_ack` 是已被累计确认的段数，`last_sent` 是已发出的段数，
//!   因此“下一个待确认段”永远是 `last_ack + 1`。

use std::io::Read;

use tracing::{debug, error, info, trace, warn};

use super::segment::{Segment, SegmentError, flags};
use super::stats::TcpStats;
use super::tcp::{ConnKey, TcpConfig};
use crate::net::{NetApi, NetEvent, NodeId};
use crate::sim::SimTime;

/// 第 3 个重复 ACK 触发快速重传
const DUP_ACK_THRESHOLD: u32 = 3;
const RTT_ALPHA: f64 = 0.875;
const RTT_BETA: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Closed,
    SynSent,
    Established,
    FinWait1,
    TimeWait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionPhase {
    SlowStart,
    CongestionAvoidance,
    FastRecovery,
}

pub struct TcpSender {
    key: ConnKey,
    cfg: TcpConfig,
    state: SenderState,
    phase: CongestionPhase,
    source: Option<Box<dyn Read>>,

    /// 第 k 段的载荷位于 `segments[k - 1]`
    segments: Vec<Vec<u8>>,
    total_bytes: u32,
    /// 对端下一个期望的序列号（即本端发出的 ack 字段）
    rcv_nxt: u32,

    last_ack: usize,
    last_sent: usize,
    cwnd: u32,
    /// 拥塞避免阶段的累加器：累计满 cwnd 个 ACK 后 cwnd += 1
    cwnd_acc: u32,
    ssthresh: u32,
    dup_acks: u32,

    ertt: f64,
    edev: f64,
    timeout: SimTime,
    /// 队首段当前有效的超时时刻，早于它的检查都已失效
    head_deadline: SimTime,
    /// 同一段的连续超时次数
    retries: u32,

    fin_acked: bool,
    aborted: bool,
    opened_at: Option<SimTime>,
    established_at: Option<SimTime>,
    closed_at: Option<SimTime>,
    stats: TcpStats,
}

impl TcpSender {
    /// 创建发送端（`Closed`），从 `source` 读取待发送的数据。
    pub fn new(local: NodeId, remote: NodeId, source: Box<dyn Read>, cfg: TcpConfig) -> Self {
        let init_cwnd = cfg.init_cwnd.max(1);
        let ssthresh = cfg.window_segments.max(1);
        let timeout = cfg.clamp_rto(cfg.init_rto);
        Self {
            key: ConnKey::new(local, remote),
            cfg,
            state: SenderState::Closed,
            phase: CongestionPhase::SlowStart,
            source: Some(source),
            segments: Vec::new(),
            total_bytes: 0,
            rcv_nxt: 0,
            last_ack: 0,
            last_sent: 0,
            cwnd: init_cwnd,
            cwnd_acc: 0,
            ssthresh,
            dup_acks: 0,
            ertt: 0.0,
            edev: 0.0,
            timeout,
            head_deadline: SimTime::ZERO,
            retries: 0,
            fin_acked: false,
            aborted: false,
            opened_at: None,
            established_at: None,
            closed_at: None,
            stats: TcpStats::default(),
        }
    }

    pub fn key(&self) -> ConnKey {
        self.key
    }

    pub fn state(&self) -> SenderState {
        self.state
    }

    pub fn phase(&self) -> CongestionPhase {
        self.phase
    }

    pub fn cwnd(&self) -> u32 {
        self.cwnd
    }

    pub fn ssthresh(&self) -> u32 {
        self.ssthresh
    }

    pub fn timeout(&self) -> SimTime {
        self.timeout
    }

    pub fn last_ack(&self) -> usize {
        self.last_ack
    }

    pub fn last_sent(&self) -> usize {
        self.last_sent
    }

    pub fn total_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bytes
    }

    pub fn stats(&self) -> &TcpStats {
        &self.stats
    }

    pub fn established_at(&self) -> Option<SimTime> {
        self.established_at
    }

    pub fn closed_at(&self) -> Option<SimTime> {
        self.closed_at
    }

    pub fn is_closed(&self) -> bool {
        self.state == SenderState::Closed && self.closed_at.is_some()
    }

    /// 正常走完四次挥手（而不是中途放弃）
    pub fn is_done(&self) -> bool {
        self.is_closed() && !self.aborted
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    fn mss(&self) -> u32 {
        self.cfg.mss()
    }

    fn fin_seq(&self) -> u32 {
        1u32.wrapping_add(self.total_bytes)
    }

    /// 第 k 段（从 1 计）的起始序列号
    fn seq_of(&self, k: usize) -> u32 {
        1 + (k as u32 - 1) * self.mss()
    }

    /// 序列号 -> 段序号（从 1 计）
    fn index_of(&self, seq: u32) -> usize {
        (seq.saturating_sub(1) / self.mss()) as usize + 1
    }

    /// 累计 ACK 号 -> 已确认的段数
    fn ack_index(&self, ack: u32) -> usize {
        let covered = ack.saturating_sub(1).div_ceil(self.mss()) as usize;
        covered.min(self.segments.len())
    }

    /// 有效发送窗口：min(cwnd, 接收窗口)
    fn window(&self) -> usize {
        self.cwnd.min(self.cfg.window_segments).max(1) as usize
    }

    fn in_flight(&self) -> usize {
        self.last_sent - self.last_ack
    }

    /// 发起三次握手：发出 SYN 并进入 `SynSent`。
    #[tracing::instrument(skip(self, api), fields(conn = ?self.key))]
    pub fn open(&mut self, api: &mut dyn NetApi) -> bool {
        if self.state != SenderState::Closed || self.opened_at.is_some() {
            warn!(state = ?self.state, "连接已打开过，忽略 open");
            return false;
        }
        let now = api.now();
        let syn = Segment::new(0, 0, flags::SYN).with_timestamp(now.0);
        if !self.emit(syn, api) {
            warn!("🚫 SYN 无法发出（无路由）");
            return false;
        }
        self.arm_timer(0, 0, api);
        self.opened_at = Some(now);
        self.state = SenderState::SynSent;
        info!("🤝 SYN 已发出，进入 SynSent");
        true
    }

    /// 处理到达本端的一个段（线上字节）。
    #[tracing::instrument(skip(self, bytes, api), fields(conn = ?self.key, state = ?self.state))]
    pub fn on_segment(&mut self, bytes: &[u8], api: &mut dyn NetApi) {
        let seg = match Segment::decode(bytes) {
            Ok(seg) => seg,
            Err(e) => {
                self.stats.packets_received += 1;
                self.stats.checksum_failures += 1;
                if let SegmentError::ChecksumMismatch { .. } = e {
                    warn!(error = %e, "校验失败，丢弃");
                } else {
                    warn!(error = %e, "无法解析的段，丢弃");
                }
                return;
            }
        };
        self.stats.packets_received += 1;
        self.stats.bytes_received += seg.len() as u64;
        debug!(seq = seg.seq, ack = seg.ack, flags = seg.flags, len = seg.len(), "收到段");

        match self.state {
            SenderState::SynSent => self.on_syn_ack(seg, api),
            SenderState::Established => {
                if seg.is_syn() {
                    // 重复的 SYN|ACK：握手 ACK 可能丢了，再补发一次
                    self.send_control(1, flags::ACK, api);
                } else if seg.is_ack() {
                    self.on_ack(seg, api);
                }
            }
            SenderState::FinWait1 => self.on_fin_wait(seg, api),
            SenderState::TimeWait => {
                if seg.is_fin() {
                    debug!("重复的 FIN，补发最后的 ACK");
                    self.send_control(self.fin_seq().wrapping_add(1), flags::ACK, api);
                }
            }
            SenderState::Closed => trace!("连接已关闭，忽略"),
        }
    }

    fn on_syn_ack(&mut self, seg: Segment, api: &mut dyn NetApi) {
        if !seg.is_syn() || !seg.is_ack() || seg.ack != 1 {
            warn!(
                flags = seg.flags,
                ack = seg.ack,
                "握手回复不合法，保持 SynSent 等待重传"
            );
            return;
        }
        let now = api.now();
        self.rcv_nxt = seg.seq.wrapping_add(1);

        let sample = now.saturating_sub(SimTime(seg.timestamp)).as_nanos_f64();
        self.ertt = sample;
        self.edev = 0.0;
        self.timeout = self.cfg.clamp_rto(SimTime::from_nanos_f64(2.0 * sample));
        self.retries = 0;

        self.send_control(1, flags::ACK, api);

        if let Err(e) = self.load_source() {
            error!(error = %e, "读取待发送数据失败，放弃连接");
            self.abort(now);
            return;
        }

        self.state = SenderState::Established;
        self.established_at = Some(now);
        info!(
            rtt_ns = sample,
            timeout = ?self.timeout,
            segments = self.segments.len(),
            total_bytes = self.total_bytes,
            "✅ 连接建立"
        );

        if self.segments.is_empty() {
            self.send_fin(api);
        } else {
            self.send_data_if_possible(api);
        }
    }

    /// 把整个数据源切成 MSS 大小的段放入发送缓冲区
    fn load_source(&mut self) -> std::io::Result<()> {
        let Some(mut source) = self.source.take() else {
            return Ok(());
        };
        let mut data = Vec::new();
        source.read_to_end(&mut data)?;
        // 序列号是 32 位的，数据 + SYN + FIN 必须放得下
        if data.len() > (u32::MAX - 2) as usize {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "input does not fit the 32-bit sequence space",
            ));
        }
        let mss = self.mss() as usize;
        self.total_bytes = data.len() as u32;
        self.segments = data.chunks(mss).map(<[u8]>::to_vec).collect();
        Ok(())
    }

    fn on_ack(&mut self, seg: Segment, api: &mut dyn NetApi) {
        let now = api.now();
        self.update_rto(now.saturating_sub(SimTime(seg.timestamp)));

        let idx = self.ack_index(seg.ack);
        if idx > self.last_sent {
            warn!(ack = seg.ack, idx, last_sent = self.last_sent, "ACK 超出已发送范围，忽略");
            return;
        }

        if idx > self.last_ack {
            self.on_new_ack(idx, api);
        } else if idx == self.last_ack && self.in_flight() > 0 && seg.is_empty() {
            self.on_dup_ack(api);
        } else {
            trace!(idx, last_ack = self.last_ack, "过期 ACK");
        }
    }

    fn on_new_ack(&mut self, idx: usize, api: &mut dyn NetApi) {
        trace!(from = self.last_ack, to = idx, "累计确认前进");
        self.last_ack = idx;
        self.dup_acks = 0;
        self.retries = 0;

        match self.phase {
            CongestionPhase::SlowStart => {
                self.cwnd = self.cwnd.saturating_add(1);
                if self.cwnd >= self.ssthresh {
                    self.phase = CongestionPhase::CongestionAvoidance;
                    self.cwnd_acc = 0;
                }
            }
            CongestionPhase::CongestionAvoidance => {
                self.cwnd_acc += 1;
                if self.cwnd_acc >= self.cwnd {
                    self.cwnd = self.cwnd.saturating_add(1);
                    self.cwnd_acc = 0;
                }
            }
            CongestionPhase::FastRecovery => {
                // 退出快速恢复：窗口收缩回减半后的值
                self.cwnd = (self.ssthresh / 2).max(1);
                self.cwnd_acc = 0;
                self.phase = CongestionPhase::CongestionAvoidance;
            }
        }
        debug!(
            cwnd = self.cwnd,
            ssthresh = self.ssthresh,
            phase = ?self.phase,
            "拥塞窗口更新"
        );

        if self.last_ack == self.segments.len() {
            info!("📦 全部数据已确认");
            self.send_fin(api);
            return;
        }
        // 新的队首段重新计时，旧计时器可能早已因守卫失效
        if self.last_ack < self.last_sent {
            let k = self.last_ack + 1;
            self.head_deadline =
                self.arm_timer(self.seq_of(k), self.segments[k - 1].len() as u32, api);
        }
        self.send_data_if_possible(api);
    }

    fn on_dup_ack(&mut self, api: &mut dyn NetApi) {
        self.dup_acks += 1;
        self.stats.duplicate_acks += 1;
        debug!(dup_acks = self.dup_acks, last_ack = self.last_ack, "重复 ACK");

        if self.dup_acks == DUP_ACK_THRESHOLD {
            self.ssthresh = self.cwnd;
            self.cwnd = (self.cwnd / 2).max(1);
            self.cwnd_acc = 0;
            self.phase = CongestionPhase::FastRecovery;
            let k = self.last_ack + 1;
            info!(segment = k, cwnd = self.cwnd, ssthresh = self.ssthresh, "⚡ 快速重传");
            self.transmit(k, true, api);
        } else if self.dup_acks > DUP_ACK_THRESHOLD
            && self.phase == CongestionPhase::FastRecovery
        {
            self.cwnd = self.cwnd.saturating_add(1);
            self.send_data_if_possible(api);
        }
    }

    /// 用一个 RTT 样本更新 RTO 估计
    fn update_rto(&mut self, sample: SimTime) {
        let srtt = sample.as_nanos_f64();
        let sdev = (srtt - self.ertt).abs();
        self.ertt = RTT_ALPHA * self.ertt + (1.0 - RTT_ALPHA) * srtt;
        self.edev = RTT_BETA * self.edev + (1.0 - RTT_BETA) * sdev;
        self.timeout = self
            .cfg
            .clamp_rto(SimTime::from_nanos_f64(self.ertt + 4.0 * self.edev));
        trace!(srtt, ertt = self.ertt, edev = self.edev, timeout = ?self.timeout, "RTO 更新");
    }

    /// 在窗口允许的范围内发送新段：`last_sent - last_ack < window`。
    pub(crate) fn send_data_if_possible(&mut self, api: &mut dyn NetApi) {
        if self.state != SenderState::Established {
            return;
        }
        while self.last_sent < self.segments.len() && self.in_flight() < self.window() {
            self.last_sent += 1;
            self.transmit(self.last_sent, false, api);
        }
    }

    /// 发出第 k 段；ack 与时间戳在此刻写入，并布置超时检查。
    fn transmit(&mut self, k: usize, retrans: bool, api: &mut dyn NetApi) {
        let seq = self.seq_of(k);
        let payload = self.segments[k - 1].clone();
        let len = payload.len() as u32;
        let seg = Segment::new(seq, self.rcv_nxt, flags::ACK)
            .with_payload(payload)
            .with_timestamp(api.now().0);
        self.stats.bytes_sent += len as u64;
        if retrans {
            self.stats.retransmissions += 1;
        }
        debug!(segment = k, seq, len, retrans, "📤 发送数据段");
        self.emit(seg, api);
        let at = self.arm_timer(seq, len, api);
        if k == self.last_ack + 1 {
            self.head_deadline = at;
        }
    }

    fn send_fin(&mut self, api: &mut dyn NetApi) {
        let seq = self.fin_seq();
        let fin = Segment::new(seq, self.rcv_nxt, flags::FIN | flags::ACK)
            .with_timestamp(api.now().0);
        self.emit(fin, api);
        self.arm_timer(seq, 0, api);
        self.retries = 0;
        self.state = SenderState::FinWait1;
        info!(seq, "👋 发出 FIN，进入 FinWait1");
    }

    fn send_control(&mut self, seq: u32, f: u8, api: &mut dyn NetApi) {
        let seg = Segment::new(seq, self.rcv_nxt, f).with_timestamp(api.now().0);
        self.emit(seg, api);
    }

    fn emit(&mut self, mut seg: Segment, api: &mut dyn NetApi) -> bool {
        let bytes = seg.encode();
        let env = api.make_envelope(self.key.local, self.key.remote, bytes);
        self.stats.packets_sent += 1;
        api.send_from(self.key.local, env)
    }

    /// 排入一个 TimeoutCheck，返回其触发时刻
    fn arm_timer(&self, seq: u32, len: u32, api: &mut dyn NetApi) -> SimTime {
        let at = api.now().saturating_add(self.timeout);
        api.schedule(
            at,
            NetEvent::TimeoutCheck {
                conn: self.key,
                seq,
                len,
            },
        );
        at
    }

    fn on_fin_wait(&mut self, seg: Segment, api: &mut dyn NetApi) {
        let fin_ack = self.fin_seq().wrapping_add(1);
        if seg.is_fin() {
            if !seg.is_ack() || seg.ack != fin_ack {
                warn!(ack = seg.ack, expected = fin_ack, "对端 FIN 未确认本端 FIN，忽略");
                return;
            }
            self.fin_acked = true;
            self.rcv_nxt = seg.seq.wrapping_add(1);
            self.send_control(fin_ack, flags::ACK, api);
            self.state = SenderState::TimeWait;
            let at = api.now().saturating_add(self.cfg.time_wait);
            api.schedule(at, NetEvent::TimeWait { conn: self.key });
            info!(expire_at = ?at, "⏳ 收到对端 FIN，进入 TimeWait");
        } else if seg.is_ack() && seg.ack == fin_ack {
            self.fin_acked = true;
            debug!("FIN 已被确认，等待对端 FIN");
        }
    }

    /// 超时检查。只有当该段仍是 `last_ack + 1` 时才重传，过期的检查直接忽略。
    #[tracing::instrument(skip(self, api), fields(conn = ?self.key, state = ?self.state))]
    pub fn on_timeout(&mut self, seq: u32, len: u32, api: &mut dyn NetApi) {
        let now = api.now();
        match self.state {
            SenderState::SynSent if seq == 0 => {
                if !self.bump_retries(now) {
                    return;
                }
                warn!(timeout = ?self.timeout, "⏰ SYN 超时，重传");
                self.stats.retransmissions += 1;
                let syn = Segment::new(0, 0, flags::SYN).with_timestamp(now.0);
                self.emit(syn, api);
                self.arm_timer(0, 0, api);
            }
            SenderState::Established if len > 0 => {
                let k = self.index_of(seq);
                if k != self.last_ack + 1 || k > self.last_sent {
                    trace!(segment = k, last_ack = self.last_ack, "过期的超时检查");
                    return;
                }
                if now < self.head_deadline {
                    trace!(segment = k, deadline = ?self.head_deadline, "队首段已重新计时，忽略");
                    return;
                }
                if !self.bump_retries(now) {
                    return;
                }
                self.ssthresh = (self.cwnd / 2).max(2);
                self.cwnd = 1;
                self.cwnd_acc = 0;
                self.dup_acks = 0;
                self.phase = CongestionPhase::SlowStart;
                warn!(segment = k, timeout = ?self.timeout, "⏰ 超时重传");
                self.transmit(k, true, api);
            }
            SenderState::FinWait1 if seq == self.fin_seq() && !self.fin_acked => {
                if !self.bump_retries(now) {
                    return;
                }
                warn!("⏰ FIN 超时，重传");
                self.stats.retransmissions += 1;
                let fin = Segment::new(seq, self.rcv_nxt, flags::FIN | flags::ACK)
                    .with_timestamp(now.0);
                self.emit(fin, api);
                self.arm_timer(seq, 0, api);
            }
            _ => trace!(seq, len, "过期的超时检查"),
        }
    }

    /// 记一次连续超时并退避 RTO；超过上限时放弃连接并返回 false。
    fn bump_retries(&mut self, now: SimTime) -> bool {
        self.retries += 1;
        if self.retries > self.cfg.max_retries {
            error!(retries = self.retries, "重传次数超过上限，放弃连接");
            self.abort(now);
            return false;
        }
        self.timeout = self
            .timeout
            .saturating_add(self.timeout)
            .min(self.cfg.max_rto);
        true
    }

    fn abort(&mut self, now: SimTime) {
        self.state = SenderState::Closed;
        self.aborted = true;
        self.closed_at = Some(now);
        self.source = None;
    }

    /// TIME_WAIT 到期，连接彻底释放。
    pub fn on_time_wait(&mut self, api: &mut dyn NetApi) {
        if self.state != SenderState::TimeWait {
            return;
        }
        let now = api.now();
        self.state = SenderState::Closed;
        self.closed_at = Some(now);
        info!(conn = ?self.key, closed_at = ?now, "🔚 发送端关闭");
    }
}
