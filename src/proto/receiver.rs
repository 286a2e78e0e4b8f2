//! TCP 接收端
//!
//! 状态机：`Listen → SynRcvd → Established → CloseWait → LastAck → Closed`。
//! 按序数据立即写入 sink；乱序段暂存在以 seq 为键的有序缓冲中，
//! 缓冲上限为接收窗口（段数）。

use std::collections::BTreeMap;
use std::io::Write;

use tracing::{debug, error, info, trace, warn};

use super::segment::{Segment, flags};
use super::stats::TcpStats;
use super::tcp::{ConnKey, TcpConfig};
use crate::net::{NetApi, NetEvent, NodeId};
use crate::sim::SimTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Listen,
    SynRcvd,
    Established,
    CloseWait,
    LastAck,
    Closed,
}

pub struct TcpReceiver {
    key: ConnKey,
    cfg: TcpConfig,
    state: ReceiverState,
    sink: Option<Box<dyn Write>>,

    /// 下一个期望的对端序列号
    expected: u32,
    /// 本端下一个要使用的序列号（SYN 占 0）
    snd_nxt: u32,
    /// 本端 FIN 的序列号，发出 FIN 后才有值
    fin_seq: Option<u32>,
    out_of_order: BTreeMap<u32, Segment>,

    fin_timeout: SimTime,
    fin_retries: u32,
    failed: bool,
    closed_at: Option<SimTime>,
    stats: TcpStats,
}

impl TcpReceiver {
    /// 在 `local` 上等待来自 `remote` 的连接，收到的数据按序写入 `sink`。
    pub fn listen(local: NodeId, remote: NodeId, sink: Box<dyn Write>, cfg: TcpConfig) -> Self {
        let fin_timeout = cfg.clamp_rto(cfg.init_rto);
        Self {
            key: ConnKey::new(local, remote),
            cfg,
            state: ReceiverState::Listen,
            sink: Some(sink),
            expected: 0,
            snd_nxt: 0,
            fin_seq: None,
            out_of_order: BTreeMap::new(),
            fin_timeout,
            fin_retries: 0,
            failed: false,
            closed_at: None,
            stats: TcpStats::default(),
        }
    }

    pub fn key(&self) -> ConnKey {
        self.key
    }

    pub fn state(&self) -> ReceiverState {
        self.state
    }

    pub fn stats(&self) -> &TcpStats {
        &self.stats
    }

    /// 下一个期望的序列号（即累计 ACK 号）
    pub fn expected_seq(&self) -> u32 {
        self.expected
    }

    pub fn buffered(&self) -> usize {
        self.out_of_order.len()
    }

    pub fn closed_at(&self) -> Option<SimTime> {
        self.closed_at
    }

    pub fn is_closed(&self) -> bool {
        self.state == ReceiverState::Closed
    }

    /// sink 写入失败导致连接被拆除
    pub fn has_failed(&self) -> bool {
        self.failed
    }

    #[tracing::instrument(skip(self, bytes, api), fields(conn = ?self.key, state = ?self.state))]
    pub fn on_segment(&mut self, bytes: &[u8], api: &mut dyn NetApi) {
        self.stats.packets_received += 1;
        let seg = match Segment::decode(bytes) {
            Ok(seg) => seg,
            Err(e) => {
                self.stats.checksum_failures += 1;
                warn!(error = %e, "坏段，丢弃");
                return;
            }
        };
        debug!(seq = seg.seq, ack = seg.ack, flags = seg.flags, len = seg.len(), "收到段");

        match self.state {
            ReceiverState::Listen => {
                if !seg.is_syn() {
                    warn!(flags = seg.flags, "Listen 状态只接受 SYN");
                    return;
                }
                self.expected = seg.seq.wrapping_add(1);
                self.send_syn_ack(seg.timestamp, api);
                self.snd_nxt = 1;
                self.state = ReceiverState::SynRcvd;
                info!(expected = self.expected, "🤝 收到 SYN，进入 SynRcvd");
            }
            ReceiverState::SynRcvd => {
                if seg.is_syn() {
                    debug!("重复的 SYN，重发 SYN|ACK");
                    self.send_syn_ack(seg.timestamp, api);
                    return;
                }
                if !seg.is_ack() || seg.ack != self.snd_nxt {
                    warn!(ack = seg.ack, expected = self.snd_nxt, "握手 ACK 不合法");
                    return;
                }
                self.state = ReceiverState::Established;
                info!("✅ 连接建立");
                // 握手 ACK 丢失时，首个数据段同样能完成握手
                if !seg.is_empty() || seg.is_fin() {
                    self.on_data(seg, api);
                }
            }
            ReceiverState::Established => {
                if seg.is_syn() {
                    self.send_syn_ack(seg.timestamp, api);
                    return;
                }
                self.on_data(seg, api);
            }
            ReceiverState::CloseWait | ReceiverState::LastAck => self.on_last_ack(seg, api),
            ReceiverState::Closed => trace!("连接已关闭，忽略"),
        }
    }

    fn on_data(&mut self, seg: Segment, api: &mut dyn NetApi) {
        let ts = seg.timestamp;
        if seg.seq_space() == 0 {
            trace!(ack = seg.ack, "纯 ACK，忽略");
            return;
        }

        if seg.seq < self.expected {
            self.stats.out_of_order_discards += 1;
            debug!(seq = seg.seq, expected = self.expected, "过期段，重发累计 ACK");
            self.send_ack(ts, api);
            return;
        }

        if seg.seq > self.expected {
            if self.out_of_order.contains_key(&seg.seq)
                || self.out_of_order.len() >= self.cfg.window_segments as usize
            {
                self.stats.out_of_order_discards += 1;
                debug!(seq = seg.seq, buffered = self.out_of_order.len(), "乱序缓冲已满或重复，丢弃");
            } else {
                trace!(seq = seg.seq, "乱序段入缓冲");
                self.out_of_order.insert(seg.seq, seg);
            }
            // 重复 ACK 驱动发送端的快速重传
            self.send_ack(ts, api);
            return;
        }

        let mut fin_reached = self.accept(seg);
        while !fin_reached && self.state == ReceiverState::Established {
            let Some(next) = self.out_of_order.remove(&self.expected) else {
                break;
            };
            fin_reached = self.accept(next);
        }
        // 已越过 expected 的缓冲段不会再被用到
        let expected = self.expected;
        self.out_of_order.retain(|&seq, _| seq > expected);

        if self.failed {
            self.closed_at = Some(api.now());
            return;
        }
        self.send_ack(ts, api);

        if fin_reached {
            self.state = ReceiverState::CloseWait;
            info!("收到 FIN，进入 CloseWait");
            self.send_fin(api);
        }
    }

    /// 接纳一个恰好位于 `expected` 的段；返回该段是否带 FIN。
    fn accept(&mut self, seg: Segment) -> bool {
        if !seg.is_empty() {
            if let Err(e) = self.write_payload(&seg.payload) {
                error!(error = %e, "写入输出失败，拆除连接");
                self.fail();
                return false;
            }
            self.stats.bytes_received += seg.len() as u64;
        }
        self.expected = self.expected.wrapping_add(seg.len() as u32);
        if seg.is_fin() {
            self.expected = self.expected.wrapping_add(1);
            return true;
        }
        false
    }

    fn write_payload(&mut self, data: &[u8]) -> std::io::Result<()> {
        if let Some(sink) = self.sink.as_mut() {
            sink.write_all(data)?;
            sink.flush()?;
        }
        Ok(())
    }

    fn fail(&mut self) {
        self.failed = true;
        self.sink = None;
        self.out_of_order.clear();
        self.state = ReceiverState::Closed;
    }

    fn on_last_ack(&mut self, seg: Segment, api: &mut dyn NetApi) {
        let Some(fin_seq) = self.fin_seq else {
            return;
        };
        if seg.is_fin() {
            // 发送端没收到我们的 ACK：补发 ACK 与 FIN
            debug!("重复的 FIN，补发 ACK 与 FIN");
            self.send_ack(seg.timestamp, api);
            self.resend_fin(fin_seq, api);
            return;
        }
        if seg.is_ack() && seg.ack == fin_seq.wrapping_add(1) {
            self.close(api.now());
        }
    }

    fn close(&mut self, now: SimTime) {
        if let Some(mut sink) = self.sink.take() {
            if let Err(e) = sink.flush() {
                error!(error = %e, "关闭输出时 flush 失败");
                self.failed = true;
            }
        }
        self.state = ReceiverState::Closed;
        self.closed_at = Some(now);
        info!(conn = ?self.key, closed_at = ?now, "🔚 接收端关闭");
    }

    fn send_fin(&mut self, api: &mut dyn NetApi) {
        let seq = self.snd_nxt;
        self.snd_nxt = self.snd_nxt.wrapping_add(1);
        self.fin_seq = Some(seq);
        self.resend_fin(seq, api);
        self.state = ReceiverState::LastAck;
        info!(seq, "👋 发出 FIN，进入 LastAck");
    }

    fn resend_fin(&mut self, seq: u32, api: &mut dyn NetApi) {
        let now = api.now();
        let fin = Segment::new(seq, self.expected, flags::FIN | flags::ACK).with_timestamp(now.0);
        self.emit(fin, api);
        api.schedule(
            now.saturating_add(self.fin_timeout),
            NetEvent::TimeoutCheck {
                conn: self.key,
                seq,
                len: 0,
            },
        );
    }

    /// 本端 FIN 的超时检查
    pub fn on_timeout(&mut self, seq: u32, api: &mut dyn NetApi) {
        if self.state != ReceiverState::LastAck || self.fin_seq != Some(seq) {
            trace!(seq, "过期的超时检查");
            return;
        }
        self.fin_retries += 1;
        if self.fin_retries > self.cfg.max_retries {
            error!(retries = self.fin_retries, "FIN 重传次数超过上限，直接关闭");
            self.close(api.now());
            return;
        }
        self.fin_timeout = self
            .fin_timeout
            .saturating_add(self.fin_timeout)
            .min(self.cfg.max_rto);
        self.stats.retransmissions += 1;
        warn!(timeout = ?self.fin_timeout, "⏰ FIN 超时，重传");
        self.resend_fin(seq, api);
    }

    fn send_syn_ack(&mut self, echo_ts: u64, api: &mut dyn NetApi) {
        let seg = Segment::new(0, self.expected, flags::SYN | flags::ACK).with_timestamp(echo_ts);
        self.emit(seg, api);
    }

    /// 累计 ACK，回显触发它的段的时间戳
    fn send_ack(&mut self, echo_ts: u64, api: &mut dyn NetApi) {
        let seg = Segment::new(self.snd_nxt, self.expected, flags::ACK).with_timestamp(echo_ts);
        self.emit(seg, api);
    }

    fn emit(&mut self, mut seg: Segment, api: &mut dyn NetApi) {
        let bytes = seg.encode();
        let env = api.make_envelope(self.key.local, self.key.remote, bytes);
        self.stats.packets_sent += 1;
        if !api.send_from(self.key.local, env) {
            warn!("🚫 无路由，段未发出");
        }
    }
}
