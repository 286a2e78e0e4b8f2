//! 链路类型
//!
//! 单向链路：带宽、传播时延和有限缓冲。缓冲区容量以“排空时间”表示
//! （`full_buffer_time = buffer_bytes * 8 / bandwidth`），一个包只有在其预计
//! 发送完成时刻不晚于 `now + full_buffer_time` 时才被接纳，等价于有界 FIFO 的尾丢弃。

use super::id::NodeId;
use crate::sim::SimTime;
use tracing::{debug, trace};

/// 网络链路（单向）
#[derive(Debug)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
    pub latency: SimTime,
    pub bandwidth_bps: u64,
    /// 缓冲区容量（字节）
    pub buffer_bytes: u64,
    /// 传输介质下一次空闲的时刻（单服务台、非抢占）
    pub next_available: SimTime,
    pub sent_pkts: u64,
    pub dropped_pkts: u64,
    pub dropped_bytes: u64,
}

impl Link {
    /// 创建新链路
    pub fn new(
        from: NodeId,
        to: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
        buffer_bytes: u64,
    ) -> Self {
        Self {
            from,
            to,
            latency,
            bandwidth_bps,
            buffer_bytes,
            next_available: SimTime::ZERO,
            sent_pkts: 0,
            dropped_pkts: 0,
            dropped_bytes: 0,
        }
    }

    /// 计算传输指定字节数所需的时间
    pub(crate) fn tx_time(&self, bytes: u64) -> SimTime {
        // ceil(bytes*8 / bps) 秒 -> 纳秒
        if self.bandwidth_bps == 0 {
            return SimTime(u64::MAX / 4);
        }
        let bits = (bytes as u128).saturating_mul(8);
        let nanos = (bits.saturating_mul(1_000_000_000u128)
            + (self.bandwidth_bps as u128 - 1))
            / self.bandwidth_bps as u128;
        SimTime(nanos.min(u64::MAX as u128) as u64)
    }

    /// 缓冲区排空时间
    pub fn full_buffer_time(&self) -> SimTime {
        self.tx_time(self.buffer_bytes)
    }

    /// 尝试发送一个 `size_bytes` 字节的包。
    ///
    /// 被接纳时返回到达远端的时刻并占用介质；缓冲区放不下时返回 `None`（计入丢包，不是错误）。
    pub fn transmit(&mut self, now: SimTime, size_bytes: u32) -> Option<SimTime> {
        let tx_time = self.tx_time(size_bytes as u64);
        let depart = self.next_available.max(now);
        let completion = depart.saturating_add(tx_time);
        let limit = now.saturating_add(self.full_buffer_time());

        trace!(
            now = ?now,
            next_available = ?self.next_available,
            tx_time = ?tx_time,
            completion = ?completion,
            limit = ?limit,
            "计算传输时间"
        );

        if completion > limit {
            self.dropped_pkts += 1;
            self.dropped_bytes += size_bytes as u64;
            debug!(
                from = ?self.from,
                to = ?self.to,
                size_bytes,
                "🗑️  缓冲区已满，尾丢弃"
            );
            return None;
        }

        self.next_available = completion;
        self.sent_pkts += 1;
        Some(completion.saturating_add(self.latency))
    }
}
