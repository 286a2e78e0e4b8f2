//! 端点统计
//!
//! 发送端与接收端共用同一结构；仅属于接收端的计数在发送端保持为 0。

use serde::Serialize;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct TcpStats {
    /// 发出的载荷字节（含重传）
    pub bytes_sent: u64,
    /// 收到的载荷字节
    pub bytes_received: u64,
    pub packets_sent: u64,
    pub packets_received: u64,
    pub retransmissions: u64,
    pub duplicate_acks: u64,
    /// 接收端：过期或缓冲区放不下而丢弃的段
    pub out_of_order_discards: u64,
    /// 校验失败（或无法解析）而丢弃的段
    pub checksum_failures: u64,
}
