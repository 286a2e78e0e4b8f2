//! 统计信息
//!
//! 定义网络仿真统计数据结构。

use serde::Serialize;

/// 网络统计信息
#[derive(Debug, Default, Clone, Serialize)]
pub struct Stats {
    /// 到达目的节点的信封数/字节数
    pub delivered_pkts: u64,
    pub delivered_bytes: u64,
    /// 被链路缓冲区尾丢弃的信封数/字节数
    pub dropped_pkts: u64,
    pub dropped_bytes: u64,
    /// 找不到路由的信封数
    pub unroutable_pkts: u64,
    /// 到达目的节点但没有匹配端点的信封数
    pub unclaimed_pkts: u64,
}
