//! Dumbbell 拓扑构建

use crate::net::{Network, NodeId};
use crate::sim::SimTime;

/// Dumbbell 拓扑配置选项
#[derive(Debug, Clone)]
pub struct DumbbellOpts {
    pub host_link_bps: u64,
    pub bottleneck_bps: u64,
    pub link_latency: SimTime,
    /// 接入链路缓冲（字节）
    pub host_buffer_bytes: u64,
    /// 瓶颈链路缓冲（字节），决定 r0 -> r1 方向的尾丢弃
    pub bottleneck_buffer_bytes: u64,
}

impl Default for DumbbellOpts {
    fn default() -> Self {
        Self {
            host_link_bps: 1_000_000_000,
            bottleneck_bps: 100_000_000,
            link_latency: SimTime::from_micros(100),
            host_buffer_bytes: 1 << 20,
            bottleneck_buffer_bytes: 64 * 1024,
        }
    }
}

/// 构建 dumbbell 拓扑并建好路由表
///
/// 拓扑结构：h0 <-> r0 <-> r1 <-> h1
/// 返回：(源主机, 目标主机)
pub fn build_dumbbell(net: &mut Network, opts: &DumbbellOpts) -> (NodeId, NodeId) {
    let h0 = net.add_host("h0", 0);
    let h1 = net.add_host("h1", 1);
    let r0 = net.add_router("r0", 2);
    let r1 = net.add_router("r1", 3);

    let lat = opts.link_latency;
    net.connect_duplex(h0, r0, lat, opts.host_link_bps, opts.host_buffer_bytes);
    // 瓶颈
    net.connect_duplex(r0, r1, lat, opts.bottleneck_bps, opts.bottleneck_buffer_bytes);
    net.connect_duplex(r1, h1, lat, opts.host_link_bps, opts.host_buffer_bytes);

    net.build_routing_tables();
    (h0, h1)
}
