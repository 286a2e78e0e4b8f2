//! 网络拓扑管理
//!
//! 定义网络拓扑结构，包含节点、链路、信封转发和统计信息。

use std::collections::HashMap;

use super::envelope::Envelope;
use super::event::NetEvent;
use super::id::{LinkId, NodeId};
use super::link::Link;
use super::node::{Node, NodeKind};
use super::routing::Adjacency;
use super::stats::Stats;
use crate::sim::{SimTime, Simulator};
use tracing::{debug, info, trace, warn};

/// 网络拓扑
#[derive(Default)]
pub struct Network {
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    links: Vec<Link>,
    adj: Adjacency,
    routes_dirty: bool,
    next_env_id: u64,
    pub stats: Stats,
}

impl Network {
    /// 添加主机节点
    pub fn add_host(&mut self, name: impl Into<String>, id: u16) -> NodeId {
        self.add_node(name, id, NodeKind::Host)
    }

    /// 添加路由器节点
    pub fn add_router(&mut self, name: impl Into<String>, id: u16) -> NodeId {
        self.add_node(name, id, NodeKind::Router)
    }

    fn add_node(&mut self, name: impl Into<String>, id: u16, kind: NodeKind) -> NodeId {
        let id = NodeId(id);
        if self.index.contains_key(&id) {
            warn!(node_id = ?id, "节点 ID 已存在，忽略重复添加");
            return id;
        }
        self.index.insert(id, self.nodes.len());
        self.nodes.push(Node::new(id, name, kind));
        self.routes_dirty = true;
        id
    }

    /// 连接两个节点（创建单向链路）
    pub fn connect(
        &mut self,
        from: NodeId,
        to: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
        buffer_bytes: u64,
    ) -> LinkId {
        let id = LinkId(self.links.len());
        self.links
            .push(Link::new(from, to, latency, bandwidth_bps, buffer_bytes));
        self.adj.entry(from).or_default().push((to, id));
        self.routes_dirty = true;
        id
    }

    /// 双向连接：两条参数相同、彼此独立的单向链路
    pub fn connect_duplex(
        &mut self,
        a: NodeId,
        b: NodeId,
        latency: SimTime,
        bandwidth_bps: u64,
        buffer_bytes: u64,
    ) -> (LinkId, LinkId) {
        let ab = self.connect(a, b, latency, bandwidth_bps, buffer_bytes);
        let ba = self.connect(b, a, latency, bandwidth_bps, buffer_bytes);
        (ab, ba)
    }

    /// 为每个节点重建路由表。拓扑修改后必须显式调用。
    #[tracing::instrument(skip(self), fields(nodes = self.nodes.len(), links = self.links.len()))]
    pub fn build_routing_tables(&mut self) {
        for node in &mut self.nodes {
            node.build_routing_table(&self.adj);
            trace!(node = %node.name(), routes = node.routes().len(), "路由表已构建");
        }
        self.routes_dirty = false;
        info!("🧭 路由表构建完成");
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }

    /// 按名称查找节点
    pub fn node_by_name(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn link(&self, id: LinkId) -> &Link {
        &self.links[id.0]
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// 查找 from -> to 的单向链路
    pub fn link_between(&self, from: NodeId, to: NodeId) -> Option<LinkId> {
        self.adj
            .get(&from)?
            .iter()
            .find(|(nb, _)| *nb == to)
            .map(|&(_, id)| id)
    }

    /// 修改 from -> to 链路的缓冲区容量（字节）
    pub fn set_link_buffer_bytes(&mut self, from: NodeId, to: NodeId, bytes: u64) -> bool {
        match self.link_between(from, to) {
            Some(id) => {
                self.links[id.0].buffer_bytes = bytes;
                true
            }
            None => false,
        }
    }

    /// 创建信封
    pub fn make_envelope(&mut self, src: NodeId, dst: NodeId, payload: Vec<u8>) -> Envelope {
        let id = self.next_env_id;
        self.next_env_id = self.next_env_id.wrapping_add(1);
        Envelope::new(id, src, dst, payload)
    }

    /// 从指定节点把信封发往其目的地的下一跳。
    ///
    /// 返回 false 表示无路由；被链路尾丢弃仍返回 true（发送动作本身已完成）。
    #[tracing::instrument(skip(self, env, sim), fields(env_id = env.id, from = ?from, dst = ?env.dst))]
    pub fn send_from(&mut self, from: NodeId, env: Envelope, sim: &mut Simulator) -> bool {
        if self.routes_dirty {
            warn!("拓扑已变更但路由表尚未重建");
        }

        if from == env.dst {
            debug!("源即目的，本地交付");
            let to = env.dst;
            sim.schedule(sim.now(), NetEvent::Arrive { to, env });
            return true;
        }

        let Some(link_id) = self
            .node(from)
            .and_then(|n| n.routes().next_link(env.dst))
        else {
            self.stats.unroutable_pkts += 1;
            warn!("🚫 无可用路由，丢弃");
            return false;
        };

        let size = env.size_bytes();
        let now = sim.now();
        let link = &mut self.links[link_id.0];
        let to = link.to;
        match link.transmit(now, size) {
            Some(arrive) => {
                debug!(link_id = ?link_id, to = ?to, arrive = ?arrive, "调度信封到达事件");
                sim.schedule(arrive, NetEvent::Arrive { to, env });
            }
            None => {
                self.stats.dropped_pkts += 1;
                self.stats.dropped_bytes += size as u64;
            }
        }
        true
    }

    /// 信封到达节点：若已到达目的地则返回给传输层，否则继续转发。
    #[tracing::instrument(skip(self, env, sim), fields(env_id = env.id, to = ?to))]
    pub fn deliver(&mut self, to: NodeId, env: Envelope, sim: &mut Simulator) -> Option<Envelope> {
        if to != env.dst {
            debug!("未到达目的地，继续转发");
            self.send_from(to, env, sim);
            return None;
        }

        self.stats.delivered_pkts += 1;
        self.stats.delivered_bytes += env.size_bytes() as u64;
        debug!(
            delivered_pkts = self.stats.delivered_pkts,
            delivered_bytes = self.stats.delivered_bytes,
            "✅ 信封送达目的地"
        );
        Some(env)
    }
}
