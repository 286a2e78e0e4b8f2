//! 最短跳数路由
//!
//! 每个节点持有一张静态路由表：目的节点 -> 第一跳出链路。
//! 表在构建时对拓扑做一次 BFS（跳数即距离），再沿父指针回溯出距离为 1 的
//! 前驱，得到第一跳。拓扑变化后必须显式重建所有节点的表。

use std::collections::{HashMap, VecDeque};

use super::id::{LinkId, NodeId};

/// 邻接表：节点 -> [(邻居, 本节点到该邻居的出链路)]，按链路配置顺序排列。
pub type Adjacency = HashMap<NodeId, Vec<(NodeId, LinkId)>>;

#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    /// dst -> 第一跳出链路
    first_hop: HashMap<NodeId, LinkId>,
}

impl RoutingTable {
    /// 以 `origin` 为根在 `adj` 上做 BFS，构建路由表。不可达节点不会出现在表中。
    pub fn build(origin: NodeId, adj: &Adjacency) -> Self {
        let mut dist: HashMap<NodeId, u32> = HashMap::new();
        // 子节点 -> (父节点, 父到子的链路)
        let mut parent: HashMap<NodeId, (NodeId, LinkId)> = HashMap::new();
        let mut q: VecDeque<NodeId> = VecDeque::new();

        dist.insert(origin, 0);
        q.push_back(origin);

        while let Some(v) = q.pop_front() {
            let dv = dist[&v];
            let Some(nbrs) = adj.get(&v) else {
                continue;
            };
            for &(nb, link) in nbrs {
                if dist.contains_key(&nb) {
                    continue;
                }
                dist.insert(nb, dv + 1);
                parent.insert(nb, (v, link));
                q.push_back(nb);
            }
        }

        let mut first_hop = HashMap::new();
        for (&dst, &d) in &dist {
            if d == 0 {
                continue;
            }
            // 沿父指针回溯到距离为 1 的节点，取 origin 到它的链路
            let mut cur = dst;
            let mut hop = parent[&cur];
            while hop.0 != origin {
                cur = hop.0;
                hop = parent[&cur];
            }
            first_hop.insert(dst, hop.1);
        }

        Self { first_hop }
    }

    /// 到 `dst` 的第一跳出链路
    pub fn next_link(&self, dst: NodeId) -> Option<LinkId> {
        self.first_hop.get(&dst).copied()
    }

    /// 表中可达目的地的数量
    pub fn len(&self) -> usize {
        self.first_hop.len()
    }

    pub fn is_empty(&self) -> bool {
        self.first_hop.is_empty()
    }
}
