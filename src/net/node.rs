//! 节点类型
//!
//! 主机与路由器共享同一套转发逻辑：到达目的地则交付，否则查路由表转发。

use serde::{Deserialize, Serialize};

use super::id::NodeId;
use super::routing::{Adjacency, RoutingTable};

/// 节点类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Host,
    Router,
}

/// 网络节点
#[derive(Debug)]
pub struct Node {
    id: NodeId,
    name: String,
    kind: NodeKind,
    routes: RoutingTable,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            routes: RoutingTable::default(),
        }
    }

    /// 获取节点标识符
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// 获取节点名称
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// 基于当前拓扑重建本节点的路由表
    pub fn build_routing_table(&mut self, adj: &Adjacency) {
        self.routes = RoutingTable::build(self.id, adj);
    }
}
