//! 网络模拟模块
//!
//! 此模块包含网络模拟的核心组件，如节点、链路、信封和网络拓扑。

// 子模块声明
mod api;
mod envelope;
mod event;
mod id;
mod link;
mod net_world;
mod network;
mod node;
mod routing;
mod stats;

// 重新导出公共接口
pub use api::{NetApi, NetCtx};
pub use envelope::{ENVELOPE_HEADER_LEN, Envelope, EnvelopeError, MAX_ENVELOPE_LEN};
pub use event::NetEvent;
pub use id::{LinkId, NodeId};
pub use link::Link;
pub use net_world::NetWorld;
pub use network::Network;
pub use node::{Node, NodeKind};
pub use routing::{Adjacency, RoutingTable};
pub use stats::Stats;
