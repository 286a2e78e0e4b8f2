//! 网络世界实现
//!
//! 持有网络拓扑与 TCP 端点，是 `NetEvent` 的分发中心。

use super::api::NetCtx;
use super::event::NetEvent;
use super::network::Network;
use crate::proto::TcpStack;
use crate::sim::{Simulator, World};
use std::any::Any;
use tracing::debug;

/// 一个默认的网络世界实现：持有 Network 与 TcpStack。
#[derive(Default)]
pub struct NetWorld {
    pub net: Network,
    pub tcp: TcpStack,
}

impl NetWorld {
    pub fn new(net: Network) -> Self {
        Self {
            net,
            tcp: TcpStack::default(),
        }
    }

    /// 分发一个网络事件：到达 -> 节点转发或端点接收；超时 -> 端点重传检查；TIME_WAIT -> 端点收尾。
    pub fn on_event(&mut self, ev: NetEvent, sim: &mut Simulator) {
        match ev {
            NetEvent::Arrive { to, env } => {
                let Some(env) = self.net.deliver(to, env, sim) else {
                    return;
                };
                let mut ctx = NetCtx {
                    sim,
                    net: &mut self.net,
                };
                if !self.tcp.on_envelope(env, &mut ctx) {
                    ctx.net.stats.unclaimed_pkts += 1;
                    debug!(node = ?to, "目的节点上没有匹配的端点");
                }
            }
            NetEvent::TimeoutCheck { conn, seq, len } => {
                let mut ctx = NetCtx {
                    sim,
                    net: &mut self.net,
                };
                self.tcp.on_timeout(conn, seq, len, &mut ctx);
            }
            NetEvent::TimeWait { conn } => {
                let mut ctx = NetCtx {
                    sim,
                    net: &mut self.net,
                };
                self.tcp.on_time_wait(conn, &mut ctx);
            }
        }
    }
}

impl World for NetWorld {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
