//! TCP 端点注册表与公共配置
//!
//! 每个端点由 `(本地节点, 对端节点)` 唯一标识。信封到达目的节点后，
//! 以 `(env.dst, env.src)` 查找端点；超时与 TIME_WAIT 事件携带端点自己的键。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::receiver::TcpReceiver;
use super::segment::HEADER_LEN;
use super::sender::TcpSender;
use crate::net::{
    ENVELOPE_HEADER_LEN, Envelope, MAX_ENVELOPE_LEN, NetApi, NetCtx, NetWorld, NodeId,
};
use crate::sim::{Event, SimTime, Simulator, World};

/// 一个段加上信封头必须装得进信封的 16 位长度字段
pub const MAX_MTU: u32 = (MAX_ENVELOPE_LEN - ENVELOPE_HEADER_LEN) as u32;

/// 连接端点键：本地节点 + 对端节点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnKey {
    pub local: NodeId,
    pub remote: NodeId,
}

impl ConnKey {
    pub fn new(local: NodeId, remote: NodeId) -> Self {
        Self { local, remote }
    }

    /// 对端视角的键
    pub fn peer(self) -> Self {
        Self {
            local: self.remote,
            remote: self.local,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// MTU（字节）；MSS = MTU - 段头长度
    pub mtu: u32,
    /// 接收窗口（段数）：接收端乱序缓冲上限，也是发送端的初始 ssthresh
    pub window_segments: u32,
    /// 初始 cwnd（段数）
    pub init_cwnd: u32,
    /// 首个 RTT 样本之前使用的 RTO
    pub init_rto: SimTime,
    pub min_rto: SimTime,
    pub max_rto: SimTime,
    /// TIME_WAIT 静默时长
    pub time_wait: SimTime,
    /// 同一段连续超时的上限，超过后放弃连接
    pub max_retries: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            mtu: 1500,
            window_segments: 10,
            init_cwnd: 1,
            init_rto: SimTime::from_secs(1),
            min_rto: SimTime::from_millis(1),
            max_rto: SimTime::from_secs(60),
            time_wait: SimTime::from_secs(2),
            max_retries: 12,
        }
    }
}

impl TcpConfig {
    /// 每段载荷字节数；MTU 超过 [`MAX_MTU`] 时按上限计
    pub fn mss(&self) -> u32 {
        self.mtu
            .min(MAX_MTU)
            .saturating_sub(HEADER_LEN as u32)
            .max(1)
    }

    /// 把 RTO 限制在 [min_rto, max_rto]
    pub(crate) fn clamp_rto(&self, rto: SimTime) -> SimTime {
        rto.max(self.min_rto).min(self.max_rto)
    }
}

/// 端点
pub enum Endpoint {
    Sender(TcpSender),
    Receiver(TcpReceiver),
}

#[derive(Default)]
pub struct TcpStack {
    endpoints: HashMap<ConnKey, Endpoint>,
}

impl TcpStack {
    pub fn insert_sender(&mut self, sender: TcpSender) -> ConnKey {
        let key = sender.key();
        if self.endpoints.insert(key, Endpoint::Sender(sender)).is_some() {
            warn!(conn = ?key, "端点已存在，被新的发送端替换");
        }
        key
    }

    pub fn insert_receiver(&mut self, receiver: TcpReceiver) -> ConnKey {
        let key = receiver.key();
        if self.endpoints.insert(key, Endpoint::Receiver(receiver)).is_some() {
            warn!(conn = ?key, "端点已存在，被新的接收端替换");
        }
        key
    }

    pub fn sender(&self, key: ConnKey) -> Option<&TcpSender> {
        match self.endpoints.get(&key) {
            Some(Endpoint::Sender(s)) => Some(s),
            _ => None,
        }
    }

    pub fn receiver(&self, key: ConnKey) -> Option<&TcpReceiver> {
        match self.endpoints.get(&key) {
            Some(Endpoint::Receiver(r)) => Some(r),
            _ => None,
        }
    }

    /// 发起连接（发送端的 `open`）
    pub fn open(&mut self, key: ConnKey, api: &mut dyn NetApi) -> bool {
        match self.endpoints.get_mut(&key) {
            Some(Endpoint::Sender(s)) => s.open(api),
            _ => {
                warn!(conn = ?key, "没有对应的发送端，无法发起连接");
                false
            }
        }
    }

    /// 把到达目的节点的信封交给端点；没有匹配端点时返回 false。
    pub fn on_envelope(&mut self, env: Envelope, api: &mut dyn NetApi) -> bool {
        let key = ConnKey::new(env.dst, env.src);
        match self.endpoints.get_mut(&key) {
            Some(Endpoint::Sender(s)) => s.on_segment(&env.payload, api),
            Some(Endpoint::Receiver(r)) => r.on_segment(&env.payload, api),
            None => return false,
        }
        true
    }

    pub fn on_timeout(&mut self, key: ConnKey, seq: u32, len: u32, api: &mut dyn NetApi) {
        match self.endpoints.get_mut(&key) {
            Some(Endpoint::Sender(s)) => s.on_timeout(seq, len, api),
            Some(Endpoint::Receiver(r)) => r.on_timeout(seq, api),
            None => debug!(conn = ?key, "超时事件对应的端点不存在"),
        }
    }

    pub fn on_time_wait(&mut self, key: ConnKey, api: &mut dyn NetApi) {
        if let Some(Endpoint::Sender(s)) = self.endpoints.get_mut(&key) {
            s.on_time_wait(api);
        }
    }

    /// 所有端点都已到达终止状态
    pub fn all_closed(&self) -> bool {
        self.endpoints.values().all(|ep| match ep {
            Endpoint::Sender(s) => s.is_closed(),
            Endpoint::Receiver(r) => r.is_closed(),
        })
    }
}

/// 在指定时刻发起一个 TCP 连接
#[derive(Debug)]
pub struct TcpOpen {
    pub conn: ConnKey,
}

impl Event for TcpOpen {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let TcpOpen { conn } = *self;
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        let mut ctx = NetCtx {
            sim,
            net: &mut w.net,
        };
        w.tcp.open(conn, &mut ctx);
    }
}
