//! 网络仿真事件
//!
//! 所有进入调度器的网络事件都是 `NetEvent` 的一个变体，按值持有数据：
//! 事件入队后再修改连接状态不会影响已排队的事件。

use super::envelope::Envelope;
use super::id::NodeId;
use super::net_world::NetWorld;
use crate::proto::ConnKey;
use crate::sim::{Event, Simulator, World};
use tracing::trace;

/// 网络事件
#[derive(Debug, Clone)]
pub enum NetEvent {
    /// 信封到达某个节点（转发或交付给端点）
    Arrive { to: NodeId, env: Envelope },
    /// 端点的重传检查：`seq`/`len` 标识当时发出的段
    TimeoutCheck { conn: ConnKey, seq: u32, len: u32 },
    /// TIME_WAIT 静默期结束
    TimeWait { conn: ConnKey },
}

impl Event for NetEvent {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World) {
        let ev = *self;
        trace!(event = ?ev, now = ?sim.now(), "执行网络事件");
        let w = world
            .as_any_mut()
            .downcast_mut::<NetWorld>()
            .expect("world must be NetWorld");
        w.on_event(ev, sim);
    }
}
