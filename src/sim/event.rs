//! 事件 trait
//!
//! 调度器只认识这个 trait；网络层的 `NetEvent`（到达 / 超时检查 / TIME_WAIT 到期）
//! 以及测试里的标记事件都通过它进入队列。

use super::simulator::Simulator;
use super::world::World;

/// 事件：可被调度执行。使用 `self: Box<Self>` 以支持 move/所有权转移，
/// 入队后事件持有自己的数据副本，不与连接状态共享可变引用。
pub trait Event: Send + 'static {
    fn execute(self: Box<Self>, sim: &mut Simulator, world: &mut dyn World);
}
