//! 标识符类型
//!
//! 定义节点和链路的唯一标识符。

use serde::{Deserialize, Serialize};

/// 节点标识符（拓扑文件中声明的 16 位 ID，也是信封上的地址）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u16);

/// 链路标识符（`Network` 内部链路数组下标）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LinkId(pub usize);
