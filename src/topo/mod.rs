//! 拓扑构建：内置 dumbbell 与拓扑描述文件

pub mod dumbbell;
pub mod file;

pub use dumbbell::{DumbbellOpts, build_dumbbell};
pub use file::{LinkSpec, NodeSpec, TopologyError, TopologySpec, load_topology, parse_topology};
