//! 传输层/协议模块
//!
//! 可靠传输（TCP 变体）：段编解码、发送端与接收端状态机、端点注册表。

pub mod receiver;
pub mod segment;
pub mod sender;
pub mod stats;
pub mod tcp;

pub use receiver::{ReceiverState, TcpReceiver};
pub use segment::{HEADER_LEN, Segment, SegmentError};
pub use sender::{CongestionPhase, SenderState, TcpSender};
pub use stats::TcpStats;
pub use tcp::{ConnKey, Endpoint, MAX_MTU, TcpConfig, TcpOpen, TcpStack};
