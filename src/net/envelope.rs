//! 网络层信封
//!
//! 节点之间搬运的最小容器：源/目的节点 ID + 已序列化的 TCP 段。
//! 本身不携带任何协议语义。
//!
//! 线上格式（大端）：src(2) | dst(2) | length(2) | checksum(2, 保留为 0) | segment...

use super::id::NodeId;
use thiserror::Error;

/// 信封头长度（字节）
pub const ENVELOPE_HEADER_LEN: usize = 8;
/// 16 位长度字段能表示的最大信封
pub const MAX_ENVELOPE_LEN: usize = u16::MAX as usize;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("buffer of {0} bytes is shorter than the envelope header")]
    Truncated(usize),
    #[error("length field says {declared} bytes but buffer holds {actual}")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("envelope of {0} bytes does not fit the 16-bit length field")]
    TooLong(usize),
}

/// 网络信封
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// 全局唯一编号（仅用于日志追踪，不上线）
    pub id: u64,
    pub src: NodeId,
    pub dst: NodeId,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(id: u64, src: NodeId, dst: NodeId, payload: Vec<u8>) -> Self {
        Self {
            id,
            src,
            dst,
            payload,
        }
    }

    /// 在链路上占用的字节数（信封头 + 段）
    pub fn size_bytes(&self) -> u32 {
        (ENVELOPE_HEADER_LEN + self.payload.len()).min(u32::MAX as usize) as u32
    }

    /// 序列化；总长超过 16 位长度字段时报错。
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        let total = ENVELOPE_HEADER_LEN + self.payload.len();
        let Ok(len) = u16::try_from(total) else {
            return Err(EnvelopeError::TooLong(total));
        };
        let mut buf = Vec::with_capacity(total);
        buf.extend_from_slice(&self.src.0.to_be_bytes());
        buf.extend_from_slice(&self.dst.0.to_be_bytes());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&0u16.to_be_bytes());
        buf.extend_from_slice(&self.payload);
        Ok(buf)
    }

    pub fn decode(id: u64, buf: &[u8]) -> Result<Self, EnvelopeError> {
        if buf.len() < ENVELOPE_HEADER_LEN {
            return Err(EnvelopeError::Truncated(buf.len()));
        }
        let src = u16::from_be_bytes([buf[0], buf[1]]);
        let dst = u16::from_be_bytes([buf[2], buf[3]]);
        let declared = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        if declared != buf.len() {
            return Err(EnvelopeError::LengthMismatch {
                declared,
                actual: buf.len(),
            });
        }
        Ok(Self {
            id,
            src: NodeId(src),
            dst: NodeId(dst),
            payload: buf[ENVELOPE_HEADER_LEN..].to_vec(),
        })
    }
}
