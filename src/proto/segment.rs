//! TCP 段的线上格式与校验和
//!
//! 所有多字节整数均为大端序：
//!
//! ```text
//!  0               4               8                              16
//! +---------------+---------------+-------------------------------+
//! |   seq (u32)   |   ack (u32)   |       timestamp (u64, ns)     |
//! +---------------+-------+-------+-------------------------------+
//! | len<<3 | flags| rsvd  | cksum |  payload ...
//! +---------------+-------+-------+----------------
//! 16              20      22      24
//! ```
//!
//! flags 低三位：SYN=4，FIN=2，ACK=1。校验和为 16 位反码和（Internet checksum），
//! 计算时校验和字段置零，覆盖整个序列化后的段。

use thiserror::Error;

/// 段头长度（字节）
pub const HEADER_LEN: usize = 24;

const OFF_SEQ: usize = 0;
const OFF_ACK: usize = 4;
const OFF_TS: usize = 8;
const OFF_LEN_FLAGS: usize = 16;
const OFF_CHECKSUM: usize = 22;

/// 长度字段可表示的最大载荷（高 29 位）
pub const MAX_PAYLOAD_LEN: usize = (u32::MAX >> 3) as usize;

/// 标志位
pub mod flags {
    pub const SYN: u8 = 0b100;
    pub const FIN: u8 = 0b010;
    pub const ACK: u8 = 0b001;
    pub const MASK: u8 = 0b111;
}

/// 解析段时可能出现的错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentError {
    #[error("buffer of {0} bytes is shorter than the {HEADER_LEN}-byte header")]
    Truncated(usize),
    #[error("length field says {declared} payload bytes but {actual} are present")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("checksum mismatch: carried {carried:#06x}, computed {computed:#06x}")]
    ChecksumMismatch { carried: u16, computed: u16 },
}

/// TCP 段（头部 + 载荷）
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segment {
    pub seq: u32,
    pub ack: u32,
    /// 发送时刻（仿真纳秒），接收端在 ACK 中原样回显
    pub timestamp: u64,
    pub flags: u8,
    /// 最近一次编码/解码得到的校验和
    pub checksum: u16,
    pub payload: Vec<u8>,
}

impl Segment {
    pub fn new(seq: u32, ack: u32, flags: u8) -> Self {
        Self {
            seq,
            ack,
            flags: flags & flags::MASK,
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_timestamp(mut self, ts: u64) -> Self {
        self.timestamp = ts;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn is_syn(&self) -> bool {
        self.flags & flags::SYN != 0
    }

    pub fn is_fin(&self) -> bool {
        self.flags & flags::FIN != 0
    }

    pub fn is_ack(&self) -> bool {
        self.flags & flags::ACK != 0
    }

    /// 该段占用的序列号空间：载荷长度，SYN/FIN 各占 1
    pub fn seq_space(&self) -> u32 {
        let mut n = self.payload.len() as u32;
        if self.is_syn() {
            n += 1;
        }
        if self.is_fin() {
            n += 1;
        }
        n
    }

    /// 序列化为线上格式，并回填校验和。
    ///
    /// 载荷超过 [`MAX_PAYLOAD_LEN`] 时长度字段会被截断，调用方需保证 MSS 合理。
    pub fn encode(&mut self) -> Vec<u8> {
        let len = self.payload.len();
        let mut buf = vec![0u8; HEADER_LEN + len];

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq.to_be_bytes());
        buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&self.ack.to_be_bytes());
        buf[OFF_TS..OFF_TS + 8].copy_from_slice(&self.timestamp.to_be_bytes());
        let len_flags = ((len as u32) << 3) | (self.flags & flags::MASK) as u32;
        buf[OFF_LEN_FLAGS..OFF_LEN_FLAGS + 4].copy_from_slice(&len_flags.to_be_bytes());
        // 20..22 保留，22..24 校验和在计算时为 0
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());
        self.checksum = csum;
        buf
    }

    /// 解析线上格式并校验。
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        let seg = Self::decode_unchecked(buf)?;
        let computed = checksum_of(buf);
        if computed != seg.checksum {
            return Err(SegmentError::ChecksumMismatch {
                carried: seg.checksum,
                computed,
            });
        }
        Ok(seg)
    }

    /// 只解析结构，不验证校验和。
    pub fn decode_unchecked(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Truncated(buf.len()));
        }
        let seq = u32::from_be_bytes(read_array(buf, OFF_SEQ));
        let ack = u32::from_be_bytes(read_array(buf, OFF_ACK));
        let timestamp = u64::from_be_bytes(read_array(buf, OFF_TS));
        let len_flags = u32::from_be_bytes(read_array(buf, OFF_LEN_FLAGS));
        let checksum = u16::from_be_bytes(read_array(buf, OFF_CHECKSUM));

        let declared = (len_flags >> 3) as usize;
        let actual = buf.len() - HEADER_LEN;
        if declared != actual {
            return Err(SegmentError::LengthMismatch { declared, actual });
        }

        Ok(Self {
            seq,
            ack,
            timestamp,
            flags: (len_flags & flags::MASK as u32) as u8,
            checksum,
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }
}

/// 对一段已序列化的 TCP 段重新计算校验和（校验和字段视为 0）。
pub fn checksum_of(buf: &[u8]) -> u16 {
    if buf.len() < HEADER_LEN {
        return internet_checksum(buf);
    }
    let mut scratch = buf.to_vec();
    scratch[OFF_CHECKSUM..OFF_CHECKSUM + 2].fill(0);
    internet_checksum(&scratch)
}

/// 校验和字段在段内的偏移
pub const fn checksum_offset() -> usize {
    OFF_CHECKSUM
}

/// 16 位反码和（RFC 1071）。奇数长度时末字节在右侧补零。
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);
    for w in &mut chunks {
        sum += u32::from(u16::from_be_bytes([w[0], w[1]]));
        sum = (sum & 0xffff) + (sum >> 16);
    }
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
        sum = (sum & 0xffff) + (sum >> 16);
    }
    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

fn read_array<const N: usize>(buf: &[u8], off: usize) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[off..off + N]);
    out
}
