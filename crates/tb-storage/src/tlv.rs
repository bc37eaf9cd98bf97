//! Length-prefixed block framing for batch files.
//!
//! Each record is stored as:
//!
//! ```text
//! +----------------------+---------------------+
//! | length: u32 (LE)     | payload: length B   |
//! +----------------------+---------------------+
//! ```
//!
//! A batch file is a plain concatenation of blocks. When the process is
//! killed mid-append the file ends with a partial block; the decoder stops
//! there and keeps every complete block before it.

use crate::error::{Result, StorageError};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Frame a payload into a single block.
pub fn encode_block(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(StorageError::EmptyObject);
    }
    let len = u32::try_from(payload.len()).map_err(|_| StorageError::ObjectTooLarge {
        size: payload.len() as u64,
        max: u64::from(u32::MAX),
    })?;

    let mut block = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    block.extend_from_slice(&len.to_le_bytes());
    block.extend_from_slice(payload);
    Ok(block)
}

/// Why decoding stopped before the end of the data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeIssue {
    /// Fewer bytes remain than the block declares (interrupted write).
    Truncated {
        offset: usize,
        declared: u64,
        available: usize,
    },
    /// The declared length exceeds the largest block the writer could have
    /// produced, so the prefix itself is garbage and nothing after it can be
    /// trusted.
    Oversized { offset: usize, declared: u64 },
}

impl std::fmt::Display for DecodeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeIssue::Truncated {
                offset,
                declared,
                available,
            } => write!(
                f,
                "truncated block at offset {}: declared {} bytes, {} available",
                offset, declared, available
            ),
            DecodeIssue::Oversized { offset, declared } => write!(
                f,
                "invalid block length {} at offset {}",
                declared, offset
            ),
        }
    }
}

/// Output of [`decode_blocks`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlocks {
    /// Complete payloads in file order.
    pub records: Vec<Vec<u8>>,
    /// Zero-length blocks skipped (zero-filled tail after a crash).
    pub skipped_empty: usize,
    /// Set when decoding stopped early.
    pub issue: Option<DecodeIssue>,
}

/// Split `data` into block payloads.
///
/// `max_block_size` bounds the declared payload length; anything larger is
/// treated as a corrupted prefix. Never panics on arbitrary input.
///
/// Decoding stops at the first oversized or truncated block and keeps only
/// the records before it. There is no resynchronization: well-formed blocks
/// after a corrupted prefix are dropped with it, since a bad length leaves
/// no reliable boundary to restart from.
pub fn decode_blocks(data: &[u8], max_block_size: u64) -> DecodedBlocks {
    let mut decoded = DecodedBlocks::default();
    let mut offset = 0usize;

    while offset < data.len() {
        let remaining = data.len() - offset;
        if remaining < LENGTH_PREFIX_SIZE {
            decoded.issue = Some(DecodeIssue::Truncated {
                offset,
                declared: LENGTH_PREFIX_SIZE as u64,
                available: remaining,
            });
            break;
        }

        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        prefix.copy_from_slice(&data[offset..offset + LENGTH_PREFIX_SIZE]);
        let declared = u64::from(u32::from_le_bytes(prefix));

        if declared == 0 {
            decoded.skipped_empty += 1;
            offset += LENGTH_PREFIX_SIZE;
            continue;
        }
        if declared > max_block_size {
            decoded.issue = Some(DecodeIssue::Oversized { offset, declared });
            break;
        }

        let start = offset + LENGTH_PREFIX_SIZE;
        let available = data.len() - start;
        // declared <= max_block_size fits in usize on every supported target
        let len = declared as usize;
        if available < len {
            decoded.issue = Some(DecodeIssue::Truncated {
                offset,
                declared,
                available,
            });
            break;
        }

        decoded.records.push(data[start..start + len].to_vec());
        offset = start + len;
    }

    decoded
}
