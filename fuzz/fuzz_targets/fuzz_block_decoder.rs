//! Fuzz target for batch file decoding.
//!
//! Batch files may be torn by a crash or corrupted on disk; decoding must
//! never panic and never return a record longer than the declared limit.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tb_storage::tlv::decode_blocks;

const MAX_BLOCK: u64 = 4 * 1024 * 1024;

fuzz_target!(|data: &[u8]| {
    let decoded = decode_blocks(data, MAX_BLOCK);
    for record in &decoded.records {
        assert!(!record.is_empty());
        assert!(record.len() as u64 <= MAX_BLOCK);
    }
});
