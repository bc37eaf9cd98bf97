//! Fuzz target for appending records and cutting the file anywhere.
//!
//! Whatever prefix of an appended file survives, decoding yields exactly
//! the records that were fully written, in order.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tb_storage::tlv::{decode_blocks, encode_block};

#[derive(Debug, Arbitrary)]
struct Input {
    records: Vec<Vec<u8>>,
    cut: usize,
}

fuzz_target!(|input: Input| {
    let mut file = Vec::new();
    let mut ends = Vec::new();
    let mut written = Vec::new();
    for record in input.records {
        if let Ok(block) = encode_block(&record) {
            file.extend_from_slice(&block);
            ends.push(file.len());
            written.push(record);
        }
    }

    let cut = if file.is_empty() { 0 } else { input.cut % (file.len() + 1) };
    let complete = ends.iter().take_while(|end| **end <= cut).count();

    let decoded = decode_blocks(&file[..cut], u64::MAX);
    assert_eq!(decoded.records, written[..complete].to_vec());
});
