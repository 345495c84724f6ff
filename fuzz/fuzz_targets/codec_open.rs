//! `TokenCodec::open` on arbitrary input: no panics, and nothing opens
//! unless it was sealed under the same key.

#![no_main]
use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use noncegate_core::TokenCodec;

fn codec() -> &'static TokenCodec {
    static CODEC: OnceLock<TokenCodec> = OnceLock::new();
    CODEC.get_or_init(|| TokenCodec::from_key(&[0x42; 32]).expect("codec construction"))
}

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    assert!(codec().open(&text).is_none());
});
