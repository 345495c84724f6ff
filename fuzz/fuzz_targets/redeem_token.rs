//! Arbitrary strings handed to `redeem` must never be admitted and never
//! disturb tokens that were really issued.

#![no_main]
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use noncegate_core::{EncryptedNonceService, NonceService, SeededEntropy, StepClock};

fn service() -> &'static EncryptedNonceService {
    static SERVICE: OnceLock<EncryptedNonceService> = OnceLock::new();
    SERVICE.get_or_init(|| {
        EncryptedNonceService::with_capabilities(
            Duration::from_secs(3600),
            Arc::new(StepClock::at_unix(1_700_000_000)),
            Arc::new(SeededEntropy::new(0)),
        )
        .expect("service construction")
    })
}

fuzz_target!(|data: &[u8]| {
    let svc = service();
    let issued = svc.get().expect("issue");

    if let Ok(input) = std::str::from_utf8(data) {
        if input != issued.token {
            assert!(!svc.redeem(input), "forged token admitted");
        }
    }

    assert!(svc.redeem(&issued.token), "genuine token lost");
});
