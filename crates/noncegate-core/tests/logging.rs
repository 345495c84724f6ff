//! Log output must never carry token material.

use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use noncegate_core::{EncryptedNonceService, NonceService, SeededEntropy, StepClock};
use tracing_subscriber::fmt::MakeWriter;

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for Capture {
    type Writer = Capture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn test_events_omit_tokens() {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(capture.clone())
        .with_max_level(tracing::Level::TRACE)
        .with_ansi(false)
        .finish();

    let token = tracing::subscriber::with_default(subscriber, || {
        let svc = EncryptedNonceService::with_capabilities(
            Duration::from_secs(90),
            Arc::new(StepClock::at_unix(1_700_000_000)),
            Arc::new(SeededEntropy::new(21)),
        )
        .unwrap();

        let token = svc.get().unwrap().token;
        assert!(svc.redeem(&token));
        assert!(!svc.redeem(&token));
        assert!(!svc.redeem("garbage"));
        svc.tidy();
        token
    });

    let logs = capture.contents();
    assert!(logs.contains("encrypted nonce service initialised"));
    assert!(logs.contains("nonce ledger tidied"));
    assert!(logs.contains("nonce rejected"));
    assert!(!logs.contains(&token), "token leaked into logs");
    assert!(!logs.contains("garbage"));
}
