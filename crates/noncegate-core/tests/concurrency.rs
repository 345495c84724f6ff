//! Multi-threaded issuance and redemption.
//!
//! Threads share one service through `Arc`; redemptions of the same token
//! race and exactly one of them must win.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use noncegate_core::{
    new_encrypted_nonce_service, new_map_nonce_service, Backend, EncryptedNonceService, NonceConfig, NonceService,
    SeededEntropy, StepClock,
};

const START: i64 = 1_700_000_000;

fn frozen(backend: Backend) -> Arc<dyn NonceService> {
    NonceConfig::default()
        .with_backend(backend)
        .build_with(
            Arc::new(StepClock::at_unix(START)),
            Arc::new(SeededEntropy::new(77)),
        )
        .unwrap()
}

/// Two threads racing on one token: exactly one wins.
#[test]
fn test_concurrent_double_redeem_one_succeeds() {
    for backend in [Backend::Encrypted, Backend::Map] {
        let service = frozen(backend);
        for _ in 0..200 {
            let token = Arc::new(service.get().unwrap().token);

            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let s = service.clone();
                    let t = token.clone();
                    thread::spawn(move || s.redeem(&t))
                })
                .collect();

            let wins = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(wins, 1, "{backend}: exactly one redeem should succeed");
        }
    }
}

#[test]
fn test_many_racers_many_tokens() {
    let service = frozen(Backend::Encrypted);
    let tokens: Arc<Vec<String>> =
        Arc::new((0..500).map(|_| service.get().unwrap().token).collect());
    let wins: Arc<Vec<AtomicUsize>> = Arc::new((0..500).map(|_| AtomicUsize::new(0)).collect());

    let handles: Vec<_> = (0..6)
        .map(|worker| {
            let s = service.clone();
            let tokens = tokens.clone();
            let wins = wins.clone();
            thread::spawn(move || {
                // stagger start positions so workers collide at different offsets
                let n = tokens.len();
                for i in 0..n {
                    let idx = (i + worker * 83) % n;
                    if s.redeem(&tokens[idx]) {
                        wins[idx].fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    for (i, w) in wins.iter().enumerate() {
        assert_eq!(w.load(Ordering::SeqCst), 1, "token {i} won {w:?} times");
    }

    let status = service.tidy();
    assert_eq!(status.issued, 500);
    assert_eq!(status.outstanding, 0);
}

#[test]
fn test_concurrent_issue_then_cross_thread_redeem() {
    let clock = Arc::new(StepClock::at_unix(START));
    let service = Arc::new(
        EncryptedNonceService::with_capabilities(
            Duration::from_secs(90),
            clock,
            Arc::new(SeededEntropy::new(8)),
        )
        .unwrap(),
    );

    let (tx, rx) = mpsc::channel::<String>();
    let issuers: Vec<_> = (0..4)
        .map(|_| {
            let s = service.clone();
            let tx = tx.clone();
            thread::spawn(move || {
                for _ in 0..250 {
                    tx.send(s.get().unwrap().token).unwrap();
                }
            })
        })
        .collect();
    drop(tx);

    let redeemer = {
        let s = service.clone();
        thread::spawn(move || rx.into_iter().filter(|t| s.redeem(t)).count())
    };

    for h in issuers {
        h.join().unwrap();
    }
    assert_eq!(redeemer.join().unwrap(), 1000);

    let status = service.tidy();
    assert_eq!(status.issued, 1000);
    assert_eq!(status.outstanding, 0);
    assert_eq!(service.ledger_stats().redeemed_entries, 0);
}

#[test]
fn test_system_clock_service_under_load() {
    let service = new_encrypted_nonce_service(Duration::from_secs(30)).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = service.clone();
            thread::spawn(move || {
                let mut admitted = 0;
                for _ in 0..200 {
                    let token = s.get().unwrap().token;
                    if s.redeem(&token) {
                        admitted += 1;
                    }
                    assert!(!s.redeem(&token));
                }
                admitted
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 800);
    assert_eq!(service.tidy().outstanding, 0);
}

#[test]
fn test_map_constructor_under_load() {
    let service = new_map_nonce_service(Duration::from_secs(30)).unwrap();
    assert!(service.is_strict());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = service.clone();
            thread::spawn(move || {
                (0..200)
                    .filter(|_| {
                        let token = s.get().unwrap().token;
                        s.redeem(&token) && !s.redeem(&token)
                    })
                    .count()
            })
        })
        .collect();

    let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(admitted, 800);
    let status = service.tidy();
    assert_eq!(status.issued, 800);
    assert_eq!(status.outstanding, 0);
}
