use crate::Mailbox;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[test]
fn test_last_write_wins() {
    let mailbox = Mailbox::new();
    mailbox.save("k1", 1);
    mailbox.save("k2", 2);

    assert_eq!(mailbox.peek(), Some(("k2", 2)));
    assert_eq!(mailbox.take_and_clear(), Some(("k2", 2)));
    assert_eq!(mailbox.take_and_clear(), None);
    assert!(mailbox.is_empty());
}

#[test]
fn test_peek_does_not_clear() {
    let mailbox: Mailbox<String, String> = Mailbox::default();
    mailbox.save("alice".to_string(), "hello".to_string());

    assert_eq!(mailbox.peek(), mailbox.peek());
    assert!(!mailbox.is_empty());

    mailbox.clear();
    assert_eq!(mailbox.peek(), None);
}

#[test]
fn test_concurrent_consumers_never_share_a_value() {
    for _ in 0..50 {
        let mailbox = Arc::new(Mailbox::new());
        mailbox.save("notification", 7u32);
        let taken = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mailbox = mailbox.clone();
                let taken = taken.clone();
                std::thread::spawn(move || {
                    if mailbox.take_and_clear().is_some() {
                        taken.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(taken.load(Ordering::SeqCst), 1);
        assert!(mailbox.is_empty());
    }
}
