//! Single-slot storage for the most recently received email

use crate::smtp::email::Email;

use parking_lot::RwLock;
use std::sync::Arc;

/// Holds at most one email: whichever session completed last
///
/// Emails are built before the lock is taken, so the lock only guards a
/// pointer swap and readers never see a partially constructed email.
#[derive(Debug, Default)]
pub struct EmailStore {
    slot: RwLock<Option<Arc<Email>>>,
}

impl EmailStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored email
    pub fn set(&self, email: Email) {
        let email = Arc::new(email);
        let previous = self.slot.write().replace(email);
        // Drop the superseded email outside the lock.
        drop(previous);
    }

    /// Return a copy of the stored email, if any
    pub fn get(&self) -> Option<Email> {
        self.slot.read().as_deref().cloned()
    }

    /// Whether a message has been stored yet
    pub fn is_empty(&self) -> bool {
        self.slot.read().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn email(n: usize) -> Email {
        Email::new(
            format!("sender{n}@example.com"),
            "root@example.com",
            format!("Subject {n}"),
            format!("Body {n}\r\n"),
        )
    }

    #[test]
    fn test_starts_empty() {
        let store = EmailStore::new();
        assert!(store.is_empty());
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_set_overwrites() {
        let store = EmailStore::new();
        store.set(email(1));
        store.set(email(2));

        assert_eq!(store.get(), Some(email(2)));
        assert!(!store.is_empty());
    }

    #[test]
    fn test_concurrent_writers_never_tear() {
        let store = Arc::new(EmailStore::new());
        let writers: Vec<_> = (0..8)
            .map(|n| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..200 {
                        store.set(email(n));
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            if let Some(seen) = store.get() {
                let n: usize = seen.subject()["Subject ".len()..].parse().unwrap();
                assert_eq!(seen, email(n));
            }
        }

        for writer in writers {
            writer.join().unwrap();
        }

        let last = store.get().unwrap();
        assert!((0..8).any(|n| last == email(n)));
    }
}
