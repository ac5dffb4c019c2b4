//! Correlation table for outstanding requests.
//!
//! Maps a correlation id to a one-shot continuation that receives the raw
//! reply text. Entries are consumed exactly once and never retried; without
//! a configured reply timeout an unanswered entry lives until connection
//! teardown.

use std::sync::{Mutex, PoisonError};

use dashmap::DashMap;

pub(crate) type ReplyFn = Box<dyn FnOnce(&str) + Send>;

/// A boxed `FnOnce` is `Send` but not `Sync`; the `Mutex` wrapper makes the
/// table shareable across tasks (the table lives inside an `Arc` that the
/// reader, drain, and timer tasks all hold).
#[derive(Default)]
pub(crate) struct PendingReplies {
    entries: DashMap<u64, Mutex<Option<ReplyFn>>>,
}

impl PendingReplies {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register the continuation for `id`. Must happen before the request
    /// frame is queued, so the reply can never race the registration.
    pub(crate) fn insert(&self, id: u64, reply: ReplyFn) {
        self.entries.insert(id, Mutex::new(Some(reply)));
    }

    /// Remove and return the continuation for `id`, if present.
    pub(crate) fn take(&self, id: u64) -> Option<ReplyFn> {
        let (_, cell) = self.entries.remove(&id)?;
        cell.into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: u64) -> bool {
        self.entries.contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn take_consumes_the_entry() {
        let pending = PendingReplies::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        pending.insert(3, Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(pending.contains(3));

        let reply = pending.take(3).unwrap();
        reply(r#"{"reply_to":3,"ok":true}"#);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // At-most-once: the id is gone.
        assert!(!pending.contains(3));
        assert!(pending.take(3).is_none());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn table_is_shareable_across_tasks() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PendingReplies>();
    }
}
