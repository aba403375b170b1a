//! Status message delivery.
//!
//! The sink holds at most one callback. Messages are delivered while holding the sink's
//! mutex, so the callback is never entered from two threads at once. Without a callback
//! every message becomes a `tracing` info event on the `miniscope::status` target.
//!
//! A callback must not call back into the controller: delivery happens on whichever
//! thread emitted the message, including the capture thread, while the sink lock is held.

use parking_lot::Mutex;

/// Callback receiving human-readable status messages.
pub type MessageCallback = Box<dyn FnMut(&str) + Send + 'static>;

/// Single-slot, overwritable status message sink.
#[derive(Default)]
pub struct MessageSink {
    callback: Mutex<Option<MessageCallback>>,
}

impl MessageSink {
    /// Create a sink with no callback registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`, replacing any previous one.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        *self.callback.lock() = Some(Box::new(callback));
    }

    /// Remove the callback, falling back to the default sink.
    pub fn clear_callback(&self) {
        *self.callback.lock() = None;
    }

    /// True if a callback is registered.
    pub fn has_callback(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Deliver one message.
    pub fn emit(&self, message: &str) {
        let mut slot = self.callback.lock();
        match slot.as_mut() {
            Some(callback) => callback(message),
            None => tracing::info!(target: "miniscope::status", "{}", message),
        }
    }
}

impl std::fmt::Debug for MessageSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSink")
            .field("has_callback", &self.has_callback())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn falls_back_to_tracing_without_callback() {
        let sink = MessageSink::new();
        sink.emit("Initialized camera 0");
        assert!(logs_contain("Initialized camera 0"));
    }

    #[test]
    fn callback_receives_messages_in_order() {
        let sink = MessageSink::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        sink.set_callback(move |msg| seen_cb.lock().push(msg.to_string()));

        sink.emit("first");
        sink.emit("second");
        assert_eq!(*seen.lock(), vec!["first", "second"]);
    }

    #[test]
    fn new_callback_replaces_old() {
        let sink = MessageSink::new();
        let old_hits = Arc::new(AtomicUsize::new(0));
        let new_hits = Arc::new(AtomicUsize::new(0));

        let old = Arc::clone(&old_hits);
        sink.set_callback(move |_| {
            old.fetch_add(1, Ordering::SeqCst);
        });
        let new = Arc::clone(&new_hits);
        sink.set_callback(move |_| {
            new.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit("hello");
        assert_eq!(old_hits.load(Ordering::SeqCst), 0);
        assert_eq!(new_hits.load(Ordering::SeqCst), 1);

        sink.clear_callback();
        assert!(!sink.has_callback());
    }

    #[test]
    fn delivery_is_serialized_across_threads() {
        let sink = Arc::new(MessageSink::new());
        let inside = Arc::new(AtomicBool::new(false));
        let overlaps = Arc::new(AtomicUsize::new(0));

        let (inside_cb, overlaps_cb) = (Arc::clone(&inside), Arc::clone(&overlaps));
        sink.set_callback(move |_| {
            if inside_cb.swap(true, Ordering::SeqCst) {
                overlaps_cb.fetch_add(1, Ordering::SeqCst);
            }
            std::thread::yield_now();
            inside_cb.store(false, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        sink.emit("tick");
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    }
}
