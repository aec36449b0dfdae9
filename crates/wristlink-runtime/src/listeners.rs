//! Weakly held message listeners
//!
//! Observers register interest in inbound traffic without the endpoint keeping
//! them alive. Dead entries are pruned on every notification.

use std::sync::{Arc, Weak};

use wristlink_core::WireMessage;

/// Observer of inbound messages
pub trait MessageListener: Send + Sync {
    fn message_received(&self, message: &WireMessage);
}

#[derive(Default)]
pub struct ListenerSet {
    listeners: Vec<Weak<dyn MessageListener>>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Weak<dyn MessageListener>) {
        self.listeners.push(listener);
    }

    /// Live listeners
    pub fn len(&self) -> usize {
        self.listeners.iter().filter(|l| l.strong_count() > 0).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn notify(&mut self, message: &WireMessage) {
        self.listeners.retain(|weak| match weak.upgrade() {
            Some(listener) => {
                listener.message_received(message);
                true
            }
            None => false,
        });
    }
}

/// Downgrade a shared listener for registration
pub fn weak_listener<L: MessageListener + 'static>(listener: &Arc<L>) -> Weak<dyn MessageListener> {
    let listener: Arc<dyn MessageListener> = listener.clone();
    Arc::downgrade(&listener)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter(AtomicUsize);

    impl MessageListener for Counter {
        fn message_received(&self, _message: &WireMessage) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_dropped_listeners_are_pruned() {
        let mut set = ListenerSet::new();
        let kept = Arc::new(Counter::default());
        let dropped = Arc::new(Counter::default());
        set.add(weak_listener(&kept));
        set.add(weak_listener(&dropped));
        assert_eq!(set.len(), 2);

        drop(dropped);
        set.notify(&WireMessage::notification("assistSTTResponse"));
        assert_eq!(set.len(), 1);
        assert_eq!(kept.0.load(Ordering::SeqCst), 1);
    }
}
