// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! In-process head change notifications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use brook_kernel::{BrookKey, BrookPosition};

/// Latest committed head per brook, for in-process subscribers.
#[derive(Clone, Default)]
pub struct HeadNotifier {
    channels: Arc<Mutex<HashMap<BrookKey, watch::Sender<BrookPosition>>>>,
}

impl HeadNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish a committed head. Never moves a channel backwards.
    pub fn publish(&self, key: &BrookKey, head: BrookPosition) {
        let mut channels = self.channels.lock();
        let Some(sender) = channels.get(key) else {
            return;
        };
        sender.send_if_modified(|current| {
            if head.is_newer_than(*current) {
                *current = head;
                true
            } else {
                false
            }
        });
        if sender.receiver_count() == 0 {
            channels.remove(key);
        }
    }

    /// Watch `key`, starting from `known` (typically the head just read).
    pub fn subscribe(&self, key: &BrookKey, known: BrookPosition) -> watch::Receiver<BrookPosition> {
        let mut channels = self.channels.lock();
        // Drop channels whose subscribers are all gone.
        channels.retain(|_, sender| sender.receiver_count() > 0);
        let sender = channels
            .entry(key.clone())
            .or_insert_with(|| watch::channel(known).0);
        sender.send_if_modified(|current| {
            if known.is_newer_than(*current) {
                *current = known;
                true
            } else {
                false
            }
        });
        sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_newer_heads_only() {
        let notifier = HeadNotifier::new();
        let key = BrookKey::new("t", "1").unwrap();
        let mut rx = notifier.subscribe(&key, BrookPosition::new(2).unwrap());

        notifier.publish(&key, BrookPosition::new(1).unwrap());
        assert!(!rx.has_changed().unwrap());

        notifier.publish(&key, BrookPosition::new(5).unwrap());
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), BrookPosition::new(5).unwrap());
    }

    #[test]
    fn test_publish_without_subscribers_is_noop() {
        let notifier = HeadNotifier::new();
        let key = BrookKey::new("t", "2").unwrap();
        notifier.publish(&key, BrookPosition::ZERO);
        assert!(notifier.channels.lock().is_empty());
    }

    #[test]
    fn test_abandoned_channels_are_pruned() {
        let notifier = HeadNotifier::new();
        for id in 0..10 {
            let key = BrookKey::new("t", format!("gone-{}", id)).unwrap();
            drop(notifier.subscribe(&key, BrookPosition::ZERO));
        }
        let _live = notifier.subscribe(&BrookKey::new("t", "live").unwrap(), BrookPosition::ZERO);
        assert_eq!(notifier.channels.lock().len(), 1);
    }
}
