// Copyright (c) 2023 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Affero General Public License that can be found
// in the LICENSE file.

//! Named fan-out of server pushes and connection-close events.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use codec::PublishPacket;

use crate::error::Error;

/// Called with each inbound application message, or with the decode error
/// that replaced it.
pub type PublishListener = Arc<dyn Fn(Result<PublishPacket, Error>) + Send + Sync>;

/// Called once per connection when it closes: `Ok(())` on graceful close,
/// the fault otherwise.
pub type CloseListener = Arc<dyn Fn(Result<(), Error>) + Send + Sync>;

#[derive(Default)]
struct Registry {
    publish: HashMap<String, PublishListener>,
    close: HashMap<String, CloseListener>,
}

/// Listener registry shared between client handles and the connection task.
///
/// Mutation is lock-guarded. Notification snapshots the listener list under
/// the lock and invokes callbacks outside it, so a listener may register or
/// unregister listeners from within its own callback. Ordering across
/// listeners is unspecified; each listener observes publishes in arrival
/// order.
#[derive(Clone, Default)]
pub struct Listeners {
    registry: Arc<Mutex<Registry>>,
}

impl Listeners {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` under `name`, replacing any previous listener
    /// with the same name.
    pub fn add_publish_listener<F>(&self, name: &str, listener: F)
    where
        F: Fn(Result<PublishPacket, Error>) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        registry.publish.insert(name.to_string(), Arc::new(listener));
    }

    /// Remove the publish listener under `name`; returns false if absent.
    pub fn remove_publish_listener(&self, name: &str) -> bool {
        let mut registry = self.registry.lock().unwrap();
        registry.publish.remove(name).is_some()
    }

    /// Register `listener` under `name`, replacing any previous listener
    /// with the same name.
    pub fn add_close_listener<F>(&self, name: &str, listener: F)
    where
        F: Fn(Result<(), Error>) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock().unwrap();
        registry.close.insert(name.to_string(), Arc::new(listener));
    }

    /// Remove the close listener under `name`; returns false if absent.
    pub fn remove_close_listener(&self, name: &str) -> bool {
        let mut registry = self.registry.lock().unwrap();
        registry.close.remove(name).is_some()
    }

    /// Deliver one inbound publish, or a decode error, to every publish
    /// listener.
    pub fn notify_publish(&self, result: Result<PublishPacket, Error>) {
        let snapshot: Vec<PublishListener> = {
            let registry = self.registry.lock().unwrap();
            registry.publish.values().cloned().collect()
        };
        for listener in snapshot {
            listener(result.clone());
        }
    }

    /// Deliver the connection-close result to every close listener.
    pub fn notify_close(&self, result: Result<(), Error>) {
        let snapshot: Vec<CloseListener> = {
            let registry = self.registry.lock().unwrap();
            registry.close.values().cloned().collect()
        };
        for listener in snapshot {
            listener(result.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codec::QoS;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_publish_fan_out() {
        let listeners = Listeners::new();
        let count_a = Arc::new(AtomicUsize::new(0));
        let count_b = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&count_a);
        listeners.add_publish_listener("a", move |_publish| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = Arc::clone(&count_b);
        listeners.add_publish_listener("b", move |_publish| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let publish = PublishPacket::new("t", QoS::AtMostOnce, b"m").unwrap();
        listeners.notify_publish(Ok(publish.clone()));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 1);

        assert!(listeners.remove_publish_listener("a"));
        assert!(!listeners.remove_publish_listener("a"));
        listeners.notify_publish(Ok(publish));
        assert_eq!(count_a.load(Ordering::SeqCst), 1);
        assert_eq!(count_b.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unregister_from_own_callback() {
        let listeners = Listeners::new();
        let inner = listeners.clone();
        listeners.add_close_listener("once", move |_result| {
            inner.remove_close_listener("once");
        });
        // Must not deadlock; the callback runs outside the lock.
        listeners.notify_close(Ok(()));
        assert!(!listeners.remove_close_listener("once"));
    }
}
