// thread_chat_client/src/subscription.rs

//! 广播式订阅注册表。
//!
//! 每个存活的订阅者都会收到每一条被发布的值 (广播，而不是队列)。
//! `publish` 先在锁内拍下订阅者快照，再在锁外按注册顺序逐个回调，
//! 因此回调内部可以安全地订阅或取消订阅。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use log::debug;
use tokio::sync::mpsc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct RegistryInner<T> {
    next_id: u64,
    /// 键为单调递增的订阅编号，遍历顺序即注册顺序。
    subscribers: BTreeMap<u64, Callback<T>>,
}

/// 订阅注册表，克隆后共享同一组订阅者。
pub struct SubscriberRegistry<T> {
    inner: Arc<Mutex<RegistryInner<T>>>,
}

impl<T> Clone for SubscriberRegistry<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Default for SubscriberRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> SubscriberRegistry<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(RegistryInner {
                next_id: 0,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    /// 注册回调。返回的 `Subscription` 被丢弃或调用 `unsubscribe` 时取消注册。
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(id, Arc::new(callback));
            id
        };
        let registry: Weak<Mutex<RegistryInner<T>>> = Arc::downgrade(&self.inner);
        Subscription {
            id,
            remove: Some(Box::new(move || {
                if let Some(inner) = registry.upgrade() {
                    let mut inner = inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                    inner.subscribers.remove(&id);
                }
            })),
        }
    }

    /// 把每个值投递给所有当前订阅者，返回投递的订阅者数量。
    pub fn publish(&self, value: &T) -> usize {
        let snapshot: Vec<Callback<T>> = {
            let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            inner.subscribers.values().cloned().collect()
        };
        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .map(|inner| inner.subscribers.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().subscribers.len())
    }
}

impl<T: Clone + Send + 'static> SubscriberRegistry<T> {
    /// 以通道形式订阅，适合在异步任务中逐条消费。
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |value: &T| {
            if tx.send(value.clone()).is_err() {
                debug!("[订阅] 通道接收端已关闭，丢弃一条投递");
            }
        });
        (subscription, rx)
    }
}

/// 一个已注册的订阅。丢弃即取消注册。
pub struct Subscription {
    id: u64,
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 取消注册；重复调用无副作用。
    pub fn unsubscribe(&mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.remove.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder(registry: &SubscriberRegistry<u32>, tag: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Subscription {
        let log = Arc::clone(log);
        registry.subscribe(move |value: &u32| log.lock().unwrap().push(format!("{}:{}", tag, value)))
    }

    #[test]
    fn test_every_subscriber_receives_every_value_in_order() {
        let registry = SubscriberRegistry::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _a = recorder(&registry, "a", &log);
        let _b = recorder(&registry, "b", &log);

        assert_eq!(registry.publish(&1), 2);
        assert_eq!(registry.publish(&2), 2);
        assert_eq!(*log.lock().unwrap(), vec!["a:1", "b:1", "a:2", "b:2"]);
    }

    #[test]
    fn test_drop_and_unsubscribe_deregister() {
        let registry = SubscriberRegistry::<u32>::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let a = recorder(&registry, "a", &log);
        let mut b = recorder(&registry, "b", &log);
        assert_eq!(registry.subscriber_count(), 2);

        drop(a);
        b.unsubscribe();
        b.unsubscribe();
        assert_eq!(registry.subscriber_count(), 0);
        assert_eq!(registry.publish(&1), 0);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_callback_may_unsubscribe_others_during_publish() {
        let registry = SubscriberRegistry::<u32>::new();
        let registry_for_cb = registry.clone();
        let extra: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let extra_for_cb = Arc::clone(&extra);
        let _first = registry.subscribe(move |_| {
            // 在回调中操作注册表不应死锁
            extra_for_cb.lock().unwrap().take();
            let _ = registry_for_cb.subscriber_count();
        });
        *extra.lock().unwrap() = Some(registry.subscribe(|_| {}));

        registry.publish(&1);
        assert_eq!(registry.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_channel_subscription() {
        let registry = SubscriberRegistry::<u32>::new();
        let (subscription, mut rx) = registry.subscribe_channel();
        registry.publish(&5);
        assert_eq!(rx.recv().await, Some(5));

        drop(subscription);
        registry.publish(&6);
        assert!(rx.recv().await.is_none(), "取消订阅后通道应关闭");
    }
}
