// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared store of each node's latest published output.
//!
//! Publishing merges a partial payload into the node's entry and notifies
//! every subscriber of that node. Subscribers may publish from inside their
//! callback: such nested publishes are queued and delivered breadth-first
//! by the outermost publish, so deep graphs never grow the call stack.
//!
//! Subscribing does not replay existing data. Consumers pair every
//! [`NodeDataStore::subscribe`] with a [`NodeDataStore::read`] to pick up a
//! value that was published before they subscribed.

use crate::node::NodeId;
use crate::payload::{NodeData, PortValue};
use crate::port::Schema;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Callback invoked with the full merged entry on every publish
pub type Subscriber = Arc<dyn Fn(&NodeDataEntry) + Send + Sync>;

/// Latest published output of a node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDataEntry {
    /// Owning node
    pub node: NodeId,
    /// Merged payload
    pub data: NodeData,
    /// Milliseconds since the Unix epoch, strictly increasing across publishes
    pub updated_at: u64,
}

impl NodeDataEntry {
    /// Get the value for a schema
    pub fn get(&self, schema: Schema) -> Option<&PortValue> {
        self.data.get(schema)
    }
}

/// Handle returned by [`NodeDataStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    node: NodeId,
    id: u64,
}

impl SubscriptionHandle {
    /// Node this subscription listens to
    pub fn node(&self) -> NodeId {
        self.node
    }
}

struct Registration {
    id: u64,
    callback: Subscriber,
}

#[derive(Default)]
struct StoreState {
    entries: HashMap<NodeId, NodeDataEntry>,
    subscribers: HashMap<NodeId, Vec<Registration>>,
    /// Entries waiting to be delivered
    pending: VecDeque<NodeDataEntry>,
    /// Set while some publish call is delivering `pending`
    draining: bool,
    last_stamp: u64,
    next_subscription: u64,
}

impl StoreState {
    fn next_stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        self.last_stamp = now.max(self.last_stamp + 1);
        self.last_stamp
    }
}

/// Process-wide keyed storage of node outputs with synchronous notification
pub struct NodeDataStore {
    state: Mutex<StoreState>,
}

/// Clears the draining flag when a subscriber unwinds mid-delivery, so
/// later publishes are still delivered
struct DrainReset<'a>(&'a Mutex<StoreState>);

impl Drop for DrainReset<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.lock().draining = false;
        }
    }
}

impl NodeDataStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }

    /// Merge `data` into the entry of `node` and notify its subscribers.
    ///
    /// Subscribers are invoked in registration order with the merged entry.
    /// When called from inside a subscriber, the notification is queued and
    /// delivered by the outer call once the current batch finishes.
    pub fn publish(&self, node: NodeId, data: NodeData) -> NodeDataEntry {
        let mut state = self.state.lock();
        let stamp = state.next_stamp();
        let entry = state.entries.entry(node).or_insert_with(|| NodeDataEntry {
            node,
            data: NodeData::new(),
            updated_at: 0,
        });
        entry.data.merge(data);
        entry.updated_at = stamp;
        let snapshot = entry.clone();

        state.pending.push_back(snapshot.clone());
        if state.draining {
            tracing::trace!(%node, "Queued nested publish");
            return snapshot;
        }

        state.draining = true;
        drop(state);
        let _reset = DrainReset(&self.state);

        loop {
            let mut state = self.state.lock();
            let Some(next) = state.pending.pop_front() else {
                state.draining = false;
                break;
            };
            let callbacks: Vec<Subscriber> = state
                .subscribers
                .get(&next.node)
                .map(|regs| regs.iter().map(|r| Arc::clone(&r.callback)).collect())
                .unwrap_or_default();
            drop(state);

            tracing::debug!(node = %next.node, subscribers = callbacks.len(), "Publishing");
            for callback in &callbacks {
                callback(&next);
            }
        }

        snapshot
    }

    /// Last published entry of a node, or `None` if it never published
    pub fn read(&self, node: NodeId) -> Option<NodeDataEntry> {
        self.state.lock().entries.get(&node).cloned()
    }

    /// Last published value of one schema for a node
    pub fn read_value(&self, node: NodeId, schema: Schema) -> Option<PortValue> {
        self.state
            .lock()
            .entries
            .get(&node)
            .and_then(|e| e.get(schema).cloned())
    }

    /// Register `callback` for every future publish of `node`.
    ///
    /// Past data is not replayed. Registering the same callback (the same
    /// `Arc`) twice for one node returns the existing handle instead of
    /// adding a second registration.
    pub fn subscribe(&self, node: NodeId, callback: Subscriber) -> SubscriptionHandle {
        let mut state = self.state.lock();

        if let Some(existing) = state.subscribers.get(&node).and_then(|regs| {
            regs.iter()
                .find(|r| std::ptr::addr_eq(Arc::as_ptr(&r.callback), Arc::as_ptr(&callback)))
        }) {
            tracing::warn!(%node, "Ignoring duplicate subscription");
            return SubscriptionHandle { node, id: existing.id };
        }

        state.next_subscription += 1;
        let id = state.next_subscription;
        state
            .subscribers
            .entry(node)
            .or_default()
            .push(Registration { id, callback });
        SubscriptionHandle { node, id }
    }

    /// Remove one registration. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut state = self.state.lock();
        let Some(regs) = state.subscribers.get_mut(&handle.node) else {
            return false;
        };
        let before = regs.len();
        regs.retain(|r| r.id != handle.id);
        let removed = regs.len() != before;
        if regs.is_empty() {
            state.subscribers.remove(&handle.node);
        }
        removed
    }

    /// Drop a node's entry and its subscriber list without notifying anyone
    pub fn remove_node(&self, node: NodeId) {
        let mut state = self.state.lock();
        state.entries.remove(&node);
        state.subscribers.remove(&node);
    }

    /// Number of callbacks registered for a node
    pub fn subscriber_count(&self, node: NodeId) -> usize {
        self.state
            .lock()
            .subscribers
            .get(&node)
            .map_or(0, Vec::len)
    }
}

impl Default for NodeDataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::ImageData;

    fn recorder() -> (Subscriber, Arc<Mutex<Vec<NodeDataEntry>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: Subscriber = Arc::new(move |entry: &NodeDataEntry| sink.lock().push(entry.clone()));
        (callback, seen)
    }

    fn text(value: &str) -> NodeData {
        NodeData::single(PortValue::Text(value.to_string()))
    }

    #[test]
    fn test_read_before_publish_is_absent() {
        let store = NodeDataStore::new();
        assert!(store.read(NodeId(1)).is_none());
    }

    #[test]
    fn test_publish_then_read_returns_merged_entry() {
        let store = NodeDataStore::new();
        let image = ImageData::png(vec![1, 2, 3], 1, 1);
        store.publish(NodeId(1), text("a"));
        store.publish(NodeId(1), NodeData::single(PortValue::RenderedImage(image.clone())));

        let entry = store.read(NodeId(1)).unwrap();
        assert_eq!(entry.get(Schema::Text), Some(&PortValue::Text("a".into())));
        assert_eq!(entry.get(Schema::RenderedImage), Some(&PortValue::RenderedImage(image)));
    }

    #[test]
    fn test_subscriber_invoked_once_per_publish() {
        let store = NodeDataStore::new();
        let (callback, seen) = recorder();
        store.subscribe(NodeId(1), callback);

        store.publish(NodeId(1), text("hello"));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].get(Schema::Text), Some(&PortValue::Text("hello".into())));
    }

    #[test]
    fn test_subscribe_does_not_replay() {
        let store = NodeDataStore::new();
        store.publish(NodeId(1), text("early"));

        let (callback, seen) = recorder();
        store.subscribe(NodeId(1), callback);
        assert!(seen.lock().is_empty());
        assert!(store.read(NodeId(1)).is_some());
    }

    #[test]
    fn test_other_nodes_not_notified() {
        let store = NodeDataStore::new();
        let (callback, seen) = recorder();
        store.subscribe(NodeId(2), callback);
        store.publish(NodeId(1), text("x"));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_registration_order() {
        let store = NodeDataStore::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in 0..3 {
            let order = Arc::clone(&order);
            store.subscribe(NodeId(1), Arc::new(move |_: &NodeDataEntry| order.lock().push(tag)));
        }
        store.publish(NodeId(1), text("x"));
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let store = NodeDataStore::new();
        let (callback, seen) = recorder();
        let handle = store.subscribe(NodeId(1), callback);

        assert!(store.unsubscribe(handle));
        assert!(!store.unsubscribe(handle));
        store.publish(NodeId(1), text("x"));
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn test_duplicate_registration_ignored() {
        let store = NodeDataStore::new();
        let (callback, seen) = recorder();
        let first = store.subscribe(NodeId(1), Arc::clone(&callback));
        let second = store.subscribe(NodeId(1), callback);

        assert_eq!(first, second);
        assert_eq!(store.subscriber_count(NodeId(1)), 1);
        store.publish(NodeId(1), text("x"));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        let store = NodeDataStore::new();
        let a = store.publish(NodeId(1), text("a")).updated_at;
        let b = store.publish(NodeId(1), text("b")).updated_at;
        let c = store.publish(NodeId(2), text("c")).updated_at;
        assert!(a < b && b < c);
    }

    #[test]
    fn test_nested_publish_delivered_breadth_first() {
        let store = Arc::new(NodeDataStore::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        // 1 fans out to 2 and 3; 2 re-publishes to 4
        for (from, to) in [(1, 2), (1, 3), (2, 4)] {
            let weak = Arc::downgrade(&store);
            let log = Arc::clone(&log);
            store.subscribe(
                NodeId(from),
                Arc::new(move |entry: &NodeDataEntry| {
                    log.lock().push((entry.node.0, to));
                    if let Some(store) = weak.upgrade() {
                        store.publish(NodeId(to), entry.data.clone());
                    }
                }),
            );
        }

        store.publish(NodeId(1), text("root"));

        assert_eq!(*log.lock(), vec![(1, 2), (1, 3), (2, 4)]);
        for node in [2, 3, 4] {
            assert_eq!(
                store.read_value(NodeId(node), Schema::Text),
                Some(PortValue::Text("root".into()))
            );
        }
    }

    #[test]
    fn test_long_chain_does_not_recurse() {
        let store = Arc::new(NodeDataStore::new());
        let depth = 10_000u64;
        for from in 1..depth {
            let weak = Arc::downgrade(&store);
            store.subscribe(
                NodeId(from),
                Arc::new(move |entry: &NodeDataEntry| {
                    if let Some(store) = weak.upgrade() {
                        store.publish(NodeId(from + 1), entry.data.clone());
                    }
                }),
            );
        }

        store.publish(NodeId(1), text("deep"));
        assert!(store.read(NodeId(depth)).is_some());
    }

    #[test]
    fn test_remove_node_tears_down_entry_and_subscribers() {
        let store = NodeDataStore::new();
        let (callback, seen) = recorder();
        store.subscribe(NodeId(1), callback);
        store.publish(NodeId(1), text("x"));

        store.remove_node(NodeId(1));
        assert!(store.read(NodeId(1)).is_none());
        assert_eq!(store.subscriber_count(NodeId(1)), 0);

        store.publish(NodeId(1), text("y"));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_panicking_subscriber_does_not_stall_delivery() {
        let store = NodeDataStore::new();
        let crashed = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&crashed);
        let crashing: Subscriber = Arc::new(move |_: &NodeDataEntry| {
            if !flag.swap(true, std::sync::atomic::Ordering::SeqCst) {
                panic!("subscriber crashed");
            }
        });
        store.subscribe(NodeId(1), crashing);
        let (callback, seen) = recorder();
        store.subscribe(NodeId(2), callback);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            store.publish(NodeId(1), text("boom"));
        }));
        assert!(result.is_err());

        store.publish(NodeId(2), text("after"));
        assert_eq!(seen.lock().len(), 1);
    }
}
