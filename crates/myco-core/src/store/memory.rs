//! In-memory [`RemoteStore`] used by tests and the desktop simulator

use alloc::collections::VecDeque;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::debug;
use serde_json::{Map, Value};

use super::{RecordKey, RemoteStore, StoreChange, StoreError, child_path, is_within};

/// JSON tree with subscriptions and fault injection
///
/// Keys produced by [`RemoteStore::append`] sort in insertion order. Every
/// write fans out one [`StoreChange`] per related subscription (the written
/// path is at, above or below the subscribed path). Subscribing does not
/// replay the current value.
#[derive(Debug)]
pub struct MemoryStore {
    root: Value,
    available: bool,
    subscriptions: Vec<String>,
    changes: VecDeque<StoreChange>,
    next_key: u64,
    failing: Vec<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
            available: true,
            subscriptions: Vec::new(),
            changes: VecDeque::new(),
            next_key: 0,
            failing: Vec::new(),
        }
    }

    /// A store whose connectivity primitives are missing
    pub fn offline() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// Make every operation on a path at or below `prefix` fail.
    pub fn fail_under(&mut self, prefix: &str) {
        self.failing.push(prefix.to_string());
    }

    pub fn clear_failures(&mut self) {
        self.failing.clear();
    }

    /// Inspect the stored value at `path`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in segments(path) {
            node = node.get(segment)?;
        }
        (!node.is_null()).then_some(node)
    }

    /// Number of direct children stored below `path`
    pub fn child_count(&self, path: &str) -> usize {
        self.get(path)
            .and_then(Value::as_object)
            .map_or(0, Map::len)
    }

    /// Merge `fields` into the object at `path` as one write.
    ///
    /// This is how a device pushes its current readings without touching
    /// sibling nodes such as `Sensors/history`.
    pub fn update(&mut self, path: &str, fields: Map<String, Value>) -> Result<(), StoreError> {
        self.check("update", path)?;
        let node = node_mut(&mut self.root, path);
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        if let Value::Object(map) = node {
            map.extend(fields);
        }
        self.notify(path);
        Ok(())
    }

    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    fn check(&self, operation: &'static str, path: &str) -> Result<(), StoreError> {
        if !self.available {
            return Err(StoreError::Unavailable);
        }
        if self.failing.iter().any(|prefix| is_within(path, prefix)) {
            return Err(StoreError::Rejected {
                operation,
                path: path.to_string(),
            });
        }
        Ok(())
    }

    fn put(&mut self, path: &str, value: Value) {
        *node_mut(&mut self.root, path) = value;
        self.notify(path);
    }

    fn remove(&mut self, path: &str) {
        let (parent, leaf) = match path.rsplit_once('/') {
            Some((parent, leaf)) => (Some(parent), leaf),
            None => (None, path),
        };

        let parent_node = match parent {
            Some(parent) => {
                let mut node = &mut self.root;
                for segment in segments(parent) {
                    match node.get_mut(segment) {
                        Some(child) => node = child,
                        None => return,
                    }
                }
                node
            }
            None => &mut self.root,
        };

        if let Some(map) = parent_node.as_object_mut() {
            map.remove(leaf);
        }
        self.notify(path);
    }

    fn notify(&mut self, origin: &str) {
        let related: Vec<String> = self
            .subscriptions
            .iter()
            .filter(|sub| is_within(origin, sub) || is_within(sub, origin))
            .cloned()
            .collect();

        for path in related {
            let value = self.get(&path).cloned().unwrap_or(Value::Null);
            self.changes.push_back(StoreChange {
                path,
                origin: origin.to_string(),
                value,
            });
        }
    }
}

impl RemoteStore for MemoryStore {
    fn is_available(&self) -> bool {
        self.available
    }

    async fn read(&mut self, path: &str) -> Result<Option<Value>, StoreError> {
        self.check("read", path)?;
        Ok(self.get(path).cloned())
    }

    async fn write(&mut self, path: &str, value: Value) -> Result<(), StoreError> {
        self.check("write", path)?;
        self.put(path, value);
        Ok(())
    }

    async fn append(&mut self, path: &str, value: Value) -> Result<RecordKey, StoreError> {
        self.check("append", path)?;
        self.next_key += 1;
        let key = format!("k{:012}", self.next_key);
        self.put(&child_path(path, &key), value);
        Ok(key)
    }

    async fn range_query(
        &mut self,
        path: &str,
        order_by: &str,
        limit_to_last: Option<usize>,
    ) -> Result<Vec<(RecordKey, Value)>, StoreError> {
        self.check("range_query", path)?;

        let mut children: Vec<(RecordKey, Value)> = self
            .get(path)
            .and_then(Value::as_object)
            .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        // Children without the field sort first, ties keep key order.
        children.sort_by(|(ka, a), (kb, b)| {
            let a = a.get(order_by).and_then(Value::as_f64);
            let b = b.get(order_by).and_then(Value::as_f64);
            a.partial_cmp(&b)
                .unwrap_or(core::cmp::Ordering::Equal)
                .then_with(|| ka.cmp(kb))
        });

        if let Some(limit) = limit_to_last {
            let skip = children.len().saturating_sub(limit);
            children.drain(..skip);
        }

        debug!("range query on {} returned {} records", path, children.len());
        Ok(children)
    }

    async fn delete(&mut self, path: &str) -> Result<(), StoreError> {
        self.check("delete", path)?;
        self.remove(path);
        Ok(())
    }

    async fn subscribe(&mut self, path: &str) -> Result<(), StoreError> {
        self.check("subscribe", path)?;
        if !self.subscriptions.iter().any(|sub| sub == path) {
            self.subscriptions.push(path.to_string());
        }
        Ok(())
    }

    fn try_next_change(&mut self) -> Option<StoreChange> {
        self.changes.pop_front()
    }
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

/// Walk to `path`, creating intermediate objects as needed.
fn node_mut<'v>(root: &'v mut Value, path: &str) -> &'v mut Value {
    segments(path).fold(root, |node, segment| {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        match node {
            Value::Object(map) => map.entry(segment).or_insert(Value::Null),
            other => other,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::paths;
    use embassy_futures::block_on;
    use serde_json::json;

    #[test]
    fn test_write_then_read_nested() {
        let mut store = MemoryStore::new();
        block_on(store.write("Actuators/heating", json!(true))).unwrap();

        let actuators = block_on(store.read(paths::ACTUATORS)).unwrap().unwrap();
        assert_eq!(actuators, json!({ "heating": true }));
        assert!(block_on(store.read("Ranges")).unwrap().is_none());
    }

    #[test]
    fn test_range_query_orders_and_limits() {
        let mut store = MemoryStore::new();
        for ts in [30, 10, 20, 40] {
            block_on(store.append(paths::SENSOR_HISTORY, json!({ "timestamp": ts }))).unwrap();
        }

        let records = block_on(store.range_query(paths::SENSOR_HISTORY, "timestamp", Some(3))).unwrap();
        let stamps: Vec<u64> = records
            .iter()
            .map(|(_, v)| v["timestamp"].as_u64().unwrap())
            .collect();
        assert_eq!(stamps, [20, 30, 40]);
    }

    #[test]
    fn test_subscription_fans_out_related_writes() {
        let mut store = MemoryStore::new();
        block_on(store.subscribe(paths::SENSORS)).unwrap();
        block_on(store.subscribe(paths::RANGES)).unwrap();

        block_on(store.write(paths::SENSORS, json!({ "Temperature": 21.0 }))).unwrap();
        block_on(store.append(paths::SENSOR_HISTORY, json!({ "timestamp": 1 }))).unwrap();
        block_on(store.write(paths::ACTUATORS, json!({ "heating": true }))).unwrap();

        let first = store.try_next_change().unwrap();
        assert_eq!(first.path, paths::SENSORS);
        assert!(!first.from_history_write());

        let second = store.try_next_change().unwrap();
        assert!(second.from_history_write());
        assert!(store.try_next_change().is_none());
    }

    #[test]
    fn test_update_keeps_siblings() {
        let mut store = MemoryStore::new();
        block_on(store.append(paths::SENSOR_HISTORY, json!({ "timestamp": 1 }))).unwrap();
        block_on(store.subscribe(paths::SENSORS)).unwrap();

        let fields = json!({ "Temperature": 22.0, "Humidity": 81.0, "CO2": 700.0 });
        store
            .update(paths::SENSORS, fields.as_object().unwrap().clone())
            .unwrap();

        assert_eq!(store.child_count(paths::SENSOR_HISTORY), 1);
        assert_eq!(store.pending_changes(), 1);
        assert_eq!(store.get("Sensors/CO2"), Some(&json!(700.0)));
    }

    #[test]
    fn test_delete_removes_child() {
        let mut store = MemoryStore::new();
        let key = block_on(store.append(paths::SENSOR_HISTORY, json!({ "timestamp": 1 }))).unwrap();
        assert_eq!(store.child_count(paths::SENSOR_HISTORY), 1);

        block_on(store.delete(&child_path(paths::SENSOR_HISTORY, &key))).unwrap();
        assert_eq!(store.child_count(paths::SENSOR_HISTORY), 0);
    }

    #[test]
    fn test_offline_and_injected_failures() {
        let mut offline = MemoryStore::offline();
        assert!(!offline.is_available());
        assert_eq!(
            block_on(offline.read(paths::SENSORS)),
            Err(StoreError::Unavailable)
        );

        let mut store = MemoryStore::new();
        store.fail_under(paths::SENSOR_HISTORY);
        let result = block_on(store.append(paths::SENSOR_HISTORY, json!({})));
        assert!(matches!(result, Err(StoreError::Rejected { operation: "append", .. })));
        assert!(block_on(store.write(paths::SENSORS, json!({}))).is_ok());
    }
}
