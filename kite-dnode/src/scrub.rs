use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::path::{Path, PathSeg};
use crate::value::{CallValue, Function, FUNCTION_PLACEHOLDER};

/// The outgoing callback map: stringified integer id to the path where the
/// scrubbed callable lived.
pub type CallbackMap = BTreeMap<String, Path>;

/// Per-peer scrubbing state: the local callback table and its id sequence.
///
/// The table grows on send and shrinks when the caller culls entries it no
/// longer expects the peer to invoke. Ids are allocated from the atomic
/// counter; the mutex guards only the table, and is never held across an
/// await point.
pub struct Scrubber {
    seq: AtomicU64,
    callbacks: Mutex<HashMap<u64, Function>>,
}

impl Scrubber {
    pub fn new() -> Self {
        Self {
            seq: AtomicU64::new(0),
            callbacks: Mutex::new(HashMap::new()),
        }
    }

    /// Walk an argument tree, replacing every callable with the
    /// `"[Function]"` placeholder and recording its path under a fresh id.
    ///
    /// A scalar root is legal and yields the tree unchanged with an empty
    /// map; only sequences and mappings are walked.
    pub fn scrub(&self, root: &CallValue) -> (serde_json::Value, CallbackMap) {
        let mut map = CallbackMap::new();
        match root {
            CallValue::Array(_) | CallValue::Object(_) => {
                let mut path = Vec::new();
                let json = self.walk(root, &mut path, &mut map);
                (json, map)
            }
            other => (other.to_json(), map),
        }
    }

    fn walk(
        &self,
        value: &CallValue,
        path: &mut Vec<PathSeg>,
        map: &mut CallbackMap,
    ) -> serde_json::Value {
        match value {
            CallValue::Function(f) => {
                let id = self.register(f.clone());
                map.insert(id.to_string(), Path::from_segs(path.clone()));
                serde_json::Value::String(FUNCTION_PLACEHOLDER.to_string())
            }
            CallValue::Array(items) => serde_json::Value::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| {
                        path.push(PathSeg::Index(i));
                        let out = self.walk(item, path, map);
                        path.pop();
                        out
                    })
                    .collect(),
            ),
            CallValue::Object(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(key, field)| {
                        path.push(PathSeg::Key(key.clone()));
                        let out = self.walk(field, path, map);
                        path.pop();
                        (key.clone(), out)
                    })
                    .collect(),
            ),
            scalar => scalar.to_json(),
        }
    }

    /// Store a callable under the next id and return the id.
    pub fn register(&self, f: Function) -> u64 {
        let id = self.seq.fetch_add(1, Ordering::Relaxed);
        self.callbacks.lock().unwrap().insert(id, f);
        id
    }

    /// Look up a callable by the integer id a peer sent back.
    pub fn get(&self, id: u64) -> Option<Function> {
        self.callbacks.lock().unwrap().get(&id).cloned()
    }

    /// Remove a single table entry, returning it if it was live.
    pub fn cull(&self, id: u64) -> Option<Function> {
        self.callbacks.lock().unwrap().remove(&id)
    }

    /// Remove a batch of entries, e.g. after a matching response arrived.
    pub fn cull_many(&self, ids: &[u64]) {
        let mut table = self.callbacks.lock().unwrap();
        for id in ids {
            table.remove(id);
        }
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Scrubber {
    fn default() -> Self {
        Self::new()
    }
}
