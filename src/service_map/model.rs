//! Graph vertices and edges as returned to callers.

use crate::core::{Result, TraceId, TracemapError};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::hash::Hash;

/// What kind of component a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Edge,
    Gateway,
    Mesh,
    Database,
    Outbound,
    Service,
    Uninstrumented,
}

/// Directional role of a node relative to the central service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    Central,
    Upstream,
    Downstream,
    Distributary,
    Unknown,
}

/// One aggregated graph vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    pub service_name: String,
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_type: Option<String>,
    /// Number of spans folded into this node
    pub count: u64,
    /// Operation name -> occurrences
    pub operations: BTreeMap<String, u64>,
    /// Summed span duration in microseconds
    pub duration: u64,
    pub avg_duration: String,
    pub trace_ids: Vec<TraceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<Relationship>,
    #[serde(default)]
    pub invalid_cycle_detected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_cycle_path: Vec<String>,
}

impl Node {
    /// Creates a node holding a single observation.
    ///
    /// `id` and `name` are required; an empty value means a matcher produced
    /// nothing usable, which is a configuration bug rather than bad input.
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: NodeKind) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.is_empty() {
            return Err(TracemapError::schema("missing required property id when creating node"));
        }
        if name.is_empty() {
            return Err(TracemapError::schema(format!(
                "missing required property name when creating node {}",
                id
            )));
        }
        Ok(Node {
            id,
            name,
            service_name: String::new(),
            kind,
            database_type: None,
            count: 1,
            operations: BTreeMap::new(),
            duration: 0,
            avg_duration: format_avg_duration(0, 1),
            trace_ids: Vec::new(),
            relationship: None,
            invalid_cycle_detected: false,
            invalid_cycle_path: Vec::new(),
        })
    }

    /// Sets the relationship unless one is already assigned.
    /// Returns true when the label was written.
    pub fn assign(&mut self, relationship: Relationship) -> bool {
        if self.relationship.is_some() {
            return false;
        }
        self.relationship = Some(relationship);
        true
    }

    pub fn is_central(&self) -> bool {
        self.relationship == Some(Relationship::Central)
    }
}

/// Average duration display value: `floor(duration / count)` in whole milliseconds.
pub fn format_avg_duration(duration_us: u64, count: u64) -> String {
    format!("{} ms", duration_us / count.max(1) / 1000)
}

/// One aggregated directed edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    pub source: String,
    pub target: String,
    pub count: u64,
    /// Raw occurrence counter, incremented alongside `count`; not a rate.
    pub tps: u64,
    pub is_uninstrumented: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub invalid_cycle_detected: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_cycle_path: Vec<String>,
}

impl Link {
    /// Creates a link seen once. Both endpoints are required.
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let target = target.into();
        if source.is_empty() {
            return Err(TracemapError::schema(format!(
                "missing required property source when creating link to {}",
                target
            )));
        }
        if target.is_empty() {
            return Err(TracemapError::schema(format!(
                "missing required property target when creating link from {}",
                source
            )));
        }
        Ok(Link {
            source,
            target,
            count: 1,
            tps: 1,
            is_uninstrumented: false,
            invalid_cycle_detected: false,
            invalid_cycle_path: Vec::new(),
        })
    }

    /// Records another occurrence of this edge.
    pub fn record(&mut self) {
        self.count += 1;
        self.tps += 1;
    }

    pub fn key(&self) -> LinkKey {
        (self.source.clone(), self.target.clone())
    }
}

/// Ordered (source, target) pair identifying a link.
pub type LinkKey = (String, String);

/// Insertion-ordered map. Iteration follows first insertion, which keeps
/// output stable across runs on identical input.
#[derive(Debug, Clone)]
pub struct Registry<K, V> {
    entries: Vec<V>,
    index: AHashMap<K, usize>,
}

/// Nodes keyed by node id.
pub type NodeMap = Registry<String, Node>;

/// Links keyed by ordered endpoint pair.
pub type LinkMap = Registry<LinkKey, Link>;

impl<K: Eq + Hash, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: AHashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Registry<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of `key` in insertion order
    pub fn position<Q>(&self, key: &Q) -> Option<usize>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.index.get(key).copied()
    }

    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        let position = self.position(key)?;
        self.entries.get_mut(position)
    }

    /// Inserts a new entry. Keys are never overwritten.
    pub fn insert(&mut self, key: K, value: V) -> std::result::Result<usize, V> {
        if self.index.contains_key(&key) {
            return Err(value);
        }
        let position = self.entries.len();
        self.index.insert(key, position);
        self.entries.push(value);
        Ok(position)
    }

    /// Returns the entry for `key`, creating it with `create` when absent.
    /// The flag is true when the entry was created by this call.
    pub fn get_or_try_insert_with<E>(
        &mut self,
        key: K,
        create: impl FnOnce() -> std::result::Result<V, E>,
    ) -> std::result::Result<(&mut V, bool), E> {
        let (position, created) = match self.index.get(&key) {
            Some(&position) => (position, false),
            None => {
                let position = self.entries.len();
                self.entries.push(create()?);
                self.index.insert(key, position);
                (position, true)
            },
        };
        Ok((&mut self.entries[position], created))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, V> {
        self.entries.iter_mut()
    }

    pub fn into_vec(self) -> Vec<V> {
        self.entries
    }
}

impl<K, V> std::ops::Index<usize> for Registry<K, V> {
    type Output = V;

    fn index(&self, position: usize) -> &V {
        &self.entries[position]
    }
}

impl<K, V> std::ops::IndexMut<usize> for Registry<K, V> {
    fn index_mut(&mut self, position: usize) -> &mut V {
        &mut self.entries[position]
    }
}
