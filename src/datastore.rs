//!
//! netconfd datastore backend
//! --------------------------
//! The RPC executors never talk to storage directly; they go through the
//! [`DatastoreSession`] contract, one handle per (session, datastore).
//! Status codes distinguish the conditions the NETCONF error mapping cares
//! about (unknown model, not found, unauthorized, data exists/missing).
//!
//! `MemoryDatastore` is the in-process reference backend: a canonical-path
//! keyed map under a `parking_lot::Mutex`, with predicate-aware query
//! matching good enough for `/mod:*` discovery, `{path}//*` descendant
//! expansion and the content predicates the filter compiler emits.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

use crate::path;
use crate::value::{DsValue, TypedValue};

/// Backend status codes surfaced to the RPC error mapping.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DsError {
    #[error("unknown model")]
    UnknownModel,
    #[error("not found")]
    NotFound,
    #[error("unauthorized")]
    Unauthorized,
    #[error("data already exists")]
    DataExists,
    #[error("data is missing")]
    DataMissing,
    #[error("datastore is locked")]
    Locked,
    #[error("{0}")]
    Other(String),
}

/// Flags for set/delete calls. `strict` makes a set fail on an existing
/// node and a delete fail on an absent one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditFlags {
    pub strict: bool,
}

impl EditFlags {
    pub const NONE: EditFlags = EditFlags { strict: false };
    pub const STRICT: EditFlags = EditFlags { strict: true };
}

/// A transaction-capable session against one datastore.
pub trait DatastoreSession: Send + Sync {
    /// All nodes selected by `xpath`, keyed by their full canonical path.
    fn get_items(&self, xpath: &str) -> Result<Vec<DsValue>, DsError>;

    /// Iterator form of [`Self::get_items`], used for descendant expansion.
    fn get_items_iter(
        &self,
        xpath: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<DsValue, DsError>> + '_>, DsError>;

    fn set_item(
        &self,
        xpath: &str,
        value: Option<TypedValue>,
        flags: EditFlags,
    ) -> Result<(), DsError>;

    fn delete_item(&self, xpath: &str, flags: EditFlags) -> Result<(), DsError>;

    fn lock_datastore(&self) -> Result<(), DsError>;

    fn unlock_datastore(&self) -> Result<(), DsError>;

    /// Refresh the session view to a snapshot no older than the call.
    fn session_refresh(&self) -> Result<(), DsError>;
}

struct MemoryInner {
    items: Mutex<BTreeMap<String, TypedValue>>,
    locked: Mutex<bool>,
}

/// In-memory datastore. Cloning shares the underlying store, so handing the
/// same instance to several sessions models one backing datastore.
#[derive(Clone)]
pub struct MemoryDatastore {
    inner: Arc<MemoryInner>,
}

impl Default for MemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                items: Mutex::new(BTreeMap::new()),
                locked: Mutex::new(false),
            }),
        }
    }

    /// Seed an entry directly, bypassing edit semantics. Ancestors are
    /// created as containers/list instances like a normal set.
    pub fn put(&self, xpath: &str, value: TypedValue) {
        let mut items = self.inner.items.lock();
        ensure_ancestors(&mut items, xpath);
        items.insert(xpath.to_string(), value);
    }

    pub fn get(&self, xpath: &str) -> Option<TypedValue> {
        self.inner.items.lock().get(xpath).cloned()
    }

    pub fn contains(&self, xpath: &str) -> bool {
        self.inner.items.lock().contains_key(xpath)
    }

    pub fn len(&self) -> usize {
        self.inner.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.items.lock().is_empty()
    }

    pub fn is_locked(&self) -> bool {
        *self.inner.locked.lock()
    }

    /// Sorted (path, value) dump for assertions.
    pub fn dump(&self) -> Vec<(String, TypedValue)> {
        self.inner
            .items
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Seed the store from a JSON object mapping canonical paths to scalar
    /// values, e.g. `{"/ex:top/mtu": 1500}`. Demo/test data only; typed
    /// widths beyond i64/u64/f64 must go through [`Self::put`].
    pub fn load_json(&self, data: &serde_json::Value) -> anyhow::Result<()> {
        let obj = data
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("expected a JSON object of path -> value"))?;
        for (path, v) in obj {
            let value = match v {
                serde_json::Value::String(s) => TypedValue::String(s.clone()),
                serde_json::Value::Bool(b) => TypedValue::Bool(*b),
                serde_json::Value::Null => TypedValue::Empty,
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        TypedValue::Int64(i)
                    } else if let Some(u) = n.as_u64() {
                        TypedValue::Uint64(u)
                    } else {
                        TypedValue::Decimal64(n.as_f64().unwrap_or_default())
                    }
                }
                other => anyhow::bail!("unsupported value for {}: {}", path, other),
            };
            self.put(path, value);
        }
        Ok(())
    }

    /// Export the store as a JSON object of path -> lexical value
    /// (interior nodes map to null). Diagnostic dumps and tests.
    pub fn to_json(&self) -> serde_json::Value {
        let items = self.inner.items.lock();
        let mut obj = serde_json::Map::new();
        for (k, v) in items.iter() {
            let jv = match lexical(v) {
                Some(s) => serde_json::Value::String(s),
                None => serde_json::Value::Null,
            };
            obj.insert(k.clone(), jv);
        }
        serde_json::Value::Object(obj)
    }
}

/// One parsed step of a query or canonical path: effective module (after
/// inheritance), bare name, and raw `[...]` predicate groups.
struct Step<'a> {
    module: Option<&'a str>,
    name: &'a str,
    preds: Vec<&'a str>,
}

fn parse_steps(xpath: &str) -> Vec<Step<'_>> {
    let mut out: Vec<Step<'_>> = Vec::new();
    let mut module = None;
    for seg in path::segments(xpath) {
        let bare = path::strip_predicates(seg);
        let (prefix, name) = path::split_prefix(bare);
        if prefix.is_some() {
            module = prefix;
        }
        out.push(Step { module, name, preds: predicate_groups(&seg[bare.len()..]) });
    }
    out
}

/// Split `[a='1'][b='2']` into its bracket groups, quote-aware.
fn predicate_groups(rest: &str) -> Vec<&str> {
    let bytes = rest.as_bytes();
    let mut out = Vec::new();
    let mut start = None;
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'\'' | b'"' => quote = Some(b),
                b'[' if start.is_none() => start = Some(i),
                b']' => {
                    if let Some(s) = start.take() {
                        out.push(&rest[s..=i]);
                    }
                }
                _ => {}
            },
        }
    }
    out
}

static PRED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[\s*(@)?([A-Za-z0-9_.:-]+(?:\(\))?)\s*=\s*'([^']*)'\s*\]$").unwrap());

/// Lexical value comparison used by content predicates.
fn lexical(value: &TypedValue) -> Option<String> {
    match value {
        TypedValue::String(s)
        | TypedValue::Binary(s)
        | TypedValue::Bits(s)
        | TypedValue::Enum(s)
        | TypedValue::Identityref(s)
        | TypedValue::InstanceId(s)
        | TypedValue::Leafref(s) => Some(s.clone()),
        TypedValue::Empty => None,
        TypedValue::Bool(b) => Some(b.to_string()),
        TypedValue::Decimal64(v) => Some(v.to_string()),
        TypedValue::Int8(v) => Some(v.to_string()),
        TypedValue::Int16(v) => Some(v.to_string()),
        TypedValue::Int32(v) => Some(v.to_string()),
        TypedValue::Int64(v) => Some(v.to_string()),
        TypedValue::Uint8(v) => Some(v.to_string()),
        TypedValue::Uint16(v) => Some(v.to_string()),
        TypedValue::Uint32(v) => Some(v.to_string()),
        TypedValue::Uint64(v) => Some(v.to_string()),
        TypedValue::Container | TypedValue::ListInstance => None,
    }
}

impl MemoryDatastore {
    fn matches(
        &self,
        items: &BTreeMap<String, TypedValue>,
        key: &str,
        query_steps: &[Step<'_>],
    ) -> bool {
        let key_steps = parse_steps(key);
        if key_steps.len() != query_steps.len() {
            return false;
        }
        for (depth, (ks, qs)) in key_steps.iter().zip(query_steps.iter()).enumerate() {
            if qs.name != "*" {
                if ks.name != qs.name {
                    return false;
                }
                if qs.module.is_some() && ks.module != qs.module {
                    return false;
                }
            } else if qs.module.is_some() && ks.module != qs.module {
                return false;
            }
            for pred in &qs.preds {
                if !self.predicate_holds(items, key, &key_steps, depth, pred) {
                    return false;
                }
            }
        }
        true
    }

    fn predicate_holds(
        &self,
        items: &BTreeMap<String, TypedValue>,
        key: &str,
        key_steps: &[Step<'_>],
        depth: usize,
        pred: &str,
    ) -> bool {
        let caps = match PRED_RE.captures(pred) {
            Some(c) => c,
            None => return false,
        };
        // attributes are not stored; such predicates cannot constrain us
        if caps.get(1).is_some() {
            return true;
        }
        let name = caps.get(2).unwrap().as_str();
        let want = caps.get(3).unwrap().as_str();
        if name == "text()" {
            return items.get(key).and_then(lexical).as_deref() == Some(want);
        }
        let bare = match name.find(':') {
            Some(idx) => &name[idx + 1..],
            None => name,
        };
        // key predicate carried by the path step itself
        if key_steps[depth].preds.iter().any(|kp| {
            PRED_RE.captures(kp).is_some_and(|c| {
                c.get(1).is_none()
                    && c.get(2).unwrap().as_str() == bare
                    && c.get(3).unwrap().as_str() == want
            })
        }) {
            return true;
        }
        // otherwise compare against the child leaf's value
        let prefix = prefix_of(key, depth + 1);
        for (k, v) in items.range(prefix.clone()..) {
            if !k.starts_with(prefix.as_str()) {
                break;
            }
            let rest = &k[prefix.len()..];
            if let Some(child) = rest.strip_prefix('/') {
                let bare_child = path::split_prefix(path::strip_predicates(child)).1;
                if !child.contains('/') && bare_child == bare {
                    return lexical(v).as_deref() == Some(want);
                }
            }
        }
        false
    }
}

/// The canonical path made of the first `count` steps of `key`.
fn prefix_of(key: &str, count: usize) -> String {
    let mut out = String::new();
    for seg in path::segments(key).into_iter().take(count) {
        out.push('/');
        out.push_str(seg);
    }
    out
}

fn ensure_ancestors(items: &mut BTreeMap<String, TypedValue>, xpath: &str) {
    let segs = path::segments(xpath);
    let mut prefix = String::new();
    for seg in segs.iter().take(segs.len().saturating_sub(1)) {
        prefix.push('/');
        prefix.push_str(seg);
        if !items.contains_key(&prefix) {
            let kind = if seg.contains('[') {
                TypedValue::ListInstance
            } else {
                TypedValue::Container
            };
            items.insert(prefix.clone(), kind);
        }
    }
}

impl DatastoreSession for MemoryDatastore {
    fn get_items(&self, xpath: &str) -> Result<Vec<DsValue>, DsError> {
        let items = self.inner.items.lock();
        if let Some(base) = xpath.strip_suffix("//*") {
            // strict descendants of base
            let mut out = Vec::new();
            for (k, v) in items.iter() {
                if k.len() > base.len() && k.starts_with(base) && k.as_bytes()[base.len()] == b'/' {
                    out.push(DsValue::new(k.clone(), v.clone()));
                }
            }
            debug!(target: "netconfd::datastore", "get_items {} -> {} item(s)", xpath, out.len());
            return Ok(out);
        }
        let query_steps = parse_steps(xpath);
        let mut out = Vec::new();
        for (k, v) in items.iter() {
            if self.matches(&items, k, &query_steps) {
                out.push(DsValue::new(k.clone(), v.clone()));
            }
        }
        debug!(target: "netconfd::datastore", "get_items {} -> {} item(s)", xpath, out.len());
        Ok(out)
    }

    fn get_items_iter(
        &self,
        xpath: &str,
    ) -> Result<Box<dyn Iterator<Item = Result<DsValue, DsError>> + '_>, DsError> {
        let values = self.get_items(xpath)?;
        Ok(Box::new(values.into_iter().map(Ok)))
    }

    fn set_item(
        &self,
        xpath: &str,
        value: Option<TypedValue>,
        flags: EditFlags,
    ) -> Result<(), DsError> {
        let mut items = self.inner.items.lock();
        if flags.strict && items.contains_key(xpath) {
            return Err(DsError::DataExists);
        }
        ensure_ancestors(&mut items, xpath);
        let value = value.unwrap_or_else(|| {
            if xpath.ends_with(']') {
                TypedValue::ListInstance
            } else {
                TypedValue::Container
            }
        });
        items.insert(xpath.to_string(), value);
        debug!(target: "netconfd::datastore", "set_item {}", xpath);
        Ok(())
    }

    fn delete_item(&self, xpath: &str, flags: EditFlags) -> Result<(), DsError> {
        let mut items = self.inner.items.lock();
        if flags.strict && !items.contains_key(xpath) {
            return Err(DsError::DataMissing);
        }
        let child_prefix = format!("{}/", xpath);
        items.retain(|k, _| k != xpath && !k.starts_with(&child_prefix));
        debug!(target: "netconfd::datastore", "delete_item {}", xpath);
        Ok(())
    }

    fn lock_datastore(&self) -> Result<(), DsError> {
        let mut locked = self.inner.locked.lock();
        if *locked {
            return Err(DsError::Locked);
        }
        *locked = true;
        Ok(())
    }

    fn unlock_datastore(&self) -> Result<(), DsError> {
        let mut locked = self.inner.locked.lock();
        if !*locked {
            return Err(DsError::Locked);
        }
        *locked = false;
        Ok(())
    }

    fn session_refresh(&self) -> Result<(), DsError> {
        // the memory backend always serves the live view
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> MemoryDatastore {
        let ds = MemoryDatastore::new();
        ds.put("/ex:top/a/b", TypedValue::String("7".into()));
        ds.put("/ex:top/mtu", TypedValue::Uint16(1500));
        ds.put("/ex:top/item[k1='a'][k2='b']/v", TypedValue::Int32(1));
        ds
    }

    #[test]
    fn ancestors_are_materialized() {
        let ds = seeded();
        assert_eq!(ds.get("/ex:top"), Some(TypedValue::Container));
        assert_eq!(ds.get("/ex:top/a"), Some(TypedValue::Container));
        assert_eq!(
            ds.get("/ex:top/item[k1='a'][k2='b']"),
            Some(TypedValue::ListInstance)
        );
    }

    #[test]
    fn module_wildcard_returns_top_level() {
        let ds = seeded();
        let hits = ds.get_items("/ex:*").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].xpath, "/ex:top");
    }

    #[test]
    fn descendant_query_excludes_the_base() {
        let ds = seeded();
        let hits = ds.get_items("/ex:top/a//*").unwrap();
        let paths: Vec<_> = hits.iter().map(|h| h.xpath.as_str()).collect();
        assert_eq!(paths, vec!["/ex:top/a/b"]);
    }

    #[test]
    fn content_predicate_matches_child_value() {
        let ds = seeded();
        // fully prefixed query against prefix-inheriting canonical keys
        let hits = ds.get_items("/ex:top/ex:a[ex:b='7']").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].xpath, "/ex:top/a");
        assert!(ds.get_items("/ex:top/ex:a[ex:b='8']").unwrap().is_empty());
    }

    #[test]
    fn key_predicates_match_the_step_itself() {
        let ds = seeded();
        let hits = ds.get_items("/ex:top/ex:item[k1='a'][k2='b']/ex:v").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(ds
            .get_items("/ex:top/ex:item[k1='z'][k2='b']/ex:v")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn strict_set_and_delete() {
        let ds = MemoryDatastore::new();
        ds.set_item("/ex:x", Some(TypedValue::Int32(1)), EditFlags::STRICT)
            .unwrap();
        assert_eq!(
            ds.set_item("/ex:x", Some(TypedValue::Int32(2)), EditFlags::STRICT),
            Err(DsError::DataExists)
        );
        assert_eq!(
            ds.delete_item("/ex:y", EditFlags::STRICT),
            Err(DsError::DataMissing)
        );
        ds.delete_item("/ex:x", EditFlags::STRICT).unwrap();
        assert!(!ds.contains("/ex:x"));
    }

    #[test]
    fn delete_removes_descendants() {
        let ds = seeded();
        ds.delete_item("/ex:top/a", EditFlags::NONE).unwrap();
        assert!(!ds.contains("/ex:top/a/b"));
        assert!(ds.contains("/ex:top/mtu"));
    }

    #[test]
    fn backend_lock_is_exclusive() {
        let ds = MemoryDatastore::new();
        ds.lock_datastore().unwrap();
        assert_eq!(ds.lock_datastore(), Err(DsError::Locked));
        ds.unlock_datastore().unwrap();
        assert_eq!(ds.unlock_datastore(), Err(DsError::Locked));
    }

    #[test]
    fn json_seed_round_trip() {
        let ds = MemoryDatastore::new();
        ds.load_json(&serde_json::json!({
            "/ex:top/mtu": 1500,
            "/ex:top/name": "lo",
            "/ex:top/up": true,
        }))
        .unwrap();
        assert_eq!(ds.get("/ex:top/mtu"), Some(TypedValue::Int64(1500)));
        let dumped = ds.to_json();
        assert_eq!(dumped["/ex:top/name"], serde_json::json!("lo"));
        assert_eq!(dumped["/ex:top/up"], serde_json::json!("true"));
        assert_eq!(dumped["/ex:top"], serde_json::Value::Null);
        assert!(ds.load_json(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn text_predicate_on_top_level_leaf() {
        let ds = MemoryDatastore::new();
        ds.put("/other:serial", TypedValue::String("abc".into()));
        let hits = ds.get_items("/other:serial[text()='abc']").unwrap();
        assert_eq!(hits.len(), 1);
        assert!(ds.get_items("/other:serial[text()='zzz']").unwrap().is_empty());
    }
}
