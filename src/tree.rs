//!
//! netconfd reply data tree
//! ------------------------
//! Read RPCs assemble their response by inserting (xpath, value) pairs into
//! this arena tree. Insertion has update semantics: an existing path is
//! revisited, never duplicated, so the same node returned by several filter
//! queries appears once. Rendering produces the `<data>` payload XML with
//! namespace declarations at module boundaries, after the selected
//! with-defaults transformation has been applied.

use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::path;
use crate::schema::{SchemaNodeKind, SchemaRegistry};
use crate::WITH_DEFAULTS_NS;

/// RFC 6243 retrieval modes for default-valued leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithDefaults {
    ReportAll,
    ReportAllTagged,
    Trim,
    Explicit,
}

impl WithDefaults {
    pub fn from_leaf(value: &str) -> Option<WithDefaults> {
        match value {
            "report-all" => Some(WithDefaults::ReportAll),
            "report-all-tagged" => Some(WithDefaults::ReportAllTagged),
            "trim" => Some(WithDefaults::Trim),
            "explicit" => Some(WithDefaults::Explicit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct DataNode {
    /// Full path step including predicates, e.g. `item[k1='a']`.
    step: String,
    /// Bare element name.
    name: String,
    /// Effective module name after prefix inheritance.
    module: Option<String>,
    value: Option<String>,
    /// Tagged as default data by report-all-tagged.
    tagged: bool,
    removed: bool,
    children: Vec<usize>,
}

/// Arena data tree keyed by canonical XPath steps.
#[derive(Debug, Default)]
pub struct DataTree {
    nodes: Vec<DataNode>,
    roots: Vec<usize>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.iter().all(|&r| self.nodes[r].removed)
    }

    /// Insert `xpath` with the rendered `value`, creating missing interior
    /// nodes. Re-inserting an existing path updates its value in place.
    pub fn new_path(&mut self, xpath: &str, value: Option<&str>) {
        let mut module: Option<String> = None;
        let mut cursor: Option<usize> = None;
        for seg in path::segments(xpath) {
            let bare = path::strip_predicates(seg);
            let (prefix, name) = path::split_prefix(bare);
            if let Some(p) = prefix {
                module = Some(p.to_string());
            }
            let existing = match cursor {
                None => self
                    .roots
                    .iter()
                    .copied()
                    .find(|&r| !self.nodes[r].removed && self.nodes[r].step == seg),
                Some(c) => self.nodes[c]
                    .children
                    .iter()
                    .copied()
                    .find(|&ch| !self.nodes[ch].removed && self.nodes[ch].step == seg),
            };
            let id = match existing {
                Some(id) => id,
                None => {
                    let id = self.nodes.len();
                    self.nodes.push(DataNode {
                        step: seg.to_string(),
                        name: name.to_string(),
                        module: module.clone(),
                        value: None,
                        tagged: false,
                        removed: false,
                        children: Vec::new(),
                    });
                    match cursor {
                        None => self.roots.push(id),
                        Some(c) => self.nodes[c].children.push(id),
                    }
                    id
                }
            };
            cursor = Some(id);
        }
        if let Some(id) = cursor {
            if value.is_some() {
                self.nodes[id].value = value.map(|v| v.to_string());
            }
        }
    }

    /// Apply the selected with-defaults transformation.
    pub fn apply_with_defaults(&mut self, registry: &SchemaRegistry, mode: WithDefaults) {
        match mode {
            WithDefaults::Explicit => {}
            WithDefaults::Trim => self.trim_defaults(registry),
            WithDefaults::ReportAll => self.report_all(registry, false),
            WithDefaults::ReportAllTagged => self.report_all(registry, true),
        }
    }

    fn trim_defaults(&mut self, registry: &SchemaRegistry) {
        let roots = self.roots.clone();
        for root in roots {
            self.trim_walk(registry, root, String::new());
        }
    }

    fn trim_walk(&mut self, registry: &SchemaRegistry, id: usize, parent_path: String) {
        if self.nodes[id].removed {
            return;
        }
        let my_path = format!("{}/{}", parent_path, self.nodes[id].step);
        if let Some(value) = self.nodes[id].value.clone() {
            if let Some((_, snode)) = registry.node_by_data_path(&my_path) {
                if snode.default.as_deref() == Some(value.as_str()) {
                    self.nodes[id].removed = true;
                    return;
                }
            }
        }
        for child in self.nodes[id].children.clone() {
            self.trim_walk(registry, child, my_path.clone());
        }
    }

    fn report_all(&mut self, registry: &SchemaRegistry, tag: bool) {
        let roots = self.roots.clone();
        for root in roots {
            self.report_walk(registry, root, String::new(), tag);
        }
    }

    fn report_walk(&mut self, registry: &SchemaRegistry, id: usize, parent_path: String, tag: bool) {
        if self.nodes[id].removed {
            return;
        }
        let my_path = format!("{}/{}", parent_path, self.nodes[id].step);
        let schema = registry.node_by_data_path(&my_path);
        if let Some((_, snode)) = schema {
            let interior = matches!(
                snode.kind,
                SchemaNodeKind::Container { .. } | SchemaNodeKind::List { .. }
            );
            if interior {
                for leaf in &snode.children {
                    let Some(default) = leaf.default.clone() else { continue };
                    let present = self.nodes[id]
                        .children
                        .iter()
                        .any(|&c| !self.nodes[c].removed && self.nodes[c].name == leaf.name);
                    if !present {
                        let nid = self.nodes.len();
                        let module = self.nodes[id].module.clone();
                        self.nodes.push(DataNode {
                            step: leaf.name.clone(),
                            name: leaf.name.clone(),
                            module,
                            value: Some(default),
                            tagged: tag,
                            removed: false,
                            children: Vec::new(),
                        });
                        self.nodes[id].children.push(nid);
                    }
                }
            }
            if tag {
                if let (Some(value), Some(default)) =
                    (self.nodes[id].value.as_deref(), snode.default.as_deref())
                {
                    if value == default {
                        self.nodes[id].tagged = true;
                    }
                }
            }
        }
        for child in self.nodes[id].children.clone() {
            self.report_walk(registry, child, my_path.clone(), tag);
        }
    }

    /// Render the tree as the XML payload of the reply `<data>` element,
    /// roots in insertion order (sibling context preserved).
    pub fn to_xml(&self, registry: &SchemaRegistry) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.render(registry, root, None, &mut out);
        }
        out
    }

    fn render(&self, registry: &SchemaRegistry, id: usize, parent_module: Option<&str>, out: &mut String) {
        let node = &self.nodes[id];
        if node.removed {
            return;
        }
        out.push('<');
        out.push_str(&node.name);
        if node.module.as_deref() != parent_module {
            if let Some(ns) = node
                .module
                .as_deref()
                .and_then(|m| registry.module_by_name(m))
                .map(|m| m.namespace.as_str())
            {
                out.push_str(&format!(" xmlns=\"{}\"", ns));
            }
        }
        if node.tagged {
            out.push_str(&format!(
                " xmlns:ncwd=\"{}\" ncwd:default=\"true\"",
                WITH_DEFAULTS_NS
            ));
        }
        let has_value = node.value.is_some();
        let live_children: Vec<usize> = node
            .children
            .iter()
            .copied()
            .filter(|&c| !self.nodes[c].removed)
            .collect();
        if !has_value && live_children.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        if let Some(v) = &node.value {
            out.push_str(&escape(v.as_str()));
        }
        for child in live_children {
            self.render(registry, child, node.module.as_deref(), out);
        }
        out.push_str(&format!("</{}>", node.name));
    }
}
