//!
//! netconfd schema registry
//! ------------------------
//! In-memory registry of the YANG modules the agent serves. The registry is
//! read-only after startup: RPC executors translate filter namespaces to
//! module names through it, discover which modules carry data when no filter
//! is given, and resolve schema nodes for typed-value rendering and edit
//! validation.
//!
//! Schema *parsing* is out of scope; modules are registered programmatically
//! through the builder API on [`Module`] and [`SchemaNode`].

use serde::Serialize;

/// Value type of a leaf or leaf-list node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeafType {
    String,
    Binary,
    Bits,
    Enumeration,
    Identityref,
    InstanceId,
    Leafref,
    Empty,
    Boolean,
    Decimal64 { fraction_digits: u8 },
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
}

/// Statement kind of a schema node.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaNodeKind {
    Container { presence: bool },
    Leaf { ty: LeafType, is_key: bool },
    LeafList { ty: LeafType },
    List { keys: Vec<String> },
    AnyXml,
    Grouping,
    Rpc,
    Notification,
}

/// One node of a module's schema tree.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaNode {
    pub name: String,
    pub kind: SchemaNodeKind,
    /// Default value for leaves, used by the with-defaults transforms.
    pub default: Option<String>,
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    fn new(name: &str, kind: SchemaNodeKind) -> Self {
        Self { name: name.to_string(), kind, default: None, children: Vec::new() }
    }

    pub fn container(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::Container { presence: false })
    }

    pub fn presence_container(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::Container { presence: true })
    }

    pub fn leaf(name: &str, ty: LeafType) -> Self {
        Self::new(name, SchemaNodeKind::Leaf { ty, is_key: false })
    }

    pub fn key_leaf(name: &str, ty: LeafType) -> Self {
        Self::new(name, SchemaNodeKind::Leaf { ty, is_key: true })
    }

    pub fn leaf_list(name: &str, ty: LeafType) -> Self {
        Self::new(name, SchemaNodeKind::LeafList { ty })
    }

    pub fn list(name: &str, keys: &[&str]) -> Self {
        Self::new(
            name,
            SchemaNodeKind::List { keys: keys.iter().map(|k| k.to_string()).collect() },
        )
    }

    pub fn anyxml(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::AnyXml)
    }

    pub fn grouping(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::Grouping)
    }

    pub fn rpc(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::Rpc)
    }

    pub fn notification(name: &str) -> Self {
        Self::new(name, SchemaNodeKind::Notification)
    }

    /// Attach a child node (builder chaining).
    pub fn child(mut self, node: SchemaNode) -> Self {
        self.children.push(node);
        self
    }

    /// Set the default value (leaves only).
    pub fn with_default(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    /// True for node kinds that can appear in instance data.
    pub fn is_data(&self) -> bool {
        !matches!(
            self.kind,
            SchemaNodeKind::Grouping | SchemaNodeKind::Rpc | SchemaNodeKind::Notification
        )
    }

    /// Leaf/leaf-list value type, if this node carries one.
    pub fn leaf_type(&self) -> Option<LeafType> {
        match &self.kind {
            SchemaNodeKind::Leaf { ty, .. } | SchemaNodeKind::LeafList { ty } => Some(*ty),
            _ => None,
        }
    }

    pub fn is_key(&self) -> bool {
        matches!(self.kind, SchemaNodeKind::Leaf { is_key: true, .. })
    }

    pub fn find_child(&self, name: &str) -> Option<&SchemaNode> {
        self.children.iter().find(|c| c.name == name)
    }
}

/// A registered YANG module: name, namespace and top-level schema nodes.
#[derive(Debug, Clone, Serialize)]
pub struct Module {
    pub name: String,
    pub namespace: String,
    pub data: Vec<SchemaNode>,
}

impl Module {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self { name: name.to_string(), namespace: namespace.to_string(), data: Vec::new() }
    }

    pub fn node(mut self, node: SchemaNode) -> Self {
        self.data.push(node);
        self
    }

    /// Top-level schema nodes of the module.
    pub fn top_level(&self) -> &[SchemaNode] {
        &self.data
    }

    /// True when the module defines at least one top-level node that can
    /// appear in instance data (i.e. not only groupings/rpcs/notifications).
    pub fn has_data(&self) -> bool {
        self.data.iter().any(|n| n.is_data())
    }

    pub fn top_level_by_name(&self, name: &str) -> Option<&SchemaNode> {
        self.data.iter().find(|n| n.name == name)
    }
}

/// The process-wide module registry. Built once at startup, read-only after.
#[derive(Debug, Default, Clone)]
pub struct SchemaRegistry {
    modules: Vec<Module>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, module: Module) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.iter()
    }

    pub fn module_by_name(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    pub fn module_by_namespace(&self, namespace: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.namespace == namespace)
    }

    /// Resolve a schema node from an absolute schema path such as
    /// `/mod:container/leaf`. Unprefixed steps inherit the previous module.
    pub fn node_by_schema_path(&self, path: &str) -> Option<(&Module, &SchemaNode)> {
        self.resolve_path(path)
    }

    /// Resolve a schema node from a *data* path: identical to
    /// [`Self::node_by_schema_path`] but list-key predicates are ignored.
    pub fn node_by_data_path(&self, path: &str) -> Option<(&Module, &SchemaNode)> {
        self.resolve_path(path)
    }

    fn resolve_path(&self, path: &str) -> Option<(&Module, &SchemaNode)> {
        let segs = crate::path::segments(path);
        let mut module: Option<&Module> = None;
        let mut node: Option<&SchemaNode> = None;
        for seg in segs {
            let bare = crate::path::strip_predicates(seg);
            let (prefix, name) = crate::path::split_prefix(bare);
            if let Some(p) = prefix {
                module = Some(self.module_by_name(p)?);
                // a module switch restarts resolution relative to that module
                // only at the top of the path; below it we keep descending
            }
            let m = module?;
            node = match node {
                None => m.top_level_by_name(name),
                Some(parent) => parent.find_child(name),
            };
            node?;
        }
        Some((module?, node?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(
            Module::new("ex", "urn:ex").node(
                SchemaNode::container("top")
                    .child(SchemaNode::leaf("mtu", LeafType::Uint16).with_default("1500"))
                    .child(
                        SchemaNode::list("item", &["k1"])
                            .child(SchemaNode::key_leaf("k1", LeafType::String))
                            .child(SchemaNode::leaf("v", LeafType::Int32)),
                    ),
            ),
        );
        reg.register(Module::new("ops", "urn:ops").node(SchemaNode::rpc("reset")));
        reg
    }

    #[test]
    fn namespace_lookup() {
        let reg = registry();
        assert_eq!(reg.module_by_namespace("urn:ex").unwrap().name, "ex");
        assert!(reg.module_by_namespace("urn:none").is_none());
    }

    #[test]
    fn data_discovery_skips_rpc_only_modules() {
        let reg = registry();
        assert!(reg.module_by_name("ex").unwrap().has_data());
        assert!(!reg.module_by_name("ops").unwrap().has_data());
    }

    #[test]
    fn schema_path_resolution() {
        let reg = registry();
        let (m, n) = reg.node_by_schema_path("/ex:top/mtu").unwrap();
        assert_eq!(m.name, "ex");
        assert_eq!(n.leaf_type(), Some(LeafType::Uint16));
        assert_eq!(n.default.as_deref(), Some("1500"));
    }

    #[test]
    fn data_path_ignores_predicates() {
        let reg = registry();
        let (_, n) = reg.node_by_data_path("/ex:top/item[k1='a']/v").unwrap();
        assert_eq!(n.name, "v");
        let (_, k) = reg.node_by_data_path("/ex:top/item[k1='a']/k1").unwrap();
        assert!(k.is_key());
    }

    #[test]
    fn unknown_steps_resolve_to_none() {
        let reg = registry();
        assert!(reg.node_by_schema_path("/ex:top/nope").is_none());
        assert!(reg.node_by_schema_path("/zz:top").is_none());
    }
}
