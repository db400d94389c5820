//! edit-config
//! -----------
//! Parses the edit parameters, validates the embedded config tree against
//! the schema, then walks it depth-first issuing create/delete mutations.
//! Two synchronized stacks drive the walk: the XPath of the current node
//! and the effective operation at each depth. Operations inherit from the
//! nearest annotated ancestor, falling back to the default-operation.

use std::sync::Arc;

use tracing::debug;

use crate::datastore::{DatastoreSession, DsError, EditFlags};
use crate::error::{NcError, NcResult};
use crate::path::PathBuilder;
use crate::rpc::{Reply, RpcContext};
use crate::schema::{Module, SchemaNode, SchemaNodeKind, SchemaRegistry};
use crate::session::Session;
use crate::value::TypedValue;
use crate::xml::{NodeId, XmlTree};
use crate::NETCONF_BASE_NS;

/// Effective edit operation of a node. `None` skips the datastore call and
/// is also the inheritance sentinel at the walk root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    None,
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

impl EditOp {
    fn from_attr(value: &str) -> NcResult<EditOp> {
        match value {
            "merge" => Ok(EditOp::Merge),
            "replace" => Ok(EditOp::Replace),
            "create" => Ok(EditOp::Create),
            "delete" => Ok(EditOp::Delete),
            "remove" => Ok(EditOp::Remove),
            other => Err(NcError::invalid_value(format!(
                "invalid operation attribute ({})",
                other
            ))),
        }
    }

    /// Ops that stand on their own for a list instance; merge/replace flow
    /// through the children instead.
    fn is_structural(self) -> bool {
        matches!(self, EditOp::Create | EditOp::Delete | EditOp::Remove)
    }
}

/// Validated edit tree node: schema-resolved, with list keys reordered to
/// schema-declared order ahead of the other children.
#[derive(Debug)]
struct EditNode<'a> {
    name: String,
    module: &'a Module,
    /// Step carries a module prefix (root, or module change from parent).
    prefixed: bool,
    schema: &'a SchemaNode,
    value: Option<String>,
    op_attr: Option<EditOp>,
    children: Vec<EditNode<'a>>,
}

fn build_edit_node<'a>(
    tree: &XmlTree,
    id: NodeId,
    registry: &'a SchemaRegistry,
    parent: Option<(&'a Module, &'a SchemaNode)>,
) -> NcResult<EditNode<'a>> {
    let node = tree.node(id);
    let module = match node.namespace.as_deref() {
        Some(ns) => registry
            .module_by_namespace(ns)
            .ok_or_else(|| NcError::invalid_value(format!("unknown namespace ({})", ns)))?,
        None => parent
            .map(|(m, _)| m)
            .ok_or_else(|| NcError::invalid_value(format!("element <{}> has no namespace", node.name)))?,
    };
    let schema = match parent {
        Some((_, ps)) => ps.find_child(&node.name),
        None => module.top_level_by_name(&node.name),
    }
    .filter(|s| s.is_data())
    .ok_or_else(|| NcError::invalid_value(format!("unknown element <{}>", node.name)))?;

    let op_attr = match tree.attr_ns(id, NETCONF_BASE_NS, "operation") {
        Some(v) => Some(EditOp::from_attr(v)?),
        None => None,
    };

    let prefixed = parent.map(|(pm, _)| pm.name != module.name).unwrap_or(true);
    let value = tree.content(id).map(|t| t.to_string());

    let mut children = Vec::new();
    for child in tree.children(id) {
        children.push(build_edit_node(tree, child, registry, Some((module, schema)))?);
    }

    // keys must be observed before any datastore call on the list instance
    if let SchemaNodeKind::List { keys } = &schema.kind {
        let mut ordered = Vec::with_capacity(children.len());
        for key in keys {
            if let Some(pos) = children.iter().position(|c| &c.name == key) {
                ordered.push(children.remove(pos));
            }
        }
        ordered.append(&mut children);
        children = ordered;
    }

    Ok(EditNode { name: node.name.clone(), module, prefixed, schema, value, op_attr, children })
}

pub fn execute(ctx: &RpcContext, session: &Session, rpc: &mut XmlTree, root: NodeId) -> Reply {
    // target: only the running datastore is editable in this core
    let target = rpc
        .child_by_name(root, NETCONF_BASE_NS, "target")
        .and_then(|t| rpc.children(t).first().copied())
        .map(|n| rpc.node(n).name.clone());
    let ds: Arc<dyn DatastoreSession> = match target.as_deref() {
        Some("running") => session.running().clone(),
        Some(other) => {
            return Reply::error(NcError::invalid_value(format!(
                "invalid <edit-config> target ({})",
                other
            )))
        }
        None => return Reply::error(NcError::invalid_value("missing <edit-config> target")),
    };

    // default-operation, default merge
    let defop = match rpc
        .child_by_name(root, NETCONF_BASE_NS, "default-operation")
        .and_then(|n| rpc.content(n))
    {
        Some("merge") | None => EditOp::Merge,
        Some("replace") => EditOp::Replace,
        Some("none") => EditOp::None,
        Some(other) => {
            return Reply::error(NcError::invalid_value(format!(
                "invalid default-operation ({})",
                other
            )))
        }
    };

    // test-option, default test-then-set; every option runs the same
    // set-through path, the parsed value is recorded for the log only
    let testopt = match rpc
        .child_by_name(root, NETCONF_BASE_NS, "test-option")
        .and_then(|n| rpc.content(n))
    {
        Some(v @ ("test-then-set" | "set" | "test-only")) => v.to_string(),
        None => "test-then-set".to_string(),
        Some(other) => {
            return Reply::error(NcError::invalid_value(format!(
                "invalid test-option ({})",
                other
            )))
        }
    };

    // error-option is ignored, rollback is always done

    let config = match rpc.child_by_name(root, NETCONF_BASE_NS, "config") {
        Some(c) => c,
        None => {
            return Reply::error(NcError::op_failed_app(
                "missing <config> parameter (:url is not supported)",
            ))
        }
    };
    let edit_roots = rpc.children(config);
    if edit_roots.is_empty() {
        // nothing to do
        return Reply::ok();
    }

    debug!(target: "netconfd::rpc",
        "edit-config: session {}, defop {:?}, testopt {}", session.id(), defop, testopt);

    let mut trees = Vec::with_capacity(edit_roots.len());
    for &er in &edit_roots {
        match build_edit_node(rpc, er, &ctx.registry, None) {
            Ok(t) => trees.push(t),
            Err(e) => return Reply::error(e),
        }
    }

    for tree in &trees {
        let mut walker = Walker {
            ds: &*ds,
            defop,
            path: PathBuilder::new(),
            ops: vec![EditOp::None],
            missing_keys: 0,
            pending_list_op: EditOp::None,
        };
        if let Err(e) = walker.walk(tree) {
            return Reply::error(e);
        }
    }

    Reply::ok()
}

struct Walker<'a> {
    ds: &'a dyn DatastoreSession,
    defop: EditOp,
    path: PathBuilder,
    ops: Vec<EditOp>,
    missing_keys: usize,
    pending_list_op: EditOp,
}

impl<'a> Walker<'a> {
    /// Depth-first walk with explicit frames: children first, left to
    /// right; on ascent the path suffix and the operation stack pop.
    fn walk<'t>(&mut self, root: &'t EditNode<'_>) -> NcResult<()> {
        self.visit(root)?;
        let mut frames: Vec<(&'t EditNode<'_>, usize)> = vec![(root, 0)];
        while let Some(frame) = frames.last_mut() {
            let (node, cursor) = (frame.0, frame.1);
            if cursor < node.children.len() {
                frame.1 += 1;
                let child = &node.children[cursor];
                self.visit(child)?;
                frames.push((child, 0));
            } else {
                self.leave(node)?;
                frames.pop();
            }
        }
        Ok(())
    }

    fn visit(&mut self, node: &EditNode<'_>) -> NcResult<()> {
        let parent_op = *self.ops.last().expect("op stack sentinel");
        let effective = node.op_attr.unwrap_or(if parent_op != EditOp::None {
            parent_op
        } else {
            self.defop
        });
        self.ops.push(effective);

        // list keys: extend the enclosing step, no datastore call of their own
        if self.missing_keys > 0 {
            if !node.schema.is_key() || node.prefixed {
                return Err(NcError::invalid_value(format!(
                    "list instance {} is missing key(s), got <{}>",
                    self.path.as_str(),
                    node.name
                )));
            }
            self.path.append_predicate(&format!(
                "[{}='{}']",
                node.name,
                node.value.as_deref().unwrap_or_default()
            ));
            self.missing_keys -= 1;
            if self.missing_keys == 0 {
                debug!(target: "netconfd::rpc",
                    "edit-config: list {}, operation {:?}", self.path.as_str(), self.pending_list_op);
                if self.pending_list_op.is_structural() {
                    self.apply(self.pending_list_op, None)?;
                }
            }
            // empty marker keeps ascent bookkeeping symmetric
            self.path.push_segment("");
            return Ok(());
        }

        if node.prefixed {
            self.path.push_segment(&format!("/{}:{}", node.module.name, node.name));
        } else {
            self.path.push_segment(&format!("/{}", node.name));
        }

        match &node.schema.kind {
            SchemaNodeKind::Container { presence: false } => {}
            SchemaNodeKind::Container { presence: true } => {
                debug!(target: "netconfd::rpc",
                    "edit-config: presence container {}, operation {:?}", self.path.as_str(), effective);
                self.apply(effective, None)?;
            }
            SchemaNodeKind::List { keys } => {
                self.missing_keys = keys.len();
                self.pending_list_op = effective;
                if keys.is_empty() && effective.is_structural() {
                    self.apply(effective, None)?;
                }
            }
            SchemaNodeKind::Leaf { ty, .. } | SchemaNodeKind::LeafList { ty } => {
                debug!(target: "netconfd::rpc",
                    "edit-config: leaf {}, operation {:?}", self.path.as_str(), effective);
                // deletes never carry a value
                let value = if matches!(effective, EditOp::Merge | EditOp::Replace | EditOp::Create)
                {
                    self.typed_value(node, *ty)?
                } else {
                    None
                };
                self.apply(effective, value)?;
            }
            SchemaNodeKind::AnyXml => {
                debug!(target: "netconfd::rpc",
                    "edit-config: anyxml {}, operation {:?}", self.path.as_str(), effective);
                let value = node.value.clone().map(TypedValue::String);
                self.apply(effective, value)?;
            }
            // filtered out by the edit tree builder
            SchemaNodeKind::Grouping | SchemaNodeKind::Rpc | SchemaNodeKind::Notification => {}
        }
        Ok(())
    }

    fn leave(&mut self, node: &EditNode<'_>) -> NcResult<()> {
        if let SchemaNodeKind::List { .. } = node.schema.kind {
            if self.missing_keys > 0 {
                self.missing_keys = 0;
                self.ops.pop();
                self.path.pop_segment();
                return Err(NcError::invalid_value(format!(
                    "list instance {} is missing key(s)",
                    self.path.as_str()
                )));
            }
        }
        self.ops.pop();
        self.path.pop_segment();
        Ok(())
    }

    fn typed_value(&self, node: &EditNode<'_>, ty: crate::schema::LeafType) -> NcResult<Option<TypedValue>> {
        let text = node.value.as_deref().unwrap_or("");
        let value = TypedValue::parse(ty, text).map_err(|e| {
            NcError::invalid_value(format!("{} ({})", e, self.path.as_str()))
        })?;
        Ok(Some(value))
    }

    /// Map the effective operation onto the backend call and translate the
    /// backend status into the NETCONF error carrying the current path.
    fn apply(&self, op: EditOp, value: Option<TypedValue>) -> NcResult<()> {
        let path = self.path.as_str();
        let result = match op {
            EditOp::Merge | EditOp::Replace => self.ds.set_item(path, value, EditFlags::NONE),
            EditOp::Create => self.ds.set_item(path, value, EditFlags::STRICT),
            EditOp::Delete => self.ds.delete_item(path, EditFlags::STRICT),
            EditOp::Remove => self.ds.delete_item(path, EditFlags::NONE),
            EditOp::None => return Ok(()),
        };
        match result {
            Ok(()) => {
                debug!(target: "netconfd::rpc", "edit-config: success ({})", path);
                Ok(())
            }
            Err(DsError::Unauthorized) => Err(NcError::access_denied(path)),
            Err(DsError::DataExists) => Err(NcError::data_exists(path)),
            Err(DsError::DataMissing) => Err(NcError::data_missing(path)),
            Err(e) => Err(NcError::op_failed_app(format!(
                "editing the datastore failed at {} ({})",
                path, e
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_attribute_parsing() {
        assert_eq!(EditOp::from_attr("merge").unwrap(), EditOp::Merge);
        assert_eq!(EditOp::from_attr("replace").unwrap(), EditOp::Replace);
        assert_eq!(EditOp::from_attr("create").unwrap(), EditOp::Create);
        assert_eq!(EditOp::from_attr("delete").unwrap(), EditOp::Delete);
        assert_eq!(EditOp::from_attr("remove").unwrap(), EditOp::Remove);
        assert!(EditOp::from_attr("none").is_err());
    }

    #[test]
    fn structural_ops() {
        assert!(EditOp::Create.is_structural());
        assert!(EditOp::Delete.is_structural());
        assert!(EditOp::Remove.is_structural());
        assert!(!EditOp::Merge.is_structural());
        assert!(!EditOp::Replace.is_structural());
        assert!(!EditOp::None.is_structural());
    }

    #[test]
    fn list_children_are_reordered_keys_first() {
        use crate::schema::{LeafType, Module, SchemaNode, SchemaRegistry};
        let mut reg = SchemaRegistry::new();
        reg.register(
            Module::new("ex", "urn:ex").node(
                SchemaNode::list("item", &["k1", "k2"])
                    .child(SchemaNode::key_leaf("k1", LeafType::String))
                    .child(SchemaNode::key_leaf("k2", LeafType::String))
                    .child(SchemaNode::leaf("v", LeafType::Int32)),
            ),
        );
        let tree = XmlTree::parse(
            r#"<item xmlns="urn:ex"><v>1</v><k2>b</k2><k1>a</k1></item>"#,
        )
        .unwrap();
        let node = build_edit_node(&tree, tree.roots()[0], &reg, None).unwrap();
        let names: Vec<_> = node.children.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["k1", "k2", "v"]);
    }

    #[test]
    fn unknown_elements_are_rejected() {
        use crate::schema::{Module, SchemaNode, SchemaRegistry};
        let mut reg = SchemaRegistry::new();
        reg.register(Module::new("ex", "urn:ex").node(SchemaNode::container("top")));
        let tree = XmlTree::parse(r#"<nope xmlns="urn:ex"/>"#).unwrap();
        let err = build_edit_node(&tree, tree.roots()[0], &reg, None).unwrap_err();
        assert_eq!(err.tag(), "invalid-value");
        let tree = XmlTree::parse(r#"<top xmlns="urn:unknown"/>"#).unwrap();
        assert!(build_edit_node(&tree, tree.roots()[0], &reg, None).is_err());
    }
}
