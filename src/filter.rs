//!
//! netconfd subtree-filter compiler
//! --------------------------------
//! Transforms a NETCONF subtree filter (RFC 6241 §6) into a set of absolute
//! XPath expressions against the schema registry. The three filter node
//! kinds map as follows:
//!
//! - containment nodes append `/module:name` steps,
//! - content-match nodes collapse into `[module:name='value']` predicates on
//!   the enclosing step (and are unlinked from the working tree),
//! - selection nodes terminate a path with a bare step.
//!
//! A containment node with several remaining children branches the
//! accumulated path, one XPath per child subtree; the last child consumes
//! the original buffer. Attributes whose namespace resolves to a known
//! module add `[@module:name='value']` predicates; unresolvable attribute
//! namespaces are skipped, and an unresolvable element namespace silently
//! drops the whole branch.

use tracing::debug;

use crate::error::NcResult;
use crate::schema::SchemaRegistry;
use crate::xml::{NodeId, XmlTree};
use crate::NETCONF_BASE_NS;

/// Compile the filter elements `roots` into absolute XPath expressions.
/// Content-match nodes are removed from `tree` as they are absorbed.
pub fn compile(
    tree: &mut XmlTree,
    roots: &[NodeId],
    registry: &SchemaRegistry,
) -> NcResult<Vec<String>> {
    let mut filters: Vec<String> = Vec::new();

    for &root in roots {
        let (name, namespace) = {
            let n = tree.node(root);
            (n.name.clone(), n.namespace.clone())
        };

        // A namespaced top-level element resolves to exactly one module;
        // otherwise fan out to every module with a matching top-level node.
        let modules: Vec<String> = match namespace.as_deref() {
            Some(ns) if ns != NETCONF_BASE_NS => match registry.module_by_namespace(ns) {
                Some(m) => vec![m.name.clone()],
                // not really an error, the branch just cannot match
                None => continue,
            },
            _ => registry
                .modules()
                .filter(|m| m.top_level().iter().any(|n| n.is_data() && n.name == name))
                .map(|m| m.name.clone())
                .collect(),
        };

        let top_content = !tree.has_children(root) && tree.content(root).is_some();
        let last = modules.len().saturating_sub(1);
        for (i, module) in modules.iter().enumerate() {
            if top_content {
                add_top_content(tree, root, module, registry, &mut filters);
            } else if i == last {
                add_subtree(tree, root, Some(module), String::new(), registry, &mut filters);
            } else {
                // content absorption unlinks nodes, so earlier fan-out
                // branches must work on their own copy of the tree
                let mut copy = tree.clone();
                add_subtree(&mut copy, root, Some(module), String::new(), registry, &mut filters);
            }
        }
    }

    debug!(target: "netconfd::filter", "compiled {} xpath filter(s)", filters.len());
    Ok(filters)
}

/// Append `[@module:name='value']` for every attribute whose namespace
/// resolves to a known module.
fn add_attrs(tree: &XmlTree, elem: NodeId, registry: &SchemaRegistry, buf: &mut String) {
    for attr in &tree.node(elem).attrs {
        let module = match attr.namespace.as_deref() {
            Some(ns) => registry.module_by_namespace(ns),
            // attribute without namespace will not match anything anyway
            None => None,
        };
        if let Some(module) = module {
            buf.push_str(&format!("[@{}:{}='{}']", module.name, attr.name, attr.value));
        }
    }
}

/// Append the `/name` or `/module:name` step for a containment/selection
/// node plus its attribute predicates. Returns false when the element's
/// namespace does not resolve to any module (the branch cannot match).
fn add_step(
    tree: &XmlTree,
    elem: NodeId,
    forced_module: Option<&str>,
    registry: &SchemaRegistry,
    buf: &mut String,
) -> bool {
    let node = tree.node(elem);
    let module = match forced_module {
        Some(m) => Some(m.to_string()),
        None => match node.namespace.as_deref() {
            Some(ns) if ns != NETCONF_BASE_NS => match registry.module_by_namespace(ns) {
                Some(m) => Some(m.name.clone()),
                None => return false,
            },
            _ => None,
        },
    };
    match module {
        Some(m) => buf.push_str(&format!("/{}:{}", m, node.name)),
        None => buf.push_str(&format!("/{}", node.name)),
    }
    add_attrs(tree, elem, registry, buf);
    true
}

/// Absorb a content-match child into the enclosing step's predicate list.
/// Returns false when the child's namespace does not resolve.
fn add_content(tree: &XmlTree, child: NodeId, registry: &SchemaRegistry, buf: &mut String) -> bool {
    let node = tree.node(child);
    let module = match node.namespace.as_deref() {
        Some(ns) if ns != NETCONF_BASE_NS => match registry.module_by_namespace(ns) {
            Some(m) => Some(m.name.clone()),
            None => return false,
        },
        _ => None,
    };
    match module {
        Some(m) => buf.push_str(&format!("[{}:{}", m, node.name)),
        None => buf.push_str(&format!("[{}", node.name)),
    }
    add_attrs(tree, child, registry, buf);
    let content = tree.content(child).unwrap_or_default();
    buf.push_str(&format!("='{}']", content));
    true
}

/// Top-level element that is itself a content match:
/// `/module:name[text()='value']` with attribute predicates appended.
fn add_top_content(
    tree: &XmlTree,
    elem: NodeId,
    module: &str,
    registry: &SchemaRegistry,
    filters: &mut Vec<String>,
) {
    let node = tree.node(elem);
    let content = tree.content(elem).unwrap_or_default();
    let mut buf = format!("/{}:{}[text()='{}']", module, node.name, content);
    add_attrs(tree, elem, registry, &mut buf);
    filters.push(buf);
}

/// Recursive descent over a containment node: absorbs content children,
/// then either finishes the path or branches per remaining child. `buf` is
/// consumed; branch copies duplicate the path buffer, never tree nodes.
fn add_subtree(
    tree: &mut XmlTree,
    elem: NodeId,
    forced_module: Option<&str>,
    mut buf: String,
    registry: &SchemaRegistry,
    filters: &mut Vec<String>,
) {
    if !add_step(tree, elem, forced_module, registry, &mut buf) {
        return;
    }

    // content-match children collapse into predicates and leave the tree
    for child in tree.children(elem) {
        if !tree.has_children(child) && tree.content(child).is_some() {
            if !add_content(tree, child, registry, &mut buf) {
                return;
            }
            tree.unlink(child);
        }
    }

    // nothing below: the accumulated path is one complete filter
    if !tree.has_children(elem) {
        filters.push(buf);
        return;
    }

    // branch with every remaining child; the last one consumes the buffer
    let children = tree.children(elem);
    let last = children.len() - 1;
    for (i, child) in children.into_iter().enumerate() {
        let branch = if i == last { std::mem::take(&mut buf) } else { buf.clone() };
        if tree.has_children(child) {
            add_subtree(tree, child, None, branch, registry, filters);
        } else {
            let mut branch = branch;
            if add_step(tree, child, None, registry, &mut branch) {
                filters.push(branch);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LeafType, Module, SchemaNode};

    fn registry() -> SchemaRegistry {
        let mut reg = SchemaRegistry::new();
        reg.register(
            Module::new("ex", "urn:ex").node(
                SchemaNode::container("top")
                    .child(
                        SchemaNode::container("a")
                            .child(SchemaNode::leaf("b", LeafType::String)),
                    )
                    .child(SchemaNode::container("b")),
            ),
        );
        reg.register(
            Module::new("other", "urn:other")
                .node(SchemaNode::container("top"))
                .node(SchemaNode::leaf("serial", LeafType::String)),
        );
        reg
    }

    fn compile_str(xml: &str) -> Vec<String> {
        let reg = registry();
        let mut tree = XmlTree::parse(xml).unwrap();
        let roots = tree.roots().to_vec();
        compile(&mut tree, &roots, &reg).unwrap()
    }

    #[test]
    fn content_match_collapses_into_predicate() {
        let out = compile_str(r#"<top xmlns="urn:ex"><a><b>7</b></a></top>"#);
        assert_eq!(out, vec!["/ex:top/ex:a[ex:b='7']"]);
    }

    #[test]
    fn siblings_branch_in_document_order() {
        let out = compile_str(r#"<top xmlns="urn:ex"><a/><b/></top>"#);
        assert_eq!(out, vec!["/ex:top/ex:a", "/ex:top/ex:b"]);
    }

    #[test]
    fn selection_only_root() {
        let out = compile_str(r#"<top xmlns="urn:ex"/>"#);
        assert_eq!(out, vec!["/ex:top"]);
    }

    #[test]
    fn whitespace_content_is_a_selection_node() {
        let out = compile_str(r#"<top xmlns="urn:ex"><a>   </a></top>"#);
        assert_eq!(out, vec!["/ex:top/ex:a"]);
    }

    #[test]
    fn content_values_are_trimmed() {
        let out = compile_str(r#"<top xmlns="urn:ex"><a><b>  7 </b></a></top>"#);
        assert_eq!(out, vec!["/ex:top/ex:a[ex:b='7']"]);
    }

    #[test]
    fn top_level_content_match() {
        let out = compile_str(r#"<serial xmlns="urn:other">abc</serial>"#);
        assert_eq!(out, vec!["/other:serial[text()='abc']"]);
    }

    #[test]
    fn unqualified_root_fans_out_to_matching_modules() {
        let out = compile_str(r#"<top/>"#);
        // both modules carry a top-level "top" node
        assert_eq!(out.len(), 2);
        assert!(out.contains(&"/ex:top".to_string()));
        assert!(out.contains(&"/other:top".to_string()));
    }

    #[test]
    fn unknown_namespace_drops_the_branch() {
        let out = compile_str(r#"<top xmlns="urn:nowhere"><a/></top>"#);
        assert!(out.is_empty());
    }

    #[test]
    fn attribute_predicates_require_a_known_module() {
        let out = compile_str(
            r#"<top xmlns="urn:ex" xmlns:o="urn:other" xmlns:u="urn:nope" o:tag="x" u:skip="y" plain="z"/>"#,
        );
        assert_eq!(out, vec!["/ex:top[@other:tag='x']"]);
    }

    #[test]
    fn mixed_content_and_siblings() {
        // content match absorbed first, then the remaining children branch
        let out = compile_str(
            r#"<top xmlns="urn:ex"><a><b>7</b></a><b/></top>"#,
        );
        assert_eq!(out, vec!["/ex:top/ex:a[ex:b='7']", "/ex:top/ex:b"]);
    }

    #[test]
    fn filter_count_matches_top_level_siblings() {
        let out = compile_str(r#"<top xmlns="urn:ex"><a/></top><top xmlns="urn:other"/>"#);
        assert_eq!(out, vec!["/ex:top/ex:a", "/other:top"]);
    }
}
