//!
//! netconfd XML element tree
//! -------------------------
//! Arena-backed XML tree used for subtree filters, RPC parameter extraction
//! and edit-config payloads. Nodes live in one `Vec` and link to each other
//! by index, so parent/child traversal and in-place child removal never
//! create owned pointer cycles. Parsing is event-driven through quick-xml
//! with explicit namespace-scope tracking.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

pub type NodeId = usize;

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml parse error: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attr(#[from] quick_xml::events::attributes::AttrError),
    #[error("xml escape error: {0}")]
    Escape(#[from] quick_xml::escape::EscapeError),
    #[error("xml is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("xml encoding error: {0}")]
    Encoding(#[from] quick_xml::encoding::EncodingError),
    #[error("unbalanced element nesting")]
    Unbalanced,
}

/// A standard (non-xmlns) attribute with its resolved namespace.
#[derive(Debug, Clone)]
pub struct XmlAttr {
    pub name: String,
    /// Resolved namespace URI; `None` for unprefixed attributes, which
    /// never inherit the default namespace.
    pub namespace: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone)]
pub struct XmlNode {
    pub name: String,
    /// Effective namespace URI after default-namespace inheritance.
    pub namespace: Option<String>,
    pub attrs: Vec<XmlAttr>,
    pub text: String,
    pub parent: Option<NodeId>,
    pub first_child: Option<NodeId>,
    pub last_child: Option<NodeId>,
    pub prev_sibling: Option<NodeId>,
    pub next_sibling: Option<NodeId>,
}

/// An XML document fragment with zero or more root elements.
#[derive(Debug, Default, Clone)]
pub struct XmlTree {
    nodes: Vec<XmlNode>,
    roots: Vec<NodeId>,
}

impl XmlTree {
    /// Parse a (possibly multi-root) XML fragment into an arena tree.
    pub fn parse(input: &str) -> Result<XmlTree, XmlError> {
        let mut reader = Reader::from_str(input);
        let mut tree = XmlTree::default();
        // stack of (node id, namespace scope introduced by that element)
        let mut open: Vec<NodeId> = Vec::new();
        let mut scopes: Vec<Vec<(String, String)>> = Vec::new();

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = tree.open_element(e.name().as_ref(), e.attributes(), &mut scopes, open.last().copied())?;
                    open.push(id);
                }
                Event::Empty(e) => {
                    tree.open_element(e.name().as_ref(), e.attributes(), &mut scopes, open.last().copied())?;
                    scopes.pop();
                }
                Event::End(_) => {
                    open.pop().ok_or(XmlError::Unbalanced)?;
                    scopes.pop();
                }
                Event::Text(t) => {
                    if let Some(&id) = open.last() {
                        tree.nodes[id].text.push_str(&t.decode()?);
                    }
                }
                Event::CData(t) => {
                    if let Some(&id) = open.last() {
                        tree.nodes[id].text.push_str(std::str::from_utf8(t.as_ref())?);
                    }
                }
                Event::GeneralRef(r) => {
                    if let Some(&id) = open.last() {
                        if let Some(ch) = r.resolve_char_ref()? {
                            push_text_char(&mut tree, id, ch);
                        } else {
                            let name: &[u8] = &r;
                            match name {
                                b"lt" => push_text_char(&mut tree, id, '<'),
                                b"gt" => push_text_char(&mut tree, id, '>'),
                                b"amp" => push_text_char(&mut tree, id, '&'),
                                b"apos" => push_text_char(&mut tree, id, '\''),
                                b"quot" => push_text_char(&mut tree, id, '"'),
                                _ => {}
                            }
                        }
                    }
                }
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
                Event::Eof => break,
            }
        }
        if !open.is_empty() {
            return Err(XmlError::Unbalanced);
        }
        Ok(tree)
    }

    fn open_element(
        &mut self,
        raw_name: &[u8],
        attributes: quick_xml::events::attributes::Attributes<'_>,
        scopes: &mut Vec<Vec<(String, String)>>,
        parent: Option<NodeId>,
    ) -> Result<NodeId, XmlError> {
        // first pass: collect this element's namespace declarations
        let mut scope: Vec<(String, String)> = Vec::new();
        let mut plain: Vec<(String, String)> = Vec::new();
        for attr in attributes {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?;
            let value = attr.unescape_value()?.into_owned();
            if key == "xmlns" {
                scope.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                scope.push((prefix.to_string(), value));
            } else {
                plain.push((key.to_string(), value));
            }
        }
        scopes.push(scope);

        let (prefix, local) = split_qname(std::str::from_utf8(raw_name)?);
        let namespace = resolve_ns(scopes, prefix.unwrap_or(""));

        let attrs = plain
            .into_iter()
            .map(|(key, value)| {
                let (aprefix, alocal) = split_qname(&key);
                XmlAttr {
                    name: alocal.to_string(),
                    namespace: aprefix.and_then(|p| resolve_ns(scopes, p)),
                    value,
                }
            })
            .collect();

        let id = self.nodes.len();
        self.nodes.push(XmlNode {
            name: local.to_string(),
            namespace,
            attrs,
            text: String::new(),
            parent,
            first_child: None,
            last_child: None,
            prev_sibling: None,
            next_sibling: None,
        });
        self.attach(id, parent);
        Ok(id)
    }

    fn attach(&mut self, id: NodeId, parent: Option<NodeId>) {
        match parent {
            Some(p) => {
                if let Some(last) = self.nodes[p].last_child {
                    self.nodes[last].next_sibling = Some(id);
                    self.nodes[id].prev_sibling = Some(last);
                } else {
                    self.nodes[p].first_child = Some(id);
                }
                self.nodes[p].last_child = Some(id);
            }
            None => self.roots.push(id),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &XmlNode {
        &self.nodes[id]
    }

    /// Child element ids of `id`, in document order.
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cur = self.nodes[id].first_child;
        while let Some(c) = cur {
            out.push(c);
            cur = self.nodes[c].next_sibling;
        }
        out
    }

    pub fn has_children(&self, id: NodeId) -> bool {
        self.nodes[id].first_child.is_some()
    }

    /// Find the first direct child with the given (namespace, name).
    pub fn child_by_name(&self, id: NodeId, namespace: &str, name: &str) -> Option<NodeId> {
        self.children(id).into_iter().find(|&c| {
            let n = &self.nodes[c];
            n.name == name && n.namespace.as_deref() == Some(namespace)
        })
    }

    /// Value of an unqualified attribute.
    pub fn attr(&self, id: NodeId, name: &str) -> Option<&str> {
        self.nodes[id]
            .attrs
            .iter()
            .find(|a| a.name == name && a.namespace.is_none())
            .map(|a| a.value.as_str())
    }

    /// Value of a namespace-qualified attribute.
    pub fn attr_ns(&self, id: NodeId, namespace: &str, name: &str) -> Option<&str> {
        self.nodes[id]
            .attrs
            .iter()
            .find(|a| a.name == name && a.namespace.as_deref() == Some(namespace))
            .map(|a| a.value.as_str())
    }

    /// Unlink a node from its parent's child chain (the arena slot stays
    /// allocated; the node simply becomes unreachable from the tree).
    pub fn unlink(&mut self, id: NodeId) {
        let (parent, prev, next) = {
            let n = &self.nodes[id];
            (n.parent, n.prev_sibling, n.next_sibling)
        };
        match prev {
            Some(p) => self.nodes[p].next_sibling = next,
            None => {
                if let Some(par) = parent {
                    self.nodes[par].first_child = next;
                }
            }
        }
        match next {
            Some(nx) => self.nodes[nx].prev_sibling = prev,
            None => {
                if let Some(par) = parent {
                    self.nodes[par].last_child = prev;
                }
            }
        }
        if parent.is_none() {
            self.roots.retain(|&r| r != id);
        }
        let n = &mut self.nodes[id];
        n.parent = None;
        n.prev_sibling = None;
        n.next_sibling = None;
    }

    /// Trimmed element text; `None` when it is empty or whitespace-only.
    pub fn content(&self, id: NodeId) -> Option<&str> {
        let t = self.nodes[id].text.trim();
        if t.is_empty() {
            None
        } else {
            Some(t)
        }
    }
}

fn push_text_char(tree: &mut XmlTree, id: NodeId, ch: char) {
    tree.nodes[id].text.push(ch);
}

fn split_qname(qname: &str) -> (Option<&str>, &str) {
    match qname.find(':') {
        Some(idx) => (Some(&qname[..idx]), &qname[idx + 1..]),
        None => (None, qname),
    }
}

fn resolve_ns(scopes: &[Vec<(String, String)>], prefix: &str) -> Option<String> {
    for scope in scopes.iter().rev() {
        for (p, uri) in scope.iter().rev() {
            if p == prefix {
                if uri.is_empty() {
                    return None; // xmlns="" un-declares the default namespace
                }
                return Some(uri.clone());
            }
        }
    }
    None
}
