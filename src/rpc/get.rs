//! get / get-config
//! ----------------
//! Read RPC execution: resolve the source datastore, turn the filter into
//! absolute XPath queries (or synthesize one per data-bearing module when
//! no filter is given), submit each query, and assemble the matched values
//! plus their descendants into the reply data tree.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::datastore::{DatastoreSession, DsError};
use crate::error::NcError;
use crate::filter;
use crate::rpc::{Reply, RpcContext};
use crate::session::Session;
use crate::tree::{DataTree, WithDefaults};
use crate::xml::{NodeId, XmlTree};
use crate::{NETCONF_BASE_NS, WITH_DEFAULTS_NS};

pub fn execute(
    ctx: &RpcContext,
    session: &Session,
    rpc: &mut XmlTree,
    root: NodeId,
    config: bool,
) -> Reply {
    // source datastore: fixed running for <get>, from source/* for <get-config>
    let ds: Arc<dyn DatastoreSession> = if !config {
        session.running().clone()
    } else {
        let source = match rpc
            .child_by_name(root, NETCONF_BASE_NS, "source")
            .and_then(|s| rpc.children(s).first().copied())
        {
            Some(s) => s,
            None => return Reply::error(NcError::invalid_value("missing <get-config> source")),
        };
        match rpc.node(source).name.as_str() {
            "running" => session.running_config().clone(),
            "startup" => session.startup().clone(),
            "candidate" => session.candidate().clone(),
            other => {
                return Reply::error(NcError::invalid_value(format!(
                    "invalid <get-config> source ({})",
                    other
                )))
            }
        }
    };

    // filter -> xpath queries
    let filters = match rpc.child_by_name(root, NETCONF_BASE_NS, "filter") {
        Some(felem) => {
            let ftype = rpc.attr(felem, "type").unwrap_or("subtree");
            match ftype {
                "xpath" => match rpc.attr(felem, "select") {
                    Some("") => return Reply::data(String::new()),
                    Some(select) => vec![select.to_string()],
                    None => {
                        return Reply::error(NcError::op_failed_app(
                            "rpc with an xpath filter without the \"select\" attribute",
                        ))
                    }
                },
                "subtree" => {
                    let roots = rpc.children(felem);
                    if roots.is_empty() {
                        // empty filter, fair enough
                        return Reply::data(String::new());
                    }
                    match filter::compile(rpc, &roots, &ctx.registry) {
                        Ok(f) => f,
                        Err(e) => return Reply::error(e),
                    }
                }
                other => {
                    return Reply::error(NcError::invalid_value(format!(
                        "invalid filter type ({})",
                        other
                    )))
                }
            }
        }
        // no filter: one query per module with actual data definitions
        None => ctx
            .registry
            .modules()
            .filter(|m| m.has_data())
            .map(|m| format!("/{}:*", m.name))
            .collect(),
    };

    // with-defaults mode
    let wd = match rpc
        .child_by_name(root, WITH_DEFAULTS_NS, "with-defaults")
        .and_then(|n| rpc.content(n))
    {
        Some(text) => match WithDefaults::from_leaf(text) {
            Some(mode) => mode,
            None => {
                return Reply::error(NcError::invalid_value(format!(
                    "invalid with-defaults mode ({})",
                    text
                )))
            }
        },
        None => ctx.with_defaults,
    };

    // observe a snapshot no older than rpc entry
    if let Err(e) = ds.session_refresh() {
        warn!(target: "netconfd::rpc", "session refresh failed ({})", e);
    }

    let mut tree = DataTree::new();
    let mut buf = String::new();
    for query in &filters {
        let values = match ds.get_items(query) {
            Ok(v) => v,
            // skip modules not known to the store and queries without data
            Err(DsError::UnknownModel) | Err(DsError::NotFound) => continue,
            Err(e) => {
                return Reply::error(NcError::op_failed_app(format!(
                    "getting items ({}) from the datastore failed ({})",
                    query, e
                )))
            }
        };
        debug!(target: "netconfd::rpc", "query {} matched {} node(s)", query, values.len());
        for v in values {
            let rendered = v.value.render(&ctx.registry, &v.xpath, &mut buf);
            tree.new_path(&v.xpath, rendered);
            if let Err(e) = build_subtree(&*ds, ctx, &mut tree, &v.xpath) {
                return Reply::error(e);
            }
        }
    }

    tree.apply_with_defaults(&ctx.registry, wd);
    Reply::data(tree.to_xml(&ctx.registry))
}

/// Materialize the full subtree under a matched node with a companion
/// `{xpath}//*` query.
fn build_subtree(
    ds: &dyn DatastoreSession,
    ctx: &RpcContext,
    tree: &mut DataTree,
    subtree_path: &str,
) -> Result<(), NcError> {
    let query = format!("{}//*", subtree_path);
    let iter = match ds.get_items_iter(&query) {
        Ok(it) => it,
        Err(DsError::UnknownModel) | Err(DsError::NotFound) => return Ok(()),
        Err(e) => {
            return Err(NcError::op_failed_app(format!(
                "getting items ({}) from the datastore failed ({})",
                query, e
            )))
        }
    };
    let mut buf = String::new();
    for item in iter {
        let v = item.map_err(|e| {
            NcError::op_failed_app(format!(
                "iterating items ({}) from the datastore failed ({})",
                query, e
            ))
        })?;
        let rendered = v.value.render(&ctx.registry, &v.xpath, &mut buf);
        tree.new_path(&v.xpath, rendered);
    }
    Ok(())
}
