// Submodules implementing the RPC executors
// NOTE: This module is intentionally kept thin. Add new operations in their
// own files and route them from execute().
pub mod edit;
pub mod get;
pub mod lock;
pub mod reply;

use std::sync::Arc;

use tracing::debug;

use crate::error::NcError;
use crate::locks::LockTable;
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::tree::WithDefaults;
use crate::xml::XmlTree;
use crate::NETCONF_BASE_NS;

pub use reply::Reply;

/// Server-level state shared by every RPC execution: the schema registry,
/// the lock table and capability defaults.
#[derive(Clone)]
pub struct RpcContext {
    pub registry: Arc<SchemaRegistry>,
    pub locks: Arc<LockTable>,
    /// with-defaults mode used when the RPC does not carry the leaf.
    pub with_defaults: WithDefaults,
}

impl RpcContext {
    /// Context over the process-wide lock table. The default with-defaults
    /// mode comes from `NETCONFD_WITH_DEFAULTS` when set.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self::with_locks(registry, LockTable::global())
    }

    pub fn with_locks(registry: Arc<SchemaRegistry>, locks: Arc<LockTable>) -> Self {
        let with_defaults = std::env::var("NETCONFD_WITH_DEFAULTS")
            .ok()
            .and_then(|v| WithDefaults::from_leaf(&v))
            .unwrap_or(WithDefaults::Explicit);
        Self { registry, locks, with_defaults }
    }
}

/// Execute one parsed RPC against the session, producing the reply.
/// The rpc tree's root must be the operation element itself.
pub fn execute(ctx: &RpcContext, session: &Session, rpc: &mut XmlTree) -> Reply {
    let Some(&root) = rpc.roots().first() else {
        return Reply::error(NcError::op_failed_app("empty rpc"));
    };
    let (name, ns) = {
        let n = rpc.node(root);
        (n.name.clone(), n.namespace.clone())
    };
    if ns.as_deref() != Some(NETCONF_BASE_NS) {
        return Reply::error(NcError::op_failed_app(format!(
            "unsupported rpc namespace ({})",
            ns.as_deref().unwrap_or("none")
        )));
    }
    debug!(target: "netconfd::rpc", "session {} rpc <{}>", session.id(), name);
    match name.as_str() {
        "get" => get::execute(ctx, session, rpc, root, false),
        "get-config" => get::execute(ctx, session, rpc, root, true),
        "lock" => lock::lock(ctx, session, rpc, root),
        "unlock" => lock::unlock(ctx, session, rpc, root),
        "edit-config" => edit::execute(ctx, session, rpc, root),
        other => Reply::error(NcError::op_failed_app(format!(
            "unsupported operation <{}>",
            other
        ))),
    }
}
