//! lock / unlock
//! -------------
//! Target extraction plus the lock-table protocol. Kept thin: all the
//! arbitration lives in [`crate::locks::LockTable`].

use crate::error::NcError;
use crate::rpc::{Reply, RpcContext};
use crate::session::{Datastore, Session};
use crate::xml::{NodeId, XmlTree};
use crate::NETCONF_BASE_NS;

fn target(rpc: &XmlTree, root: NodeId, op: &str) -> Result<Datastore, NcError> {
    let name = rpc
        .child_by_name(root, NETCONF_BASE_NS, "target")
        .and_then(|t| rpc.children(t).first().copied())
        .map(|n| rpc.node(n).name.clone())
        .ok_or_else(|| NcError::invalid_value(format!("missing <{}> target", op)))?;
    match Datastore::from_element(&name) {
        // the candidate datastore is not wired through this core
        ds @ (Datastore::Running | Datastore::Startup) => Ok(ds),
        _ => Err(NcError::invalid_value(format!(
            "invalid <{}> target ({})",
            op, name
        ))),
    }
}

pub fn lock(ctx: &RpcContext, session: &Session, rpc: &XmlTree, root: NodeId) -> Reply {
    let ds = match target(rpc, root, "lock") {
        Ok(ds) => ds,
        Err(e) => return Reply::error(e),
    };
    match ctx.locks.acquire(ds, session) {
        Ok(()) => Reply::ok(),
        Err(e) => Reply::error(e),
    }
}

pub fn unlock(ctx: &RpcContext, session: &Session, rpc: &XmlTree, root: NodeId) -> Reply {
    let ds = match target(rpc, root, "unlock") {
        Ok(ds) => ds,
        Err(e) => return Reply::error(e),
    };
    match ctx.locks.release(ds, session) {
        Ok(()) => Reply::ok(),
        Err(e) => Reply::error(e),
    }
}
