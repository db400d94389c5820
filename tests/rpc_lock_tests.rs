use std::sync::Arc;

use netconfd::datastore::{DatastoreSession, MemoryDatastore};
use netconfd::locks::LockTable;
use netconfd::rpc::{self, Reply, RpcContext};
use netconfd::schema::{Module, SchemaNode, SchemaRegistry};
use netconfd::session::Session;
use netconfd::xml::XmlTree;

fn registry() -> Arc<SchemaRegistry> {
    let mut reg = SchemaRegistry::new();
    reg.register(Module::new("ex", "urn:ex").node(SchemaNode::container("top")));
    Arc::new(reg)
}

struct Fixture {
    ctx: RpcContext,
    running: MemoryDatastore,
    startup: MemoryDatastore,
}

impl Fixture {
    fn new() -> Fixture {
        Fixture {
            ctx: RpcContext::with_locks(registry(), Arc::new(LockTable::new())),
            running: MemoryDatastore::new(),
            startup: MemoryDatastore::new(),
        }
    }

    fn session(&self, id: u32) -> Session {
        let r: Arc<dyn DatastoreSession> = Arc::new(self.running.clone());
        let s: Arc<dyn DatastoreSession> = Arc::new(self.startup.clone());
        let c: Arc<dyn DatastoreSession> = Arc::new(MemoryDatastore::new());
        Session::new(id, r.clone(), r, s, c)
    }

    fn run(&self, session: &Session, xml: &str) -> Reply {
        let mut tree = XmlTree::parse(xml).unwrap();
        rpc::execute(&self.ctx, session, &mut tree)
    }
}

const NC: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

fn lock_rpc(target: &str) -> String {
    format!(r#"<lock xmlns="{}"><target><{}/></target></lock>"#, NC, target)
}

fn unlock_rpc(target: &str) -> String {
    format!(r#"<unlock xmlns="{}"><target><{}/></target></unlock>"#, NC, target)
}

#[test]
fn lock_contention_reports_the_holder() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let s2 = fx.session(2);

    assert!(fx.run(&s1, &lock_rpc("running")).is_ok());

    let denied = fx.run(&s2, &lock_rpc("running"));
    let err = denied.first_error().expect("lock must be denied");
    assert_eq!(err.tag(), "lock-denied");
    assert_eq!(err.session_id(), Some(1));
    let xml = denied.to_xml();
    assert!(xml.contains("<error-tag>lock-denied</error-tag>"));
    assert!(xml.contains("<session-id>1</session-id>"));

    // after the holder unlocks, the retry succeeds
    assert!(fx.run(&s1, &unlock_rpc("running")).is_ok());
    assert!(fx.run(&s2, &lock_rpc("running")).is_ok());
}

#[test]
fn startup_and_running_locks_are_independent() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let s2 = fx.session(2);

    assert!(fx.run(&s1, &lock_rpc("running")).is_ok());
    assert!(fx.run(&s2, &lock_rpc("startup")).is_ok());
    assert!(fx.run(&s1, &unlock_rpc("running")).is_ok());
    assert!(fx.run(&s2, &unlock_rpc("startup")).is_ok());
}

#[test]
fn unlock_without_holding_fails() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let reply = fx.run(&s1, &unlock_rpc("running"));
    assert_eq!(reply.first_error().unwrap().tag(), "operation-failed");
}

#[test]
fn unlock_by_another_session_is_denied() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let s2 = fx.session(2);
    assert!(fx.run(&s1, &lock_rpc("running")).is_ok());
    let reply = fx.run(&s2, &unlock_rpc("running"));
    let err = reply.first_error().unwrap();
    assert_eq!(err.tag(), "lock-denied");
    assert_eq!(err.session_id(), Some(1));
}

#[test]
fn candidate_target_is_invalid() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let reply = fx.run(&s1, &lock_rpc("candidate"));
    assert_eq!(reply.first_error().unwrap().tag(), "invalid-value");
}

#[test]
fn externally_locked_backend_reports_session_zero() {
    let fx = Fixture::new();
    fx.running.lock_datastore().unwrap();
    let s1 = fx.session(1);
    let reply = fx.run(&s1, &lock_rpc("running"));
    assert_eq!(reply.first_error().unwrap().session_id(), Some(0));
}

#[test]
fn teardown_releases_everything_the_session_held() {
    let fx = Fixture::new();
    let s1 = fx.session(1);
    let s2 = fx.session(2);

    assert!(fx.run(&s1, &lock_rpc("running")).is_ok());
    assert!(fx.run(&s1, &lock_rpc("startup")).is_ok());

    fx.ctx.locks.clean_session(&s1);

    assert!(fx.run(&s2, &lock_rpc("running")).is_ok());
    assert!(fx.run(&s2, &lock_rpc("startup")).is_ok());
}
