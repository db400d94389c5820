use std::sync::Arc;

use netconfd::datastore::{DatastoreSession, MemoryDatastore};
use netconfd::locks::LockTable;
use netconfd::rpc::{self, Reply, RpcContext};
use netconfd::schema::{LeafType, Module, SchemaNode, SchemaRegistry};
use netconfd::session::{Datastore, Session};
use netconfd::value::TypedValue;
use netconfd::xml::XmlTree;

const NC: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

fn registry() -> Arc<SchemaRegistry> {
    let mut reg = SchemaRegistry::new();
    reg.register(
        Module::new("ex", "urn:ex")
            .node(SchemaNode::leaf("x", LeafType::Int32))
            .node(
                SchemaNode::container("top")
                    .child(SchemaNode::leaf("mtu", LeafType::Uint16))
                    .child(SchemaNode::presence_container("alarms"))
                    .child(
                        SchemaNode::list("item", &["k1", "k2"])
                            .child(SchemaNode::key_leaf("k1", LeafType::String))
                            .child(SchemaNode::key_leaf("k2", LeafType::String))
                            .child(SchemaNode::leaf("v", LeafType::Int32)),
                    ),
            ),
    );
    Arc::new(reg)
}

struct Fixture {
    ctx: RpcContext,
    running: MemoryDatastore,
}

impl Fixture {
    fn new() -> Fixture {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
        Fixture {
            ctx: RpcContext::with_locks(registry(), Arc::new(LockTable::new())),
            running: MemoryDatastore::new(),
        }
    }

    fn session(&self, id: u32) -> Session {
        let r: Arc<dyn DatastoreSession> = Arc::new(self.running.clone());
        let s: Arc<dyn DatastoreSession> = Arc::new(MemoryDatastore::new());
        let c: Arc<dyn DatastoreSession> = Arc::new(MemoryDatastore::new());
        Session::new(id, r.clone(), r, s, c)
    }

    fn run(&self, session: &Session, xml: &str) -> Reply {
        let mut tree = XmlTree::parse(xml).unwrap();
        rpc::execute(&self.ctx, session, &mut tree)
    }
}

fn edit(config: &str) -> String {
    format!(
        r#"<edit-config xmlns="{}"><target><running/></target><config>{}</config></edit-config>"#,
        NC, config
    )
}

#[test]
fn create_is_strict() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let rpc_xml = edit(
        r#"<x xmlns="urn:ex" xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" nc:operation="create">1</x>"#,
    );

    assert!(fx.run(&s, &rpc_xml).is_ok());
    assert_eq!(fx.running.get("/ex:x"), Some(TypedValue::Int32(1)));

    // a second identical call must hit data-exists with the path
    let reply = fx.run(&s, &rpc_xml);
    let err = reply.first_error().unwrap();
    assert_eq!(err.tag(), "data-exists");
    assert_eq!(err.path(), Some("/ex:x"));
}

#[test]
fn list_keys_complete_before_any_set() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let reply = fx.run(
        &s,
        &edit(r#"<top xmlns="urn:ex"><item><k1>a</k1><k2>b</k2><v>1</v></item></top>"#),
    );
    assert!(reply.is_ok(), "reply: {:?}", reply);

    // exactly one set call for the value leaf, full key predicates in the path
    assert_eq!(
        fx.running.get("/ex:top/item[k1='a'][k2='b']/v"),
        Some(TypedValue::Int32(1))
    );
    // the list instance exists only as the implicit ancestor of the leaf
    assert_eq!(
        fx.running.get("/ex:top/item[k1='a'][k2='b']"),
        Some(TypedValue::ListInstance)
    );
}

#[test]
fn list_delete_targets_the_instance_path() {
    let fx = Fixture::new();
    fx.running
        .put("/ex:top/item[k1='a'][k2='b']/v", TypedValue::Int32(1));
    let s = fx.session(1);

    let reply = fx.run(
        &s,
        &edit(
            r#"<top xmlns="urn:ex"><item xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" nc:operation="delete"><k1>a</k1><k2>b</k2></item></top>"#,
        ),
    );
    assert!(reply.is_ok(), "reply: {:?}", reply);
    assert!(!fx.running.contains("/ex:top/item[k1='a'][k2='b']"));
    assert!(!fx.running.contains("/ex:top/item[k1='a'][k2='b']/v"));
}

#[test]
fn delete_of_absent_node_is_data_missing() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let reply = fx.run(
        &s,
        &edit(
            r#"<x xmlns="urn:ex" xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" nc:operation="delete"/>"#,
        ),
    );
    let err = reply.first_error().unwrap();
    assert_eq!(err.tag(), "data-missing");
    assert_eq!(err.path(), Some("/ex:x"));
}

#[test]
fn remove_of_absent_node_is_fine() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let reply = fx.run(
        &s,
        &edit(
            r#"<x xmlns="urn:ex" xmlns:nc="urn:ietf:params:xml:ns:netconf:base:1.0" nc:operation="remove"/>"#,
        ),
    );
    assert!(reply.is_ok());
}

#[test]
fn default_operation_none_touches_nothing() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let rpc_xml = format!(
        r#"<edit-config xmlns="{}"><target><running/></target><default-operation>none</default-operation><config><top xmlns="urn:ex"><mtu>9000</mtu></top></config></edit-config>"#,
        NC
    );
    assert!(fx.run(&s, &rpc_xml).is_ok());
    assert!(fx.running.is_empty(), "dump: {:?}", fx.running.dump());
}

#[test]
fn operation_attribute_overrides_inherited_default() {
    let fx = Fixture::new();
    fx.running.put("/ex:top/mtu", TypedValue::Uint16(1500));
    let s = fx.session(1);
    // default none, one leaf explicitly removed
    let rpc_xml = format!(
        r#"<edit-config xmlns="{}"><target><running/></target><default-operation>none</default-operation><config><top xmlns="urn:ex"><mtu xmlns:nc="{}" nc:operation="remove"/></top></config></edit-config>"#,
        NC, NC
    );
    assert!(fx.run(&s, &rpc_xml).is_ok());
    assert!(!fx.running.contains("/ex:top/mtu"));
}

#[test]
fn non_presence_containers_make_no_call() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let rpc_xml = format!(
        r#"<edit-config xmlns="{}"><target><running/></target><default-operation>none</default-operation><config><top xmlns="urn:ex"><alarms xmlns:nc="{}" nc:operation="create"/></top></config></edit-config>"#,
        NC, NC
    );
    assert!(fx.run(&s, &rpc_xml).is_ok());
    // the presence container was created, its non-presence parent was not
    assert!(fx.running.contains("/ex:top/alarms"));
    // /ex:top exists only because it is the ancestor of the created node
    assert_eq!(fx.running.get("/ex:top"), Some(TypedValue::Container));
}

#[test]
fn merge_is_the_default_default_operation() {
    let fx = Fixture::new();
    let s = fx.session(1);
    assert!(fx
        .run(&s, &edit(r#"<top xmlns="urn:ex"><mtu>9000</mtu></top>"#))
        .is_ok());
    assert_eq!(fx.running.get("/ex:top/mtu"), Some(TypedValue::Uint16(9000)));
}

#[test]
fn empty_config_is_ok() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let rpc_xml = format!(
        r#"<edit-config xmlns="{}"><target><running/></target><config/></edit-config>"#,
        NC
    );
    assert!(fx.run(&s, &rpc_xml).is_ok());
    assert!(fx.running.is_empty());
}

#[test]
fn startup_target_is_invalid() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let rpc_xml = format!(
        r#"<edit-config xmlns="{}"><target><startup/></target><config><x xmlns="urn:ex">1</x></config></edit-config>"#,
        NC
    );
    assert_eq!(
        fx.run(&s, &rpc_xml).first_error().unwrap().tag(),
        "invalid-value"
    );
}

#[test]
fn bad_leaf_value_is_invalid_value() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let reply = fx.run(&s, &edit(r#"<x xmlns="urn:ex">notanumber</x>"#));
    assert_eq!(reply.first_error().unwrap().tag(), "invalid-value");
    assert!(fx.running.is_empty());
}

#[test]
fn unknown_element_in_config_is_rejected() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let reply = fx.run(&s, &edit(r#"<zzz xmlns="urn:ex">1</zzz>"#));
    assert_eq!(reply.first_error().unwrap().tag(), "invalid-value");
}

#[test]
fn lock_edit_unlock_leaves_the_table_clean() {
    let fx = Fixture::new();
    let s = fx.session(1);
    let lock = format!(r#"<lock xmlns="{}"><target><running/></target></lock>"#, NC);
    let unlock = format!(r#"<unlock xmlns="{}"><target><running/></target></unlock>"#, NC);

    assert!(fx.run(&s, &lock).is_ok());
    assert!(fx.run(&s, &edit(r#"<top xmlns="urn:ex"><mtu>9000</mtu></top>"#)).is_ok());
    assert!(fx.run(&s, &unlock).is_ok());

    for ds in [Datastore::Running, Datastore::Startup, Datastore::Candidate] {
        assert_eq!(fx.ctx.locks.owner(ds), None);
    }
    assert!(!fx.running.is_locked());
}
