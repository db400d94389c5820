pub mod datastore;
pub mod error;
pub mod filter;
pub mod locks;
pub mod path;
pub mod rpc;
pub mod schema;
pub mod session;
pub mod tree;
pub mod value;
pub mod xml;

/// Base NETCONF namespace carried by the `ietf-netconf` module and every
/// inbound RPC element.
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// Namespace of the `with-defaults` leaf (RFC 6243).
pub const WITH_DEFAULTS_NS: &str =
    "urn:ietf:params:xml:ns:yang:ietf-netconf-with-defaults";
