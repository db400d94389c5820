//! Unified NETCONF error model and mapping helpers.
//! This module provides the structured error enum used across all RPC
//! executors, along with the error-tag/error-type accessors needed to
//! assemble `<rpc-error>` replies.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// RFC 6241 error-type. Only the two layers this core emits are modeled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Protocol,
    Application,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
        }
    }
}

/// Structured NETCONF error as carried inside an `<rpc-error>` reply.
///
/// Every failure inside the core maps to one of these variants; none are
/// allowed to escape as unhandled faults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tag", rename_all = "kebab-case")]
pub enum NcError {
    /// Bad target/source datastore or malformed parameter content.
    InvalidValue { message: String },
    /// Datastore lock is busy. `session_id` names the holder; 0 means the
    /// lock is held outside this server.
    LockDenied { session_id: u32, message: String },
    /// Generic failure; `layer` distinguishes protocol misuse (e.g. unlock
    /// without holding the lock) from internal/application faults.
    OperationFailed { layer: ErrorType, message: String },
    /// Backend refused the mutation at `path`.
    AccessDenied { path: String },
    /// Strict create hit an existing node at `path`.
    DataExists { path: String },
    /// Strict delete hit an absent node at `path`.
    DataMissing { path: String },
}

impl NcError {
    pub fn invalid_value<S: Into<String>>(msg: S) -> Self {
        NcError::InvalidValue { message: msg.into() }
    }

    pub fn lock_denied<S: Into<String>>(session_id: u32, msg: S) -> Self {
        NcError::LockDenied { session_id, message: msg.into() }
    }

    pub fn op_failed<S: Into<String>>(msg: S) -> Self {
        NcError::OperationFailed { layer: ErrorType::Protocol, message: msg.into() }
    }

    pub fn op_failed_app<S: Into<String>>(msg: S) -> Self {
        NcError::OperationFailed { layer: ErrorType::Application, message: msg.into() }
    }

    pub fn access_denied<S: Into<String>>(path: S) -> Self {
        NcError::AccessDenied { path: path.into() }
    }

    pub fn data_exists<S: Into<String>>(path: S) -> Self {
        NcError::DataExists { path: path.into() }
    }

    pub fn data_missing<S: Into<String>>(path: S) -> Self {
        NcError::DataMissing { path: path.into() }
    }

    /// RFC 6241 error-tag string.
    pub fn tag(&self) -> &'static str {
        match self {
            NcError::InvalidValue { .. } => "invalid-value",
            NcError::LockDenied { .. } => "lock-denied",
            NcError::OperationFailed { .. } => "operation-failed",
            NcError::AccessDenied { .. } => "access-denied",
            NcError::DataExists { .. } => "data-exists",
            NcError::DataMissing { .. } => "data-missing",
        }
    }

    /// RFC 6241 error-type layer for this error.
    pub fn error_type(&self) -> ErrorType {
        match self {
            NcError::InvalidValue { .. }
            | NcError::LockDenied { .. }
            | NcError::AccessDenied { .. }
            | NcError::DataExists { .. }
            | NcError::DataMissing { .. } => ErrorType::Protocol,
            NcError::OperationFailed { layer, .. } => *layer,
        }
    }

    /// Human-readable message, when one is carried.
    pub fn message(&self) -> Option<&str> {
        match self {
            NcError::InvalidValue { message }
            | NcError::LockDenied { message, .. }
            | NcError::OperationFailed { message, .. } => Some(message.as_str()),
            _ => None,
        }
    }

    /// The error-path, when one is carried.
    pub fn path(&self) -> Option<&str> {
        match self {
            NcError::AccessDenied { path }
            | NcError::DataExists { path }
            | NcError::DataMissing { path } => Some(path.as_str()),
            _ => None,
        }
    }

    /// Session id for the `error-info/session-id` element of lock-denied.
    pub fn session_id(&self) -> Option<u32> {
        match self {
            NcError::LockDenied { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// Render this error as an `<rpc-error>` element body.
    pub fn to_xml(&self) -> String {
        use quick_xml::escape::escape;

        let mut out = String::with_capacity(160);
        out.push_str("<rpc-error>");
        out.push_str(&format!("<error-type>{}</error-type>", self.error_type().as_str()));
        out.push_str(&format!("<error-tag>{}</error-tag>", self.tag()));
        out.push_str("<error-severity>error</error-severity>");
        if let Some(path) = self.path() {
            out.push_str(&format!("<error-path>{}</error-path>", escape(path)));
        }
        if let Some(msg) = self.message() {
            out.push_str(&format!(
                "<error-message xml:lang=\"en\">{}</error-message>",
                escape(msg)
            ));
        }
        if let Some(sid) = self.session_id() {
            out.push_str(&format!(
                "<error-info><session-id>{}</session-id></error-info>",
                sid
            ));
        }
        out.push_str("</rpc-error>");
        out
    }
}

impl Display for NcError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            Some(msg) => write!(f, "{}: {}", self.tag(), msg),
            None => match self.path() {
                Some(path) => write!(f, "{} ({})", self.tag(), path),
                None => write!(f, "{}", self.tag()),
            },
        }
    }
}

impl std::error::Error for NcError {}

impl From<crate::xml::XmlError> for NcError {
    fn from(err: crate::xml::XmlError) -> Self {
        NcError::op_failed_app(format!("parsing the rpc content failed ({})", err))
    }
}

pub type NcResult<T> = Result<T, NcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_mapping() {
        assert_eq!(NcError::invalid_value("bad source").tag(), "invalid-value");
        assert_eq!(NcError::lock_denied(3, "busy").tag(), "lock-denied");
        assert_eq!(NcError::op_failed("no lock").tag(), "operation-failed");
        assert_eq!(NcError::access_denied("/m:x").tag(), "access-denied");
        assert_eq!(NcError::data_exists("/m:x").tag(), "data-exists");
        assert_eq!(NcError::data_missing("/m:x").tag(), "data-missing");
    }

    #[test]
    fn error_type_layers() {
        assert_eq!(NcError::invalid_value("x").error_type(), ErrorType::Protocol);
        assert_eq!(NcError::op_failed("x").error_type(), ErrorType::Protocol);
        assert_eq!(NcError::op_failed_app("x").error_type(), ErrorType::Application);
        assert_eq!(NcError::data_exists("/m:x").error_type(), ErrorType::Protocol);
    }

    #[test]
    fn lock_denied_carries_holder() {
        let e = NcError::lock_denied(17, "held by session 17");
        assert_eq!(e.session_id(), Some(17));
        let xml = e.to_xml();
        assert!(xml.contains("<error-tag>lock-denied</error-tag>"));
        assert!(xml.contains("<session-id>17</session-id>"));
    }

    #[test]
    fn path_is_escaped() {
        let e = NcError::data_exists("/m:list[k='a<b']");
        assert!(e.to_xml().contains("&lt;"));
    }
}
