//! rpc replies
//! -----------
//! The three NETCONF reply shapes the executors produce: `<ok/>`, a data
//! reply carrying the `output/data` payload, or one or more structured
//! errors.

use serde::Serialize;

use crate::error::NcError;
use crate::NETCONF_BASE_NS;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "reply", rename_all = "kebab-case")]
pub enum Reply {
    Ok,
    /// XML payload of the `<data>` element (may be empty).
    Data { data: String },
    Error { errors: Vec<NcError> },
}

impl Reply {
    pub fn ok() -> Reply {
        Reply::Ok
    }

    pub fn data<S: Into<String>>(data: S) -> Reply {
        Reply::Data { data: data.into() }
    }

    pub fn error(err: NcError) -> Reply {
        Reply::Error { errors: vec![err] }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok)
    }

    pub fn errors(&self) -> &[NcError] {
        match self {
            Reply::Error { errors } => errors,
            _ => &[],
        }
    }

    /// First error, for the common single-error assertions.
    pub fn first_error(&self) -> Option<&NcError> {
        self.errors().first()
    }

    /// Render the full `<rpc-reply>` envelope.
    pub fn to_xml(&self) -> String {
        let mut out = format!("<rpc-reply xmlns=\"{}\">", NETCONF_BASE_NS);
        match self {
            Reply::Ok => out.push_str("<ok/>"),
            Reply::Data { data } => {
                if data.is_empty() {
                    out.push_str("<data/>");
                } else {
                    out.push_str("<data>");
                    out.push_str(data);
                    out.push_str("</data>");
                }
            }
            Reply::Error { errors } => {
                for e in errors {
                    out.push_str(&e.to_xml());
                }
            }
        }
        out.push_str("</rpc-reply>");
        out
    }
}
