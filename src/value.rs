//!
//! netconfd typed values
//! ---------------------
//! Values exchanged with the datastore backend carry a type discriminator
//! and render to the canonical NETCONF string form: string-like kinds
//! verbatim, booleans as literals, decimal64 with exactly the schema's
//! fraction-digits, integers in plain decimal.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::schema::{LeafType, SchemaRegistry};

/// A typed datastore value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum TypedValue {
    String(String),
    Binary(String),
    Bits(String),
    Enum(String),
    Identityref(String),
    InstanceId(String),
    Leafref(String),
    Empty,
    Bool(bool),
    Decimal64(f64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    /// Interior container node; carries no value of its own.
    Container,
    /// List instance node; keys live in the path predicates.
    ListInstance,
}

/// A value returned by the backend, keyed by its fully qualified XPath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsValue {
    pub xpath: String,
    pub value: TypedValue,
}

impl DsValue {
    pub fn new<S: Into<String>>(xpath: S, value: TypedValue) -> Self {
        Self { xpath: xpath.into(), value }
    }
}

impl TypedValue {
    /// Render to the canonical string. String-like kinds borrow their own
    /// storage; numeric kinds format into `buf`. `Empty` (and a decimal64
    /// whose schema node cannot be resolved) renders to `None`.
    pub fn render<'a>(
        &'a self,
        registry: &SchemaRegistry,
        xpath: &str,
        buf: &'a mut String,
    ) -> Option<&'a str> {
        buf.clear();
        match self {
            TypedValue::String(s)
            | TypedValue::Binary(s)
            | TypedValue::Bits(s)
            | TypedValue::Enum(s)
            | TypedValue::Identityref(s)
            | TypedValue::InstanceId(s)
            | TypedValue::Leafref(s) => Some(s.as_str()),
            TypedValue::Empty => None,
            TypedValue::Bool(b) => Some(if *b { "true" } else { "false" }),
            TypedValue::Decimal64(v) => {
                let (_, node) = registry.node_by_data_path(xpath)?;
                match node.leaf_type() {
                    Some(LeafType::Decimal64 { fraction_digits }) => {
                        let _ = write!(buf, "{:.*}", fraction_digits as usize, v);
                        Some(buf.as_str())
                    }
                    _ => None,
                }
            }
            TypedValue::Int8(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Int16(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Int32(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Int64(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Uint8(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Uint16(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Uint32(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Uint64(v) => {
                let _ = write!(buf, "{}", v);
                Some(buf.as_str())
            }
            TypedValue::Container | TypedValue::ListInstance => None,
        }
    }

    /// Parse a canonical string into a value of the given schema type.
    /// Used by edit-config to coerce leaf text before a set call.
    pub fn parse(ty: LeafType, text: &str) -> Result<TypedValue, String> {
        let bad = |what: &str| format!("invalid {} value '{}'", what, text);
        Ok(match ty {
            LeafType::String => TypedValue::String(text.to_string()),
            LeafType::Binary => TypedValue::Binary(text.to_string()),
            LeafType::Bits => TypedValue::Bits(text.to_string()),
            LeafType::Enumeration => TypedValue::Enum(text.to_string()),
            LeafType::Identityref => TypedValue::Identityref(text.to_string()),
            LeafType::InstanceId => TypedValue::InstanceId(text.to_string()),
            LeafType::Leafref => TypedValue::Leafref(text.to_string()),
            LeafType::Empty => {
                if !text.is_empty() {
                    return Err(bad("empty"));
                }
                TypedValue::Empty
            }
            LeafType::Boolean => match text {
                "true" => TypedValue::Bool(true),
                "false" => TypedValue::Bool(false),
                _ => return Err(bad("boolean")),
            },
            LeafType::Decimal64 { .. } => {
                TypedValue::Decimal64(text.parse().map_err(|_| bad("decimal64"))?)
            }
            LeafType::Int8 => TypedValue::Int8(text.parse().map_err(|_| bad("int8"))?),
            LeafType::Int16 => TypedValue::Int16(text.parse().map_err(|_| bad("int16"))?),
            LeafType::Int32 => TypedValue::Int32(text.parse().map_err(|_| bad("int32"))?),
            LeafType::Int64 => TypedValue::Int64(text.parse().map_err(|_| bad("int64"))?),
            LeafType::Uint8 => TypedValue::Uint8(text.parse().map_err(|_| bad("uint8"))?),
            LeafType::Uint16 => TypedValue::Uint16(text.parse().map_err(|_| bad("uint16"))?),
            LeafType::Uint32 => TypedValue::Uint32(text.parse().map_err(|_| bad("uint32"))?),
            LeafType::Uint64 => TypedValue::Uint64(text.parse().map_err(|_| bad("uint64"))?),
        })
    }
}
