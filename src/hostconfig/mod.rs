//! HOST_CONFIG record codec and store.
//!
//! The engine keeps one colon-delimited line per host. Most columns are
//! plain text; a few pack yes/no flags and enums into the bits of a 32-bit
//! unsigned word, and one column holds the host-switch cell.

pub mod codec;
pub mod fields;
pub mod protocol;
pub mod store;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

pub use codec::{decode_line, encode_line, parse_document, render_document, ToggleGroup};
pub use fields::{BitSpec, FieldSpec, Schema, SchemaEntry, HOST_CONFIG_FIELDS};
pub use protocol::ProtocolIndex;
pub use store::{HostConfigStore, HostSelector, SavePayload};

/// Value of a single decoded field.
///
/// Columns that parse as an integer decode to [`FieldValue::Int`]; all
/// others, including every flag, decode to [`FieldValue::Text`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Integer column value.
    Int(i64),
    /// Text column value or flag state.
    Text(String),
}

impl FieldValue {
    /// Interpret raw column text: integers stay integers, anything else is text.
    #[must_use]
    pub fn from_column(raw: &str) -> Self {
        raw.parse::<i64>()
            .map_or_else(|_| Self::Text(raw.to_owned()), Self::Int)
    }

    /// Textual form as written to the store.
    #[must_use]
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Self::Int(value) => Cow::Owned(value.to_string()),
            Self::Text(value) => Cow::Borrowed(value),
        }
    }

    /// Whether the textual form equals `expected`.
    #[must_use]
    pub fn is(&self, expected: &str) -> bool {
        self.as_text() == expected
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldValueVisitor;

        impl Visitor<'_> for FieldValueVisitor {
            type Value = FieldValue;

            fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str("a string, integer or boolean field value")
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<FieldValue, E> {
                Ok(FieldValue::from(if v { "yes" } else { "no" }))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<FieldValue, E> {
                Ok(FieldValue::Int(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<FieldValue, E> {
                Ok(i64::try_from(v).map_or_else(|_| FieldValue::Text(v.to_string()), FieldValue::Int))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<FieldValue, E> {
                Ok(FieldValue::from(v))
            }

            fn visit_string<E: de::Error>(self, v: String) -> Result<FieldValue, E> {
                Ok(FieldValue::Text(v))
            }

            fn visit_unit<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::from(""))
            }

            fn visit_none<E: de::Error>(self) -> Result<FieldValue, E> {
                Ok(FieldValue::from(""))
            }
        }

        deserializer.deserialize_any(FieldValueVisitor)
    }
}

/// Decoded field map of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    /// CSS scheme classes derived from live status; never persisted.
    #[serde(
        rename = "protocol-class",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub protocol_class: String,
    /// Field name to value.
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl HostRecord {
    /// Value of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Textual value of `name`, if present.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<Cow<'_, str>> {
        self.fields.get(name).map(FieldValue::as_text)
    }

    /// Set `name` to `value`.
    pub fn set(&mut self, name: &str, value: impl Into<FieldValue>) {
        self.fields.insert(name.to_owned(), value.into());
    }
}

/// Fully materialised HOST_CONFIG.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostConfig {
    /// Comment block preceding the first record, verbatim.
    pub header: String,
    /// Aliases in display and persistence order.
    pub order: Vec<String>,
    /// Record per alias.
    pub data: BTreeMap<String, HostRecord>,
}
