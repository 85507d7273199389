//! Session message envelope.

use std::fmt;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::AppError;

/// Handler group a message is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageClass {
    /// Live fleet status subscription.
    Fsa,
    /// Engine-wide control and configuration files.
    Afd,
    /// Host-level actions.
    Alias,
    /// Log and query retrieval.
    Log,
    /// Any other class; logged and ignored.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for MessageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fsa => "fsa",
            Self::Afd => "afd",
            Self::Alias => "alias",
            Self::Log => "log",
            Self::Unknown => "unknown",
        })
    }
}

/// Inbound or outbound message.
///
/// `alias` accepts either a single string or a list on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Submitting user, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Handler group.
    pub class: MessageClass,
    /// Action within the class.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Sub-command of the action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// Log or editor context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Target host aliases.
    #[serde(
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub alias: Vec<String>,
    /// Free text payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Configuration file name for editor requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Query filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
}

impl SessionMessage {
    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` if the frame is not a valid envelope.
    pub fn parse(raw: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// `action`, or empty.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_deref().unwrap_or_default()
    }

    /// `command`, or empty.
    #[must_use]
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or_default()
    }

    /// `context`, or empty.
    #[must_use]
    pub fn context(&self) -> &str {
        self.context.as_deref().unwrap_or_default()
    }

    /// `filter` as an object; anything else is empty.
    #[must_use]
    pub fn filter_object(&self) -> Map<String, Value> {
        match &self.filter {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Copy of the request carrying `status`, as sent back when a host
    /// command fails.
    #[must_use]
    pub fn with_status(&self, status: u16) -> Value {
        let mut reply = self.to_object();
        reply.insert("status".into(), Value::from(status));
        Value::Object(reply)
    }

    /// Error reply mirroring the request's routing fields.
    #[must_use]
    pub fn error_reply(&self, err: &AppError) -> Value {
        let mut reply = Map::new();
        reply.insert("class".into(), Value::from(self.class.to_string()));
        for (key, value) in [
            ("action", &self.action),
            ("command", &self.command),
            ("context", &self.context),
        ] {
            if let Some(value) = value {
                reply.insert(key.into(), Value::from(value.as_str()));
            }
        }
        if !self.alias.is_empty() {
            reply.insert("alias".into(), Value::from(self.alias.clone()));
        }
        reply.insert("status".into(), Value::from(err.status()));
        reply.insert("message".into(), Value::from(err.to_string()));
        Value::Object(reply)
    }

    fn to_object(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}

/// Reply for a frame that could not be parsed at all.
#[must_use]
pub fn parse_error_reply(err: &AppError) -> Value {
    serde_json::json!({
        "status": err.status(),
        "message": err.to_string(),
    })
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    struct OneOrMany;

    impl<'de> Visitor<'de> for OneOrMany {
        type Value = Vec<String>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("an alias or a list of aliases")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<String>, E> {
            Ok(vec![v.to_owned()])
        }

        fn visit_unit<E: de::Error>(self) -> Result<Vec<String>, E> {
            Ok(Vec::new())
        }

        fn visit_none<E: de::Error>(self) -> Result<Vec<String>, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<String>, A::Error> {
            let mut aliases = Vec::new();
            while let Some(alias) = seq.next_element::<Option<String>>()? {
                aliases.extend(alias);
            }
            Ok(aliases)
        }
    }

    deserializer.deserialize_any(OneOrMany)
}
