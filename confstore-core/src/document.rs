use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Name of the root field that identifies a stored document.
pub const VERSION_FIELD: &str = "version";

/// A user configuration tree whose root is an object carrying a non-empty
/// string `version`.
///
/// The invariant is checked on construction and on deserialization, so a
/// `ConfigDocument` read back from any backend is always addressable by its
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct ConfigDocument(Value);

impl ConfigDocument {
    pub fn new(value: Value) -> Result<ConfigDocument> {
        let root = value
            .as_object()
            .ok_or_else(|| Error::malformed("document root must be a JSON object"))?;
        match root.get(VERSION_FIELD) {
            Some(Value::String(s)) if !s.is_empty() => Ok(ConfigDocument(value)),
            Some(Value::String(_)) => Err(Error::malformed("'version' must not be empty")),
            Some(other) => Err(Error::malformed(format!(
                "'version' must be a string, got {}",
                other
            ))),
            None => Err(Error::malformed("document has no 'version' field")),
        }
    }

    /// Set `version` on an object body, replacing whatever the caller sent.
    pub fn with_version(mut body: Value, version: &str) -> Result<ConfigDocument> {
        let root = body
            .as_object_mut()
            .ok_or_else(|| Error::malformed("document root must be a JSON object"))?;
        root.insert(VERSION_FIELD.to_string(), Value::String(version.to_string()));
        ConfigDocument::new(body)
    }

    /// Parse stored bytes back into a document.
    pub fn from_slice(bytes: &[u8]) -> Result<ConfigDocument> {
        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| Error::malformed(format!("stored document is not valid JSON: {}", e)))?;
        ConfigDocument::new(value)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0)
            .map_err(|e| Error::malformed(format!("could not serialize document: {}", e)))
    }

    pub fn version(&self) -> &str {
        // Checked in `new`
        self.0
            .get(VERSION_FIELD)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// The configuration payload: the document without its `version` key.
    pub fn content(&self) -> Value {
        let mut value = self.0.clone();
        if let Some(root) = value.as_object_mut() {
            root.remove(VERSION_FIELD);
        }
        value
    }
}

impl TryFrom<Value> for ConfigDocument {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        ConfigDocument::new(value)
    }
}

impl From<ConfigDocument> for Value {
    fn from(doc: ConfigDocument) -> Value {
        doc.0
    }
}

/// Identifier of the user owning a set of configuration versions.
///
/// Backends derive file and object names from it, so anything that could
/// escape a directory is rejected up front.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<UserId> {
        let id = id.into();
        if is_safe_name(&id) {
            Ok(UserId(id))
        } else {
            Err(Error::InvalidUserId(id))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        UserId::new(s)
    }
}

/// Whether `name` can be embedded in a single path component.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}
