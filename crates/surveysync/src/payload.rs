//! Survey payloads.
//!
//! A [`SurveyPayload`] is the assembled survey response: a flat mapping from
//! field name to a string or number. Map annotations arrive as already
//! serialized JSON strings. Once serialized into a [`SerializedPayload`] the
//! rest of the pipeline treats it as an opaque body.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A single answer in a survey payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// A numeric answer (Likert scores, picture responses).
    Number(serde_json::Number),
    /// A textual answer, or an annotation serialized to a JSON string.
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

/// One fully assembled survey response, ready for serialization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SurveyPayload {
    fields: BTreeMap<String, FieldValue>,
}

impl SurveyPayload {
    /// Create an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse form answers from a JSON object of strings and numbers.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if the text is not such an object.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw)
            .map_err(|e| Error::parse(format!("expected an object of text or numeric answers: {e}")))
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style variant of [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Store an annotation as a JSON string field.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if the annotation cannot be serialized.
    pub fn insert_annotation<T: Serialize + ?Sized>(
        &mut self,
        name: impl Into<String>,
        annotation: &T,
    ) -> Result<()> {
        let encoded = serde_json::to_string(annotation)
            .map_err(|e| Error::parse(format!("annotation is not serializable: {e}")))?;
        self.fields.insert(name.into(), FieldValue::Text(encoded));
        Ok(())
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the payload has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Serialize into the opaque form the pipeline stores and transmits.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if the payload cannot be encoded.
    pub fn serialize(&self) -> Result<SerializedPayload> {
        let body = serde_json::to_string(&self.fields)
            .map_err(|e| Error::parse(format!("payload is not serializable: {e}")))?;
        Ok(SerializedPayload(body))
    }
}

/// An already-serialized survey payload.
///
/// Always a JSON object in compact form. The queue and the endpoint never
/// look inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerializedPayload(String);

impl SerializedPayload {
    /// Validate raw JSON text and normalize it to compact form.
    ///
    /// # Errors
    ///
    /// Returns a parse failure if the text is not a JSON object.
    pub fn from_json(raw: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| Error::parse(format!("not valid JSON: {e}")))?;
        let serde_json::Value::Object(map) = value else {
            return Err(Error::parse("expected a JSON object of survey fields"));
        };
        let body = serde_json::to_string(&map)?;
        Ok(Self(body))
    }

    /// Wrap text read back from the local store, which was validated on the
    /// way in.
    pub(crate) fn from_stored(body: String) -> Self {
        Self(body)
    }

    /// The serialized body.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Compute the BLAKE3 digest of the body.
    #[must_use]
    pub fn digest(&self) -> String {
        blake3::hash(self.0.as_bytes()).to_hex().to_string()
    }

    /// Length of the body in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the body is empty (never true for validated payloads).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for SerializedPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
