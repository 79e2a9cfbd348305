// ai
//! 📡 Bulk actions — one write, two lines, zero ambiguity. Mostly.
//!
//! 🎬 COLD OPEN — INT. ELASTICSEARCH CLUSTER — BULK ENDPOINT — HIGH NOON
//!
//! The bulk API has rules.
//! Rule 1: An action line `{"<op>":{...metadata...}}`, then a source line if the op needs one.
//! Rule 2: `delete` never gets a source line. Not an empty one. Not a `{}`. None.
//! Rule 3: Every line ends in `\n`, including the last. Three engineers lost weekends to this.
//!
//! 🧠 Knowledge graph:
//! - `OpType`: index / create / update / delete.
//! - `ActionMetadata`: the explicit metadata struct. Serialized in field order, so
//!   `_index`, `_type`, `_id` always lead. Unknown keys ride along in `extra`.
//! - `ActionKind`: the tagged union. `Delete` has no payload slot, so a delete
//!   carrying a source cannot be constructed.
//! - `Payload`: `Document`, `Script`, or `Raw` pre-encoded JSON. 🦆

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

use super::document::{Document, Script};
use crate::error::{ClientError, Result};

/// 🏷️ What the action does to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Index,
    Create,
    Update,
    Delete,
}

impl OpType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpType::Index => "index",
            OpType::Create => "create",
            OpType::Update => "update",
            OpType::Delete => "delete",
        }
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OpType {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(OpType::Index),
            "create" => Ok(OpType::Create),
            "update" => Ok(OpType::Update),
            "delete" => Ok(OpType::Delete),
            other => Err(ClientError::InvalidAction(format!(
                "'{other}' is not a bulk operation (expected index, create, update or delete)"
            ))),
        }
    }
}

/// 🏷️ The metadata object on an action line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionMetadata {
    #[serde(rename = "_index", default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(
        rename = "_id",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<String>,
    #[serde(
        rename = "_parent",
        alias = "parent",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<String>,
    #[serde(
        rename = "_routing",
        alias = "routing",
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub routing: Option<String>,
    #[serde(
        rename = "_version",
        alias = "version",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version: Option<u64>,
    #[serde(
        rename = "_version_type",
        alias = "version_type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub version_type: Option<String>,
    #[serde(
        rename = "_retry_on_conflict",
        alias = "retry_on_conflict",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub retry_on_conflict: Option<u32>,
    /// 🎒 Anything else. Passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// 🔢 ids show up as numbers in hand-written bulk files. we accept both, we store strings.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected a string or number, got {other}"
        ))),
    }
}

/// 📦 What an action can carry as its source line.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Document(Document),
    Script(Script),
    /// Pre-encoded JSON, sent as-is (re-encoded compactly only if it spans lines).
    Raw(String),
}

impl From<Document> for Payload {
    fn from(document: Document) -> Self {
        Payload::Document(document)
    }
}

impl From<Script> for Payload {
    fn from(script: Script) -> Self {
        Payload::Script(script)
    }
}

impl From<Value> for Payload {
    fn from(data: Value) -> Self {
        Payload::Document(Document::new(data))
    }
}

/// 🎭 The op type, with a payload slot only where the protocol allows one.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    Index(Option<Payload>),
    Create(Option<Payload>),
    Update(Option<Payload>),
    Delete,
}

/// 📡 One write operation inside a bulk batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    kind: ActionKind,
    metadata: ActionMetadata,
}

impl Action {
    /// 🏗️ Any op type with its payload. Delete takes none, everything else needs one.
    pub fn new(op_type: OpType, payload: Option<Payload>) -> Result<Self> {
        match (op_type, &payload) {
            (OpType::Delete, Some(_)) => Err(ClientError::InvalidAction(
                "a delete action never carries a source".to_string(),
            )),
            (OpType::Index | OpType::Create | OpType::Update, None) => {
                Err(ClientError::InvalidAction(format!(
                    "a {op_type} action needs a source, otherwise the next action line becomes its source"
                )))
            }
            _ => Ok(Self::from_parts(op_type, payload)),
        }
    }

    fn from_parts(op_type: OpType, payload: Option<Payload>) -> Self {
        let metadata = match &payload {
            Some(Payload::Document(document)) => document.metadata(),
            Some(Payload::Script(script)) => script.metadata(),
            Some(Payload::Raw(_)) | None => ActionMetadata::default(),
        };
        let kind = match op_type {
            OpType::Index => ActionKind::Index(payload),
            OpType::Create => ActionKind::Create(payload),
            OpType::Update => ActionKind::Update(payload),
            OpType::Delete => ActionKind::Delete,
        };
        Self { kind, metadata }
    }

    pub fn index(payload: impl Into<Payload>) -> Self {
        Self::from_parts(OpType::Index, Some(payload.into()))
    }

    pub fn create(payload: impl Into<Payload>) -> Self {
        Self::from_parts(OpType::Create, Some(payload.into()))
    }

    pub fn update(payload: impl Into<Payload>) -> Self {
        Self::from_parts(OpType::Update, Some(payload.into()))
    }

    pub fn delete() -> Self {
        Self::from_parts(OpType::Delete, None)
    }

    /// 📜 Scripted update. Metadata comes from the script.
    pub fn update_script(script: Script) -> Self {
        Self::from_parts(OpType::Update, Some(Payload::Script(script)))
    }

    /// 📄 Any op type for a document, metadata lifted from the document.
    /// For `Delete` only the metadata survives; the body stays home.
    pub fn from_document(op_type: OpType, document: Document) -> Self {
        match op_type {
            OpType::Delete => Self {
                kind: ActionKind::Delete,
                metadata: document.metadata(),
            },
            _ => Self::from_parts(op_type, Some(Payload::Document(document))),
        }
    }

    /// 🧾 Explicit metadata plus an optional pre-encoded source line.
    pub fn raw(op_type: OpType, metadata: ActionMetadata, source: Option<String>) -> Result<Self> {
        let mut action = Self::new(op_type, source.map(Payload::Raw))?;
        action.metadata = metadata;
        Ok(action)
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.metadata.index = Some(index.into());
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.metadata.type_name = Some(type_name.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = Some(id.into());
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.metadata.routing = Some(routing.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.metadata.parent = Some(parent.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.metadata.version = Some(version);
        self
    }

    pub fn with_retry_on_conflict(mut self, retries: u32) -> Self {
        self.metadata.retry_on_conflict = Some(retries);
        self
    }

    /// 🎒 Any metadata key the struct doesn't name.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.extra.insert(key.into(), value);
        self
    }

    pub fn op_type(&self) -> OpType {
        match self.kind {
            ActionKind::Index(_) => OpType::Index,
            ActionKind::Create(_) => OpType::Create,
            ActionKind::Update(_) => OpType::Update,
            ActionKind::Delete => OpType::Delete,
        }
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn metadata(&self) -> &ActionMetadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut ActionMetadata {
        &mut self.metadata
    }

    pub fn payload(&self) -> Option<&Payload> {
        match &self.kind {
            ActionKind::Index(payload) | ActionKind::Create(payload) | ActionKind::Update(payload) => {
                payload.as_ref()
            }
            ActionKind::Delete => None,
        }
    }

    fn payload_mut(&mut self) -> Option<&mut Payload> {
        match &mut self.kind {
            ActionKind::Index(payload) | ActionKind::Create(payload) | ActionKind::Update(payload) => {
                payload.as_mut()
            }
            ActionKind::Delete => None,
        }
    }

    /// 📄 The document this action carries, if it carries one.
    pub fn document(&self) -> Option<&Document> {
        match self.payload() {
            Some(Payload::Document(document)) => Some(document),
            _ => None,
        }
    }

    pub fn document_mut(&mut self) -> Option<&mut Document> {
        match self.payload_mut() {
            Some(Payload::Document(document)) => Some(document),
            _ => None,
        }
    }

    /// 📦 The encoded source line (no trailing newline), or `None` when the op has none.
    pub fn source_line(&self) -> Result<Option<String>> {
        let payload = match &self.kind {
            ActionKind::Delete => return Ok(None),
            ActionKind::Index(payload) | ActionKind::Create(payload) | ActionKind::Update(payload) => {
                payload
            }
        };
        let Some(payload) = payload else {
            return Err(ClientError::InvalidAction(format!(
                "{} action has no source line",
                self.op_type()
            )));
        };

        let is_update = self.op_type() == OpType::Update;
        let line = match payload {
            Payload::Document(document) if is_update => serde_json::to_string(&document.update_body())?,
            Payload::Document(document) => serde_json::to_string(&document.data)?,
            Payload::Script(script) if is_update => serde_json::to_string(&script.update_body())?,
            Payload::Script(_) => {
                return Err(ClientError::InvalidAction(format!(
                    "a script can only drive an update, not a {}",
                    self.op_type()
                )));
            }
            Payload::Raw(raw) => compact_raw(raw)?,
        };
        Ok(Some(line))
    }

    /// 🏷️ `{"<op>":{...}}` for the given metadata.
    pub(crate) fn action_line_with(&self, metadata: &ActionMetadata) -> Result<String> {
        let envelope = BTreeMap::from([(self.op_type().as_str(), metadata)]);
        Ok(serde_json::to_string(&envelope)?)
    }

    /// 📡 Both wire lines for this action alone, each newline-terminated.
    pub fn to_wire_lines(&self) -> Result<String> {
        let mut out = String::new();
        self.write_wire_lines(&self.metadata, &mut out)?;
        Ok(out)
    }

    pub(crate) fn write_wire_lines(&self, metadata: &ActionMetadata, out: &mut String) -> Result<()> {
        out.push_str(&self.action_line_with(metadata)?);
        out.push('\n');
        if let Some(source) = self.source_line()? {
            out.push_str(&source);
            out.push('\n');
        }
        Ok(())
    }
}

// 🧹 raw source must be one JSON value on one line. single-line input is vetted
// without a full parse; multi-line input gets re-encoded compactly.
fn compact_raw(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.contains(['\n', '\r']) {
        let value: Value = serde_json::from_str(trimmed)?;
        return Ok(serde_json::to_string(&value)?);
    }
    let _: &RawValue = serde_json::from_str(trimmed)?;
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn the_one_where_metadata_always_leads_with_index_type_id() -> anyhow::Result<()> {
        let action = Action::index(json!({"a": 1}))
            .with_id("1")
            .with_routing("r")
            .with_type("t")
            .with_index("idx");
        assert_eq!(
            action.to_wire_lines()?,
            "{\"index\":{\"_index\":\"idx\",\"_type\":\"t\",\"_id\":\"1\",\"_routing\":\"r\"}}\n{\"a\":1}\n"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_delete_travels_light() -> anyhow::Result<()> {
        let action = Action::delete().with_id("2");
        assert_eq!(action.to_wire_lines()?, "{\"delete\":{\"_id\":\"2\"}}\n");
        assert!(Action::new(OpType::Delete, Some(json!({}).into())).is_err());
        Ok(())
    }

    #[test]
    fn the_one_where_deleting_a_document_keeps_only_its_paperwork() -> anyhow::Result<()> {
        let doc = Document::new(json!({"big": "body"})).with_id("9").with_index("idx");
        let action = Action::from_document(OpType::Delete, doc);
        assert_eq!(action.op_type(), OpType::Delete);
        assert!(action.payload().is_none());
        assert_eq!(action.to_wire_lines()?, "{\"delete\":{\"_index\":\"idx\",\"_id\":\"9\"}}\n");
        Ok(())
    }

    #[test]
    fn the_one_where_updates_wrap_documents_and_scripts() -> anyhow::Result<()> {
        let partial = Action::update(Document::new(json!({"n": 1})).with_id("1"));
        assert_eq!(partial.source_line()?.as_deref(), Some("{\"doc\":{\"n\":1}}"));

        let scripted = Action::update_script(Script::new("ctx._source.n++").with_id("2"));
        assert_eq!(scripted.metadata().id.as_deref(), Some("2"));
        assert_eq!(scripted.source_line()?.as_deref(), Some("{\"script\":\"ctx._source.n++\"}"));
        Ok(())
    }

    #[test]
    fn the_one_where_an_index_without_a_body_is_turned_away() {
        for op in [OpType::Index, OpType::Create, OpType::Update] {
            assert!(matches!(Action::new(op, None), Err(ClientError::InvalidAction(_))));
            assert!(matches!(
                Action::raw(op, ActionMetadata::default(), None),
                Err(ClientError::InvalidAction(_))
            ));
        }
        assert!(Action::new(OpType::Delete, None).is_ok());
    }

    #[test]
    fn the_one_where_a_script_cannot_index() {
        let action = Action::index(Script::new("nope"));
        assert!(matches!(action.source_line(), Err(ClientError::InvalidAction(_))));
    }

    #[test]
    fn the_one_where_raw_sources_are_squashed_onto_one_line() -> anyhow::Result<()> {
        let pretty = Action::raw(
            OpType::Index,
            ActionMetadata::default(),
            Some("{\n  \"a\": 1,\n  \"s\": \"x\"\n}".to_string()),
        )?;
        assert_eq!(pretty.source_line()?.as_deref(), Some("{\"a\":1,\"s\":\"x\"}"));

        let tidy = Action::raw(OpType::Create, ActionMetadata::default(), Some(" {\"b\": 2} ".to_string()))?;
        assert_eq!(tidy.source_line()?.as_deref(), Some("{\"b\": 2}"));

        let broken = Action::raw(OpType::Index, ActionMetadata::default(), Some("{nope".to_string()))?;
        assert!(matches!(broken.source_line(), Err(ClientError::Serialization(_))));
        Ok(())
    }

    #[test]
    fn the_one_where_numeric_ids_and_modern_keys_are_understood() -> anyhow::Result<()> {
        let metadata: ActionMetadata = serde_json::from_value(json!({
            "_index": "idx",
            "_id": 42,
            "routing": "r1",
            "retry_on_conflict": 3,
            "pipeline": "p"
        }))?;
        assert_eq!(metadata.id.as_deref(), Some("42"));
        assert_eq!(metadata.routing.as_deref(), Some("r1"));
        assert_eq!(metadata.retry_on_conflict, Some(3));
        assert_eq!(metadata.extra.get("pipeline"), Some(&json!("p")));
        Ok(())
    }

    #[test]
    fn the_one_where_op_types_round_the_bases() -> anyhow::Result<()> {
        for op in [OpType::Index, OpType::Create, OpType::Update, OpType::Delete] {
            assert_eq!(op.as_str().parse::<OpType>()?, op);
        }
        assert!("upsert".parse::<OpType>().is_err());
        Ok(())
    }
}
