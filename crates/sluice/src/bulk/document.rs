//! 📄 Documents and scripts — the two things an action can carry besides raw bytes.
//!
//! A `Document` is a JSON body plus the metadata the cluster files it under
//! (`_index`, `_type`, `_id`, routing, version...). A `Script` is an update
//! expressed as code instead of a partial document.
//!
//! `auto_populate` is the interesting flag: when set and the document has no id,
//! a successful bulk writes the server-assigned `_id`/`_version` back onto the
//! document the batch holds. Like getting your name tag filled in at the door.

use serde_json::{Map, Value};

use super::action::ActionMetadata;

/// 📄 A JSON document plus where it lives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub id: Option<String>,
    pub index: Option<String>,
    pub type_name: Option<String>,
    pub data: Value,
    pub version: Option<u64>,
    pub version_type: Option<String>,
    pub routing: Option<String>,
    pub parent: Option<String>,
    /// 🪞 Accept the server's `_id`/`_version` after a successful bulk, if we have no id yet.
    pub auto_populate: bool,
    /// 🔁 On update: create the document from `data` if it doesn't exist.
    pub doc_as_upsert: bool,
    /// 🔁 On update: create the document from this body if it doesn't exist.
    pub upsert: Option<Value>,
}

impl Document {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn with_routing(mut self, routing: impl Into<String>) -> Self {
        self.routing = Some(routing.into());
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_auto_populate(mut self, auto_populate: bool) -> Self {
        self.auto_populate = auto_populate;
        self
    }

    pub fn with_doc_as_upsert(mut self, doc_as_upsert: bool) -> Self {
        self.doc_as_upsert = doc_as_upsert;
        self
    }

    pub fn with_upsert(mut self, upsert: Value) -> Self {
        self.upsert = Some(upsert);
        self
    }

    pub fn has_id(&self) -> bool {
        self.id.as_deref().is_some_and(|id| !id.is_empty())
    }

    /// 🏷️ The action metadata this document implies.
    pub(crate) fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            index: self.index.clone(),
            type_name: self.type_name.clone(),
            id: self.id.clone().filter(|id| !id.is_empty()),
            parent: self.parent.clone(),
            routing: self.routing.clone(),
            version: self.version,
            version_type: self.version_type.clone(),
            ..ActionMetadata::default()
        }
    }

    /// 🔁 `{"doc": data}` plus the upsert knobs, for partial updates.
    pub(crate) fn update_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("doc".to_string(), self.data.clone());
        if self.doc_as_upsert {
            body.insert("doc_as_upsert".to_string(), Value::Bool(true));
        }
        if let Some(upsert) = &self.upsert {
            body.insert("upsert".to_string(), upsert.clone());
        }
        Value::Object(body)
    }
}

impl From<Value> for Document {
    fn from(data: Value) -> Self {
        Document::new(data)
    }
}

/// 📜 An update driven by a script instead of a partial document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub script: String,
    pub lang: Option<String>,
    pub params: Map<String, Value>,
    pub upsert: Option<Value>,
    pub id: Option<String>,
    pub index: Option<String>,
    pub type_name: Option<String>,
    pub routing: Option<String>,
    pub parent: Option<String>,
}

impl Script {
    pub fn new(script: impl Into<String>) -> Self {
        Self {
            script: script.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    pub fn with_upsert(mut self, upsert: Value) -> Self {
        self.upsert = Some(upsert);
        self
    }

    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub(crate) fn metadata(&self) -> ActionMetadata {
        ActionMetadata {
            index: self.index.clone(),
            type_name: self.type_name.clone(),
            id: self.id.clone(),
            parent: self.parent.clone(),
            routing: self.routing.clone(),
            ..ActionMetadata::default()
        }
    }

    /// 📜 `{"script": ..., "lang"?, "params"?, "upsert"?}`.
    pub(crate) fn update_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("script".to_string(), Value::String(self.script.clone()));
        if let Some(lang) = &self.lang {
            body.insert("lang".to_string(), Value::String(lang.clone()));
        }
        if !self.params.is_empty() {
            body.insert("params".to_string(), Value::Object(self.params.clone()));
        }
        if let Some(upsert) = &self.upsert {
            body.insert("upsert".to_string(), upsert.clone());
        }
        Value::Object(body)
    }
}
