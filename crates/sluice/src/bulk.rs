// ai
//! 📦 BulkBatch — many writes, one request, one outcome per write.
//!
//! 🎬 *[a batch of actions boards the wire. the server sends back a list.
//! nobody wrote names on anything. we match them up by seat number.]*
//!
//! 🧠 Knowledge graph:
//! - Encode: every action becomes an action line (`{"<op>":{metadata}}`) plus a
//!   source line when the op has one. Batch defaults (`_index`, `_type`, the
//!   client's `retry_on_conflict`) are applied at encode time, so actions stay
//!   exactly as the caller built them.
//! - Send: `PUT [index/][type/]_bulk` through the client's failover loop.
//! - Decode: the response `items` array is paired with the actions **by position**.
//!   There is no correlation id. Count mismatch → `Protocol`, before anything is
//!   touched. Some items failed → `BulkFailure` carrying the whole outcome set.
//! - Auto-populate: id-less documents that asked for it (or whose client asked
//!   for it) get the server-assigned `_id`/`_version` written back onto the
//!   document held by the batch's own action.
//! - UDP: see [`udp`]. Different error model, on purpose.

use memchr::memchr;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::client::Client;
use crate::error::{ClientError, Result};
use crate::transports::{Method, Response};

pub mod action;
pub mod document;
pub mod outcome;
pub mod udp;

pub use action::{Action, ActionKind, ActionMetadata, OpType, Payload};
pub use document::{Document, Script};
pub use outcome::{BulkOutcome, BulkOutcomeSet};

/// 📦 An ordered batch of actions bound to a client.
#[derive(Debug, Clone)]
pub struct BulkBatch {
    client: Client,
    index: Option<String>,
    type_name: Option<String>,
    actions: Vec<Action>,
    request_params: Vec<(String, String)>,
}

impl BulkBatch {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            index: None,
            type_name: None,
            actions: Vec::new(),
            request_params: Vec::new(),
        }
    }

    /// 🏷️ Default `_index` for actions that don't name one. Also goes in the path.
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    /// 🏷️ Default `_type` for actions that don't name one.
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn add_action(&mut self, action: Action) -> &mut Self {
        self.actions.push(action);
        self
    }

    pub fn add_actions(&mut self, actions: impl IntoIterator<Item = Action>) -> &mut Self {
        self.actions.extend(actions);
        self
    }

    pub fn add_document(&mut self, op_type: OpType, document: Document) -> &mut Self {
        self.add_action(Action::from_document(op_type, document))
    }

    pub fn add_documents(
        &mut self,
        op_type: OpType,
        documents: impl IntoIterator<Item = Document>,
    ) -> &mut Self {
        self.add_actions(
            documents
                .into_iter()
                .map(|document| Action::from_document(op_type, document)),
        )
    }

    pub fn add_script(&mut self, script: Script) -> &mut Self {
        self.add_action(Action::update_script(script))
    }

    /// 🧾 Already-decoded bulk lines: an action object, then its source object unless it's a delete.
    pub fn add_raw_data(&mut self, data: Vec<Value>) -> Result<&mut Self> {
        let mut parsed = Vec::new();
        let mut values = data.into_iter();
        while let Some(action_value) = values.next() {
            let (op_type, metadata) = action_from_value(action_value)?;
            let source = if op_type == OpType::Delete {
                None
            } else {
                let source = values.next().ok_or_else(|| {
                    ClientError::InvalidAction(format!("{op_type} action is missing its source"))
                })?;
                Some(serde_json::to_string(&source)?)
            };
            parsed.push(Action::raw(op_type, metadata, source)?);
        }
        Ok(self.add_actions(parsed))
    }

    /// 🧾 A chunk of NDJSON in bulk format. Blank lines are ignored.
    pub fn add_raw_ndjson(&mut self, ndjson: &str) -> Result<&mut Self> {
        let parsed = parse_ndjson(ndjson)?;
        Ok(self.add_actions(parsed))
    }

    /// 🔧 Any query parameter for the bulk request. Setting a key twice replaces it.
    pub fn set_request_param(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let key = key.into();
        self.request_params.retain(|(existing, _)| *existing != key);
        self.request_params.push((key, value.into()));
        self
    }

    pub fn set_refresh(&mut self, refresh: bool) -> &mut Self {
        self.set_request_param("refresh", refresh.to_string())
    }

    /// ⏱️ Server-side wait for the shards, e.g. `"1m"`.
    pub fn set_shard_timeout(&mut self, timeout: impl Into<String>) -> &mut Self {
        self.set_request_param("timeout", timeout)
    }

    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub fn request_params(&self) -> &[(String, String)] {
        &self.request_params
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// 🧭 `[index/][type/]_bulk`. A type without an index stays out of the path.
    pub fn path(&self) -> String {
        let mut path = String::new();
        if let Some(index) = &self.index {
            path.push_str(index);
            path.push('/');
            if let Some(type_name) = &self.type_name {
                path.push_str(type_name);
                path.push('/');
            }
        }
        path.push_str("_bulk");
        path
    }

    /// 📡 The NDJSON body, every line newline-terminated.
    pub fn to_wire_format(&self) -> Result<String> {
        let retry_on_conflict = self.client.config().retry_on_conflict;
        let mut out = String::with_capacity(self.actions.len() * 64);
        for action in &self.actions {
            let mut metadata = action.metadata().clone();
            if metadata.index.is_none() {
                metadata.index.clone_from(&self.index);
            }
            if metadata.type_name.is_none() {
                metadata.type_name.clone_from(&self.type_name);
            }
            if action.op_type() == OpType::Update
                && metadata.retry_on_conflict.is_none()
                && retry_on_conflict > 0
            {
                metadata.retry_on_conflict = Some(retry_on_conflict);
            }
            action.write_wire_lines(&metadata, &mut out)?;
        }
        Ok(out)
    }

    /// 🚀 Send the batch and correlate the answer.
    ///
    /// `Ok` only when every action succeeded. Partial failure is
    /// `Err(ClientError::BulkFailure)` with the full outcome set inside; the items
    /// that succeeded are written regardless. The batch itself is kept (with any
    /// auto-populated ids) and can be inspected or sent again.
    pub async fn send(&mut self) -> Result<BulkOutcomeSet> {
        if self.actions.is_empty() {
            return Err(ClientError::InvalidAction(
                "refusing to send an empty bulk batch".to_string(),
            ));
        }
        let body = self.to_wire_format()?;
        let path = self.path();
        debug!(
            "📦 Sending bulk of {} action(s) ({} bytes) to {}",
            self.actions.len(),
            body.len(),
            path
        );

        let response = self
            .client
            .request(path, Method::Put, Some(body), self.request_params.clone())
            .await?;
        let outcomes = self.correlate(response)?;

        if outcomes.has_error() {
            warn!("⚠️ {}", outcomes.error_message());
            return Err(ClientError::BulkFailure(Box::new(outcomes)));
        }
        debug!("✅ Bulk of {} action(s) landed clean", outcomes.len());
        Ok(outcomes)
    }

    /// 🧩 Pair response items with actions, strictly by position.
    pub(crate) fn correlate(&mut self, response: Response) -> Result<BulkOutcomeSet> {
        let status = response.status();
        let data = response.data().map_err(|e| {
            ClientError::Protocol(format!("bulk response (status {status}) is not valid JSON: {e}"))
        })?;

        let items = match data.get("items") {
            Some(Value::Array(items)) => items,
            Some(_) => {
                return Err(ClientError::Protocol(
                    "bulk response 'items' is not an array".to_string(),
                ));
            }
            None if !response.is_success() => {
                return Err(ClientError::Protocol(format!(
                    "bulk request failed with status {status}: {}",
                    response
                        .error_message()
                        .unwrap_or_else(|| "no error details in the response".to_string())
                )));
            }
            None => {
                return Err(ClientError::Protocol(
                    "bulk response has no 'items' array".to_string(),
                ));
            }
        };

        // 🧪 shape and count first. nothing gets written back unless everything lines up.
        let mut results = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            if position >= self.actions.len() {
                return Err(ClientError::Protocol(format!(
                    "no action for response index {position}"
                )));
            }
            results.push(split_item(position, item)?);
        }
        if results.len() < self.actions.len() {
            return Err(ClientError::Protocol(format!(
                "bulk response has {} item(s) for {} action(s); refusing to correlate a partial answer",
                results.len(),
                self.actions.len()
            )));
        }

        let populate_all = self.client.config().auto_populate;
        let mut outcomes = Vec::with_capacity(results.len());
        for (action, (op_type, metadata)) in self.actions.iter_mut().zip(results) {
            let mut outcome = BulkOutcome::new(action.clone(), op_type, metadata);
            if outcome.is_ok() && auto_populate(action, &outcome, populate_all) {
                // 🪞 the outcome sees the same document the batch now holds
                outcome.action = action.clone();
            }
            outcomes.push(outcome);
        }

        let took = data.get("took").and_then(Value::as_u64);
        Ok(BulkOutcomeSet::new(outcomes, response, took))
    }
}

// 🪞 server-assigned id/version onto the id-less document, if it opted in.
fn auto_populate(action: &mut Action, outcome: &BulkOutcome, populate_all: bool) -> bool {
    let Some(id) = outcome.id() else {
        return false;
    };
    let version = outcome.version();
    let Some(document) = action.document_mut() else {
        return false;
    };
    if !(document.auto_populate || populate_all) || document.has_id() {
        return false;
    }
    document.id = Some(id.clone());
    if version.is_some() {
        document.version = version;
    }
    // 🔁 a resend should hit the same document, not mint a twin
    let metadata = action.metadata_mut();
    if metadata.id.is_none() {
        metadata.id = Some(id);
    }
    true
}

// 🔪 `{"<op>": {...}}` → ("<op>", {...})
fn split_item(position: usize, item: &Value) -> Result<(String, Map<String, Value>)> {
    let malformed = || ClientError::Protocol(format!("bulk response item {position} is malformed: {item}"));
    let entry = item.as_object().filter(|fields| fields.len() == 1).ok_or_else(malformed)?;
    let (op_type, metadata) = entry.iter().next().ok_or_else(malformed)?;
    let metadata = metadata.as_object().ok_or_else(malformed)?;
    Ok((op_type.clone(), metadata.clone()))
}

fn action_from_value(value: Value) -> Result<(OpType, ActionMetadata)> {
    let Value::Object(fields) = value else {
        return Err(ClientError::InvalidAction(format!(
            "expected an action object like {{\"index\":{{...}}}}, got {value}"
        )));
    };
    if fields.len() != 1 {
        return Err(ClientError::InvalidAction(format!(
            "an action line holds exactly one operation, found {}",
            fields.len()
        )));
    }
    let Some((op, metadata)) = fields.into_iter().next() else {
        return Err(ClientError::InvalidAction("empty action line".to_string()));
    };
    let op_type: OpType = op.parse()?;
    let metadata: ActionMetadata = serde_json::from_value(metadata)?;
    Ok((op_type, metadata))
}

/// 🧾 Parse NDJSON in bulk format into actions. Source lines are kept verbatim.
pub fn parse_ndjson(ndjson: &str) -> Result<Vec<Action>> {
    let mut lines = NdjsonLines::new(ndjson);
    let mut actions = Vec::new();
    while let Some(line) = lines.next() {
        let action_line = lines.line_number;
        let (op_type, metadata) = action_from_value(serde_json::from_str(line)?)?;
        let source = if op_type == OpType::Delete {
            None
        } else {
            let source = lines.next().ok_or_else(|| {
                ClientError::InvalidAction(format!(
                    "{op_type} action on line {action_line} is missing its source line"
                ))
            })?;
            Some(source.to_string())
        };
        actions.push(Action::raw(op_type, metadata, source)?);
    }
    Ok(actions)
}

// 📏 non-blank lines, newline hunting done by memchr
struct NdjsonLines<'a> {
    rest: &'a str,
    line_number: usize,
}

impl<'a> NdjsonLines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            rest: text,
            line_number: 0,
        }
    }
}

impl<'a> Iterator for NdjsonLines<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while !self.rest.is_empty() {
            let (line, rest) = match memchr(b'\n', self.rest.as_bytes()) {
                Some(end) => (&self.rest[..end], &self.rest[end + 1..]),
                None => (self.rest, ""),
            };
            self.rest = rest;
            self.line_number += 1;
            let line = line.trim();
            if !line.is_empty() {
                return Some(line);
            }
        }
        None
    }
}
