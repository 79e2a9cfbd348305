//! 📋 Outcomes — what the server said about each action, lined up by position.
//!
//! One `BulkOutcome` per submitted action, in submission order. The set is the
//! report card: `is_ok` only if every single item passed, `failures()` for the
//! ones that didn't. Successful items stay written either way. No rollbacks here,
//! this is a search cluster, not a bank. 🦆

use serde_json::{Map, Value};

use super::action::Action;
use crate::transports::{Response, describe_error};

/// 📄 One action and the server's verdict on it.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcome {
    pub action: Action,
    /// The op type the server reported back (the item's single key).
    pub op_type: String,
    /// The item's result metadata: `_id`, `_version`, `status`, maybe `error`.
    pub metadata: Map<String, Value>,
}

impl BulkOutcome {
    pub fn new(action: Action, op_type: impl Into<String>, metadata: Map<String, Value>) -> Self {
        Self {
            action,
            op_type: op_type.into(),
            metadata,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.metadata
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|status| u16::try_from(status).ok())
    }

    /// 🔢 `_id` as a string, even when the server sent a number.
    pub fn id(&self) -> Option<String> {
        match self.metadata.get("_id")? {
            Value::String(id) => Some(id.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn version(&self) -> Option<u64> {
        self.metadata.get("_version").and_then(Value::as_u64)
    }

    pub fn index(&self) -> Option<&str> {
        self.metadata.get("_index").and_then(Value::as_str)
    }

    /// 💀 The per-item error, flattened to a string.
    pub fn error(&self) -> Option<String> {
        match self.metadata.get("error") {
            None | Some(Value::Null) => None,
            Some(error) => Some(describe_error(error)),
        }
    }

    pub fn has_error(&self) -> bool {
        self.error().is_some()
    }

    /// ✅ No error key. A delete that found nothing (404 not_found) still counts.
    pub fn is_ok(&self) -> bool {
        !self.has_error()
    }
}

/// 📋 Every outcome of one batch, plus the raw response it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOutcomeSet {
    outcomes: Vec<BulkOutcome>,
    response: Response,
    took: Option<u64>,
}

impl BulkOutcomeSet {
    pub fn new(outcomes: Vec<BulkOutcome>, response: Response, took: Option<u64>) -> Self {
        Self {
            outcomes,
            response,
            took,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.outcomes.iter().all(BulkOutcome::is_ok)
    }

    pub fn has_error(&self) -> bool {
        !self.is_ok()
    }

    /// ⚠️ `(position, outcome)` for every item that failed.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &BulkOutcome)> {
        self.outcomes
            .iter()
            .enumerate()
            .filter(|(_, outcome)| outcome.has_error())
    }

    /// 💬 One line summarizing the damage, with the first failure as a sample.
    pub fn error_message(&self) -> String {
        let failed = self.failures().count();
        match self.failures().next() {
            None => format!("all {} bulk actions succeeded", self.len()),
            Some((position, outcome)) => format!(
                "{failed} of {} bulk actions failed; first at position {position} ({} {}): {}",
                self.len(),
                outcome.op_type,
                outcome.id().unwrap_or_else(|| "<no id>".to_string()),
                outcome.error().unwrap_or_default()
            ),
        }
    }

    pub fn outcomes(&self) -> &[BulkOutcome] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<&BulkOutcome> {
        self.outcomes.get(position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BulkOutcome> {
        self.outcomes.iter()
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    /// ⏱️ Server-reported milliseconds, if the server reported it.
    pub fn took(&self) -> Option<u64> {
        self.took
    }
}

impl IntoIterator for BulkOutcomeSet {
    type Item = BulkOutcome;
    type IntoIter = std::vec::IntoIter<BulkOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

impl<'a> IntoIterator for &'a BulkOutcomeSet {
    type Item = &'a BulkOutcome;
    type IntoIter = std::slice::Iter<'a, BulkOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.iter()
    }
}
