//! 🕳️ NullTransport — a transport that transports nothing, anywhere, ever.
//!
//! Every request gets a 200 and a body echoing what was asked. No socket is opened.
//! No packet is harmed. Useful for dry runs, and for finding out what you *would*
//! have sent before you send it for real.

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{Request, Response, Transport};
use crate::connection::Connection;
use crate::error::TransportError;

/// 🕳️ Always answers, never connects.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    async fn execute(
        &self,
        connection: &Connection,
        request: &Request,
    ) -> Result<Response, TransportError> {
        let query: Map<String, Value> = request
            .query
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        let body = json!({
            "took": 0,
            "timed_out": false,
            "params": {
                "connection": connection.to_string(),
                "method": request.method.as_str(),
                "path": request.path,
                "query": query,
                "body": request.body,
            }
        });
        Ok(Response::json(200, &body))
    }
}
