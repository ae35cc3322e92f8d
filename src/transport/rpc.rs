//! JSON-RPC 2.0 envelope used by the backend's JSON routes.

use crate::error::TransportError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Serialize)]
pub(crate) struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'static str,
    params: &'a Value,
    id: u32,
}

impl<'a> RpcRequest<'a> {
    pub(crate) fn call(params: &'a Value) -> Self {
        Self {
            jsonrpc: "2.0",
            method: "call",
            params,
            id: rand::thread_rng().gen(),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcReply {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcFault>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcFault {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<RpcFaultData>,
}

/// Server-side exception details, when the backend includes them.
#[derive(Debug, Deserialize)]
pub(crate) struct RpcFaultData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl RpcReply {
    /// Unwrap the `result` member, turning a fault into [`TransportError::Rpc`].
    pub(crate) fn into_result(self) -> Result<Value, TransportError> {
        if let Some(fault) = self.error {
            // Prefer the exception text over the generic "Server Error" banner.
            let message = fault
                .data
                .and_then(|d| match (d.name, d.message) {
                    (Some(name), Some(msg)) => Some(format!("{name}: {msg}")),
                    (None, Some(msg)) => Some(msg),
                    _ => None,
                })
                .unwrap_or(fault.message);
            return Err(TransportError::Rpc {
                code: fault.code,
                message,
            });
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

pub(crate) fn parse_reply(body: &[u8]) -> Result<Value, TransportError> {
    let reply: RpcReply = serde_json::from_slice(body)?;
    reply.into_result()
}
