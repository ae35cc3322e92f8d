//! Typed wrappers over the backend's JSON routes.

use crate::error::Result;
use crate::model::{
    ClearLogsResponse, EnvInfoResponse, ExecuteRequest, ExecutionResult, HistoryResponse,
    RestartRequest, RestartResponse, UploadHistoryResponse,
};
use crate::transport::RpcTransport;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub const GET_HISTORY: &str = "get_history";
pub const EXECUTE: &str = "execute";
pub const GET_ENV_INFO: &str = "get_env_info";
pub const RESTART: &str = "restart_odoo";
pub const CLEAR_LOGS: &str = "clear_logs";
pub const GET_UPLOAD_HISTORY: &str = "get_upload_history";

async fn call<T: DeserializeOwned>(rpc: &dyn RpcTransport, route: &str, params: Value) -> Result<T> {
    let value = rpc.call(route, params).await?;
    Ok(serde_json::from_value(value)?)
}

pub async fn get_history(rpc: &dyn RpcTransport, limit: usize) -> Result<HistoryResponse> {
    call(rpc, GET_HISTORY, json!({ "limit": limit })).await
}

pub async fn execute(rpc: &dyn RpcTransport, req: &ExecuteRequest) -> Result<ExecutionResult> {
    call(rpc, EXECUTE, serde_json::to_value(req)?).await
}

pub async fn get_env_info(rpc: &dyn RpcTransport) -> Result<EnvInfoResponse> {
    call(rpc, GET_ENV_INFO, json!({})).await
}

pub async fn restart(rpc: &dyn RpcTransport, req: &RestartRequest) -> Result<RestartResponse> {
    call(rpc, RESTART, serde_json::to_value(req)?).await
}

pub async fn clear_logs(rpc: &dyn RpcTransport) -> Result<ClearLogsResponse> {
    call(rpc, CLEAR_LOGS, json!({})).await
}

pub async fn get_upload_history(
    rpc: &dyn RpcTransport,
    limit: usize,
) -> Result<UploadHistoryResponse> {
    call(rpc, GET_UPLOAD_HISTORY, json!({ "limit": limit })).await
}
