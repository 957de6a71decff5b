//! JSON-RPC 2.0 server for Monochain
//!
//! Every call is a `POST /` carrying one request object. Read methods are
//! served from committed storage; `chain.SendTransaction` stages into the
//! mempool.

use axum::{
    body::Bytes,
    extract::{Request, State},
    middleware::{self, Next},
    response::Response,
    routing::post,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::blockchain::BlockInfoList;
use crate::crypto;
use crate::error::{LedgerError, Result};
use crate::mempool::Mempool;
use crate::network::{
    methods, BlockInterval, RpcErrorObject, RpcRequest, RpcResponse, INVALID_REQUEST,
    JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, SERVER_ERROR,
};
use crate::persistence::Storage;
use crate::transaction::Transaction;

/// Method table behind the HTTP transport.
pub struct RpcService {
    storage: Arc<Storage>,
    mempool: Arc<Mempool>,
}

impl RpcService {
    pub fn new(storage: Arc<Storage>, mempool: Arc<Mempool>) -> Self {
        Self { storage, mempool }
    }

    /// Executes one call. Blocking; run it off the async workers.
    pub fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> std::result::Result<Value, RpcErrorObject> {
        let result = match method {
            methods::GET_ACCOUNT_INFO => {
                let address = crypto::address_from_hex(&single_param::<String>(params)?)?;
                to_json(&self.storage.get_account(&address)?.to_info())
            }
            methods::GET_TRANSACTION_BY_HASH => {
                let hash = crypto::hash_from_hex(&single_param::<String>(params)?)?;
                let tx = self.storage.get_transaction(&hash)?.ok_or_else(|| {
                    LedgerError::NotFound(format!("transaction {}", hex::encode(hash)))
                })?;
                to_json(&tx.to_info())
            }
            methods::GET_BLOCK_BY_HASH => {
                let hash = crypto::hash_from_hex(&single_param::<String>(params)?)?;
                let info = self
                    .storage
                    .get_block_info_by_hash(&hash)?
                    .ok_or_else(|| LedgerError::NotFound(format!("block {}", hex::encode(hash))))?;
                to_json(&info)
            }
            methods::GET_BLOCK_BY_HEIGHT => {
                let height = single_param::<u64>(params)?;
                let info = self
                    .storage
                    .get_block_info_by_height(height)?
                    .ok_or_else(|| LedgerError::NotFound(format!("block at height {}", height)))?;
                to_json(&info)
            }
            methods::GET_BLOCKS_INTERVAL => {
                let interval = single_param::<BlockInterval>(params)?;
                let list = if interval.left > interval.right {
                    BlockInfoList::default()
                } else {
                    self.storage
                        .get_blocks_interval(interval.left, interval.right)?
                };
                to_json(&list)
            }
            methods::SEND_TRANSACTION => {
                let tx = Transaction::from_base64(&single_param::<String>(params)?)?;
                debug!(tx = %tx.hash_str(), "Staged transaction");
                self.mempool.add(tx);
                Ok(Value::Bool(true))
            }
            methods::GET_CURRENT_BLOCK_HEIGHT => to_json(&self.storage.get_height()?),
            other => {
                return Err(RpcErrorObject::new(
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", other),
                ))
            }
        };
        result.map_err(RpcErrorObject::from)
    }
}

/// Accepts `[param]` or a bare value.
fn single_param<T: DeserializeOwned>(params: Option<Value>) -> Result<T> {
    let value = match params {
        Some(Value::Array(mut items)) if items.len() == 1 => items.remove(0),
        Some(Value::Array(items)) => {
            return Err(LedgerError::InvalidArgument(format!(
                "Expected exactly one parameter, got {}",
                items.len()
            )))
        }
        Some(value) => value,
        None => return Err(LedgerError::InvalidArgument("Missing parameter".to_string())),
    };
    serde_json::from_value(value)
        .map_err(|e| LedgerError::InvalidArgument(format!("Invalid parameter: {}", e)))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| LedgerError::InvalidArgument(format!("Failed to encode result: {}", e)))
}

// ============================================================================
// HTTP transport
// ============================================================================

async fn rpc_handler(State(service): State<Arc<RpcService>>, body: Bytes) -> Json<RpcResponse> {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcErrorObject::new(PARSE_ERROR, format!("Parse error: {}", e)),
            ))
        }
    };

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let request: RpcRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => {
            return Json(RpcResponse::failure(
                id,
                RpcErrorObject::new(INVALID_REQUEST, format!("Invalid request: {}", e)),
            ))
        }
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return Json(RpcResponse::failure(
            request.id,
            RpcErrorObject::new(INVALID_REQUEST, "jsonrpc must be \"2.0\""),
        ));
    }

    let RpcRequest {
        method, params, id, ..
    } = request;
    debug!(rpc_method = %method, "rpc.call");

    let joined = tokio::task::spawn_blocking(move || service.dispatch(&method, params)).await;
    let response = match joined {
        Ok(Ok(result)) => RpcResponse::success(id, result),
        Ok(Err(error)) => RpcResponse::failure(id, error),
        Err(e) => RpcResponse::failure(
            id,
            RpcErrorObject::new(SERVER_ERROR, format!("Internal error: {}", e)),
        ),
    };
    Json(response)
}

/// Logs method, path, status and duration of every request.
async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        "rpc.request"
    );

    response
}

pub fn build_rpc_router(service: Arc<RpcService>) -> Router {
    Router::new()
        .route("/", post(rpc_handler))
        .layer(middleware::from_fn(logging_middleware))
        .with_state(service)
}

/// Serves the router on `listener` until `shutdown` flips to `true`.
pub async fn run_rpc_server(
    service: Arc<RpcService>,
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "RPC server listening");

    axum::serve(listener, build_rpc_router(service))
        .with_graceful_shutdown(async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("RPC server stopped");
    Ok(())
}
