//! stdio JSON-RPC dispatcher.
//!
//! One reader loop decodes frames serially to keep the request log in
//! arrival order, then hands each `tools/call` to a worker bounded by a
//! semaphore sized `2 × cores`. A single writer task owns the output
//! stream; responses are unordered relative to requests and clients match
//! on `id`. EOF on stdin drains in-flight workers and returns.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::rpc::protocol::{
    RpcRequest, RpcResponse, ToolCallParams, INVALID_PARAMS, INVALID_REQUEST, MAX_FRAME_BYTES,
    METHOD_NOT_FOUND, PARSE_ERROR,
};
use crate::rpc::tools::ToolRouter;
use crate::utils::error::ServiceError;
use crate::{rpc::envelope, ServiceState};

pub struct Dispatcher {
    state: Arc<ServiceState>,
    router: Arc<ToolRouter>,
}

impl Dispatcher {
    pub fn new(state: Arc<ServiceState>) -> Self {
        let router = Arc::new(ToolRouter::new(Arc::clone(&state)));
        Self { state, router }
    }

    /// Serve until the input stream reaches EOF.
    ///
    /// Generic over the streams so tests can drive the full protocol over
    /// an in-memory duplex pipe.
    pub async fn run<R, W>(&self, input: R, output: W) -> anyhow::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<String>(64);
        let writer = tokio::spawn(async move {
            let mut output = output;
            while let Some(line) = rx.recv().await {
                if output.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if output.write_all(b"\n").await.is_err() {
                    break;
                }
                if output.flush().await.is_err() {
                    break;
                }
            }
        });

        let semaphore = Arc::new(Semaphore::new(self.state.config.limits.max_in_flight));
        let mut workers: JoinSet<()> = JoinSet::new();
        let mut reader = BufReader::new(input).lines();

        while let Some(line) = reader.next_line().await? {
            // Reap finished workers so the set does not grow unbounded
            while workers.try_join_next().is_some() {}

            if line.trim().is_empty() {
                continue;
            }
            if line.len() > MAX_FRAME_BYTES {
                tracing::warn!("Rejecting oversized frame ({} bytes)", line.len());
                let response =
                    RpcResponse::failure(Value::Null, INVALID_REQUEST, "Invalid Request: frame exceeds 1 MiB");
                let _ = tx.send(response.to_line()).await;
                continue;
            }

            let request: RpcRequest = match serde_json::from_str(&line) {
                Ok(request) => request,
                Err(e) => {
                    tracing::debug!("Unparseable frame: {}", e);
                    let response =
                        RpcResponse::failure(Value::Null, PARSE_ERROR, "Parse error");
                    let _ = tx.send(response.to_line()).await;
                    continue;
                },
            };

            let Some(id) = request.id else {
                // Notification: process nothing, answer nothing
                tracing::debug!("Ignoring notification: {}", request.method);
                continue;
            };

            match request.method.as_str() {
                "initialize" => {
                    let response = RpcResponse::success_raw(
                        id,
                        self.state.statics.initialize_result.clone(),
                    );
                    let _ = tx.send(response.to_line()).await;
                },
                "tools/list" => {
                    let response = RpcResponse::success_raw(
                        id,
                        self.state.statics.tools_list_result.clone(),
                    );
                    let _ = tx.send(response.to_line()).await;
                },
                "tools/call" => {
                    let params: ToolCallParams = match request
                        .params
                        .ok_or("missing params")
                        .and_then(|p| serde_json::from_value(p).map_err(|_| "malformed params"))
                    {
                        Ok(params) => params,
                        Err(reason) => {
                            let response = RpcResponse::failure(
                                id,
                                INVALID_PARAMS,
                                format!("Invalid params: {}", reason),
                            );
                            let _ = tx.send(response.to_line()).await;
                            continue;
                        },
                    };

                    let permit = match Arc::clone(&semaphore).acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => break,
                    };
                    let router = Arc::clone(&self.router);
                    let state = Arc::clone(&self.state);
                    let tx = tx.clone();
                    workers.spawn(async move {
                        let _permit = permit;
                        let response = handle_tool_call(&state, &router, id, params).await;
                        let _ = tx.send(response.to_line()).await;
                    });
                },
                other => {
                    tracing::debug!("Unknown method: {}", other);
                    let response = RpcResponse::failure(
                        id,
                        METHOD_NOT_FOUND,
                        format!("Method not found: {}", other),
                    );
                    let _ = tx.send(response.to_line()).await;
                },
            }
        }

        // EOF: drain in-flight workers, then let the writer finish
        while workers.join_next().await.is_some() {}
        drop(tx);
        let _ = writer.await;
        Ok(())
    }
}

/// Run one tool call under the per-tool deadline and wrap the envelope
/// into the JSON-RPC result content.
async fn handle_tool_call(
    state: &Arc<ServiceState>,
    router: &Arc<ToolRouter>,
    id: Value,
    params: ToolCallParams,
) -> RpcResponse {
    let deadline = Duration::from_millis(state.config.limits.tool_timeout_ms);
    let tool = params.name.clone();

    match tokio::time::timeout(deadline, router.call(&params.name, params.arguments)).await {
        Ok(Some(payload)) => {
            let result = serde_json::json!({
                "content": [ { "type": "text", "text": payload } ]
            });
            RpcResponse::success_value(id, &result)
        },
        Ok(None) => RpcResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown tool: {}", tool)),
        Err(_) => {
            // The worker was cancelled mid-call; record the failure here
            state.metrics.record(&tool, deadline.as_secs_f64() * 1000.0, false);
            let err = ServiceError::timeout(format!(
                "tool {} exceeded the {} ms deadline",
                tool,
                deadline.as_millis()
            ));
            let payload = envelope::failure(&err);
            let result = serde_json::json!({
                "content": [ { "type": "text", "text": payload } ]
            });
            RpcResponse::success_value(id, &result)
        },
    }
}
