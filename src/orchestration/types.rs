//! # Orchestration Types
//!
//! The seams between the scheduler and the code that actually performs work:
//! [`OperationExecutor`] runs a single attempt of an operation, and
//! [`ElementStore`] resolves target element ids before the first attempt.

use crate::models::{BatchId, OperationId, OperationKind, OperationOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Everything an executor needs to perform one attempt of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub batch_id: BatchId,
    pub operation_id: OperationId,
    pub kind: OperationKind,
    pub target_element_ids: Vec<String>,
    pub options: OperationOptions,
    /// 1-based attempt number
    pub attempt: u32,
}

impl ExecutionRequest {
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}

/// Performs the work of an operation
///
/// Returning `Err` marks the attempt failed; the scheduler decides whether to
/// retry according to the operation's retry policy. The cancellation token
/// fires when the batch is cancelled or the scheduler shuts down, and also when
/// the attempt's timeout elapses. Implementations are expected to observe it
/// and return promptly.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancellation: CancellationToken,
    ) -> anyhow::Result<Value>;
}

/// A resolved target element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: String,
    #[serde(default)]
    pub data: Value,
}

impl Element {
    pub fn new(id: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }
}

/// Resolves element ids to elements
///
/// Ids that cannot be found are simply absent from the returned list; the
/// scheduler fails the operation with `elements_not_found` in that case.
#[async_trait]
pub trait ElementStore: Send + Sync {
    async fn resolve(&self, ids: &[String]) -> anyhow::Result<Vec<Element>>;
}
