//! Host boundary: the ordered stream of upserts and checkpoints.

use async_trait::async_trait;
use congress_core::CursorState;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SinkError;

/// One operation handed to the host, in production order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Operation {
    /// Write-or-replace one record keyed by the table's primary key.
    Upsert { table: String, data: Value },
    /// Persist this cursor snapshot before anything after it is applied.
    Checkpoint { state: Value },
}

impl Operation {
    pub fn is_checkpoint(&self) -> bool {
        matches!(self, Operation::Checkpoint { .. })
    }
}

/// Receiver of the engine's output.
///
/// Each call is awaited before the engine issues its next request, so a
/// checkpoint that returns `Ok` happens-before any later page fetch. For the
/// channel sink `Ok` only means the operation was queued; the receiving host
/// must apply operations in the order received and persist each checkpoint
/// only after the upserts before it.
#[async_trait]
pub trait OperationSink: Send {
    async fn upsert(&mut self, table: &str, record: Value) -> Result<(), SinkError>;
    async fn checkpoint(&mut self, state: &CursorState) -> Result<(), SinkError>;
}

#[async_trait]
impl OperationSink for Vec<Operation> {
    async fn upsert(&mut self, table: &str, record: Value) -> Result<(), SinkError> {
        self.push(Operation::Upsert {
            table: table.to_string(),
            data: record,
        });
        Ok(())
    }

    async fn checkpoint(&mut self, state: &CursorState) -> Result<(), SinkError> {
        self.push(Operation::Checkpoint {
            state: state.snapshot(),
        });
        Ok(())
    }
}

#[async_trait]
impl OperationSink for mpsc::Sender<Operation> {
    async fn upsert(&mut self, table: &str, record: Value) -> Result<(), SinkError> {
        self.send(Operation::Upsert {
            table: table.to_string(),
            data: record,
        })
        .await
        .map_err(|_| SinkError::ChannelClosed)
    }

    async fn checkpoint(&mut self, state: &CursorState) -> Result<(), SinkError> {
        self.send(Operation::Checkpoint {
            state: state.snapshot(),
        })
        .await
        .map_err(|_| SinkError::ChannelClosed)
    }
}
