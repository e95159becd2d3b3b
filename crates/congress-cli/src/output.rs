//! Local host for debugging runs: JSONL operations out, cursor state on disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use congress_core::CursorState;
use congress_sync::{Operation, OperationSink, SinkError};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Writes every operation as one JSON line. At each checkpoint the output is
/// flushed first and the state file rewritten last, so a killed run may replay
/// records but never skips any.
pub struct LocalHost {
    out: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    state_path: Option<PathBuf>,
    pub upserts: u64,
    pub checkpoints: u64,
}

impl LocalHost {
    pub async fn open(out: Option<&Path>, state_path: Option<PathBuf>) -> Result<Self, SinkError> {
        let writer: Box<dyn AsyncWrite + Send + Unpin> = match out {
            Some(path) => Box::new(tokio::fs::File::create(path).await?),
            None => Box::new(tokio::io::stdout()),
        };
        Ok(Self {
            out: BufWriter::new(writer),
            state_path,
            upserts: 0,
            checkpoints: 0,
        })
    }

    async fn write_line(&mut self, op: &Operation) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(op)?;
        line.push(b'\n');
        self.out.write_all(&line).await?;
        Ok(())
    }

    pub async fn finish(mut self) -> Result<(), SinkError> {
        self.out.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl OperationSink for LocalHost {
    async fn upsert(&mut self, table: &str, record: Value) -> Result<(), SinkError> {
        self.write_line(&Operation::Upsert {
            table: table.to_string(),
            data: record,
        })
        .await?;
        self.upserts += 1;
        Ok(())
    }

    async fn checkpoint(&mut self, state: &CursorState) -> Result<(), SinkError> {
        let snapshot = state.snapshot();
        self.write_line(&Operation::Checkpoint {
            state: snapshot.clone(),
        })
        .await?;
        // Records covered by this checkpoint must be on disk before the cursor moves.
        self.out.flush().await?;
        if let Some(path) = &self.state_path {
            write_state(path, &snapshot).await?;
        }
        self.checkpoints += 1;
        Ok(())
    }
}

/// Replace `path` atomically: write a sibling temp file, then rename over it.
pub async fn write_state(path: &Path, state: &Value) -> Result<(), SinkError> {
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, serde_json::to_vec_pretty(state)?).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Last persisted state, or `None` when no state file exists yet.
pub async fn read_state(path: &Path) -> anyhow::Result<Option<Value>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}
