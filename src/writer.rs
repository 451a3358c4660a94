//! The sink boundary finished results fan out through. The core only
//! depends on the trait; concrete sinks here are minimal reference
//! implementations so the contract is exercisable end to end.

use crate::error::ProbeError;
use crate::result::ProbeResult;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[async_trait]
pub trait Writer: Send + Sync {
    async fn write(&self, result: &ProbeResult) -> Result<(), ProbeError>;
}

/// Writes one human-readable summary line per result to stdout.
pub struct StdoutWriter;

#[async_trait]
impl Writer for StdoutWriter {
    async fn write(&self, result: &ProbeResult) -> Result<(), ProbeError> {
        println!(
            "{} -> {} [{}] title={:?} failed={}",
            result.url,
            result.final_url.as_deref().unwrap_or("-"),
            result.response_code,
            result.title,
            result.failed
        );
        Ok(())
    }
}

/// Appends one JSON object per line to a file. Concurrent-safe via an
/// internal mutex since multiple workers may write through the same sink.
pub struct JsonLinesWriter {
    file: Mutex<tokio::fs::File>,
}

impl JsonLinesWriter {
    pub async fn create(path: PathBuf) -> Result<Self, ProbeError> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl Writer for JsonLinesWriter {
    async fn write(&self, result: &ProbeResult) -> Result<(), ProbeError> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');
        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Discards every result. Useful for dry runs and tests.
pub struct NullWriter;

#[async_trait]
impl Writer for NullWriter {
    async fn write(&self, _result: &ProbeResult) -> Result<(), ProbeError> {
        Ok(())
    }
}

pub type SharedWriter = Arc<dyn Writer>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_writer_always_succeeds() {
        let w = NullWriter;
        let r = ProbeResult::new("https://example.com".into());
        assert!(w.write(&r).await.is_ok());
    }

    #[tokio::test]
    async fn jsonlines_writer_appends_one_line_per_call() {
        let dir = std::env::temp_dir().join(format!("webwitness-test-{}", uuid::Uuid::new_v4()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("out.jsonl");
        let writer = JsonLinesWriter::create(path.clone()).await.unwrap();

        let mut r1 = ProbeResult::new("https://a.example".into());
        r1.response_code = 200;
        let mut r2 = ProbeResult::new("https://b.example".into());
        r2.response_code = 404;

        writer.write(&r1).await.unwrap();
        writer.write(&r2).await.unwrap();

        let content = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(content.lines().count(), 2);

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
