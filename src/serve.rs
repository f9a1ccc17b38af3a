//! Line protocol for long-running sessions: `<id>`, `stats`, `clear` or
//! `invalidate <id>`, one JSON answer per line.
//!
//! Every id resolves on its own task and answers are written as they
//! finish, so a slow id never holds back another one.

use anyhow::Result;
use serde::Serialize;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use crate::api::{Engine, ErrorResponse};
use crate::error::ResolveError;

type Reply = serde_json::Result<String>;

/// Serves `input` until EOF or `shutdown`, then waits for the answers
/// still in flight.
pub async fn run<R, W, S>(engine: &Engine, input: R, mut output: W, shutdown: S) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut pending: JoinSet<Reply> = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Some(reply) = dispatch(engine, &line, &mut pending) {
                    write_line(&mut output, &reply?).await?;
                }
            }
            Some(joined) = pending.join_next(), if !pending.is_empty() => {
                write_joined(&mut output, joined).await?;
            }
            _ = &mut shutdown => {
                info!("⚠️ Señal de shutdown recibida, cerrando...");
                break;
            }
        }
    }

    if !pending.is_empty() {
        info!("⏳ Esperando {} resoluciones pendientes", pending.len());
    }
    while let Some(joined) = pending.join_next().await {
        write_joined(&mut output, joined).await?;
    }

    output.flush().await?;
    Ok(())
}

/// Answers control commands inline; ids go to a new task.
fn dispatch(engine: &Engine, line: &str, pending: &mut JoinSet<Reply>) -> Option<Reply> {
    let mut parts = line.split_whitespace();

    match (parts.next(), parts.next(), parts.next()) {
        (None, _, _) => None,
        (Some("stats"), None, _) => Some(serde_json::to_string(&engine.cache_stats())),
        (Some("clear"), None, _) => Some(serde_json::to_string(&engine.cache_clear())),
        (Some("invalidate"), Some(id), None) => Some(reply(engine.invalidate(id))),
        (Some(id), None, _) => {
            let engine = engine.clone();
            let id = id.to_string();
            pending.spawn(async move { reply(engine.resolve(&id).await) });
            None
        }
        _ => Some(reply::<()>(Err(ResolveError::invalid(format!(
            "unrecognized command '{}'",
            line.trim()
        ))))),
    }
}

fn reply<T: Serialize>(result: Result<T, ResolveError>) -> Reply {
    match result {
        Ok(value) => serde_json::to_string(&value),
        Err(e) => {
            error!("❌ {}", e);
            serde_json::to_string(&ErrorResponse::from(&e))
        }
    }
}

async fn write_joined<W>(output: &mut W, joined: Result<Reply, JoinError>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    match joined {
        Ok(reply) => write_line(output, &reply?).await,
        Err(e) => {
            error!("❌ Tarea de resolución abortada: {}", e);
            Ok(())
        }
    }
}

async fn write_line<W>(output: &mut W, line: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ResolutionCache;
    use crate::downloads::MockMediaFetcher;
    use crate::error::ProviderError;
    use crate::metadata::{MetadataService, RegionFallbackDirectory};
    use crate::resolver::{Jitter, Resolver, StrategyCatalog};
    use crate::service::ResolutionService;
    use crate::sources::{
        ExtractedMedia, ExtractionProvider, MediaFormatCandidate, MockMetadataProvider,
        NetworkIdentity,
    };
    use crate::storage::MockFileStore;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use std::sync::Arc;
    use std::time::Duration;

    /// Tarda 4s para ids que contienen "slow"
    struct TimedProvider;

    #[async_trait]
    impl ExtractionProvider for TimedProvider {
        async fn extract(
            &self,
            url: &str,
            _identity: &NetworkIdentity,
            _format_hint: &str,
        ) -> Result<ExtractedMedia, ProviderError> {
            if url.contains("slow") {
                tokio::time::sleep(Duration::from_secs(4)).await;
            }
            Ok(ExtractedMedia {
                title: Some(url.to_string()),
                duration_seconds: 30,
                candidates: vec![MediaFormatCandidate {
                    has_audio: true,
                    has_video: false,
                    bitrate_kbps: Some(128.0),
                    extension: "m4a".to_string(),
                    resource_url: "https://cdn.example/a".to_string(),
                    format_note: None,
                }],
            })
        }
    }

    fn engine() -> Engine {
        let resolver =
            Resolver::new(Arc::new(TimedProvider), StrategyCatalog::default()).with_jitter(Jitter::none());
        let resolution =
            ResolutionService::new(resolver, ResolutionCache::new(Duration::from_secs(300)));
        let metadata = MetadataService::new(
            Arc::new(MockMetadataProvider::new()),
            RegionFallbackDirectory::default(),
        );
        Engine::new(
            resolution,
            metadata,
            Arc::new(MockMediaFetcher::new()),
            Arc::new(MockFileStore::new()),
        )
    }

    async fn session(input: &str) -> Vec<Value> {
        let engine = engine();
        let mut output = Vec::new();
        run(&engine, input.as_bytes(), &mut output, std::future::pending())
            .await
            .unwrap();

        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_id_does_not_hold_back_others() {
        let started = tokio::time::Instant::now();
        let answers = session("slow\nfast\n").await;

        let ids: Vec<&str> = answers.iter().map(|a| a["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["fast", "slow"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_control_commands_and_errors() {
        let answers = session("\nstats\ninvalidate abc\nfoo bar baz\n").await;

        assert_eq!(answers.len(), 3);
        assert_eq!(answers[0]["total_entries"], 0);
        assert_eq!(answers[1]["removed"], false);
        assert_eq!(answers[2]["status"], 400);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_still_drains_pending_answers() {
        let engine = engine();
        let mut output = Vec::new();
        let (reader, mut writer) = tokio::io::duplex(64);
        writer.write_all(b"slow\n").await.unwrap();

        let shutdown = tokio::time::sleep(Duration::from_secs(1));
        run(&engine, tokio::io::BufReader::new(reader), &mut output, shutdown)
            .await
            .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("\"id\":\"slow\""));
    }
}
