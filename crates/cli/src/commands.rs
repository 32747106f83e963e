use std::sync::Arc;

use {
    anyhow::{Context, Result},
    recall_config::RecallConfig,
    recall_memory::{
        Interaction, MemoryManager, NewEpisode, NewRecord, NewShortTerm, RangeOptions,
        SearchOptions, SemanticSearch,
    },
    serde_json::{Value, json},
    time::{OffsetDateTime, format_description::well_known::Rfc3339},
    tokio_util::sync::CancellationToken,
    tracing::info,
};

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// JSON input is stored as-is; anything else becomes a JSON string.
pub fn parse_content(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Metadata must be a JSON object.
pub fn parse_metadata(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("metadata is not valid JSON")?;
    if !value.is_object() {
        anyhow::bail!("metadata must be a JSON object");
    }
    Ok(value)
}

/// Milliseconds since the Unix epoch, from either an integer or RFC 3339.
pub fn parse_instant(raw: &str) -> Result<i64> {
    if let Ok(ms) = raw.parse::<i64>() {
        return Ok(ms);
    }
    let at = OffsetDateTime::parse(raw, &Rfc3339)
        .with_context(|| format!("not epoch milliseconds or RFC 3339: {raw}"))?;
    Ok((at.unix_timestamp_nanos() / 1_000_000) as i64)
}

pub async fn remember(
    manager: &MemoryManager,
    content: &str,
    kind: &str,
    importance: Option<f64>,
    metadata: Option<&str>,
) -> Result<()> {
    let content = parse_content(content);
    let importance =
        importance.unwrap_or_else(|| Interaction::new(kind, content.clone()).derived_importance());
    let mut record = NewShortTerm::new(kind, content).with_importance(importance);
    if let Some(raw) = metadata {
        record = record.with_metadata(parse_metadata(raw)?);
    }
    let stored = manager.append(NewRecord::ShortTerm(record)).await?;
    print_json(&stored)
}

pub struct EpisodeArgs {
    pub title: String,
    pub description: String,
    pub outcome: Option<String>,
    pub kind: String,
    pub importance: Option<f64>,
    pub success: bool,
}

pub async fn episode(manager: &MemoryManager, args: EpisodeArgs) -> Result<()> {
    let mut episode =
        NewEpisode::new(args.kind, args.title, args.description).succeeded(args.success);
    if let Some(outcome) = args.outcome {
        episode = episode.with_outcome(outcome);
    }
    if let Some(importance) = args.importance {
        episode = episode.with_importance(importance);
    }
    let stored = manager.append(NewRecord::Episodic(episode)).await?;
    print_json(&stored)
}

pub async fn search(search: &SemanticSearch, query: &str, options: SearchOptions) -> Result<()> {
    let response = search.search(query, &options).await?;
    print_json(&response)
}

pub async fn range(
    search: &SemanticSearch,
    query: &str,
    from: &str,
    to: &str,
    limit: Option<usize>,
) -> Result<()> {
    let (start, end) = (parse_instant(from)?, parse_instant(to)?);
    let response = search
        .search_by_time_range(query, start, end, &RangeOptions { limit })
        .await?;
    print_json(&response)
}

pub async fn consolidate(manager: &Arc<MemoryManager>, watch: bool) -> Result<()> {
    if !watch {
        let report = manager.consolidate().await?;
        return print_json(&report);
    }

    let cancel = CancellationToken::new();
    let handle = manager.spawn_consolidation_loop(cancel.clone());
    info!("consolidating in the background, Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    cancel.cancel();
    handle.await?;
    print_json(&manager.stats().await?)
}

pub async fn prune(manager: &MemoryManager) -> Result<()> {
    let pruned = manager.prune_short_term().await?;
    print_json(&json!({ "pruned": pruned }))
}

pub async fn stats(manager: &MemoryManager, search: &SemanticSearch) -> Result<()> {
    print_json(&json!({
        "memory": manager.stats().await?,
        "search": search.stats(),
    }))
}

/// Effective configuration as TOML, secrets masked.
pub fn render_config(config: &RecallConfig) -> Result<String> {
    let mut shown = config.clone();
    if shown.embeddings.api_key.is_some() {
        shown.embeddings.api_key = Some("********".into());
    }
    toml::to_string_pretty(&shown).context("serialize config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instants_accept_millis_and_rfc3339() {
        assert_eq!(parse_instant("1700000000000").unwrap(), 1_700_000_000_000);
        assert_eq!(parse_instant("1970-01-01T00:00:01Z").unwrap(), 1000);
        assert_eq!(parse_instant("2024-01-01T00:00:00.250+00:00").unwrap(), 1_704_067_200_250);
        assert!(parse_instant("yesterday").is_err());
    }

    #[test]
    fn content_keeps_json_structure() {
        assert_eq!(parse_content(r#"{"a":1}"#), json!({ "a": 1 }));
        assert_eq!(parse_content("plain words"), json!("plain words"));
    }

    #[test]
    fn metadata_must_be_an_object() {
        assert_eq!(parse_metadata(r#"{"source":"cli"}"#).unwrap(), json!({ "source": "cli" }));
        assert!(parse_metadata("[1, 2]").is_err());
        assert!(parse_metadata("not json").is_err());
    }

    #[test]
    fn rendered_config_masks_api_key() {
        let mut config = RecallConfig::default();
        config.embeddings.api_key = Some("s3cret".into());
        let text = render_config(&config).unwrap();
        assert!(!text.contains("s3cret"));
        assert!(text.contains("********"));
        assert!(text.contains("[memory]"));
    }
}
