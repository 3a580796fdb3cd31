//! `contextual assemble` — Replay a transcript and print the assembled context.

use super::load_config;
use contextual_assembler::{AssembledContext, Capabilities, ConversationSession, MemoryStatus};
use contextual_core::{EventBus, Role};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct AssembleOptions {
    pub transcript: PathBuf,
    pub query: Option<String>,
    pub budget: Option<usize>,
    pub window: Option<usize>,
    pub json: bool,
}

/// One transcript line: `{"role": "user", "content": "..."}`.
#[derive(Debug, Deserialize, PartialEq)]
pub struct TranscriptLine {
    pub role: Role,
    pub content: String,
}

/// Parse a JSONL transcript. Blank lines are skipped.
pub fn parse_transcript(text: &str) -> Result<Vec<TranscriptLine>, String> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<TranscriptLine>(line)
                .map_err(|e| format!("transcript line {}: {e}", i + 1))
        })
        .collect()
}

pub async fn run(
    config_path: Option<&Path>,
    options: AssembleOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(budget) = options.budget {
        config.context.token_budget = budget;
    }
    if let Some(window) = options.window {
        config.context.window = window;
    }
    config.validate()?;

    let text = std::fs::read_to_string(&options.transcript)
        .map_err(|e| format!("Failed to read {}: {e}", options.transcript.display()))?;
    let lines = parse_transcript(&text)?;

    let session = ConversationSession::start(
        &config,
        Capabilities::local(&config),
        Arc::new(EventBus::default()),
    );

    for line in lines {
        session.append(line.role, line.content).await?;
    }
    if let Some(query) = options.query {
        session.append(Role::User, query).await?;
    }

    // Maintenance failures only cost memory coverage; assemble regardless.
    if let Err(e) = session.maintain_now().await {
        tracing::warn!("Maintenance failed: {e}");
    }

    let mut context = session.assemble().await?;
    session.close().await?;

    if options.json {
        for scored in &mut context.memory {
            scored.chunk.embedding.clear();
        }
        println!("{}", serde_json::to_string_pretty(&context)?);
    } else {
        println!("{}", context.render());
        eprintln!("\n{}", summary_line(&context));
    }

    Ok(())
}

fn summary_line(context: &AssembledContext) -> String {
    let meta = &context.metadata;
    let memory = match &meta.memory_status {
        MemoryStatus::Retrieved { candidates } => {
            format!("{} of {candidates} chunks", context.memory.len())
        }
        MemoryStatus::NotReady { reason } => format!("unavailable ({reason})"),
        MemoryStatus::NotNeeded => "not needed".to_string(),
    };
    let mut line = format!(
        "{} / {} tokens · {} facts · memory: {memory} · {} recent turns",
        meta.total_tokens,
        meta.budget,
        context.facts.len(),
        context.recent.len()
    );
    if meta.over_budget {
        line.push_str(" · OVER BUDGET");
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lines_and_skips_blanks() {
        let text = r#"{"role": "user", "content": "hi"}

{"role": "assistant", "content": "hello"}
"#;
        let lines = parse_transcript(text).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].role, Role::Assistant);
        assert_eq!(lines[1].content, "hello");
    }

    #[test]
    fn bad_line_reports_line_number() {
        let text = concat!(
            "{\"role\": \"user\", \"content\": \"ok\"}\n",
            "{\"role\": \"system\", \"content\": \"x\"}",
        );
        let err = parse_transcript(text).unwrap_err();
        assert!(err.starts_with("transcript line 2"));
    }
}
