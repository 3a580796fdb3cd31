//! `contextual config` — Configuration management commands.

use super::load_config;
use contextual_config::AppConfig;
use std::path::{Path, PathBuf};

/// Non-fatal observations about a valid configuration.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.context.window == 1 {
        warnings.push("context.window = 1 keeps only the query turn verbatim".to_string());
    }

    if config.context.retrieve_k == 0 {
        warnings.push("context.retrieve_k = 0 disables memory retrieval".to_string());
    }

    if config.memory.embedder == "none" {
        warnings.push("memory.embedder = \"none\": assembly will run without memory".to_string());
    }

    if config.maintenance.max_chunk_turns < config.maintenance.summarize_every {
        warnings.push(format!(
            "maintenance.max_chunk_turns ({}) < summarize_every ({}): \
             each trigger needs several passes",
            config.maintenance.max_chunk_turns, config.maintenance.summarize_every
        ));
    }

    warnings
}

pub async fn validate(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match load_config(path) {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Window:    {} turns", config.context.window);
            println!("   Budget:    {} tokens", config.context.token_budget);
            println!("   Retrieve:  {} chunks", config.context.retrieve_k);
            println!("   Embedder:  {}", config.memory.embedder);
            println!(
                "   Summarize: every {} turns (max {} per chunk)",
                config.maintenance.summarize_every, config.maintenance.max_chunk_turns
            );
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(path).map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path(path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_path);
    println!("{}", config_path.display());
    Ok(())
}

fn default_path() -> PathBuf {
    AppConfig::config_dir().join("config.toml")
}
