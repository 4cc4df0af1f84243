//! Configuration management commands.

use std::fs;

use anyhow::{bail, Result};

use super::{ConfigArgs, ConfigCommand};
use crate::config::{generate_default_config, CliConfig};
use crate::context::Context;

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => show_config(ctx),
        ConfigCommand::Get { key } => get_config(&key, ctx),
        ConfigCommand::Init { path, force } => init_config(&path, force, ctx),
        ConfigCommand::Validate => validate_config(ctx),
    }
}

fn show_config(ctx: &Context) -> Result<()> {
    if ctx.output.is_json() {
        ctx.output.json(&ctx.config);
        return Ok(());
    }

    ctx.output.header("Current Configuration");
    match &ctx.config_path {
        Some(path) => ctx.output.kv("source", &path.display().to_string()),
        None => ctx.output.kv("source", "defaults"),
    }

    let cache = &ctx.config.cache;
    ctx.output.info("");
    ctx.output.info("[cache]");
    ctx.output.kv("instance_id", &cache.instance_id);
    ctx.output.kv("ttl_secs", &cache.ttl_secs.to_string());
    if cache.tables.is_empty() {
        ctx.output.kv("tables", "(all)");
    } else {
        ctx.output.kv("tables", "");
        for table in &cache.tables {
            ctx.output.list_item(table);
        }
    }
    ctx.output.kv("easer", &cache.easer.to_string());
    ctx.output.kv("enabled", &cache.enabled.to_string());
    ctx.output
        .kv("eviction_queue_depth", &cache.eviction_queue_depth.to_string());

    ctx.output.info("");
    ctx.output.info("[demo]");
    ctx.output.kv("users", &ctx.config.demo.users.to_string());
    ctx.output.kv("latency_ms", &ctx.config.demo.latency_ms.to_string());

    Ok(())
}

fn get_config(key: &str, ctx: &Context) -> Result<()> {
    let value = get_config_value(&ctx.config, key)?;

    if ctx.output.is_json() {
        ctx.output.json(&serde_json::json!({ "key": key, "value": value }));
    } else {
        println!("{}", value);
    }

    Ok(())
}

fn init_config(path: &str, force: bool, ctx: &Context) -> Result<()> {
    let config_path = ctx.resolve_path(path);

    if config_path.exists() && !force {
        bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    if path.ends_with(".json") {
        let config: CliConfig = toml::from_str(&generate_default_config())?;
        config.save(&config_path.to_string_lossy())?;
    } else {
        fs::write(&config_path, generate_default_config())?;
    }

    ctx.output
        .success(&format!("Created: {}", config_path.display()));

    Ok(())
}

fn validate_config(ctx: &Context) -> Result<()> {
    ctx.output.header("Validating configuration");

    let mut errors: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let cache = &ctx.config.cache;

    if cache.instance_id.is_empty() {
        warnings.push("cache.instance_id is empty; keys will share the bare namespace".to_string());
    }
    if cache.instance_id.contains(':') {
        errors.push("cache.instance_id must not contain ':'".to_string());
    }
    if cache.ttl_secs == 0 {
        warnings.push("cache.ttl_secs = 0 asks the store to keep entries forever".to_string());
    }
    for (i, table) in cache.tables.iter().enumerate() {
        if table.trim().is_empty() {
            errors.push(format!("cache.tables[{}] is empty", i));
        }
    }
    if cache.eviction_queue_depth == 0 {
        warnings.push("cache.eviction_queue_depth = 0 is raised to 1".to_string());
    }

    if errors.is_empty() && warnings.is_empty() {
        ctx.output.success("Configuration is valid");
        return Ok(());
    }

    for error in &errors {
        ctx.output.error(&format!("Error: {}", error));
    }

    for warning in &warnings {
        ctx.output.warn(&format!("Warning: {}", warning));
    }

    if !errors.is_empty() {
        bail!("Configuration has {} error(s)", errors.len());
    }

    ctx.output.success("Configuration is valid (with warnings)");

    Ok(())
}

fn get_config_value(config: &CliConfig, key: &str) -> Result<String> {
    let parts: Vec<&str> = key.split('.').collect();

    match parts.as_slice() {
        ["cache", "instance_id"] => Ok(config.cache.instance_id.clone()),
        ["cache", "ttl_secs"] => Ok(config.cache.ttl_secs.to_string()),
        ["cache", "tables"] => Ok(config.cache.tables.join(",")),
        ["cache", "easer"] => Ok(config.cache.easer.to_string()),
        ["cache", "enabled"] => Ok(config.cache.enabled.to_string()),
        ["cache", "eviction_queue_depth"] => Ok(config.cache.eviction_queue_depth.to_string()),
        ["demo", "users"] => Ok(config.demo.users.to_string()),
        ["demo", "latency_ms"] => Ok(config.demo.latency_ms.to_string()),
        _ => bail!("Unknown config key: {}", key),
    }
}
