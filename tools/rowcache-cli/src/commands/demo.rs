//! Scripted walk through reads, hits, invalidation and coalescing.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures::future::join_all;
use rowcache::{CachingLayer, MemoryStore, StatsSnapshot, WriteKind};
use serde::Serialize;
use tracing::info;

use super::DemoArgs;
use crate::context::Context;
use crate::output::{format_ratio, outcome_badge};
use crate::users::UsersTable;

const TOTAL_STEPS: usize = 6;

#[derive(Debug, Serialize)]
struct StepReport {
    step: usize,
    action: String,
    outcome: String,
    executions: usize,
    detail: String,
}

#[derive(Debug, Serialize)]
struct DemoReport {
    steps: Vec<StepReport>,
    stats: StatsSnapshot,
}

struct Demo<'a> {
    ctx: &'a Context,
    table: Arc<UsersTable>,
    layer: CachingLayer<MemoryStore>,
    steps: Vec<StepReport>,
}

impl Demo<'_> {
    fn record(&mut self, action: &str, before: usize, detail: String) {
        let executions = self.table.executions() - before;
        let outcome = match executions {
            0 => "hit",
            _ => "miss",
        };
        self.record_outcome(action, outcome, executions, detail);
    }

    fn record_outcome(&mut self, action: &str, outcome: &str, executions: usize, detail: String) {
        let step = self.steps.len() + 1;
        self.ctx.output.step(
            step,
            TOTAL_STEPS,
            &format!(
                "{} -> {} ({} execution(s)) {}",
                action,
                outcome_badge(outcome),
                executions,
                detail
            ),
        );
        self.steps.push(StepReport {
            step,
            action: action.to_string(),
            outcome: outcome.to_string(),
            executions,
            detail,
        });
    }
}

/// Run the demo command.
pub async fn run(args: DemoArgs, ctx: &Context) -> Result<()> {
    let users = args.users.unwrap_or(ctx.config.demo.users).max(2);
    let latency = Duration::from_millis(args.latency_ms.unwrap_or(ctx.config.demo.latency_ms));
    let config = ctx.config.cache.to_cache_config().with_easer(!args.no_easer);

    info!(users, easer = config.easer, ttl_secs = config.ttl.as_secs(), "Starting demo");
    ctx.output.header("rowcache demo");
    ctx.output.kv("users", &users.to_string());
    ctx.output.kv("instance", &config.instance_id);
    ctx.output.kv("easer", &config.easer.to_string());

    let mut demo = Demo {
        ctx,
        table: UsersTable::seeded(users, latency),
        layer: CachingLayer::with_json(config, MemoryStore::new()),
        steps: Vec::new(),
    };

    for label in ["find user 1", "find user 1 again"] {
        let before = demo.table.executions();
        let found = demo
            .layer
            .query(&UsersTable::find_statement(1), demo.table.find(1))
            .await
            .context("find user 1")?;
        demo.record(label, before, format!("name={}", found.dest.name));
    }

    let before = demo.table.executions();
    let all = demo
        .layer
        .query(&UsersTable::list_statement(), demo.table.list())
        .await
        .context("list users")?;
    demo.record("list users", before, format!("rows={}", all.rows_affected));

    let before = demo.table.executions();
    let update = UsersTable::update_statement(1, "renamed");
    let table = Arc::clone(&demo.table);
    let affected = demo
        .layer
        .write(WriteKind::Update, &update, || async move {
            table.rename(1, "renamed").await
        })
        .await
        .context("rename user 1")?;
    demo.layer.flush().await;
    demo.record_outcome(
        "rename user 1",
        "write",
        demo.table.executions() - before,
        format!("affected={}", affected),
    );

    let before = demo.table.executions();
    let all = demo
        .layer
        .query(&UsersTable::list_statement(), demo.table.list())
        .await
        .context("list users after rename")?;
    let renamed = all.dest.iter().any(|u| u.name == "renamed");
    demo.record(
        "list users after rename",
        before,
        format!("rows={} renamed_visible={}", all.rows_affected, renamed),
    );

    let before = demo.table.executions();
    let stmt = UsersTable::find_statement(2);
    let reads = join_all(
        (0..args.concurrency.max(1)).map(|_| demo.layer.query(&stmt, demo.table.find(2))),
    )
    .await;
    let served = reads.iter().filter(|r| r.is_ok()).count();
    let executions = demo.table.executions() - before;
    demo.record_outcome(
        &format!("{} concurrent reads of user 2", reads.len()),
        "coalesced",
        executions,
        format!("served={}", served),
    );

    demo.layer.shutdown().await;
    let stats = demo.layer.stats().snapshot();

    if ctx.output.is_json() {
        ctx.output.json(&DemoReport {
            steps: demo.steps,
            stats,
        });
        return Ok(());
    }

    ctx.output.header("Cache statistics");
    ctx.output.kv("hits", &stats.hits.to_string());
    ctx.output.kv("misses", &stats.misses.to_string());
    ctx.output.kv("hit rate", &format_ratio(stats.hit_rate));
    ctx.output.kv("executions", &stats.executions.to_string());
    ctx.output.kv("coalesced", &stats.coalesced.to_string());
    ctx.output.kv("stores", &stats.stores.to_string());
    ctx.output.kv("evictions", &stats.evictions.to_string());
    if stats.store_failures + stats.eviction_failures > 0 {
        ctx.output.warn(&format!(
            "{} store and {} eviction failure(s)",
            stats.store_failures, stats.eviction_failures
        ));
    }
    ctx.output.success("Demo complete");

    Ok(())
}
