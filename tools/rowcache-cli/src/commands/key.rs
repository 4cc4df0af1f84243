//! Show the cache key and eviction prefix derived for a statement.

use anyhow::Result;
use rowcache::{
    BoundArg, ColumnRef, FilterExpr, KeyBuilder, RowIdentity, Statement, TableSchema,
};
use serde::Serialize;

use super::KeyArgs;
use crate::context::Context;

#[derive(Serialize)]
struct KeyReport {
    identity: String,
    key: String,
    prefix: String,
    table_prefix: String,
}

/// Run the key command.
pub async fn run(args: KeyArgs, ctx: &Context) -> Result<()> {
    let instance = args
        .instance
        .clone()
        .unwrap_or_else(|| ctx.config.cache.instance_id.clone());
    let stmt = build_statement(&args);

    let identity = RowIdentity::for_read(&stmt);
    let keys = KeyBuilder::new(instance);
    let report = KeyReport {
        identity: identity.segment(),
        key: keys.read_key(&stmt, &identity).into_string(),
        prefix: keys.prefix(stmt.table_name(), &identity),
        table_prefix: keys.table(stmt.table_name()),
    };

    if ctx.output.is_json() {
        ctx.output.json(&report);
        return Ok(());
    }

    ctx.output.header("Cache key");
    ctx.output.kv("identity", &report.identity);
    ctx.output.kv("key", &report.key);
    ctx.output.kv("prefix", &report.prefix);
    ctx.output.kv("table prefix", &report.table_prefix);
    Ok(())
}

fn build_statement(args: &KeyArgs) -> Statement {
    let bound: Vec<BoundArg> = args.args.iter().map(|a| parse_arg(a)).collect();

    let mut stmt = Statement::new(args.table.as_str())
        .with_schema(TableSchema::new(args.table.as_str()).with_primary_key(args.pk.as_str()))
        .sql(args.sql.as_str())
        .args(bound.clone());

    if let Some(value) = &args.pk_eq {
        stmt = stmt.filter(FilterExpr::eq(ColumnRef::PrimaryKey, parse_arg(value)));
    }
    if let Some(raw) = &args.raw_where {
        stmt = stmt.filter(FilterExpr::raw(raw.as_str(), bound));
    }
    if args.limit_one {
        stmt = stmt.limit(1);
    }
    stmt
}

/// Interpret a command-line argument as the most specific bound value.
fn parse_arg(raw: &str) -> BoundArg {
    if let Ok(i) = raw.parse::<i64>() {
        return BoundArg::Int(i);
    }
    if let Some(f) = raw.parse::<f64>().ok().filter(|f| f.is_finite()) {
        return BoundArg::Float(f);
    }
    match raw {
        "true" => BoundArg::Bool(true),
        "false" => BoundArg::Bool(false),
        "null" => BoundArg::Null,
        _ => BoundArg::Text(raw.to_string()),
    }
}
