//! Query command - run a record operation through the data layer.

use anyhow::{Context as _, Result};
use clap::Args;
use serde_json::{Map, Value, json};

use crate::{Context, OutputFormat};

/// Arguments for the query command.
#[derive(Debug, Args)]
pub struct QueryArgs {
    /// Table to query.
    #[arg()]
    pub table: String,

    /// Operation: select, insert, update or delete.
    #[arg(long, short = 'm', default_value = "select")]
    pub method: String,

    /// Equality filter `column=value` (repeatable). Values are parsed as
    /// JSON when possible, otherwise taken as strings.
    #[arg(long = "where", short = 'w')]
    pub filters: Vec<String>,

    /// Payload for writes: a JSON object or array of objects.
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Sort column, optionally suffixed `:desc`.
    #[arg(long)]
    pub order_by: Option<String>,

    /// Maximum number of rows.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Rows to skip.
    #[arg(long)]
    pub offset: Option<usize>,
}

impl QueryArgs {
    /// Builds the options object accepted by `DataLayer::query_options`.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed filters or payload JSON.
    pub fn options(&self) -> Result<Value> {
        let mut filters = Map::new();
        for filter in &self.filters {
            let (column, value) = filter
                .split_once('=')
                .with_context(|| format!("filter '{filter}' must look like column=value"))?;
            filters.insert(column.trim().to_string(), parse_value(value.trim()));
        }

        let mut options = json!({ "method": self.method, "where": filters });
        if let Some(data) = &self.data {
            options["data"] = serde_json::from_str(data).context("Failed to parse --data JSON")?;
        }
        if let Some(order_by) = &self.order_by {
            let (column, direction) = order_by
                .split_once(':')
                .unwrap_or((order_by.as_str(), "asc"));
            options["orderBy"] = json!({ "column": column, "direction": direction });
        }
        if let Some(limit) = self.limit {
            options["limit"] = json!(limit);
        }
        if let Some(offset) = self.offset {
            options["offset"] = json!(offset);
        }
        Ok(options)
    }
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Execute the query command.
///
/// # Errors
///
/// Returns an error if the arguments are malformed or both backends fail.
pub async fn execute(args: QueryArgs, ctx: &Context) -> Result<()> {
    let options = args.options()?;
    let rows = ctx
        .layer
        .query_options(&args.table, &options, ctx.tenant.as_ref())
        .await?;

    match ctx.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No rows");
                return Ok(());
            }
            for row in &rows {
                println!("{}", serde_json::to_string(row)?);
            }
            println!();
            println!("{} row(s)", rows.len());
        }
    }
    Ok(())
}
