//! # backforge-cli
//!
//! Operator command-line interface for the backforge data layer.
//!
//! ## Commands
//!
//! - `backforge query` - Run a select/insert/update/delete against a table
//! - `backforge create-table` - Create a table
//! - `backforge add-column` - Add a column to a table
//! - `backforge relate` - Create a relationship between two tables
//! - `backforge namespace` - Ensure a tenant namespace exists
//!
//! ## Configuration
//!
//! The data layer is configured from `BACKFORGE_*` environment variables
//! (see `backforge_core::config`). Without `BACKFORGE_REMOTE_URL` every
//! command runs against the in-process fallback store and reports it.
//!
//! - `BACKFORGE_TENANT` - Tenant for tenant-scoped tables

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use anyhow::Result;
use backforge_core::{DataLayer, SchemaOutcome, TenantId};
use clap::{Parser, Subcommand};

/// Backforge CLI - resilient data access from the command line.
#[derive(Debug, Parser)]
#[command(name = "backforge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Tenant owning tenant-scoped tables.
    #[arg(long, env = "BACKFORGE_TENANT")]
    pub tenant: Option<String>,

    /// Output format.
    #[arg(long, default_value = "text")]
    pub format: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Validated tenant, if one was given.
    ///
    /// # Errors
    ///
    /// Returns an error if the tenant ID is malformed.
    pub fn tenant_id(&self) -> Result<Option<TenantId>> {
        Ok(self.tenant.as_deref().map(TenantId::new).transpose()?)
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a query against a table.
    Query(commands::query::QueryArgs),
    /// Create a table.
    CreateTable(commands::schema::CreateTableArgs),
    /// Add a column to a table.
    AddColumn(commands::schema::AddColumnArgs),
    /// Create a relationship between two tables.
    Relate(commands::schema::RelateArgs),
    /// Ensure a tenant namespace exists.
    Namespace(commands::schema::NamespaceArgs),
}

/// Output format.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output.
    Json,
}

/// What every command runs against.
#[derive(Debug)]
pub struct Context {
    /// Data layer built from the environment.
    pub layer: DataLayer,
    /// Tenant from `--tenant`.
    pub tenant: Option<TenantId>,
    /// Output format.
    pub format: OutputFormat,
}

/// Prints a schema outcome in the chosen format.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn print_outcome(outcome: &SchemaOutcome, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(outcome)?),
        OutputFormat::Text => {
            let status = match (outcome.success, outcome.is_fallback) {
                (false, _) => "failed",
                (true, true) => "ok (fallback store only)",
                (true, false) => "ok",
            };
            println!("{status} [{}]", outcome.namespace);
            if let Some(message) = &outcome.message {
                println!("  {message}");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_global_flags() {
        let cli = Cli::parse_from([
            "backforge",
            "--tenant",
            "acme",
            "--format",
            "json",
            "query",
            "todos",
            "--where",
            "done=false",
        ]);

        assert_eq!(cli.tenant.as_deref(), Some("acme"));
        assert!(matches!(cli.format, OutputFormat::Json));
        assert_eq!(cli.tenant_id().unwrap().unwrap().schema_name(), "tenant_acme");
        assert!(matches!(cli.command, Commands::Query(_)));
    }

    #[test]
    fn test_cli_rejects_bad_tenant() {
        let cli = Cli::parse_from(["backforge", "--tenant", "a b", "namespace"]);
        assert!(cli.tenant_id().is_err());
    }
}
