//! Backforge CLI - command-line access to the data layer.
//!
//! The main entry point for the `backforge` CLI binary.

use anyhow::Result;
use clap::Parser;

use backforge_cli::{Cli, Commands, Context, commands};
use backforge_core::{Config, DataLayer, init_logging, metrics};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Logs go to stderr so stdout stays parseable.
    init_logging(config.log_format);
    metrics::register_metrics();

    let ctx = Context {
        layer: DataLayer::from_config(&config)?,
        tenant: cli.tenant_id()?,
        format: cli.format,
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::Query(args) => commands::query::execute(args, &ctx).await,
            Commands::CreateTable(args) => commands::schema::create_table(args, &ctx).await,
            Commands::AddColumn(args) => commands::schema::add_column(args, &ctx).await,
            Commands::Relate(args) => commands::schema::relate(args, &ctx).await,
            Commands::Namespace(args) => commands::schema::namespace(args, &ctx).await,
        }
    })
}
