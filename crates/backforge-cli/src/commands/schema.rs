//! Schema commands - namespaces, tables, columns and relationships.

use anyhow::{Context as _, Result};
use backforge_core::{ColumnDef, RelationshipKind};
use clap::Args;

use crate::{Context, print_outcome};

/// Arguments for the create-table command.
#[derive(Debug, Args)]
pub struct CreateTableArgs {
    /// Table name.
    #[arg()]
    pub table: String,

    /// Column as `name:type[:pk|unique|notnull]` (repeatable).
    #[arg(long = "column", short = 'c')]
    pub columns: Vec<String>,
}

/// Arguments for the add-column command.
#[derive(Debug, Args)]
pub struct AddColumnArgs {
    /// Table name.
    #[arg()]
    pub table: String,

    /// Column as `name:type[:unique|notnull]`.
    #[arg()]
    pub column: String,
}

/// Arguments for the relate command.
#[derive(Debug, Args)]
pub struct RelateArgs {
    /// Source table.
    #[arg()]
    pub source: String,

    /// Target table.
    #[arg()]
    pub target: String,

    /// Cardinality: one-to-one, one-to-many, many-to-one or many-to-many.
    #[arg(long, short = 'k', default_value = "one-to-many")]
    pub kind: String,

    /// Column on the source side (defaults by cardinality).
    #[arg(long)]
    pub source_column: Option<String>,

    /// Column on the target side (defaults by cardinality).
    #[arg(long)]
    pub target_column: Option<String>,
}

/// Arguments for the namespace command.
#[derive(Debug, Args)]
pub struct NamespaceArgs {}

fn parse_columns(specs: &[String]) -> Result<Vec<ColumnDef>> {
    specs
        .iter()
        .map(|spec| {
            spec.parse::<ColumnDef>()
                .with_context(|| format!("invalid column '{spec}'"))
        })
        .collect()
}

/// Execute the create-table command.
///
/// # Errors
///
/// Returns an error if a column spec is malformed.
pub async fn create_table(args: CreateTableArgs, ctx: &Context) -> Result<()> {
    let columns = parse_columns(&args.columns)?;
    let outcome = ctx
        .layer
        .create_table(&args.table, columns, ctx.tenant.as_ref())
        .await;
    print_outcome(&outcome, ctx.format)
}

/// Execute the add-column command.
///
/// # Errors
///
/// Returns an error if the column spec is malformed.
pub async fn add_column(args: AddColumnArgs, ctx: &Context) -> Result<()> {
    let column: ColumnDef = args
        .column
        .parse()
        .with_context(|| format!("invalid column '{}'", args.column))?;
    let outcome = ctx
        .layer
        .add_column(&args.table, column, ctx.tenant.as_ref())
        .await;
    print_outcome(&outcome, ctx.format)
}

/// Execute the relate command.
///
/// # Errors
///
/// Returns an error if the relationship kind is unknown.
pub async fn relate(args: RelateArgs, ctx: &Context) -> Result<()> {
    let kind: RelationshipKind = args.kind.parse()?;
    let outcome = ctx
        .layer
        .create_relationship(
            &args.source,
            &args.target,
            kind,
            args.source_column.as_deref(),
            args.target_column.as_deref(),
            ctx.tenant.as_ref(),
        )
        .await;
    print_outcome(&outcome, ctx.format)
}

/// Execute the namespace command.
///
/// # Errors
///
/// Returns an error if no tenant was given.
pub async fn namespace(_args: NamespaceArgs, ctx: &Context) -> Result<()> {
    let tenant = ctx
        .tenant
        .as_ref()
        .context("Tenant is required. Set BACKFORGE_TENANT or use --tenant")?;
    let outcome = ctx.layer.create_namespace(tenant).await;
    print_outcome(&outcome, ctx.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use backforge_core::ColumnType;

    #[test]
    fn test_parse_columns() {
        let columns =
            parse_columns(&["title:text:notnull".to_string(), "done:bool".to_string()]).unwrap();
        assert_eq!(columns[0].name, "title");
        assert!(columns[0].not_null);
        assert_eq!(columns[1].column_type, ColumnType::Boolean);

        assert!(parse_columns(&["bad name:text".to_string()]).is_err());
    }
}
