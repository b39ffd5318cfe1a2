//! Table definitions and the DDL statements that realise them remotely.
//!
//! Statements are plain strings sent through the remote backend's raw
//! statement endpoint. Every identifier is validated with
//! [`validate_identifier`] before it is interpolated, and quoted on output.
//! Column defaults go through [`validate_default`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::{CREATED_AT_COLUMN, ID_COLUMN};
use crate::tenant::Namespace;

/// Longest identifier PostgreSQL keeps without truncation.
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Validates a table or column name for use in queries and DDL.
///
/// # Errors
///
/// Returns `Error::InvalidId` unless the name matches
/// `[A-Za-z_][A-Za-z0-9_]*` and is at most 63 bytes.
pub fn validate_identifier(name: &str, field: &str) -> Result<()> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(Error::invalid_id(format!("{field} cannot be empty")));
    };

    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(Error::invalid_id(format!(
            "{field} '{name}' is too long (maximum {MAX_IDENTIFIER_LEN} characters)"
        )));
    }

    if !(first.is_ascii_alphabetic() || first == '_')
        || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(Error::invalid_id(format!(
            "{field} '{name}' contains invalid characters (allowed: letters, digits, '_', not starting with a digit)"
        )));
    }

    Ok(())
}

/// Functions accepted as column defaults, compared case-insensitively.
pub const DEFAULT_FUNCTIONS: [&str; 5] = [
    "now()",
    "current_timestamp",
    "current_date",
    "gen_random_uuid()",
    "'{}'::jsonb",
];

/// Validates a column default expression.
///
/// Accepted: `null`, `true`, `false`, numeric literals, single-quoted string
/// literals (quotes doubled inside) and the functions in
/// [`DEFAULT_FUNCTIONS`].
///
/// # Errors
///
/// Returns `Error::InvalidInput` for anything else.
pub fn validate_default(expr: &str) -> Result<()> {
    let expr = expr.trim();
    let lowered = expr.to_ascii_lowercase();
    let keyword = matches!(lowered.as_str(), "null" | "true" | "false");
    let function = DEFAULT_FUNCTIONS.contains(&lowered.as_str());
    let number = expr.parse::<f64>().is_ok_and(f64::is_finite);
    let string = expr.len() >= 2
        && expr.starts_with('\'')
        && expr.ends_with('\'')
        && !expr[1..expr.len() - 1].replace("''", "").contains('\'');

    if keyword || function || number || string {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "unsupported default '{expr}' (allowed: literals, {})",
            DEFAULT_FUNCTIONS.join(", ")
        )))
    }
}

/// Semantic column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Variable-length text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// Auto-incrementing integer.
    Serial,
    /// Arbitrary-precision number.
    Numeric,
    /// Boolean.
    Boolean,
    /// Timestamp with time zone.
    Timestamp,
    /// Calendar date.
    Date,
    /// JSON document.
    Json,
    /// UUID.
    Uuid,
}

impl ColumnType {
    /// Parses loose spellings; anything unrecognised becomes [`ColumnType::Text`].
    #[must_use]
    pub fn parse_lenient(spelling: &str) -> Self {
        match spelling.trim().to_ascii_lowercase().as_str() {
            "int" | "int4" | "integer" | "number" => Self::Integer,
            "bigint" | "int8" | "long" => Self::BigInt,
            "serial" | "bigserial" | "autoincrement" => Self::Serial,
            "numeric" | "decimal" | "float" | "double" | "real" | "money" => Self::Numeric,
            "bool" | "boolean" => Self::Boolean,
            "timestamp" | "timestamptz" | "datetime" => Self::Timestamp,
            "date" => Self::Date,
            "json" | "jsonb" | "object" | "array" => Self::Json,
            "uuid" => Self::Uuid,
            _ => Self::Text,
        }
    }

    /// SQL type name.
    #[must_use]
    pub fn sql(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Serial => "SERIAL",
            Self::Numeric => "NUMERIC",
            Self::Boolean => "BOOLEAN",
            Self::Timestamp => "TIMESTAMPTZ",
            Self::Date => "DATE",
            Self::Json => "JSONB",
            Self::Uuid => "UUID",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql())
    }
}

/// One column of a table definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    /// Column name.
    pub name: String,
    /// Semantic type.
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    /// Part of the primary key.
    #[serde(default)]
    pub primary_key: bool,
    /// Unique constraint.
    #[serde(default)]
    pub unique: bool,
    /// `NOT NULL` constraint.
    #[serde(default)]
    pub not_null: bool,
    /// Default expression, restricted by [`validate_default`].
    #[serde(default)]
    pub default: Option<String>,
}

impl ColumnDef {
    /// Creates an unconstrained column.
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            unique: false,
            not_null: false,
            default: None,
        }
    }

    /// Marks the column as primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as `NOT NULL`.
    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    /// Sets the default expression. Checked when the column is validated.
    #[must_use]
    pub fn default_sql(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Validates the name and default expression.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` for a bad name and `Error::InvalidInput`
    /// for a default [`validate_default`] refuses.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name, "column name")?;
        if let Some(default) = &self.default {
            validate_default(default)?;
        }
        Ok(())
    }

    fn sql(&self) -> String {
        let mut sql = format!("{} {}", quote(&self.name), self.column_type.sql());
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.unique && !self.primary_key {
            sql.push_str(" UNIQUE");
        }
        if self.not_null && !self.primary_key {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }
}

impl FromStr for ColumnDef {
    type Err = Error;

    /// Parses `name:type[:pk|unique|notnull]...`.
    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(':');
        let name = parts.next().unwrap_or_default().trim();
        validate_identifier(name, "column name")?;
        let column_type = parts
            .next()
            .map_or(ColumnType::Text, ColumnType::parse_lenient);

        let mut column = Self::new(name, column_type);
        for flag in parts {
            match flag.trim().to_ascii_lowercase().as_str() {
                "pk" | "primary" | "primary_key" => column.primary_key = true,
                "unique" => column.unique = true,
                "notnull" | "not_null" | "required" => column.not_null = true,
                other => {
                    return Err(Error::InvalidInput(format!(
                        "unknown column flag '{other}' for column '{name}'"
                    )));
                }
            }
        }
        Ok(column)
    }
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipKind {
    /// Each source row references at most one target row, and vice versa.
    OneToOne,
    /// One source row is referenced by many target rows.
    OneToMany,
    /// Many source rows reference one target row.
    ManyToOne,
    /// Materialised through a junction table.
    ManyToMany,
}

impl RelationshipKind {
    /// Canonical kebab-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one-to-one",
            Self::OneToMany => "one-to-many",
            Self::ManyToOne => "many-to-one",
            Self::ManyToMany => "many-to-many",
        }
    }
}

impl FromStr for RelationshipKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "one-to-one" | "1:1" | "onetoone" => Ok(Self::OneToOne),
            "one-to-many" | "1:n" | "onetomany" => Ok(Self::OneToMany),
            "many-to-one" | "n:1" | "manytoone" => Ok(Self::ManyToOne),
            "many-to-many" | "n:m" | "m:n" | "manytomany" => Ok(Self::ManyToMany),
            _ => Err(Error::InvalidInput(format!(
                "unknown relationship kind '{s}'"
            ))),
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Directed edge between two tables of the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    /// Source table.
    pub source_table: String,
    /// Source column.
    pub source_column: String,
    /// Target table.
    pub target_table: String,
    /// Target column.
    pub target_column: String,
    /// Cardinality.
    pub kind: RelationshipKind,
}

impl Relationship {
    /// Creates a relationship.
    ///
    /// Missing columns default the way generated schemas name them: the
    /// foreign key is `<other table>_id` on the owning side and the
    /// referenced column is `id`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` if any table or column name is invalid.
    pub fn new(
        source_table: &str,
        target_table: &str,
        kind: RelationshipKind,
        source_column: Option<&str>,
        target_column: Option<&str>,
    ) -> Result<Self> {
        validate_identifier(source_table, "source table")?;
        validate_identifier(target_table, "target table")?;

        let (source_column, target_column) = match kind {
            RelationshipKind::OneToMany => (
                source_column.unwrap_or(ID_COLUMN).to_string(),
                target_column.map_or_else(|| format!("{source_table}_id"), str::to_string),
            ),
            RelationshipKind::ManyToOne | RelationshipKind::OneToOne => (
                source_column.map_or_else(|| format!("{target_table}_id"), str::to_string),
                target_column.unwrap_or(ID_COLUMN).to_string(),
            ),
            RelationshipKind::ManyToMany => (
                source_column.unwrap_or(ID_COLUMN).to_string(),
                target_column.unwrap_or(ID_COLUMN).to_string(),
            ),
        };
        validate_identifier(&source_column, "source column")?;
        validate_identifier(&target_column, "target column")?;

        Ok(Self {
            source_table: source_table.to_string(),
            source_column,
            target_table: target_table.to_string(),
            target_column,
            kind,
        })
    }

    /// Name of the junction table for many-to-many relationships.
    #[must_use]
    pub fn junction_table(&self) -> String {
        format!("{}_{}", self.source_table, self.target_table)
    }

    /// Foreign key columns of the junction table, source side first.
    ///
    /// A table related to itself gets `source_`/`target_` prefixes so the
    /// two columns stay distinct.
    #[must_use]
    pub fn junction_keys(&self) -> (String, String) {
        if self.source_table == self.target_table {
            (
                format!("source_{}_id", self.source_table),
                format!("target_{}_id", self.target_table),
            )
        } else {
            (
                format!("{}_id", self.source_table),
                format!("{}_id", self.target_table),
            )
        }
    }

    /// Column definitions of the junction table: both keys, together the
    /// composite primary key.
    #[must_use]
    pub fn junction_columns(&self) -> Vec<ColumnDef> {
        let (source_fk, target_fk) = self.junction_keys();
        vec![
            ColumnDef::new(source_fk, ColumnType::Integer).primary_key(),
            ColumnDef::new(target_fk, ColumnType::Integer).primary_key(),
        ]
    }

    /// Definition of the junction table, exactly as [`relationship_sql`]
    /// creates it.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` if a generated name is not a valid
    /// identifier (too long, for instance).
    pub fn junction_definition(&self) -> Result<TableDef> {
        TableDef::exact(&self.junction_table(), self.junction_columns())
    }
}

/// A table and its columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// Ordered columns.
    pub columns: Vec<ColumnDef>,
    /// Relationships originating at this table.
    #[serde(default)]
    pub relationships: Vec<Relationship>,
}

impl TableDef {
    /// Creates a definition, adding the implicit `id` and `created_at`
    /// columns when the caller did not declare them.
    ///
    /// No `id` is added when another column is declared primary key.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidId` for invalid names and `Error::InvalidInput`
    /// for duplicate columns.
    pub fn new(name: &str, columns: Vec<ColumnDef>) -> Result<Self> {
        let mut table = Self::exact(name, columns)?;

        let mut all = Vec::with_capacity(table.columns.len() + 2);
        if !table
            .columns
            .iter()
            .any(|c| c.name == ID_COLUMN || c.primary_key)
        {
            all.push(ColumnDef::new(ID_COLUMN, ColumnType::Serial).primary_key());
        }
        all.append(&mut table.columns);
        if !all.iter().any(|c| c.name == CREATED_AT_COLUMN) {
            all.push(ColumnDef::new(CREATED_AT_COLUMN, ColumnType::Timestamp).default_sql("now()"));
        }
        table.columns = all;
        Ok(table)
    }

    /// Creates a definition with exactly the given columns.
    ///
    /// # Errors
    ///
    /// Same as [`TableDef::new`].
    pub fn exact(name: &str, columns: Vec<ColumnDef>) -> Result<Self> {
        validate_identifier(name, "table name")?;
        let mut seen = std::collections::HashSet::new();
        for column in &columns {
            column.validate()?;
            if !seen.insert(column.name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate column '{}' in table '{name}'",
                    column.name
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            columns,
            relationships: Vec::new(),
        })
    }

    /// Columns forming the primary key, in declaration order.
    #[must_use]
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Returns a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Quotes an identifier that already passed [`validate_identifier`].
fn quote(ident: &str) -> String {
    format!("\"{ident}\"")
}

fn qualified(namespace: &Namespace, table: &str) -> String {
    format!("{}.{}", quote(&namespace.schema_name()), quote(table))
}

/// `CREATE SCHEMA IF NOT EXISTS` for a namespace.
#[must_use]
pub fn create_schema_sql(namespace: &Namespace) -> String {
    format!(
        "CREATE SCHEMA IF NOT EXISTS {}",
        quote(&namespace.schema_name())
    )
}

/// `CREATE TABLE IF NOT EXISTS` for a definition.
#[must_use]
pub fn create_table_sql(namespace: &Namespace, table: &TableDef) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(ColumnDef::sql).collect();

    let declared_pk = table.primary_key();
    if declared_pk.len() > 1 {
        // Composite key: move PRIMARY KEY from the columns to a table constraint.
        parts = table
            .columns
            .iter()
            .map(|c| {
                ColumnDef {
                    primary_key: false,
                    not_null: c.not_null || c.primary_key,
                    ..c.clone()
                }
                .sql()
            })
            .collect();
        let key: Vec<String> = declared_pk.iter().map(|c| quote(c)).collect();
        parts.push(format!("PRIMARY KEY ({})", key.join(", ")));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        qualified(namespace, &table.name),
        parts.join(", ")
    )
}

/// `ALTER TABLE … ADD COLUMN IF NOT EXISTS`.
#[must_use]
pub fn add_column_sql(namespace: &Namespace, table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
        qualified(namespace, table),
        column.sql()
    )
}

/// Statements materialising a relationship, in execution order.
#[must_use]
pub fn relationship_sql(namespace: &Namespace, rel: &Relationship) -> Vec<String> {
    match rel.kind {
        RelationshipKind::ManyToMany => {
            let (source_fk, target_fk) = rel.junction_keys();
            let junction = rel.junction_table();
            vec![format!(
                "CREATE TABLE IF NOT EXISTS {} ({} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE, \
                 {} INTEGER NOT NULL REFERENCES {} ({}) ON DELETE CASCADE, PRIMARY KEY ({}, {}))",
                qualified(namespace, &junction),
                quote(&source_fk),
                qualified(namespace, &rel.source_table),
                quote(&rel.source_column),
                quote(&target_fk),
                qualified(namespace, &rel.target_table),
                quote(&rel.target_column),
                quote(&source_fk),
                quote(&target_fk),
            )]
        }
        RelationshipKind::OneToMany => {
            // The target rows own the foreign key.
            foreign_key_sql(
                namespace,
                &rel.target_table,
                &rel.target_column,
                &rel.source_table,
                &rel.source_column,
                false,
            )
        }
        RelationshipKind::ManyToOne | RelationshipKind::OneToOne => foreign_key_sql(
            namespace,
            &rel.source_table,
            &rel.source_column,
            &rel.target_table,
            &rel.target_column,
            rel.kind == RelationshipKind::OneToOne,
        ),
    }
}

fn foreign_key_sql(
    namespace: &Namespace,
    owner: &str,
    owner_column: &str,
    referenced: &str,
    referenced_column: &str,
    unique: bool,
) -> Vec<String> {
    let owner_table = qualified(namespace, owner);
    let mut statements = vec![
        format!(
            "ALTER TABLE {owner_table} ADD COLUMN IF NOT EXISTS {} INTEGER",
            quote(owner_column)
        ),
        format!(
            "ALTER TABLE {owner_table} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote(&format!("fk_{owner}_{owner_column}")),
            quote(owner_column),
            qualified(namespace, referenced),
            quote(referenced_column),
        ),
    ];
    if unique {
        statements.push(format!(
            "ALTER TABLE {owner_table} ADD CONSTRAINT {} UNIQUE ({})",
            quote(&format!("uq_{owner}_{owner_column}")),
            quote(owner_column),
        ));
    }
    statements
}
