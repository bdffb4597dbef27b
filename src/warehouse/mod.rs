//! Analytical table access: schema description, merge rendering and the
//! backend trait the loader drives.

pub mod postgres;

pub use postgres::PgWarehouse;

use crate::error::{EtlError, EtlResult};
use crate::models::MatchStatRow;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Timestamp,
    Integer,
    Boolean,
}

impl ColumnType {
    pub fn pg_type(self) -> &'static str {
        match self {
            Self::String => "TEXT",
            Self::Timestamp => "TIMESTAMPTZ",
            Self::Integer => "BIGINT",
            Self::Boolean => "BOOLEAN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub primary_key: Vec<&'static str>,
}

impl TableSchema {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }

    pub fn with_primary_key(mut self, key: &[&'static str]) -> Self {
        self.primary_key = key.to_vec();
        self
    }
}

impl MatchStatRow {
    /// Column layout shared by the staging and permanent tables.
    pub fn schema() -> TableSchema {
        use ColumnType::*;
        let col = |name, ty| Column { name, ty };
        TableSchema {
            columns: vec![
                col("player_riot_id", String),
                col("match_id", String),
                col("game_timestamp", Timestamp),
                col("champion", String),
                col("kills", Integer),
                col("deaths", Integer),
                col("assists", Integer),
                col("win", Boolean),
                col("game_duration", Integer),
            ],
            primary_key: Vec::new(),
        }
    }
}

/// Validated `dataset.table` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub dataset: String,
    pub table: String,
}

fn valid_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    s.len() <= 63 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TableRef {
    pub fn new(dataset: &str, table: &str) -> EtlResult<Self> {
        for ident in [dataset, table] {
            if !valid_ident(ident) {
                return Err(EtlError::config(format!("invalid SQL identifier {ident:?}")));
            }
        }
        Ok(Self {
            dataset: dataset.to_string(),
            table: table.to_string(),
        })
    }

    /// Quoted `"dataset"."table"`.
    pub fn qualified(&self) -> String {
        format!("\"{}\".\"{}\"", self.dataset, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

/// Which columns identify a row for upsert purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeKey {
    /// One row per match
    Match,
    /// One row per (match, player)
    #[default]
    MatchPlayer,
}

impl MergeKey {
    pub fn columns(self) -> &'static [&'static str] {
        match self {
            Self::Match => &["match_id"],
            Self::MatchPlayer => &["match_id", "player_riot_id"],
        }
    }

    pub fn key_of(self, row: &MatchStatRow) -> RowKey {
        RowKey {
            match_id: row.match_id.clone(),
            player_riot_id: match self {
                Self::Match => None,
                Self::MatchPlayer => Some(row.player_riot_id.clone()),
            },
        }
    }
}

impl FromStr for MergeKey {
    type Err = EtlError;

    fn from_str(s: &str) -> EtlResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "match" | "match_id" => Ok(Self::Match),
            "match_player" | "match_id,player_riot_id" => Ok(Self::MatchPlayer),
            other => Err(EtlError::config(format!("unknown merge key {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowKey {
    pub match_id: String,
    pub player_riot_id: Option<String>,
}

/// Staging -> permanent upsert.
#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub target: TableRef,
    pub staging: TableRef,
    pub schema: TableSchema,
    pub key: MergeKey,
}

impl MergeSpec {
    /// Render a `MERGE` statement: matched rows are updated in place, the rest inserted.
    pub fn to_sql(&self) -> String {
        let key_cols = self.key.columns();
        let on = key_cols
            .iter()
            .map(|c| format!("t.{c} = s.{c}"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let set = self
            .schema
            .column_names()
            .filter(|c| !key_cols.contains(c))
            .map(|c| format!("{c} = s.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        let cols: Vec<&str> = self.schema.column_names().collect();
        let values = cols
            .iter()
            .map(|c| format!("s.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "MERGE INTO {target} AS t\n\
             USING {staging} AS s\n\
             ON {on}\n\
             WHEN MATCHED THEN\n  UPDATE SET {set}\n\
             WHEN NOT MATCHED THEN\n  INSERT ({cols}) VALUES ({values})",
            target = self.target.qualified(),
            staging = self.staging.qualified(),
            cols = cols.join(", "),
        )
    }
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create the table when it does not exist yet.
    async fn ensure_table(&self, table: &TableRef, schema: &TableSchema) -> EtlResult<()>;

    /// Drop-if-exists, then create.
    async fn recreate_table(&self, table: &TableRef, schema: &TableSchema) -> EtlResult<()>;

    async fn insert_rows(&self, table: &TableRef, rows: &[MatchStatRow]) -> EtlResult<u64>;

    /// Run the merge and wait for it to finish. Returns affected rows.
    async fn merge(&self, spec: &MergeSpec) -> EtlResult<u64>;

    /// Keys already present in `table` among the given match ids.
    async fn existing_keys(
        &self,
        table: &TableRef,
        key: MergeKey,
        match_ids: &[String],
    ) -> EtlResult<HashSet<RowKey>>;

    /// Missing tables are not an error.
    async fn drop_table(&self, table: &TableRef) -> EtlResult<()>;
}
