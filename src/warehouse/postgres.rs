use super::{MergeKey, MergeSpec, RowKey, TableRef, TableSchema, Warehouse};
use crate::error::EtlResult;
use crate::models::MatchStatRow;
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions, PgSslMode},
    PgPool, QueryBuilder, Row,
};
use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Rows per INSERT statement (9 binds each, well under the 65535 bind limit).
const INSERT_CHUNK: usize = 1000;

/// Postgres-backed warehouse. Requires PostgreSQL 15+ for `MERGE`.
#[derive(Clone)]
pub struct PgWarehouse {
    pub pool: PgPool,
}

impl PgWarehouse {
    // SECURITY: never include raw DSNs in tracing spans (they may contain credentials).
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<Self> {
        let use_prepared = crate::util::env::env_flag("USE_PREPARED", false);
        let mut connect_options = PgConnectOptions::from_str(database_url)?;

        // Ensure TLS is enabled when DSN contains sslmode=require
        if database_url.contains("sslmode=require") && !database_url.contains("sslmode=disable") {
            connect_options = connect_options.ssl_mode(PgSslMode::Require);
        }

        if !use_prepared {
            // PgBouncer txn mode safe
            connect_options = connect_options.statement_cache_capacity(0);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(connect_options)
            .await?;
        info!("connected to warehouse db");
        Ok(Self { pool })
    }

    fn create_sql(table: &TableRef, schema: &TableSchema, if_not_exists: bool) -> String {
        let mut cols: Vec<String> = schema
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.ty.pg_type()))
            .collect();
        if !schema.primary_key.is_empty() {
            cols.push(format!("PRIMARY KEY ({})", schema.primary_key.join(", ")));
        }
        format!(
            "CREATE TABLE {}{} (\n  {}\n)",
            if if_not_exists { "IF NOT EXISTS " } else { "" },
            table.qualified(),
            cols.join(",\n  ")
        )
    }

    async fn ensure_schema(&self, table: &TableRef) -> EtlResult<()> {
        sqlx::raw_sql(&format!("CREATE SCHEMA IF NOT EXISTS \"{}\"", table.dataset))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn ensure_table(&self, table: &TableRef, schema: &TableSchema) -> EtlResult<()> {
        self.ensure_schema(table).await?;
        sqlx::raw_sql(&Self::create_sql(table, schema, true))
            .execute(&self.pool)
            .await?;
        debug!(%table, "ensured table");
        Ok(())
    }

    async fn recreate_table(&self, table: &TableRef, schema: &TableSchema) -> EtlResult<()> {
        self.ensure_schema(table).await?;
        self.drop_table(table).await?;
        sqlx::raw_sql(&Self::create_sql(table, schema, false))
            .execute(&self.pool)
            .await?;
        info!(%table, "created table");
        Ok(())
    }

    async fn insert_rows(&self, table: &TableRef, rows: &[MatchStatRow]) -> EtlResult<u64> {
        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK) {
            let mut qb: QueryBuilder<'_, sqlx::Postgres> = QueryBuilder::new(format!(
                "INSERT INTO {} (player_riot_id, match_id, game_timestamp, champion, kills, deaths, assists, win, game_duration) ",
                table.qualified()
            ));
            qb.push_values(chunk, |mut b, r| {
                b.push_bind(&r.player_riot_id)
                    .push_bind(&r.match_id)
                    .push_bind(r.game_timestamp)
                    .push_bind(&r.champion)
                    .push_bind(r.kills)
                    .push_bind(r.deaths)
                    .push_bind(r.assists)
                    .push_bind(r.win)
                    .push_bind(r.game_duration);
            });
            let res = qb.build().persistent(false).execute(&self.pool).await?;
            inserted += res.rows_affected();
        }
        info!(%table, inserted, "inserted rows");
        Ok(inserted)
    }

    async fn merge(&self, spec: &MergeSpec) -> EtlResult<u64> {
        let sql = spec.to_sql();
        debug!(%sql, "running merge");
        let res = sqlx::raw_sql(&sql).execute(&self.pool).await?;
        info!(
            target_table = %spec.target,
            affected = res.rows_affected(),
            "merge complete"
        );
        Ok(res.rows_affected())
    }

    async fn existing_keys(
        &self,
        table: &TableRef,
        key: MergeKey,
        match_ids: &[String],
    ) -> EtlResult<HashSet<RowKey>> {
        if match_ids.is_empty() {
            return Ok(HashSet::new());
        }
        let sql = format!(
            "SELECT match_id, player_riot_id FROM {} WHERE match_id = ANY($1)",
            table.qualified()
        );
        let rows = sqlx::query(&sql)
            .persistent(false)
            .bind(match_ids)
            .fetch_all(&self.pool)
            .await?;
        let mut out = HashSet::with_capacity(rows.len());
        for r in rows {
            let match_id: String = r.try_get("match_id")?;
            let player: String = r.try_get("player_riot_id")?;
            out.insert(RowKey {
                match_id,
                player_riot_id: match key {
                    MergeKey::Match => None,
                    MergeKey::MatchPlayer => Some(player),
                },
            });
        }
        Ok(out)
    }

    async fn drop_table(&self, table: &TableRef) -> EtlResult<()> {
        sqlx::raw_sql(&format!("DROP TABLE IF EXISTS {}", table.qualified()))
            .execute(&self.pool)
            .await?;
        debug!(%table, "dropped table");
        Ok(())
    }
}
