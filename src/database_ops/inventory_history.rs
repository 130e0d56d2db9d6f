use sqlx::{Connection, PgConnection};
use tracing::{info, instrument};

use crate::error::{PipelineError, Result};
use crate::models::InventoryCounts;
use crate::util::db::DbSettings;

pub const TABLE: &str = "inventory_history";

const CREATE_TABLE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_history (
    fetch_timestamp timestamp NOT NULL,
    sold            int       NOT NULL,
    available       int       NOT NULL,
    unavailable     int       NOT NULL,
    pending         int       NOT NULL
)
"#;

// The timestamp comes from the server clock, never from the caller.
const INSERT_SQL: &str = r#"
INSERT INTO inventory_history (fetch_timestamp, sold, available, unavailable, pending)
VALUES (now(), $1, $2, $3, $4)
"#;

/// Create `inventory_history` if it does not exist yet. Only called when
/// AUTO_MIGRATE is on; production runs against a pre-provisioned table.
#[instrument(skip(settings), fields(host = %settings.host, db = %settings.dbname))]
pub async fn ensure_schema(settings: &DbSettings) -> Result<()> {
    let mut conn = settings.connect().await?;
    sqlx::query(CREATE_TABLE_SQL).execute(&mut conn).await?;
    conn.close().await?;
    info!(table = TABLE, "schema ensured");
    Ok(())
}

/// Insert one row on an already-open connection inside its own transaction.
/// If anything fails the transaction is dropped, which rolls it back.
pub async fn insert_counts(conn: &mut PgConnection, stats: &InventoryCounts) -> Result<()> {
    let mut tx = conn.begin().await?;
    let inserted = sqlx::query(INSERT_SQL)
        .bind(stats.sold)
        .bind(stats.available)
        .bind(stats.unavailable)
        .bind(stats.pending)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if inserted != 1 {
        return Err(PipelineError::Database(sqlx::Error::Protocol(format!(
            "expected 1 row inserted into {TABLE}, got {inserted}"
        ))));
    }
    tx.commit().await?;
    Ok(())
}

/// Append one timestamped row of normalized counts.
///
/// Opens a dedicated connection, writes a single row and closes the
/// connection again. Errors propagate as-is; a dropped connection on the
/// error path takes any open transaction with it.
#[instrument(skip(stats, settings), fields(host = %settings.host, db = %settings.dbname))]
pub async fn persist(stats: &InventoryCounts, settings: &DbSettings) -> Result<()> {
    let mut conn = settings.connect().await?;
    insert_counts(&mut conn, stats).await?;
    conn.close().await?;
    info!(
        sold = stats.sold,
        available = stats.available,
        unavailable = stats.unavailable,
        pending = stats.pending,
        "Data has been inserted to the database."
    );
    Ok(())
}
