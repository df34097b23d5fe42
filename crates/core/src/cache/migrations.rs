//! Versioned schema for the resource cache.
//!
//! Applied versions are recorded in `_migrations`; each pending step runs
//! inside its own transaction together with its bookkeeping row.

use tokio_rusqlite::{Connection, params};

use super::Error;

/// Schema steps in ascending version order.
const STEPS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_resources.sql"))];

fn applied_version(conn: &tokio_rusqlite::rusqlite::Connection) -> Result<i64, Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
    )?;
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?)
}

/// Bring the schema up to the newest version.
///
/// Returns the number of steps applied; zero when already current.
pub async fn run(conn: &Connection) -> Result<usize, Error> {
    conn.call(|conn| -> Result<usize, Error> {
        let current = applied_version(conn)?;
        let mut applied = 0;

        for (version, sql) in STEPS.iter().filter(|(v, _)| *v > current) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;

            tracing::debug!(version, "applied cache schema step");
            applied += 1;
        }

        Ok(applied)
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_creates_resources_table() {
        let conn = Connection::open_in_memory().await.unwrap();
        assert_eq!(run(&conn).await.unwrap(), STEPS.len());

        let columns: Vec<String> = conn
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('resources') ORDER BY cid")?;
                let names = stmt.query_map([], |row| row.get(0))?.collect::<Result<Vec<String>, _>>()?;
                Ok::<_, tokio_rusqlite::rusqlite::Error>(names)
            })
            .await
            .unwrap();

        assert_eq!(columns, vec!["url", "raw_content", "content_type", "fetched_at", "base64"]);
    }

    #[tokio::test]
    async fn test_rerun_applies_nothing() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        assert_eq!(run(&conn).await.unwrap(), 0);

        let version: i64 = conn
            .call(|conn| conn.query_row("SELECT MAX(version) FROM _migrations", [], |row| row.get(0)))
            .await
            .unwrap();
        assert_eq!(version, STEPS[STEPS.len() - 1].0);
    }
}
