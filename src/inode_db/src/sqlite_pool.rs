use crate::sqlite_inode::map_db_err;
use log::debug;
use ns_lib::{Extensible, NsError, NsResult, Pool, PoolManager};
use rusqlite::{params, Connection, OpenFlags};
use std::sync::Mutex;

/// Pool catalog kept in the `pools` table.
pub struct SqlitePoolManager {
    pub db_path: String,
    conn: Mutex<Connection>,
}

impl SqlitePoolManager {
    pub fn new(db_path: impl Into<String>) -> NsResult<Self> {
        let db_path = db_path.into();
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .map_err(|e| NsError::DbError(format!("open db failed: {}", e)))?;
        conn.execute_batch(
            "PRAGMA busy_timeout = 5000;
             CREATE TABLE IF NOT EXISTS pools (
                name TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                meta TEXT NOT NULL DEFAULT ''
             );",
        )
        .map_err(|e| NsError::DbError(format!("create schema failed: {}", e)))?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
        })
    }

    pub fn add_pool(&self, pool: &Pool) -> NsResult<()> {
        debug!("SqlitePoolManager: add pool {} ({})", pool.name, pool.pool_type);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO pools (name, type, meta) VALUES (?1, ?2, ?3)",
            params![pool.name, pool.pool_type, pool.meta.serialize()],
        )
        .map_err(map_db_err)?;
        Ok(())
    }

    pub fn delete_pool(&self, pool_name: &str) -> NsResult<()> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute("DELETE FROM pools WHERE name = ?1", params![pool_name])
            .map_err(map_db_err)?;
        if changed == 0 {
            return Err(NsError::NotFound(format!("pool {} not found", pool_name)));
        }
        Ok(())
    }
}

fn parse_pool(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn to_pool((name, pool_type, meta): (String, String, String)) -> NsResult<Pool> {
    Ok(Pool {
        name,
        pool_type,
        meta: Extensible::from_json_str(&meta)?,
    })
}

impl PoolManager for SqlitePoolManager {
    fn get_pools(&self) -> NsResult<Vec<Pool>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name, type, meta FROM pools ORDER BY name")
            .map_err(map_db_err)?;
        let rows = stmt
            .query_map([], parse_pool)
            .map_err(map_db_err)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(map_db_err)?;
        rows.into_iter().map(to_pool).collect()
    }

    fn get_pool(&self, pool_name: &str) -> NsResult<Pool> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, type, meta FROM pools WHERE name = ?1",
                params![pool_name],
                parse_pool,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    NsError::NotFound(format!("pool {} not found", pool_name))
                }
                _ => map_db_err(e),
            })?;
        to_pool(row)
    }
}
