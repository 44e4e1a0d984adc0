use log::{debug, warn};
use ns_lib::{
    s_isdir, unix_timestamp, Acl, ExtendedStat, Extensible, FileStatus, INode, INodeDir, InodeId,
    NsError, NsResult, Replica, ReplicaStatus, ReplicaType, Stat, SymLink, Utimbuf, ROOT_PARENT,
    S_IFDIR,
};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const ENTRY_COLUMNS: &str = "inode, parent, name, mode, uid, gid, size, nlink, atime, mtime, ctime, \
     status, guid, csumtype, csumvalue, acl, xattr";

const REPLICA_COLUMNS: &str = "replica_id, inode, nbaccesses, atime, ptime, ltime, status, rtype, \
     server, rfn, meta";

/// INode backend stored in a single SQLite database.
pub struct SqliteINode {
    pub db_path: String,
    conn: Mutex<Connection>,
    in_txn: AtomicBool,
}

impl SqliteINode {
    pub fn new(db_path: impl Into<String>) -> NsResult<Self> {
        let db_path = db_path.into();
        debug!("SqliteINode: open db {}", db_path);
        let conn = Connection::open_with_flags(
            &db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )
        .map_err(|e| {
            warn!("SqliteINode: open db failed! {}", e);
            NsError::DbError(format!("open db failed: {}", e))
        })?;
        Self::from_connection(db_path, conn)
    }

    pub fn open_in_memory() -> NsResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| NsError::DbError(format!("open db failed: {}", e)))?;
        Self::from_connection(":memory:".to_string(), conn)
    }

    fn from_connection(db_path: String, conn: Connection) -> NsResult<Self> {
        Self::init_connection(&conn)?;
        Self::create_schema(&conn)?;
        Self::ensure_root_dir(&conn)?;
        Ok(Self {
            db_path,
            conn: Mutex::new(conn),
            in_txn: AtomicBool::new(false),
        })
    }

    fn init_connection(conn: &Connection) -> NsResult<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| NsError::DbError(format!("pragma failed: {}", e)))?;
        Ok(())
    }

    fn create_schema(conn: &Connection) -> NsResult<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                inode INTEGER PRIMARY KEY AUTOINCREMENT,
                parent INTEGER NOT NULL,
                name TEXT NOT NULL,
                mode INTEGER NOT NULL,
                uid INTEGER NOT NULL,
                gid INTEGER NOT NULL,
                size INTEGER NOT NULL DEFAULT 0,
                nlink INTEGER NOT NULL DEFAULT 0,
                atime INTEGER NOT NULL,
                mtime INTEGER NOT NULL,
                ctime INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT '-',
                guid TEXT NOT NULL DEFAULT '',
                csumtype TEXT NOT NULL DEFAULT '',
                csumvalue TEXT NOT NULL DEFAULT '',
                acl TEXT NOT NULL DEFAULT '',
                xattr TEXT NOT NULL DEFAULT '',
                UNIQUE (parent, name)
            );

            CREATE TABLE IF NOT EXISTS symlinks (
                inode INTEGER PRIMARY KEY,
                link TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS comments (
                inode INTEGER PRIMARY KEY,
                comment TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS replicas (
                replica_id INTEGER PRIMARY KEY AUTOINCREMENT,
                inode INTEGER NOT NULL,
                nbaccesses INTEGER NOT NULL DEFAULT 0,
                atime INTEGER NOT NULL,
                ptime INTEGER NOT NULL,
                ltime INTEGER NOT NULL,
                status TEXT NOT NULL,
                rtype TEXT NOT NULL,
                server TEXT NOT NULL,
                rfn TEXT NOT NULL UNIQUE,
                meta TEXT NOT NULL DEFAULT ''
            );

            CREATE INDEX IF NOT EXISTS idx_replicas_inode ON replicas(inode);",
        )
        .map_err(|e| NsError::DbError(format!("create schema failed: {}", e)))?;
        Ok(())
    }

    fn ensure_root_dir(conn: &Connection) -> NsResult<InodeId> {
        let existing = conn
            .query_row(
                "SELECT inode FROM entries WHERE parent = ?1 AND name = '/'",
                params![ROOT_PARENT as i64],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map_err(map_db_err)?;
        if let Some(inode) = existing {
            return Ok(inode as InodeId);
        }

        let now = unix_timestamp();
        conn.execute(
            "INSERT INTO entries (parent, name, mode, uid, gid, size, nlink, atime, mtime, ctime)
             VALUES (?1, '/', ?2, 0, 0, 0, 0, ?3, ?3, ?3)",
            params![ROOT_PARENT as i64, (S_IFDIR | 0o755) as i64, now],
        )
        .map_err(map_db_err)?;
        let inode = conn.last_insert_rowid() as InodeId;
        debug!("SqliteINode: created root directory, inode {}", inode);
        Ok(inode)
    }

    fn with_conn<T, F>(&self, f: F) -> NsResult<T>
    where
        F: FnOnce(&Connection) -> NsResult<T>,
    {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }

    /// Runs `f` under a savepoint so that multi-statement updates are atomic
    /// whether or not the caller opened a transaction.
    fn atomically<T, F>(&self, f: F) -> NsResult<T>
    where
        F: FnOnce(&Connection) -> NsResult<T>,
    {
        self.with_conn(|conn| {
            conn.execute_batch("SAVEPOINT inode_op")
                .map_err(map_db_err)?;
            match f(conn) {
                Ok(v) => {
                    conn.execute_batch("RELEASE inode_op").map_err(map_db_err)?;
                    Ok(v)
                }
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK TO inode_op; RELEASE inode_op");
                    Err(e)
                }
            }
        })
    }

    fn load_entry(conn: &Connection, inode: InodeId) -> NsResult<ExtendedStat> {
        conn.query_row(
            &format!("SELECT {} FROM entries WHERE inode = ?1", ENTRY_COLUMNS),
            params![inode as i64],
            parse_entry,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                NsError::NotFound(format!("inode {} not found", inode))
            }
            _ => map_db_err(e),
        })
    }

    fn load_entry_by_name(conn: &Connection, parent: InodeId, name: &str) -> NsResult<ExtendedStat> {
        conn.query_row(
            &format!(
                "SELECT {} FROM entries WHERE parent = ?1 AND name = ?2",
                ENTRY_COLUMNS
            ),
            params![parent as i64, name],
            parse_entry,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                NsError::NotFound(format!("'{}' not found under inode {}", name, parent))
            }
            _ => map_db_err(e),
        })
    }

    fn load_replica(conn: &Connection, sql_where: &str, key: &dyn rusqlite::ToSql) -> NsResult<Replica> {
        conn.query_row(
            &format!("SELECT {} FROM replicas WHERE {}", REPLICA_COLUMNS, sql_where),
            [key],
            parse_replica,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => {
                NsError::NotFound("replica not found".to_string())
            }
            _ => map_db_err(e),
        })
    }

    fn adjust_nlink(conn: &Connection, inode: InodeId, delta: i64, now: i64) -> NsResult<()> {
        if inode == ROOT_PARENT {
            return Ok(());
        }
        conn.execute(
            "UPDATE entries SET nlink = MAX(nlink + ?1, 0), mtime = ?2, ctime = ?2 WHERE inode = ?3",
            params![delta, now, inode as i64],
        )
        .map_err(map_db_err)?;
        Ok(())
    }

    fn check_updated(changed: usize, inode: InodeId) -> NsResult<()> {
        if changed == 0 {
            return Err(NsError::NotFound(format!("inode {} not found", inode)));
        }
        Ok(())
    }
}

impl INode for SqliteINode {
    fn begin(&self) -> NsResult<()> {
        if self
            .in_txn
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(NsError::InvalidState(
                "a transaction is already open".to_string(),
            ));
        }
        let result = self.with_conn(|conn| conn.execute_batch("BEGIN IMMEDIATE").map_err(map_db_err));
        if result.is_err() {
            self.in_txn.store(false, Ordering::SeqCst);
        }
        result
    }

    fn commit(&self) -> NsResult<()> {
        if !self.in_txn.load(Ordering::SeqCst) {
            return Err(NsError::InvalidState("no transaction to commit".to_string()));
        }
        self.with_conn(|conn| conn.execute_batch("COMMIT").map_err(map_db_err))?;
        self.in_txn.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn rollback(&self) -> NsResult<()> {
        if !self.in_txn.swap(false, Ordering::SeqCst) {
            return Err(NsError::InvalidState(
                "no transaction to roll back".to_string(),
            ));
        }
        self.with_conn(|conn| conn.execute_batch("ROLLBACK").map_err(map_db_err))
    }

    fn create(&self, meta: &ExtendedStat) -> NsResult<ExtendedStat> {
        self.atomically(|conn| {
            let parent = Self::load_entry(conn, meta.parent)?;
            if !parent.is_dir() {
                return Err(NsError::NotDirectory(format!(
                    "parent inode {} is not a directory",
                    meta.parent
                )));
            }

            let now = unix_timestamp();
            let nlink: i64 = if s_isdir(meta.stat.mode) { 0 } else { 1 };
            conn.execute(
                "INSERT INTO entries (parent, name, mode, uid, gid, size, nlink, atime, mtime, ctime,
                                      status, guid, csumtype, csumvalue, acl, xattr)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    meta.parent as i64,
                    meta.name,
                    meta.stat.mode as i64,
                    meta.stat.uid as i64,
                    meta.stat.gid as i64,
                    meta.stat.size as i64,
                    nlink,
                    now,
                    meta.status.as_char().to_string(),
                    meta.guid,
                    meta.csumtype,
                    meta.csumvalue,
                    meta.acl.to_string(),
                    meta.xattr.serialize(),
                ],
            )
            .map_err(map_db_err)?;
            let inode = conn.last_insert_rowid() as InodeId;
            Self::adjust_nlink(conn, meta.parent, 1, now)?;
            debug!(
                "SqliteINode: created {} under {} as inode {}",
                meta.name, meta.parent, inode
            );
            Self::load_entry(conn, inode)
        })
    }

    fn symlink(&self, inode: InodeId, link: &str) -> NsResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO symlinks (inode, link) VALUES (?1, ?2)",
                params![inode as i64, link],
            )
            .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn unlink(&self, inode: InodeId) -> NsResult<()> {
        self.atomically(|conn| {
            let meta = Self::load_entry(conn, inode)?;
            if meta.is_dir() {
                let children: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM entries WHERE parent = ?1",
                        params![inode as i64],
                        |row| row.get(0),
                    )
                    .map_err(map_db_err)?;
                if children > 0 {
                    return Err(NsError::AlreadyExists(format!(
                        "directory {} is not empty",
                        meta.name
                    )));
                }
            }

            let key = inode as i64;
            conn.execute("DELETE FROM entries WHERE inode = ?1", params![key])
                .map_err(map_db_err)?;
            conn.execute("DELETE FROM symlinks WHERE inode = ?1", params![key])
                .map_err(map_db_err)?;
            conn.execute("DELETE FROM comments WHERE inode = ?1", params![key])
                .map_err(map_db_err)?;
            conn.execute("DELETE FROM replicas WHERE inode = ?1", params![key])
                .map_err(map_db_err)?;
            Self::adjust_nlink(conn, meta.parent, -1, unix_timestamp())?;
            debug!("SqliteINode: unlinked inode {} ({})", inode, meta.name);
            Ok(())
        })
    }

    fn move_entry(&self, inode: InodeId, dest: InodeId) -> NsResult<()> {
        self.atomically(|conn| {
            let meta = Self::load_entry(conn, inode)?;
            let target = Self::load_entry(conn, dest)?;
            if !target.is_dir() {
                return Err(NsError::NotDirectory(format!(
                    "destination inode {} is not a directory",
                    dest
                )));
            }
            if meta.parent == dest {
                return Ok(());
            }

            let now = unix_timestamp();
            conn.execute(
                "UPDATE entries SET parent = ?1, ctime = ?2 WHERE inode = ?3",
                params![dest as i64, now, inode as i64],
            )
            .map_err(map_db_err)?;
            Self::adjust_nlink(conn, meta.parent, -1, now)?;
            Self::adjust_nlink(conn, dest, 1, now)?;
            Ok(())
        })
    }

    fn rename(&self, inode: InodeId, name: &str) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET name = ?1, ctime = ?2 WHERE inode = ?3",
                    params![name, unix_timestamp(), inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn extended_stat(&self, inode: InodeId) -> NsResult<ExtendedStat> {
        self.with_conn(|conn| Self::load_entry(conn, inode))
    }

    fn extended_stat_by_name(&self, parent: InodeId, name: &str) -> NsResult<ExtendedStat> {
        self.with_conn(|conn| Self::load_entry_by_name(conn, parent, name))
    }

    fn read_link(&self, inode: InodeId) -> NsResult<SymLink> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT link FROM symlinks WHERE inode = ?1",
                params![inode as i64],
                |row| row.get::<_, String>(0),
            )
            .map(|link| SymLink { inode, link })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    NsError::NotFound(format!("inode {} is not a symbolic link", inode))
                }
                _ => map_db_err(e),
            })
        })
    }

    fn add_replica(&self, replica: &Replica) -> NsResult<()> {
        self.with_conn(|conn| {
            let meta = Self::load_entry(conn, replica.file_id)?;
            if !meta.is_reg() {
                return Err(NsError::InvalidValue(format!(
                    "inode {} is not a regular file",
                    replica.file_id
                )));
            }
            let now = unix_timestamp();
            conn.execute(
                "INSERT INTO replicas (inode, nbaccesses, atime, ptime, ltime, status, rtype,
                                       server, rfn, meta)
                 VALUES (?1, 0, ?2, ?2, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    replica.file_id as i64,
                    now,
                    replica.status.as_char().to_string(),
                    replica.rtype.as_char().to_string(),
                    replica.server,
                    replica.rfn,
                    replica.meta.serialize(),
                ],
            )
            .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn delete_replica(&self, replica: &Replica) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM replicas WHERE inode = ?1 AND rfn = ?2",
                    params![replica.file_id as i64, replica.rfn],
                )
                .map_err(map_db_err)?;
            if changed == 0 {
                return Err(NsError::NotFound(format!(
                    "replica {} not found",
                    replica.rfn
                )));
            }
            Ok(())
        })
    }

    fn get_replicas(&self, inode: InodeId) -> NsResult<Vec<Replica>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM replicas WHERE inode = ?1 ORDER BY replica_id",
                    REPLICA_COLUMNS
                ))
                .map_err(map_db_err)?;
            let rows = stmt
                .query_map(params![inode as i64], parse_replica)
                .map_err(map_db_err)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_db_err)
        })
    }

    fn get_replica_by_id(&self, replica_id: i64) -> NsResult<Replica> {
        self.with_conn(|conn| Self::load_replica(conn, "replica_id = ?1", &replica_id))
    }

    fn get_replica_by_rfn(&self, rfn: &str) -> NsResult<Replica> {
        self.with_conn(|conn| Self::load_replica(conn, "rfn = ?1", &rfn))
    }

    fn update_replica(&self, replica: &Replica) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE replicas
                     SET nbaccesses = ?1, atime = ?2, ptime = ?3, ltime = ?4, status = ?5,
                         rtype = ?6, server = ?7, rfn = ?8, meta = ?9
                     WHERE replica_id = ?10",
                    params![
                        replica.nbaccesses as i64,
                        replica.atime,
                        replica.ptime,
                        replica.ltime,
                        replica.status.as_char().to_string(),
                        replica.rtype.as_char().to_string(),
                        replica.server,
                        replica.rfn,
                        replica.meta.serialize(),
                        replica.replica_id,
                    ],
                )
                .map_err(map_db_err)?;
            if changed == 0 {
                return Err(NsError::NotFound(format!(
                    "replica {} not found",
                    replica.replica_id
                )));
            }
            Ok(())
        })
    }

    fn utime(&self, inode: InodeId, buf: Option<&Utimbuf>) -> NsResult<()> {
        let now = unix_timestamp();
        let (actime, modtime) = match buf {
            Some(buf) => (buf.actime, buf.modtime),
            None => (now, now),
        };
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET atime = ?1, mtime = ?2, ctime = ?3 WHERE inode = ?4",
                    params![actime, modtime, now, inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn touch_access_time(&self, inode: InodeId, atime: i64) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET atime = ?1 WHERE inode = ?2",
                    params![atime, inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn set_mode(&self, inode: InodeId, uid: u32, gid: u32, mode: u32, acl: &Acl) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET uid = ?1, gid = ?2, mode = ?3, acl = ?4, ctime = ?5
                     WHERE inode = ?6",
                    params![
                        uid as i64,
                        gid as i64,
                        mode as i64,
                        acl.to_string(),
                        unix_timestamp(),
                        inode as i64
                    ],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn set_size(&self, inode: InodeId, size: u64) -> NsResult<()> {
        self.with_conn(|conn| {
            let now = unix_timestamp();
            let changed = conn
                .execute(
                    "UPDATE entries SET size = ?1, mtime = ?2, ctime = ?2 WHERE inode = ?3",
                    params![size as i64, now, inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn set_checksum(&self, inode: InodeId, csumtype: &str, csumvalue: &str) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET csumtype = ?1, csumvalue = ?2, ctime = ?3 WHERE inode = ?4",
                    params![csumtype, csumvalue, unix_timestamp(), inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn get_comment(&self, inode: InodeId) -> NsResult<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT comment FROM comments WHERE inode = ?1",
                params![inode as i64],
                |row| row.get::<_, String>(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    NsError::NotFound(format!("no comment on inode {}", inode))
                }
                _ => map_db_err(e),
            })
        })
    }

    fn set_comment(&self, inode: InodeId, comment: &str) -> NsResult<()> {
        self.with_conn(|conn| {
            Self::load_entry(conn, inode)?;
            conn.execute(
                "INSERT OR REPLACE INTO comments (inode, comment) VALUES (?1, ?2)",
                params![inode as i64, comment],
            )
            .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn delete_comment(&self, inode: InodeId) -> NsResult<()> {
        // nothing to delete is fine
        self.with_conn(|conn| {
            conn.execute("DELETE FROM comments WHERE inode = ?1", params![inode as i64])
                .map_err(map_db_err)?;
            Ok(())
        })
    }

    fn set_guid(&self, inode: InodeId, guid: &str) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET guid = ?1, ctime = ?2 WHERE inode = ?3",
                    params![guid, unix_timestamp(), inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn update_extended_attributes(&self, inode: InodeId, attr: &Extensible) -> NsResult<()> {
        self.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE entries SET xattr = ?1, ctime = ?2 WHERE inode = ?3",
                    params![attr.serialize(), unix_timestamp(), inode as i64],
                )
                .map_err(map_db_err)?;
            Self::check_updated(changed, inode)
        })
    }

    fn open_dir(&self, inode: InodeId) -> NsResult<INodeDir> {
        self.with_conn(|conn| {
            let meta = Self::load_entry(conn, inode)?;
            if !meta.is_dir() {
                return Err(NsError::NotDirectory(format!(
                    "inode {} is not a directory",
                    inode
                )));
            }
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM entries WHERE parent = ?1 ORDER BY name",
                    ENTRY_COLUMNS
                ))
                .map_err(map_db_err)?;
            let children = stmt
                .query_map(params![inode as i64], parse_entry)
                .map_err(map_db_err)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(map_db_err)?;
            Ok(INodeDir::new(inode, children))
        })
    }
}

fn conversion_err(idx: usize, e: NsError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

fn parse_char(idx: usize, value: &str) -> rusqlite::Result<char> {
    value.chars().next().ok_or_else(|| {
        conversion_err(idx, NsError::InvalidValue("empty status column".to_string()))
    })
}

fn parse_entry(row: &Row<'_>) -> rusqlite::Result<ExtendedStat> {
    let status: String = row.get(11)?;
    let acl: String = row.get(15)?;
    let xattr: String = row.get(16)?;
    Ok(ExtendedStat {
        parent: row.get::<_, i64>(1)? as InodeId,
        name: row.get(2)?,
        stat: Stat {
            ino: row.get::<_, i64>(0)? as InodeId,
            mode: row.get::<_, i64>(3)? as u32,
            uid: row.get::<_, i64>(4)? as u32,
            gid: row.get::<_, i64>(5)? as u32,
            size: row.get::<_, i64>(6)? as u64,
            nlink: row.get::<_, i64>(7)? as u64,
            atime: row.get(8)?,
            mtime: row.get(9)?,
            ctime: row.get(10)?,
        },
        status: FileStatus::from_char(parse_char(11, &status)?).map_err(|e| conversion_err(11, e))?,
        guid: row.get(12)?,
        csumtype: row.get(13)?,
        csumvalue: row.get(14)?,
        acl: acl.parse().map_err(|e| conversion_err(15, e))?,
        xattr: Extensible::from_json_str(&xattr).map_err(|e| conversion_err(16, e))?,
    })
}

fn parse_replica(row: &Row<'_>) -> rusqlite::Result<Replica> {
    let status: String = row.get(6)?;
    let rtype: String = row.get(7)?;
    let meta: String = row.get(10)?;
    Ok(Replica {
        replica_id: row.get(0)?,
        file_id: row.get::<_, i64>(1)? as InodeId,
        nbaccesses: row.get::<_, i64>(2)? as u64,
        atime: row.get(3)?,
        ptime: row.get(4)?,
        ltime: row.get(5)?,
        status: ReplicaStatus::from_char(parse_char(6, &status)?)
            .map_err(|e| conversion_err(6, e))?,
        rtype: ReplicaType::from_char(parse_char(7, &rtype)?).map_err(|e| conversion_err(7, e))?,
        server: row.get(8)?,
        rfn: row.get(9)?,
        meta: Extensible::from_json_str(&meta).map_err(|e| conversion_err(10, e))?,
    })
}

pub(crate) fn map_db_err(err: rusqlite::Error) -> NsError {
    match &err {
        rusqlite::Error::QueryReturnedNoRows => NsError::NotFound(err.to_string()),
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            NsError::AlreadyExists(err.to_string())
        }
        _ => NsError::DbError(format!("db error: {}", err)),
    }
}
