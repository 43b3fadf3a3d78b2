pub mod migrations;
pub mod models;

use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::ws::UserId;

/// Type alias for the shared database connection.
/// rusqlite is synchronous, so it is wrapped in Arc<Mutex> and used
/// from tokio::task::spawn_blocking.
pub type DbPool = Arc<Mutex<Connection>>;

/// Initialize the SQLite database: create data directory if needed,
/// open (or create) the database file, enable WAL mode, and run migrations.
pub fn init_db(data_dir: &str) -> Result<DbPool, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(data_dir)?;

    let db_path = Path::new(data_dir).join("chatline.db");
    let mut conn = Connection::open(&db_path)?;

    // Enable WAL mode for better concurrent read performance
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    let migrations = migrations::migrations();
    migrations.to_latest(&mut conn)?;

    tracing::info!("Database initialized at {}", db_path.display());

    Ok(Arc::new(Mutex::new(conn)))
}

/// User ids of everyone taking part in a conversation, in join order.
/// Used to compute push targets after a write.
pub fn fetch_participants(
    conn: &Connection,
    conversation_id: i64,
) -> rusqlite::Result<Vec<UserId>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM conversation_participants WHERE conversation_id = ?1 ORDER BY id",
    )?;
    let ids = stmt
        .query_map(rusqlite::params![conversation_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<UserId>>>()?;
    Ok(ids)
}

/// Whether the user is a participant. `None` when the conversation does not exist.
pub fn is_participant(
    conn: &Connection,
    conversation_id: i64,
    user_id: UserId,
) -> rusqlite::Result<Option<bool>> {
    let exists = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE id = ?1",
            rusqlite::params![conversation_id],
            |_| Ok(()),
        )
        .optional()?;
    if exists.is_none() {
        return Ok(None);
    }

    let member: i64 = conn.query_row(
        "SELECT COUNT(*) FROM conversation_participants WHERE conversation_id = ?1 AND user_id = ?2",
        rusqlite::params![conversation_id, user_id],
        |row| row.get(0),
    )?;
    Ok(Some(member > 0))
}
