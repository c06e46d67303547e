use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                display_name    TEXT NOT NULL,
                user_pin        TEXT NOT NULL UNIQUE,
                is_verified     INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL,
                updated_at      TEXT NOT NULL
            );

            CREATE TABLE verification_codes (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id),
                code        TEXT NOT NULL,
                purpose     TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_codes_lookup
                ON verification_codes(user_id, code, purpose, used);

            -- One row per unordered pair: ids are stored in ascending order.
            CREATE TABLE chats (
                id          TEXT PRIMARY KEY,
                user1_id    TEXT NOT NULL REFERENCES users(id),
                user2_id    TEXT NOT NULL REFERENCES users(id),
                created_at  TEXT NOT NULL,
                CHECK (user1_id < user2_id),
                UNIQUE (user1_id, user2_id)
            );

            CREATE INDEX idx_chats_user2 ON chats(user2_id);

            CREATE TABLE messages (
                id                  TEXT PRIMARY KEY,
                chat_id             TEXT NOT NULL REFERENCES chats(id),
                sender_id           TEXT NOT NULL REFERENCES users(id),
                encrypted_message   TEXT NOT NULL,
                iv                  TEXT NOT NULL,
                created_at          TEXT NOT NULL
            );

            CREATE INDEX idx_messages_chat ON messages(chat_id, created_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
