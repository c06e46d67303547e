use chrono::Utc;
use rusqlite::{Connection, ErrorCode, Row, params};
use uuid::Uuid;

use pinchat_types::models::{
    Chat, ChatSummary, CodePurpose, Message, MessageCursor, User, VerificationCode,
};

use crate::Database;
use crate::gateway::{
    PersistenceGateway, StoreError, StoreResult, UniqueField, canonical_pair,
};
use crate::models::{ChatRow, ChatSummaryRow, CodeRow, MessageRow, UserRow, format_ts};

const USER_COLUMNS: &str =
    "id, email, password_hash, display_name, user_pin, is_verified, created_at, updated_at";

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, Some(msg)) = &e {
            if err.code == ErrorCode::ConstraintViolation {
                if msg.contains("users.email") {
                    return Self::Conflict(UniqueField::Email);
                }
                if msg.contains("users.user_pin") {
                    return Self::Conflict(UniqueField::Pin);
                }
            }
        }
        Self::Unavailable(e.to_string())
    }
}

impl PersistenceGateway for Database {
    // -- Users --

    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    fn find_user_by_pin(&self, pin: &str) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "user_pin", pin))
    }

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.with_conn(|conn| query_user(conn, "id", &id.to_string()))
    }

    fn insert_user(&self, user: &User) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, password_hash, display_name, user_pin, is_verified, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    user.id.to_string(),
                    user.email,
                    user.password_hash,
                    user.display_name,
                    user.user_pin,
                    user.is_verified,
                    format_ts(user.created_at),
                    format_ts(user.updated_at),
                ],
            )?;
            Ok(())
        })
    }

    fn set_verified(&self, user_id: Uuid) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET is_verified = 1, updated_at = ?2 WHERE id = ?1 AND is_verified = 0",
                params![user_id.to_string(), format_ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1",
                params![user_id.to_string(), password_hash, format_ts(Utc::now())],
            )?;
            Ok(())
        })
    }

    // -- Verification codes --

    fn insert_verification_code(&self, code: &VerificationCode) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO verification_codes (id, user_id, code, purpose, expires_at, used, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    code.id.to_string(),
                    code.user_id.to_string(),
                    code.code,
                    code.purpose.as_str(),
                    format_ts(code.expires_at),
                    code.used,
                    format_ts(code.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn find_latest_unused_code(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: CodePurpose,
    ) -> StoreResult<Option<VerificationCode>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, code, purpose, expires_at, used, created_at
                 FROM verification_codes
                 WHERE user_id = ?1 AND code = ?2 AND purpose = ?3 AND used = 0
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT 1",
            )?;

            let row = stmt
                .query_row(params![user_id.to_string(), code, purpose.as_str()], |row| {
                    Ok(CodeRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        code: row.get(2)?,
                        purpose: row.get(3)?,
                        expires_at: row.get(4)?,
                        used: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })
                .optional()?;

            row.map(CodeRow::into_code).transpose()
        })
    }

    fn mark_code_used(&self, id: Uuid) -> StoreResult<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE verification_codes SET used = 1 WHERE id = ?1 AND used = 0",
                [id.to_string()],
            )?;
            Ok(changed == 1)
        })
    }

    // -- Chats --

    fn find_or_create_chat(&self, a: Uuid, b: Uuid) -> StoreResult<(Chat, bool)> {
        let (user1, user2) = canonical_pair(a, b);

        self.with_conn(|conn| {
            // The UNIQUE(user1_id, user2_id) constraint on canonical ids makes
            // this safe even across processes sharing the file.
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO chats (id, user1_id, user2_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    Uuid::new_v4().to_string(),
                    user1.to_string(),
                    user2.to_string(),
                    format_ts(Utc::now()),
                ],
            )?;

            let row = conn.query_row(
                "SELECT id, user1_id, user2_id, created_at FROM chats WHERE user1_id = ?1 AND user2_id = ?2",
                params![user1.to_string(), user2.to_string()],
                chat_row,
            )?;

            Ok((row.into_chat()?, inserted == 1))
        })
    }

    fn find_chat(&self, id: Uuid) -> StoreResult<Option<Chat>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user1_id, user2_id, created_at FROM chats WHERE id = ?1",
                    [id.to_string()],
                    chat_row,
                )
                .optional()?;

            row.map(ChatRow::into_chat).transpose()
        })
    }

    fn list_chats(&self, user_id: Uuid) -> StoreResult<Vec<ChatSummary>> {
        self.with_conn(|conn| {
            // JOIN both participants and pick the counterpart per row
            let mut stmt = conn.prepare(
                "SELECT c.id,
                        CASE WHEN c.user1_id = ?1 THEN u2.id ELSE u1.id END,
                        CASE WHEN c.user1_id = ?1 THEN u2.display_name ELSE u1.display_name END,
                        CASE WHEN c.user1_id = ?1 THEN u2.user_pin ELSE u1.user_pin END,
                        c.created_at
                 FROM chats c
                 JOIN users u1 ON c.user1_id = u1.id
                 JOIN users u2 ON c.user2_id = u2.id
                 WHERE c.user1_id = ?1 OR c.user2_id = ?1
                 ORDER BY c.created_at DESC, c.rowid DESC",
            )?;

            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(ChatSummaryRow {
                        chat_id: row.get(0)?,
                        other_user_id: row.get(1)?,
                        other_user_name: row.get(2)?,
                        other_user_pin: row.get(3)?,
                        created_at: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(ChatSummaryRow::into_summary).collect()
        })
    }

    // -- Messages --

    fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, sender_id, encrypted_message, iv, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    message.id.to_string(),
                    message.chat_id.to_string(),
                    message.sender_id.to_string(),
                    message.encrypted_message,
                    message.iv,
                    format_ts(message.created_at),
                ],
            )?;
            Ok(())
        })
    }

    fn list_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> StoreResult<Vec<Message>> {
        // Ids are lowercase hyphenated text, so text order is Uuid order.
        let before_ts = before.map(|c| format_ts(c.created_at));
        let before_id = before.and_then(|c| c.id).map(|id| id.to_string());

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, encrypted_message, iv, created_at
                 FROM messages
                 WHERE chat_id = ?1
                   AND (?2 IS NULL
                        OR created_at < ?2
                        OR (created_at = ?2 AND ?3 IS NOT NULL AND id < ?3))
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?4",
            )?;

            let rows = stmt
                .query_map(
                    params![chat_id.to_string(), before_ts, before_id, limit],
                    |row| {
                        Ok(MessageRow {
                            id: row.get(0)?,
                            chat_id: row.get(1)?,
                            sender_id: row.get(2)?,
                            encrypted_message: row.get(3)?,
                            iv: row.get(4)?,
                            created_at: row.get(5)?,
                        })
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(MessageRow::into_message).collect()
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> StoreResult<Option<User>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row([value], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                email: row.get(1)?,
                password_hash: row.get(2)?,
                display_name: row.get(3)?,
                user_pin: row.get(4)?,
                is_verified: row.get(5)?,
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
            })
        })
        .optional()?;

    row.map(UserRow::into_user).transpose()
}

fn chat_row(row: &Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        user1_id: row.get(1)?,
        user2_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> StoreResult<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> StoreResult<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone};

    fn user(email: &str, pin: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            display_name: email.split('@').next().unwrap_or_default().into(),
            user_pin: pin.into(),
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn code(user_id: Uuid, value: &str, purpose: CodePurpose, created_at: DateTime<Utc>) -> VerificationCode {
        VerificationCode {
            id: Uuid::new_v4(),
            user_id,
            code: value.into(),
            purpose,
            expires_at: created_at + Duration::hours(24),
            used: false,
            created_at,
        }
    }

    #[test]
    fn user_roundtrip_and_lookups() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "K3F9ZQ");
        db.insert_user(&ann).unwrap();

        assert_eq!(db.find_user_by_email("ann@x.com").unwrap(), Some(ann.clone()));
        assert_eq!(db.find_user_by_pin("K3F9ZQ").unwrap(), Some(ann.clone()));
        assert_eq!(db.find_user_by_id(ann.id).unwrap(), Some(ann));
        assert!(db.find_user_by_email("nobody@x.com").unwrap().is_none());
    }

    #[test]
    fn duplicate_email_and_pin_report_which_field() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user(&user("ann@x.com", "AAAAAA")).unwrap();

        let dup_email = db.insert_user(&user("ann@x.com", "BBBBBB")).unwrap_err();
        assert!(matches!(dup_email, StoreError::Conflict(UniqueField::Email)));

        let dup_pin = db.insert_user(&user("bob@x.com", "AAAAAA")).unwrap_err();
        assert!(matches!(dup_pin, StoreError::Conflict(UniqueField::Pin)));
    }

    #[test]
    fn set_verified_and_update_password() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        db.insert_user(&ann).unwrap();

        db.set_verified(ann.id).unwrap();
        db.update_password(ann.id, "new-hash").unwrap();

        let stored = db.find_user_by_id(ann.id).unwrap().unwrap();
        assert!(stored.is_verified);
        assert_eq!(stored.password_hash, "new-hash");
    }

    #[test]
    fn latest_unused_code_wins_and_respects_purpose() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        db.insert_user(&ann).unwrap();

        let now = Utc::now();
        let older = code(ann.id, "123456", CodePurpose::Registration, now - Duration::minutes(5));
        let newer = code(ann.id, "123456", CodePurpose::Registration, now);
        db.insert_verification_code(&older).unwrap();
        db.insert_verification_code(&newer).unwrap();

        let found = db
            .find_latest_unused_code(ann.id, "123456", CodePurpose::Registration)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, newer.id);

        assert!(
            db.find_latest_unused_code(ann.id, "123456", CodePurpose::PasswordReset)
                .unwrap()
                .is_none()
        );
        assert!(
            db.find_latest_unused_code(ann.id, "654321", CodePurpose::Registration)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn code_can_only_be_marked_used_once() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        db.insert_user(&ann).unwrap();
        let c = code(ann.id, "111111", CodePurpose::Registration, Utc::now());
        db.insert_verification_code(&c).unwrap();

        assert!(db.mark_code_used(c.id).unwrap());
        assert!(!db.mark_code_used(c.id).unwrap());
        assert!(
            db.find_latest_unused_code(ann.id, "111111", CodePurpose::Registration)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn chats_are_unique_per_unordered_pair() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        db.insert_user(&ann).unwrap();
        db.insert_user(&bob).unwrap();

        let (first, created) = db.find_or_create_chat(ann.id, bob.id).unwrap();
        let (second, created_again) = db.find_or_create_chat(bob.id, ann.id).unwrap();

        assert!(created);
        assert!(!created_again);
        assert_eq!(first.id, second.id);
        assert!(first.user1_id < first.user2_id);
        assert_eq!(db.find_chat(first.id).unwrap(), Some(first));
    }

    #[test]
    fn list_chats_shows_the_other_participant_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        let cat = user("cat@x.com", "CCCCCC");
        for u in [&ann, &bob, &cat] {
            db.insert_user(u).unwrap();
        }

        let (with_bob, _) = db.find_or_create_chat(ann.id, bob.id).unwrap();
        let (with_cat, _) = db.find_or_create_chat(cat.id, ann.id).unwrap();

        let chats = db.list_chats(ann.id).unwrap();
        assert_eq!(chats.len(), 2);
        assert_eq!(chats[0].chat_id, with_cat.id);
        assert_eq!(chats[0].other_user_pin, "CCCCCC");
        assert_eq!(chats[1].chat_id, with_bob.id);
        assert_eq!(chats[1].other_user_name, "bob");

        let bobs = db.list_chats(bob.id).unwrap();
        assert_eq!(bobs.len(), 1);
        assert_eq!(bobs[0].other_user_id, ann.id);
    }

    #[test]
    fn messages_page_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        db.insert_user(&ann).unwrap();
        db.insert_user(&bob).unwrap();
        let (chat, _) = db.find_or_create_chat(ann.id, bob.id).unwrap();

        let base = Utc::now();
        for i in 0..5 {
            db.insert_message(&Message {
                id: Uuid::new_v4(),
                chat_id: chat.id,
                sender_id: ann.id,
                encrypted_message: format!("ct{}", i),
                iv: "iv".into(),
                created_at: base + Duration::seconds(i),
            })
            .unwrap();
        }

        let page = db.list_messages(chat.id, 2, None).unwrap();
        assert_eq!(
            page.iter().map(|m| m.encrypted_message.as_str()).collect::<Vec<_>>(),
            ["ct4", "ct3"]
        );

        let older = db.list_messages(chat.id, 10, Some(MessageCursor::at(&page[1]))).unwrap();
        assert_eq!(
            older.iter().map(|m| m.encrypted_message.as_str()).collect::<Vec<_>>(),
            ["ct2", "ct1", "ct0"]
        );
    }

    fn message(chat_id: Uuid, sender_id: Uuid, id: u128, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::from_u128(id),
            chat_id,
            sender_id,
            encrypted_message: format!("ct{}", id),
            iv: "iv".into(),
            created_at,
        }
    }

    #[test]
    fn nanosecond_timestamps_survive_storage() {
        let db = Database::open_in_memory().unwrap();
        let stamp = Utc.timestamp_opt(1_760_000_000, 508_878_131).unwrap();

        let mut ann = user("ann@x.com", "AAAAAA");
        ann.created_at = stamp;
        ann.updated_at = stamp;
        let bob = user("bob@x.com", "BBBBBB");
        db.insert_user(&ann).unwrap();
        db.insert_user(&bob).unwrap();
        assert_eq!(db.find_user_by_id(ann.id).unwrap(), Some(ann.clone()));

        let c = code(ann.id, "123456", CodePurpose::Registration, stamp);
        db.insert_verification_code(&c).unwrap();
        let found = db
            .find_latest_unused_code(ann.id, "123456", CodePurpose::Registration)
            .unwrap();
        assert_eq!(found, Some(c));

        let (chat, _) = db.find_or_create_chat(ann.id, bob.id).unwrap();
        let sent = message(chat.id, ann.id, 1, stamp);
        db.insert_message(&sent).unwrap();
        assert_eq!(db.list_messages(chat.id, 10, None).unwrap(), vec![sent]);
    }

    #[test]
    fn tied_timestamps_page_by_id() {
        let db = Database::open_in_memory().unwrap();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        db.insert_user(&ann).unwrap();
        db.insert_user(&bob).unwrap();
        let (chat, _) = db.find_or_create_chat(ann.id, bob.id).unwrap();

        let now = Utc::now();
        for id in [3, 1, 5, 2, 4] {
            db.insert_message(&message(chat.id, ann.id, id, now)).unwrap();
        }

        let ids = |page: &[Message]| page.iter().map(|m| m.id.as_u128()).collect::<Vec<_>>();

        let first = db.list_messages(chat.id, 2, None).unwrap();
        assert_eq!(ids(&first), [5, 4]);

        let rest = db.list_messages(chat.id, 10, Some(MessageCursor::at(&first[1]))).unwrap();
        assert_eq!(ids(&rest), [3, 2, 1]);

        let by_time = MessageCursor { created_at: now, id: None };
        assert!(db.list_messages(chat.id, 10, Some(by_time)).unwrap().is_empty());
    }
}
