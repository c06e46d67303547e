//! Database row types. These map directly to SQLite rows and are kept
//! distinct from the pinchat-types records so the schema can evolve on its own.

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use pinchat_types::models::{Chat, ChatSummary, Message, User, VerificationCode};

use crate::gateway::{StoreError, StoreResult};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub user_pin: String,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

pub struct CodeRow {
    pub id: String,
    pub user_id: String,
    pub code: String,
    pub purpose: String,
    pub expires_at: String,
    pub used: bool,
    pub created_at: String,
}

pub struct ChatRow {
    pub id: String,
    pub user1_id: String,
    pub user2_id: String,
    pub created_at: String,
}

pub struct ChatSummaryRow {
    pub chat_id: String,
    pub other_user_id: String,
    pub other_user_name: String,
    pub other_user_pin: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub chat_id: String,
    pub sender_id: String,
    pub encrypted_message: String,
    pub iv: String,
    pub created_at: String,
}

/// Timestamps are stored as fixed-width RFC 3339 so text order is time order.
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Unavailable(format!("corrupt timestamp '{}': {}", raw, e)))
}

pub fn parse_id(raw: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| StoreError::Unavailable(format!("corrupt id '{}': {}", raw, e)))
}

impl UserRow {
    pub fn into_user(self) -> StoreResult<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            email: self.email,
            password_hash: self.password_hash,
            display_name: self.display_name,
            user_pin: self.user_pin,
            is_verified: self.is_verified,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

impl CodeRow {
    pub fn into_code(self) -> StoreResult<VerificationCode> {
        Ok(VerificationCode {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            code: self.code,
            purpose: self.purpose.parse().map_err(StoreError::Unavailable)?,
            expires_at: parse_ts(&self.expires_at)?,
            used: self.used,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl ChatRow {
    pub fn into_chat(self) -> StoreResult<Chat> {
        Ok(Chat {
            id: parse_id(&self.id)?,
            user1_id: parse_id(&self.user1_id)?,
            user2_id: parse_id(&self.user2_id)?,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl ChatSummaryRow {
    pub fn into_summary(self) -> StoreResult<ChatSummary> {
        Ok(ChatSummary {
            chat_id: parse_id(&self.chat_id)?,
            other_user_id: parse_id(&self.other_user_id)?,
            other_user_name: self.other_user_name,
            other_user_pin: self.other_user_pin,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> StoreResult<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            chat_id: parse_id(&self.chat_id)?,
            sender_id: parse_id(&self.sender_id)?,
            encrypted_message: self.encrypted_message,
            iv: self.iv,
            created_at: parse_ts(&self.created_at)?,
        })
    }
}
