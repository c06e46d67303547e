use std::fmt;

use thiserror::Error;
use uuid::Uuid;

use pinchat_types::models::{
    Chat, ChatSummary, CodePurpose, Message, MessageCursor, User, VerificationCode,
};

/// Which uniqueness constraint an insert ran into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Email,
    Pin,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => f.write_str("email"),
            Self::Pin => f.write_str("user_pin"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("duplicate {0}")]
    Conflict(UniqueField),

    /// Anything the backend could not do: I/O, lock poisoning, corrupt rows.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Put a pair of user ids in the order chats are stored in.
pub fn canonical_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b { (a, b) } else { (b, a) }
}

/// Storage contract for users, one-time codes, chats and messages.
///
/// Calls are synchronous and may block; async callers run them on the
/// blocking pool. Each call is atomic on its own.
pub trait PersistenceGateway: Send + Sync {
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    fn find_user_by_pin(&self, pin: &str) -> StoreResult<Option<User>>;

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Fails with [`StoreError::Conflict`] when the email or PIN is taken.
    fn insert_user(&self, user: &User) -> StoreResult<()>;

    fn insert_verification_code(&self, code: &VerificationCode) -> StoreResult<()>;

    /// Newest unused code for `(user_id, code, purpose)`, expired or not.
    fn find_latest_unused_code(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: CodePurpose,
    ) -> StoreResult<Option<VerificationCode>>;

    /// Flip `used` to true. Returns false if the code was already used, so
    /// only one of several concurrent callers wins.
    fn mark_code_used(&self, id: Uuid) -> StoreResult<bool>;

    fn set_verified(&self, user_id: Uuid) -> StoreResult<()>;

    fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()>;

    /// Return the chat for the unordered pair `{a, b}`, creating it if it
    /// does not exist. The bool is true only for the call that created it.
    fn find_or_create_chat(&self, a: Uuid, b: Uuid) -> StoreResult<(Chat, bool)>;

    fn find_chat(&self, id: Uuid) -> StoreResult<Option<Chat>>;

    /// Chats containing `user_id`, newest first, with the counterpart's
    /// public identity.
    fn list_chats(&self, user_id: Uuid) -> StoreResult<Vec<ChatSummary>>;

    fn insert_message(&self, message: &Message) -> StoreResult<()>;

    /// Messages of a chat, newest first by `(created_at, id)`, starting
    /// past `before` when given.
    fn list_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> StoreResult<Vec<Message>>;
}
