use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use uuid::Uuid;

use pinchat_types::models::{
    Chat, ChatSummary, CodePurpose, Message, MessageCursor, User, VerificationCode,
};

use crate::gateway::{
    PersistenceGateway, StoreError, StoreResult, UniqueField, canonical_pair,
};

/// In-process [`PersistenceGateway`]. Nothing survives a restart; meant for
/// development runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: HashMap<Uuid, User>,
    /// Insertion order doubles as the tiebreak for equal timestamps.
    codes: Vec<VerificationCode>,
    /// Keyed by the canonical (user1, user2) pair.
    chats: HashMap<(Uuid, Uuid), Chat>,
    /// Chat ids in creation order.
    chat_order: Vec<(Uuid, Uuid)>,
    messages: Vec<Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, MemoryInner>> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {}", e)))
    }
}

impl PersistenceGateway for MemoryStore {
    fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    fn find_user_by_pin(&self, pin: &str) -> StoreResult<Option<User>> {
        let inner = self.lock()?;
        Ok(inner.users.values().find(|u| u.user_pin == pin).cloned())
    }

    fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if inner.users.values().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(UniqueField::Email));
        }
        if inner.users.values().any(|u| u.user_pin == user.user_pin) {
            return Err(StoreError::Conflict(UniqueField::Pin));
        }
        inner.users.insert(user.id, user.clone());
        Ok(())
    }

    fn insert_verification_code(&self, code: &VerificationCode) -> StoreResult<()> {
        self.lock()?.codes.push(code.clone());
        Ok(())
    }

    fn find_latest_unused_code(
        &self,
        user_id: Uuid,
        code: &str,
        purpose: CodePurpose,
    ) -> StoreResult<Option<VerificationCode>> {
        let inner = self.lock()?;
        let found = inner
            .codes
            .iter()
            .enumerate()
            .filter(|(_, c)| c.user_id == user_id && c.code == code && c.purpose == purpose && !c.used)
            .max_by_key(|(idx, c)| (c.created_at, *idx))
            .map(|(_, c)| c.clone());
        Ok(found)
    }

    fn mark_code_used(&self, id: Uuid) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        match inner.codes.iter_mut().find(|c| c.id == id && !c.used) {
            Some(code) => {
                code.used = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_verified(&self, user_id: Uuid) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.get_mut(&user_id) {
            if !user.is_verified {
                user.is_verified = true;
                user.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<()> {
        let mut inner = self.lock()?;
        if let Some(user) = inner.users.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    fn find_or_create_chat(&self, a: Uuid, b: Uuid) -> StoreResult<(Chat, bool)> {
        let key = canonical_pair(a, b);
        let mut inner = self.lock()?;

        if let Some(chat) = inner.chats.get(&key) {
            return Ok((chat.clone(), false));
        }

        let chat = Chat {
            id: Uuid::new_v4(),
            user1_id: key.0,
            user2_id: key.1,
            created_at: Utc::now(),
        };
        inner.chats.insert(key, chat.clone());
        inner.chat_order.push(key);
        Ok((chat, true))
    }

    fn find_chat(&self, id: Uuid) -> StoreResult<Option<Chat>> {
        let inner = self.lock()?;
        Ok(inner.chats.values().find(|c| c.id == id).cloned())
    }

    fn list_chats(&self, user_id: Uuid) -> StoreResult<Vec<ChatSummary>> {
        let inner = self.lock()?;

        let mut summaries = Vec::new();
        for key in inner.chat_order.iter().rev() {
            let Some(chat) = inner.chats.get(key) else { continue };
            if !chat.has_participant(user_id) {
                continue;
            }
            let other_id = if chat.user1_id == user_id { chat.user2_id } else { chat.user1_id };
            let Some(other) = inner.users.get(&other_id) else { continue };

            summaries.push(ChatSummary {
                chat_id: chat.id,
                other_user_id: other.id,
                other_user_name: other.display_name.clone(),
                other_user_pin: other.user_pin.clone(),
                created_at: chat.created_at,
            });
        }

        // chat_order is creation order; a stable sort keeps it as the tiebreak
        summaries.sort_by(|x, y| y.created_at.cmp(&x.created_at));
        Ok(summaries)
    }

    fn insert_message(&self, message: &Message) -> StoreResult<()> {
        self.lock()?.messages.push(message.clone());
        Ok(())
    }

    fn list_messages(
        &self,
        chat_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> StoreResult<Vec<Message>> {
        let inner = self.lock()?;

        let mut messages: Vec<&Message> = inner
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .filter(|m| before.is_none_or(|cursor| cursor.admits(m)))
            .collect();
        messages.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        Ok(messages
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn user(email: &str, pin: &str) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: email.into(),
            password_hash: "hash".into(),
            display_name: email.into(),
            user_pin: pin.into(),
            is_verified: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn rejects_duplicate_email_and_pin() {
        let store = MemoryStore::new();
        store.insert_user(&user("ann@x.com", "AAAAAA")).unwrap();

        assert!(matches!(
            store.insert_user(&user("ann@x.com", "BBBBBB")),
            Err(StoreError::Conflict(UniqueField::Email))
        ));
        assert!(matches!(
            store.insert_user(&user("bob@x.com", "AAAAAA")),
            Err(StoreError::Conflict(UniqueField::Pin))
        ));
    }

    #[test]
    fn newest_code_wins_on_equal_match() {
        let store = MemoryStore::new();
        let ann = user("ann@x.com", "AAAAAA");
        store.insert_user(&ann).unwrap();

        let now = Utc::now();
        let mut ids = Vec::new();
        for created_at in [now - Duration::minutes(1), now, now] {
            let code = VerificationCode {
                id: Uuid::new_v4(),
                user_id: ann.id,
                code: "000111".into(),
                purpose: CodePurpose::PasswordReset,
                expires_at: created_at + Duration::hours(1),
                used: false,
                created_at,
            };
            ids.push(code.id);
            store.insert_verification_code(&code).unwrap();
        }

        let found = store
            .find_latest_unused_code(ann.id, "000111", CodePurpose::PasswordReset)
            .unwrap()
            .unwrap();
        assert_eq!(found.id, ids[2]);

        assert!(store.mark_code_used(ids[2]).unwrap());
        assert!(!store.mark_code_used(ids[2]).unwrap());

        let next = store
            .find_latest_unused_code(ann.id, "000111", CodePurpose::PasswordReset)
            .unwrap()
            .unwrap();
        assert_eq!(next.id, ids[1]);
    }

    #[test]
    fn one_chat_per_unordered_pair() {
        let store = MemoryStore::new();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        store.insert_user(&ann).unwrap();
        store.insert_user(&bob).unwrap();

        let (c1, new1) = store.find_or_create_chat(bob.id, ann.id).unwrap();
        let (c2, new2) = store.find_or_create_chat(ann.id, bob.id).unwrap();
        assert!(new1);
        assert!(!new2);
        assert_eq!(c1, c2);

        let listed = store.list_chats(ann.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].other_user_id, bob.id);
        assert_eq!(listed[0].other_user_pin, "BBBBBB");
    }

    #[test]
    fn tied_timestamps_page_by_id() {
        let store = MemoryStore::new();
        let ann = user("ann@x.com", "AAAAAA");
        let bob = user("bob@x.com", "BBBBBB");
        store.insert_user(&ann).unwrap();
        store.insert_user(&bob).unwrap();
        let (chat, _) = store.find_or_create_chat(ann.id, bob.id).unwrap();

        let now = Utc::now();
        for id in [3u128, 1, 5, 2, 4] {
            store
                .insert_message(&Message {
                    id: Uuid::from_u128(id),
                    chat_id: chat.id,
                    sender_id: ann.id,
                    encrypted_message: format!("ct{}", id),
                    iv: "iv".into(),
                    created_at: now,
                })
                .unwrap();
        }

        let ids = |page: &[Message]| page.iter().map(|m| m.id.as_u128()).collect::<Vec<_>>();

        let first = store.list_messages(chat.id, 2, None).unwrap();
        assert_eq!(ids(&first), [5, 4]);

        let rest = store.list_messages(chat.id, 10, Some(MessageCursor::at(&first[1]))).unwrap();
        assert_eq!(ids(&rest), [3, 2, 1]);
    }
}
