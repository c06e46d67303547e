use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use pinchat_crypto::encrypt::{BLOCK_LEN, IV_LEN};
use pinchat_types::models::{Chat, Message, MessageCursor};

use crate::error::ApiError;
use crate::store::{Store, blocking};

pub const MAX_PAGE: u32 = 200;

/// Stores and pages encrypted chat messages. The server checks shape and
/// membership only; it never holds a key.
pub struct MessageService {
    store: Store,
}

impl MessageService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn send(
        &self,
        chat_id: Uuid,
        sender_id: Uuid,
        encrypted_message: String,
        iv: String,
    ) -> Result<Message, ApiError> {
        check_ciphertext(&encrypted_message, &iv)?;
        self.chat_for_participant(chat_id, sender_id).await?;

        let message = Message {
            id: Uuid::new_v4(),
            chat_id,
            sender_id,
            encrypted_message,
            iv,
            created_at: Utc::now(),
        };

        let row = message.clone();
        blocking(&self.store, move |s| s.insert_message(&row)).await?;
        debug!(message_id = %message.id, %chat_id, "Message stored");

        Ok(message)
    }

    /// Newest first. `limit` is clamped to 1..=200.
    pub async fn history(
        &self,
        chat_id: Uuid,
        reader_id: Uuid,
        limit: u32,
        before: Option<MessageCursor>,
    ) -> Result<Vec<Message>, ApiError> {
        self.chat_for_participant(chat_id, reader_id).await?;

        let limit = limit.clamp(1, MAX_PAGE);
        blocking(&self.store, move |s| s.list_messages(chat_id, limit, before)).await
    }

    async fn chat_for_participant(&self, chat_id: Uuid, user_id: Uuid) -> Result<Chat, ApiError> {
        let chat = blocking(&self.store, move |s| s.find_chat(chat_id))
            .await?
            .ok_or_else(|| ApiError::not_found("Chat not found"))?;

        if !chat.has_participant(user_id) {
            return Err(ApiError::Forbidden("Not a participant of this chat".into()));
        }
        Ok(chat)
    }
}

/// Ciphertext must be whole AES blocks and the IV one block, both base64.
fn check_ciphertext(encrypted_message: &str, iv: &str) -> Result<(), ApiError> {
    let ciphertext = B64
        .decode(encrypted_message)
        .map_err(|_| ApiError::invalid("encrypted_message must be base64"))?;
    let iv = B64.decode(iv).map_err(|_| ApiError::invalid("iv must be base64"))?;

    if iv.len() != IV_LEN {
        return Err(ApiError::invalid("iv must be 16 bytes"));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(ApiError::invalid("encrypted_message must be whole 16-byte blocks"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use pinchat_crypto::{decrypt_message, derive_chat_key, encrypt_message};
    use pinchat_db::{MemoryStore, PersistenceGateway};
    use pinchat_types::models::User;

    use super::*;

    fn add_user(store: &dyn PersistenceGateway, name: &str, pin: &str) -> Uuid {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: format!("{}@x.com", name),
            password_hash: "hash".into(),
            display_name: name.into(),
            user_pin: pin.into(),
            is_verified: true,
            created_at: now,
            updated_at: now,
        };
        store.insert_user(&user).unwrap();
        user.id
    }

    #[tokio::test]
    async fn participants_exchange_messages_under_the_derived_key() {
        let store: Store = Arc::new(MemoryStore::new());
        let ann = add_user(store.as_ref(), "ann", "K3F9ZQ");
        let bob = add_user(store.as_ref(), "bob", "ABC123");
        let (chat, _) = store.find_or_create_chat(ann, bob).unwrap();
        let service = MessageService::new(store);

        let ann_key = derive_chat_key("K3F9ZQ", "ABC123");
        let (ct, iv) = encrypt_message("hi bob", &ann_key).unwrap();
        service.send(chat.id, ann, ct, iv).await.unwrap();

        let history = service.history(chat.id, bob, 50, None).await.unwrap();
        assert_eq!(history.len(), 1);

        let bob_key = derive_chat_key("ABC123", "K3F9ZQ");
        let plain = decrypt_message(&history[0].encrypted_message, &history[0].iv, &bob_key).unwrap();
        assert_eq!(plain, "hi bob");
    }

    #[tokio::test]
    async fn outsiders_cannot_read_or_write() {
        let store: Store = Arc::new(MemoryStore::new());
        let ann = add_user(store.as_ref(), "ann", "AAAAAA");
        let bob = add_user(store.as_ref(), "bob", "BBBBBB");
        let eve = add_user(store.as_ref(), "eve", "EEEEEE");
        let (chat, _) = store.find_or_create_chat(ann, bob).unwrap();
        let service = MessageService::new(store);

        let (ct, iv) = encrypt_message("psst", &derive_chat_key("AAAAAA", "BBBBBB")).unwrap();
        assert!(matches!(
            service.send(chat.id, eve, ct, iv).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            service.history(chat.id, eve, 10, None).await,
            Err(ApiError::Forbidden(_))
        ));
        assert!(matches!(
            service.history(Uuid::new_v4(), ann, 10, None).await,
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn ciphertext_shape_is_checked() {
        let iv = B64.encode([0u8; IV_LEN]);
        assert!(check_ciphertext(&B64.encode([0u8; 32]), &iv).is_ok());
        assert!(check_ciphertext(&B64.encode([0u8; 15]), &iv).is_err());
        assert!(check_ciphertext("", &iv).is_err());
        assert!(check_ciphertext(&B64.encode([0u8; 16]), &B64.encode([0u8; 8])).is_err());
        assert!(check_ciphertext("not base64", &iv).is_err());
    }
}
