use tracing::info;
use uuid::Uuid;

use pinchat_types::api::StartChatResponse;
use pinchat_types::models::ChatSummary;

use crate::error::ApiError;
use crate::store::{Store, blocking};

/// Idempotent chat creation and per-user chat listing.
pub struct ChatCoordinator {
    store: Store,
}

impl ChatCoordinator {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Returns the chat for `{a, b}`, creating it on first call. Concurrent
    /// callers with either argument order all get the same chat; exactly one
    /// of them sees `is_new = true`.
    pub async fn start_chat(&self, a: Uuid, b: Uuid) -> Result<StartChatResponse, ApiError> {
        if a == b {
            return Err(ApiError::invalid("Cannot start chat with yourself"));
        }

        let both_exist = blocking(&self.store, move |s| {
            Ok(s.find_user_by_id(a)?.is_some() && s.find_user_by_id(b)?.is_some())
        })
        .await?;
        if !both_exist {
            return Err(ApiError::not_found("User not found"));
        }

        let (chat, is_new) = blocking(&self.store, move |s| s.find_or_create_chat(a, b)).await?;
        if is_new {
            info!(chat_id = %chat.id, "Chat created");
        }

        Ok(StartChatResponse {
            chat_id: chat.id,
            is_new,
        })
    }

    pub async fn list_chats(&self, user_id: Uuid) -> Result<Vec<ChatSummary>, ApiError> {
        blocking(&self.store, move |s| s.list_chats(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use futures_util::future::join_all;
    use pinchat_db::{Database, MemoryStore, PersistenceGateway};
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

    async fn race(store: Store) {
        let ann = add_user(store.as_ref(), "ann", "AAAAAA");
        let bob = add_user(store.as_ref(), "bob", "BBBBBB");
        let coordinator = Arc::new(ChatCoordinator::new(store));

        let calls = (0..16).map(|i| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                if i % 2 == 0 {
                    coordinator.start_chat(ann, bob).await
                } else {
                    coordinator.start_chat(bob, ann).await
                }
            })
        });

        let results: Vec<StartChatResponse> = join_all(calls)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        let chat_id = results[0].chat_id;
        assert!(results.iter().all(|r| r.chat_id == chat_id));
        assert_eq!(results.iter().filter(|r| r.is_new).count(), 1);

        assert_eq!(coordinator.list_chats(ann).await.unwrap().len(), 1);
        assert_eq!(coordinator.list_chats(bob).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_chat_resolves_to_one_chat_in_memory() {
        race(Arc::new(MemoryStore::new())).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_start_chat_resolves_to_one_chat_in_sqlite() {
        race(Arc::new(Database::open_in_memory().unwrap())).await;
    }

    #[tokio::test]
    async fn sequential_calls_in_both_orders_share_the_chat() {
        let store: Store = Arc::new(MemoryStore::new());
        let ann = add_user(store.as_ref(), "ann", "AAAAAA");
        let bob = add_user(store.as_ref(), "bob", "BBBBBB");
        let coordinator = ChatCoordinator::new(store);

        let first = coordinator.start_chat(ann, bob).await.unwrap();
        let second = coordinator.start_chat(bob, ann).await.unwrap();
        assert!(first.is_new);
        assert!(!second.is_new);
        assert_eq!(first.chat_id, second.chat_id);

        let listed = coordinator.list_chats(bob).await.unwrap();
        assert_eq!(listed[0].other_user_id, ann);
        assert_eq!(listed[0].other_user_name, "ann");
    }

    #[tokio::test]
    async fn self_chat_is_rejected() {
        let store: Store = Arc::new(MemoryStore::new());
        let ann = add_user(store.as_ref(), "ann", "AAAAAA");
        let coordinator = ChatCoordinator::new(store);

        let err = coordinator.start_chat(ann, ann).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn unknown_counterpart_is_not_found() {
        let store: Store = Arc::new(MemoryStore::new());
        let ann = add_user(store.as_ref(), "ann", "AAAAAA");
        let coordinator = ChatCoordinator::new(store);

        let err = coordinator.start_chat(ann, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
