use std::sync::Arc;

use crate::chats::ChatCoordinator;
use crate::identity::IdentityService;
use crate::messages::MessageService;
use crate::token::TokenIssuer;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler can reach. Built once in `main` and shared.
pub struct AppStateInner {
    pub identity: IdentityService,
    pub chats: ChatCoordinator,
    pub messages: MessageService,
    pub tokens: TokenIssuer,
}
