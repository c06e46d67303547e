pub mod chats;
pub mod error;
pub mod extract;
pub mod identity;
pub mod mailer;
pub mod messages;
pub mod middleware;
pub mod password;
pub mod routes;
pub mod state;
pub mod store;
pub mod token;
pub mod validate;

pub use error::ApiError;
pub use routes::router;
pub use state::{AppState, AppStateInner};
