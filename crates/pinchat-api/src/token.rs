use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use tracing::{debug, error};
use uuid::Uuid;

use pinchat_types::api::Claims;

use crate::error::ApiError;

/// How long a minted token stays valid. Tokens are never renewed.
pub const TOKEN_TTL_DAYS: i64 = 7;

/// Stateless HS256 bearer tokens. Built once at startup from the signing
/// secret and shared read-only.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::days(TOKEN_TTL_DAYS),
        }
    }

    pub fn mint(&self, user_id: Uuid) -> Result<String, ApiError> {
        self.mint_at(user_id, Utc::now())
    }

    fn mint_at(&self, user_id: Uuid, issued_at: DateTime<Utc>) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(|e| {
            error!("Token signing failed: {}", e);
            ApiError::Internal
        })
    }

    /// `None` covers every rejection: expired, bad signature, malformed.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Some(data.claims),
            Err(e) => {
                debug!("Rejected bearer token: {:?}", e.kind());
                None
            }
        }
    }
}
