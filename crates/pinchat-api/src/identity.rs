use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pinchat_db::{StoreError, UniqueField};
use pinchat_types::api::{AckResponse, ProfileResponse, RegisterResponse, TokenResponse};
use pinchat_types::models::{CodePurpose, PublicProfile, User, VerificationCode};

use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::password::CredentialStore;
use crate::store::{Store, blocking};
use crate::token::TokenIssuer;
use crate::validate::{
    CODE_LEN, PIN_ALPHABET, PIN_LEN, check_code, check_password, normalize_display_name,
    normalize_email, normalize_pin,
};

/// PIN draws before registration gives up.
pub const MAX_PIN_ATTEMPTS: usize = 8;

const RESET_ACK: &str = "If that email is registered, a reset code has been sent.";
const RESEND_ACK: &str = "If that email is awaiting verification, a new code has been sent.";

pub type Generator = Arc<dyn Fn() -> String + Send + Sync>;

/// Uniform random PIN over A-Z0-9.
pub fn random_pin() -> String {
    let mut rng = rand::rng();
    (0..PIN_LEN)
        .map(|_| PIN_ALPHABET[rng.random_range(0..PIN_ALPHABET.len())] as char)
        .collect()
}

/// Uniform random six-digit code.
pub fn random_code() -> String {
    let mut rng = rand::rng();
    (0..CODE_LEN)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn code_ttl(purpose: CodePurpose) -> Duration {
    match purpose {
        CodePurpose::Registration => Duration::hours(24),
        CodePurpose::PasswordReset => Duration::hours(1),
    }
}

/// Registration, verification, login and password reset.
pub struct IdentityService {
    store: Store,
    credentials: Arc<dyn CredentialStore>,
    tokens: TokenIssuer,
    mailer: Mailer,
    pins: Generator,
    codes: Generator,
}

impl IdentityService {
    pub fn new(
        store: Store,
        credentials: Arc<dyn CredentialStore>,
        tokens: TokenIssuer,
        mailer: Mailer,
    ) -> Self {
        Self {
            store,
            credentials,
            tokens,
            mailer,
            pins: Arc::new(random_pin),
            codes: Arc::new(random_code),
        }
    }

    /// Replace the PIN and code sources.
    pub fn with_generators(mut self, pins: Generator, codes: Generator) -> Self {
        self.pins = pins;
        self.codes = codes;
        self
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<RegisterResponse, ApiError> {
        let email = normalize_email(email)?;
        check_password(password)?;
        let display_name = normalize_display_name(display_name)?;

        if self.find_by_email(&email).await?.is_some() {
            warn!("Registration rejected: email already registered");
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let password_hash = self.credentials.hash(password)?;
        let user = self.insert_with_unique_pin(email, password_hash, display_name).await?;
        info!(user_id = %user.id, "User registered");

        let code = self.issue_code(user.id, CodePurpose::Registration).await?;
        let sent = self
            .mailer
            .send_verification_notice(&user.email, &code, &user.user_pin, CodePurpose::Registration)
            .await;
        if !sent {
            warn!(user_id = %user.id, "Verification notice not delivered; registration kept");
        }

        Ok(RegisterResponse {
            message: "Registration successful. Please check your email for the verification code.".into(),
            user_pin: user.user_pin,
            email: user.email,
        })
    }

    pub async fn verify(&self, email: &str, code: &str) -> Result<TokenResponse, ApiError> {
        let email = normalize_email(email)?;
        check_code(code)?;

        let user = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        self.consume_code(&user, code, CodePurpose::Registration).await?;

        let user_id = user.id;
        blocking(&self.store, move |s| s.set_verified(user_id)).await?;
        info!(%user_id, "User verified");

        self.token_response(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, ApiError> {
        let email = normalize_email(email)?;

        let user = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if !self.credentials.verify(password, &user.password_hash) {
            warn!(user_id = %user.id, "Login rejected: bad password");
            return Err(ApiError::Unauthorized("Invalid credentials".into()));
        }

        if !user.is_verified {
            warn!(user_id = %user.id, "Login rejected: email not verified");
            return Err(ApiError::PreconditionFailed("Please verify your email first".into()));
        }

        info!(user_id = %user.id, "Login successful");
        self.token_response(user)
    }

    /// Always answers the same way, whether or not the email is registered.
    pub async fn request_reset(&self, email: &str) -> Result<AckResponse, ApiError> {
        let email = normalize_email(email)?;

        if let Some(user) = self.find_by_email(&email).await? {
            let code = self.issue_code(user.id, CodePurpose::PasswordReset).await?;
            let sent = self
                .mailer
                .send_verification_notice(&user.email, &code, &user.user_pin, CodePurpose::PasswordReset)
                .await;
            if !sent {
                warn!(user_id = %user.id, "Reset notice not delivered");
            }
            info!(user_id = %user.id, "Password reset code issued");
        } else {
            debug!("Reset requested for unknown email");
        }

        Ok(AckResponse {
            message: RESET_ACK.into(),
        })
    }

    pub async fn confirm_reset(
        &self,
        email: &str,
        code: &str,
        new_password: &str,
    ) -> Result<AckResponse, ApiError> {
        let email = normalize_email(email)?;
        check_code(code)?;
        check_password(new_password)?;

        let user = self
            .find_by_email(&email)
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        self.consume_code(&user, code, CodePurpose::PasswordReset).await?;

        let password_hash = self.credentials.hash(new_password)?;
        let user_id = user.id;
        blocking(&self.store, move |s| s.update_password(user_id, &password_hash)).await?;
        info!(%user_id, "Password reset");

        Ok(AckResponse {
            message: "Password updated.".into(),
        })
    }

    /// Issue a fresh registration code to an unverified account. Answers the
    /// same way for unknown and already verified emails.
    pub async fn resend_verification(&self, email: &str) -> Result<AckResponse, ApiError> {
        let email = normalize_email(email)?;

        match self.find_by_email(&email).await? {
            Some(user) if !user.is_verified => {
                let code = self.issue_code(user.id, CodePurpose::Registration).await?;
                let sent = self
                    .mailer
                    .send_verification_notice(&user.email, &code, &user.user_pin, CodePurpose::Registration)
                    .await;
                if !sent {
                    warn!(user_id = %user.id, "Verification notice not delivered");
                }
                info!(user_id = %user.id, "Verification code re-issued");
            }
            _ => debug!("Resend requested for unknown or verified email"),
        }

        Ok(AckResponse {
            message: RESEND_ACK.into(),
        })
    }

    pub async fn search_by_pin(&self, pin: &str) -> Result<PublicProfile, ApiError> {
        let pin = normalize_pin(pin)?;

        blocking(&self.store, move |s| s.find_user_by_pin(&pin))
            .await?
            .map(|user| user.public_profile())
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<ProfileResponse, ApiError> {
        let user = blocking(&self.store, move |s| s.find_user_by_id(user_id))
            .await?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        Ok(ProfileResponse {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            user_pin: user.user_pin,
            is_verified: user.is_verified,
        })
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ApiError> {
        let email = email.to_string();
        blocking(&self.store, move |s| s.find_user_by_email(&email)).await
    }

    /// Draw PINs until one is free, then insert. A PIN taken between the
    /// check and the insert counts as a failed draw.
    async fn insert_with_unique_pin(
        &self,
        email: String,
        password_hash: String,
        display_name: String,
    ) -> Result<User, ApiError> {
        for attempt in 1..=MAX_PIN_ATTEMPTS {
            let pin = (self.pins)();

            let candidate = pin.clone();
            if blocking(&self.store, move |s| s.find_user_by_pin(&candidate)).await?.is_some() {
                debug!(attempt, "PIN collision, drawing again");
                continue;
            }

            let now = Utc::now();
            let user = User {
                id: Uuid::new_v4(),
                email: email.clone(),
                password_hash: password_hash.clone(),
                display_name: display_name.clone(),
                user_pin: pin,
                is_verified: false,
                created_at: now,
                updated_at: now,
            };

            let row = user.clone();
            match blocking(&self.store, move |s| Ok(s.insert_user(&row))).await? {
                Ok(()) => return Ok(user),
                Err(StoreError::Conflict(UniqueField::Pin)) => {
                    debug!(attempt, "PIN taken during insert, drawing again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        warn!("No free PIN after {} attempts", MAX_PIN_ATTEMPTS);
        Err(ApiError::Conflict("Could not allocate a unique PIN, please try again".into()))
    }

    async fn issue_code(&self, user_id: Uuid, purpose: CodePurpose) -> Result<String, ApiError> {
        let now = Utc::now();
        let code = VerificationCode {
            id: Uuid::new_v4(),
            user_id,
            code: (self.codes)(),
            purpose,
            expires_at: now + code_ttl(purpose),
            used: false,
            created_at: now,
        };

        let value = code.code.clone();
        blocking(&self.store, move |s| s.insert_verification_code(&code)).await?;
        Ok(value)
    }

    /// Match the newest unused code of this purpose and burn it.
    async fn consume_code(&self, user: &User, code: &str, purpose: CodePurpose) -> Result<(), ApiError> {
        let user_id = user.id;
        let value = code.to_string();
        let found = blocking(&self.store, move |s| s.find_latest_unused_code(user_id, &value, purpose))
            .await?
            .ok_or_else(|| {
                warn!(%user_id, purpose = purpose.as_str(), "No matching code");
                ApiError::not_found("Invalid verification code")
            })?;

        if found.is_expired_at(Utc::now()) {
            warn!(%user_id, purpose = purpose.as_str(), "Code expired");
            return Err(ApiError::Expired("Verification code expired".into()));
        }

        let code_id = found.id;
        if !blocking(&self.store, move |s| s.mark_code_used(code_id)).await? {
            // Another request consumed it first
            return Err(ApiError::not_found("Invalid verification code"));
        }

        Ok(())
    }

    fn token_response(&self, user: User) -> Result<TokenResponse, ApiError> {
        Ok(TokenResponse {
            access_token: self.tokens.mint(user.id)?,
            token_type: "bearer".into(),
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            user_pin: user.user_pin,
        })
    }
}

#[cfg(test)]
pub(crate) fn fixed(values: &[&str]) -> Generator {
    use std::sync::Mutex;

    // Hands out the given values in order, then repeats the last one.
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    let next = Mutex::new(0usize);
    Arc::new(move || {
        let mut idx = next.lock().unwrap();
        let value = values[(*idx).min(values.len() - 1)].clone();
        *idx += 1;
        value
    })
}
