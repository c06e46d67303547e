use crate::error::ApiError;

pub const PIN_LEN: usize = 6;
pub const PIN_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const CODE_LEN: usize = 6;

const MAX_PASSWORD_BYTES: usize = 256;
const MAX_DISPLAY_NAME_CHARS: usize = 64;

/// Trim and lower-case an email; requires one `@` with text on both sides.
pub fn normalize_email(raw: &str) -> Result<String, ApiError> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(email),
        _ => Err(ApiError::invalid("Invalid email address")),
    }
}

pub fn check_password(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::invalid("Password must not be empty"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(ApiError::invalid("Password is too long"));
    }
    Ok(())
}

pub fn normalize_display_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_DISPLAY_NAME_CHARS {
        return Err(ApiError::invalid("Display name must be 1 to 64 characters"));
    }
    Ok(name.to_string())
}

/// Codes are exactly six ASCII digits.
pub fn check_code(code: &str) -> Result<(), ApiError> {
    if code.len() == CODE_LEN && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::invalid("Verification code must be 6 digits"))
    }
}

/// Trim and upper-case a PIN; six symbols from A-Z and 0-9.
pub fn normalize_pin(raw: &str) -> Result<String, ApiError> {
    let pin = raw.trim().to_ascii_uppercase();
    if pin.len() == PIN_LEN && pin.bytes().all(|b| PIN_ALPHABET.contains(&b)) {
        Ok(pin)
    } else {
        Err(ApiError::invalid("PIN must be 6 letters or digits"))
    }
}
