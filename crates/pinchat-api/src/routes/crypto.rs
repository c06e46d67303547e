use axum::Json;
use serde_json::{Value, json};

use pinchat_crypto::{decrypt_message, derive_chat_key, encrypt_message, generate_key};
use pinchat_types::api::{
    ChatKeyRequest, DecryptRequest, DecryptResponse, EncryptRequest, EncryptResponse, KeyResponse,
};

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::validate::normalize_pin;

pub async fn encrypt(ApiJson(req): ApiJson<EncryptRequest>) -> Result<Json<EncryptResponse>, ApiError> {
    let (ciphertext, iv) = encrypt_message(&req.message, &req.key)?;
    Ok(Json(EncryptResponse { ciphertext, iv }))
}

pub async fn decrypt(ApiJson(req): ApiJson<DecryptRequest>) -> Result<Json<DecryptResponse>, ApiError> {
    let message = decrypt_message(&req.ciphertext, &req.iv, &req.key)?;
    Ok(Json(DecryptResponse { message }))
}

pub async fn new_key() -> Json<KeyResponse> {
    Json(KeyResponse { key: generate_key() })
}

pub async fn chat_key(ApiJson(req): ApiJson<ChatKeyRequest>) -> Result<Json<KeyResponse>, ApiError> {
    let pin_a = normalize_pin(&req.pin_a)?;
    let pin_b = normalize_pin(&req.pin_b)?;
    Ok(Json(KeyResponse {
        key: derive_chat_key(&pin_a, &pin_b),
    }))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
