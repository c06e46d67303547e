/// PinChat Crypto Library
///
/// Symmetric message encryption for one-to-one chats (AES-256-CBC, PKCS#7).
/// Both participants derive the same chat key from their public PINs, so the
/// server never has to store or relay key material.
///
/// Every encryption draws a fresh IV, which makes each stored message
/// independently decryptable with nothing but the chat key.

pub mod encrypt;
pub mod error;
pub mod keys;

pub use encrypt::{decrypt_message, encrypt_message};
pub use error::CryptoError;
pub use keys::{derive_chat_key, generate_key};
