use aes::Aes256;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, Iv, Key, KeyIvInit, block_padding::Pkcs7};
use rand::RngCore;

use crate::error::CryptoError;
use crate::keys::{KEY_LEN, key_from_base64};

pub const BLOCK_LEN: usize = 16;
pub const IV_LEN: usize = 16;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encrypt raw bytes with AES-256-CBC under a fresh random IV.
/// Returns (ciphertext, iv).
pub fn encrypt_bytes(key: &[u8; KEY_LEN], plaintext: &[u8]) -> (Vec<u8>, [u8; IV_LEN]) {
    let mut iv = [0u8; IV_LEN];
    rand::rng().fill_bytes(&mut iv);

    let cipher = Aes256CbcEnc::new(
        Key::<Aes256CbcEnc>::from_slice(key),
        Iv::<Aes256CbcEnc>::from_slice(&iv),
    );
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    (ciphertext, iv)
}

/// Decrypt raw AES-256-CBC bytes and strip PKCS#7 padding.
pub fn decrypt_bytes(key: &[u8], ciphertext: &[u8], iv: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_LEN != 0 {
        return Err(CryptoError::Decryption);
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| CryptoError::Decryption)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::Decryption)
}

/// Encrypt a UTF-8 message with a base64 key.
/// Returns (ciphertext_b64, iv_b64).
pub fn encrypt_message(plaintext: &str, key_b64: &str) -> Result<(String, String), CryptoError> {
    let key = key_from_base64(key_b64)?;
    let (ciphertext, iv) = encrypt_bytes(&key, plaintext.as_bytes());
    Ok((BASE64.encode(ciphertext), BASE64.encode(iv)))
}

/// Decrypt a message produced by [`encrypt_message`].
///
/// Every failure (undecodable input, wrong key length, truncated
/// ciphertext, bad padding, non-UTF-8 plaintext) is reported as the same
/// [`CryptoError::Decryption`].
pub fn decrypt_message(ciphertext_b64: &str, iv_b64: &str, key_b64: &str) -> Result<String, CryptoError> {
    let key = BASE64.decode(key_b64).map_err(|_| CryptoError::Decryption)?;
    let ciphertext = BASE64.decode(ciphertext_b64).map_err(|_| CryptoError::Decryption)?;
    let iv = BASE64.decode(iv_b64).map_err(|_| CryptoError::Decryption)?;

    if key.len() != KEY_LEN || iv.len() != IV_LEN {
        return Err(CryptoError::Decryption);
    }

    let plaintext = decrypt_bytes(&key, &ciphertext, &iv)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decryption)
}
