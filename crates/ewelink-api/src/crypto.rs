//! LAN payload codec.
//!
//! Devices in encrypted mode exchange AES-128-CBC ciphertext. The key is the
//! MD5 digest of the device API key, padding is PKCS#7, and a fresh random
//! IV travels next to every message. Both halves are base64 on the wire.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use rand::RngCore;

use crate::error::Error;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES block size and IV length in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Ciphertext and IV, both base64-encoded, as carried in an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    pub data: String,
    pub iv: String,
}

/// Derive the AES-128 key for a device: `MD5(api_key)`.
pub fn derive_key(api_key: &str) -> [u8; BLOCK_SIZE] {
    Md5::digest(api_key.as_bytes()).into()
}

/// Encrypt `plaintext` for the device owning `api_key`.
///
/// Generates a new IV on every call.
pub fn encrypt(plaintext: &[u8], api_key: &str) -> EncryptedPayload {
    let key = derive_key(api_key);
    let mut iv = [0u8; BLOCK_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext =
        Aes128CbcEnc::new(&key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    EncryptedPayload {
        data: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(iv),
    }
}

/// Decrypt a base64 ciphertext / IV pair with the key derived from `api_key`.
///
/// Accepts raw base64 bytes as they arrive in TXT metadata.
pub fn decrypt(
    ciphertext_b64: impl AsRef<[u8]>,
    iv_b64: impl AsRef<[u8]>,
    api_key: &str,
) -> Result<Vec<u8>, Error> {
    let ciphertext = STANDARD
        .decode(ciphertext_b64.as_ref().trim_ascii())
        .map_err(|e| Error::Decryption {
            message: format!("ciphertext is not valid base64: {e}"),
        })?;
    let iv_bytes = STANDARD
        .decode(iv_b64.as_ref().trim_ascii())
        .map_err(|e| Error::Decryption {
            message: format!("IV is not valid base64: {e}"),
        })?;
    let iv: [u8; BLOCK_SIZE] = iv_bytes.as_slice().try_into().map_err(|_| Error::Decryption {
        message: format!("IV must be {BLOCK_SIZE} bytes, got {}", iv_bytes.len()),
    })?;

    let key = derive_key(api_key);
    Aes128CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::Decryption {
            message: "invalid padding (wrong key or truncated data)".into(),
        })
}
