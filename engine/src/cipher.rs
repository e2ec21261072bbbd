//! Passphrase encryption of snapshot containers.
//!
//! The engine only needs "a buffer the cipher can invert given the same
//! password", expressed by the [`Cipher`] trait. [`PassphraseCipher`] is the
//! implementation used by the application: AES-256-GCM keyed by scrypt with
//! a fresh random salt and nonce per container.
//!
//! # Container Format
//!
//! ```text
//! [Magic "WLSC": 4] [Version: 1] [log_n: 1] [r: 4 BE] [p: 4 BE]
//! [Salt: 16] [Nonce: 12] [Ciphertext + Tag: N]
//! ```
//!
//! The header is authenticated as associated data, so any change to it fails
//! decryption just like a change to the ciphertext.

use aes_gcm::{
    aead::{rand_core::RngCore, Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use async_trait::async_trait;
use tracing::debug;

use crate::config::KdfParams;
use crate::error::CipherError;

const MAGIC: &[u8; 4] = b"WLSC";
const FORMAT_VERSION: u8 = 0x01;
const SALT_SIZE: usize = 16;
const NONCE_SIZE: usize = 12;
const KEY_SIZE: usize = 32;
const HEADER_SIZE: usize = 4 + 1 + 1 + 4 + 4 + SALT_SIZE + NONCE_SIZE;

// Bounds on header-supplied cost so a corrupted header cannot demand
// unbounded memory.
const MAX_LOG_N: u8 = 20;
const MAX_R: u32 = 32;
const MAX_P: u32 = 16;

/// Symmetric passphrase encryption of an opaque buffer.
///
/// Decryption must fail closed: a wrong password or any corruption yields
/// [`CipherError::Authentication`], never partial plaintext.
#[async_trait]
pub trait Cipher: Send + Sync {
    /// Encrypt `plaintext` under `password`.
    async fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<Vec<u8>, CipherError>;

    /// Decrypt a buffer produced by [`Cipher::encrypt`].
    async fn decrypt(&self, container: &[u8], password: &str) -> Result<Vec<u8>, CipherError>;
}

/// AES-256-GCM with an scrypt-derived key.
#[derive(Debug, Clone, Default)]
pub struct PassphraseCipher {
    kdf: KdfParams,
}

impl PassphraseCipher {
    /// Create a cipher deriving keys with the given cost for new containers.
    ///
    /// Decryption always uses the cost recorded in the container header.
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }
}

#[async_trait]
impl Cipher for PassphraseCipher {
    async fn encrypt(&self, plaintext: &[u8], password: &str) -> Result<Vec<u8>, CipherError> {
        if password.is_empty() {
            return Err(CipherError::EmptyPassword);
        }
        let kdf = self.kdf;
        let plaintext = plaintext.to_vec();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || seal(&plaintext, &password, kdf))
            .await
            .map_err(|e| CipherError::Encryption(e.to_string()))?
    }

    async fn decrypt(&self, container: &[u8], password: &str) -> Result<Vec<u8>, CipherError> {
        if password.is_empty() {
            return Err(CipherError::EmptyPassword);
        }
        let container = container.to_vec();
        let password = password.to_string();

        tokio::task::spawn_blocking(move || open(&container, &password))
            .await
            .map_err(|e| CipherError::Encryption(e.to_string()))?
    }
}

fn derive_key(password: &str, salt: &[u8], kdf: KdfParams) -> Result<[u8; KEY_SIZE], CipherError> {
    let params = scrypt::Params::new(kdf.log_n, kdf.r, kdf.p, KEY_SIZE)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    let mut key = [0u8; KEY_SIZE];
    scrypt::scrypt(password.as_bytes(), salt, &params, &mut key)
        .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
    Ok(key)
}

fn seal(plaintext: &[u8], password: &str, kdf: KdfParams) -> Result<Vec<u8>, CipherError> {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    let key = derive_key(password, &salt, kdf)?;

    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| CipherError::Encryption(e.to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut header = Vec::with_capacity(HEADER_SIZE);
    header.extend_from_slice(MAGIC);
    header.push(FORMAT_VERSION);
    header.push(kdf.log_n);
    header.extend_from_slice(&kdf.r.to_be_bytes());
    header.extend_from_slice(&kdf.p.to_be_bytes());
    header.extend_from_slice(&salt);
    header.extend_from_slice(nonce.as_slice());

    let ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad: &header,
            },
        )
        .map_err(|e| CipherError::Encryption(e.to_string()))?;

    debug!(
        plaintext_len = plaintext.len(),
        container_len = HEADER_SIZE + ciphertext.len(),
        "sealed container"
    );

    let mut container = header;
    container.extend_from_slice(&ciphertext);
    Ok(container)
}

fn open(container: &[u8], password: &str) -> Result<Vec<u8>, CipherError> {
    // The tag alone is 16 bytes; anything shorter cannot be a container.
    if container.len() < HEADER_SIZE + 16 {
        return Err(CipherError::Authentication);
    }
    let (header, ciphertext) = container.split_at(HEADER_SIZE);
    if &header[0..4] != MAGIC || header[4] != FORMAT_VERSION {
        return Err(CipherError::Authentication);
    }

    let kdf = KdfParams {
        log_n: header[5],
        r: u32::from_be_bytes([header[6], header[7], header[8], header[9]]),
        p: u32::from_be_bytes([header[10], header[11], header[12], header[13]]),
    };
    if kdf.log_n > MAX_LOG_N || kdf.r > MAX_R || kdf.p > MAX_P {
        return Err(CipherError::Authentication);
    }
    let salt = &header[14..14 + SALT_SIZE];
    let nonce = Nonce::from_slice(&header[14 + SALT_SIZE..HEADER_SIZE]);

    let key = derive_key(password, salt, kdf).map_err(|_| CipherError::Authentication)?;
    let cipher = Aes256Gcm::new_from_slice(&key).map_err(|_| CipherError::Authentication)?;

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: header,
            },
        )
        .map_err(|_| CipherError::Authentication)
}
