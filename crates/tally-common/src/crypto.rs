//! RSA PKCS#1 v1.5 body encryption.
//!
//! Keys are read from PEM. PKCS#1 (`BEGIN RSA PUBLIC KEY`) is tried first,
//! then SubjectPublicKeyInfo / PKCS#8. The plaintext of a single
//! [`encrypt`] call is limited to the key size in bytes minus 11.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::Pkcs1v15Encrypt;
use std::path::Path;

pub use rsa::{RsaPrivateKey, RsaPublicKey};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("failed to read key file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse {0} key: not a PKCS#1 or PKCS#8 PEM")]
    Parse(&'static str),
    #[error("rsa: {0}")]
    Rsa(#[from] rsa::Error),
}

pub fn public_key_from_pem(pem: &str) -> Result<RsaPublicKey, CryptoError> {
    RsaPublicKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
        .map_err(|_| CryptoError::Parse("public"))
}

pub fn private_key_from_pem(pem: &str) -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::from_pkcs1_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
        .map_err(|_| CryptoError::Parse("private"))
}

pub fn public_key_from_file(path: impl AsRef<Path>) -> Result<RsaPublicKey, CryptoError> {
    public_key_from_pem(&read_pem(path.as_ref())?)
}

pub fn private_key_from_file(path: impl AsRef<Path>) -> Result<RsaPrivateKey, CryptoError> {
    private_key_from_pem(&read_pem(path.as_ref())?)
}

fn read_pem(path: &Path) -> Result<String, CryptoError> {
    std::fs::read_to_string(path).map_err(|source| CryptoError::Read {
        path: path.display().to_string(),
        source,
    })
}

pub fn encrypt(key: &RsaPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut rng = rand::thread_rng();
    Ok(key.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext)?)
}

pub fn decrypt(key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    Ok(key.decrypt(Pkcs1v15Encrypt, ciphertext)?)
}
