//! Optional at-rest encryption of records.

use crate::error::Result;

/// Encrypts each record before it is framed and written, and decrypts it
/// after it is read back.
///
/// Implementations report failures as [`crate::StorageError::Encryption`].
/// A record that fails to encrypt is dropped; one that fails to decrypt is
/// skipped while the rest of its batch is still delivered.
pub trait DataEncryption: Send + Sync {
    fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;
}
