//! Secure Token Store
//!
//! Encrypted persistence for the session secret using Windows DPAPI.
//! Exactly one value is stored, keyed `access_token`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[cfg(windows)]
use windows::Win32::Security::Cryptography::{
    CryptProtectData, CryptUnprotectData, CRYPTPROTECT_UI_FORBIDDEN, CRYPT_INTEGER_BLOB,
};

/// Storage key for the session secret. The only persisted client-side value.
pub const TOKEN_KEY: &str = "access_token";

/// Envelope written to disk. `saved_at` is metadata only; restore semantics
/// depend solely on the token being present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

/// Durable, encrypted store for the auth token.
///
/// The persisted copy of the secret is owned here exclusively; other
/// components go through `SessionManager` for the in-memory mirror.
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Create a store rooted at the given data directory.
    pub fn new(data_dir: &Path) -> Self {
        debug!("Token store rooted at: {:?}", data_dir);
        Self {
            dir: data_dir.to_path_buf(),
        }
    }

    /// Read the stored token. An absent file is `Ok(None)`, not an error.
    pub fn get(&self) -> Result<Option<StoredToken>, StorageError> {
        let path = self.token_path();
        if !path.exists() {
            debug!("No stored token");
            return Ok(None);
        }

        let encrypted = std::fs::read(&path)
            .map_err(|e| StorageError::Io(e.to_string()))?;
        let decrypted = unprotect(&encrypted)?;
        let json = String::from_utf8(decrypted)
            .map_err(|e| StorageError::Decryption(e.to_string()))?;
        let stored = serde_json::from_str::<StoredToken>(&json)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        Ok(Some(stored))
    }

    /// Persist the token, overwriting any previous value.
    pub fn set(&self, token: &str) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let stored = StoredToken {
            token: token.to_string(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let encrypted = protect(json.as_bytes())?;

        std::fs::write(self.token_path(), encrypted)
            .map_err(|e| StorageError::Io(e.to_string()))?;

        info!("Token persisted");
        Ok(())
    }

    /// Remove the stored token. Removing an absent token is not an error.
    pub fn clear(&self) -> Result<(), StorageError> {
        let path = self.token_path();
        if path.exists() {
            std::fs::remove_file(&path)
                .map_err(|e| StorageError::Io(e.to_string()))?;
            info!("Stored token cleared");
        }
        Ok(())
    }

    fn token_path(&self) -> PathBuf {
        self.dir.join(format!("{TOKEN_KEY}.dat"))
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Decryption error: {0}")]
    Decryption(String),
}

#[cfg(windows)]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    use std::ptr::null_mut;

    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: null_mut(),
    };

    unsafe {
        CryptProtectData(
            &input,
            None,
            None,
            None,
            None,
            CRYPTPROTECT_UI_FORBIDDEN,
            &mut output,
        )
        .map_err(|_| StorageError::Encryption("DPAPI encryption failed".into()))?;

        Ok(take_blob(output))
    }
}

#[cfg(windows)]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    use std::ptr::null_mut;

    let input = CRYPT_INTEGER_BLOB {
        cbData: data.len() as u32,
        pbData: data.as_ptr() as *mut u8,
    };
    let mut output = CRYPT_INTEGER_BLOB {
        cbData: 0,
        pbData: null_mut(),
    };

    unsafe {
        CryptUnprotectData(
            &input,
            None,
            None,
            None,
            None,
            CRYPTPROTECT_UI_FORBIDDEN,
            &mut output,
        )
        .map_err(|_| StorageError::Decryption("DPAPI decryption failed".into()))?;

        Ok(take_blob(output))
    }
}

/// Copy a DPAPI output blob into owned memory and free the original.
#[cfg(windows)]
unsafe fn take_blob(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
    let bytes = std::slice::from_raw_parts(blob.pbData, blob.cbData as usize).to_vec();
    windows::Win32::Foundation::LocalFree(windows::Win32::Foundation::HLOCAL(
        blob.pbData as *mut std::ffi::c_void,
    ));
    bytes
}

#[cfg(not(windows))]
fn protect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    // Fallback for non-Windows (development only)
    Ok(data.to_vec())
}

#[cfg(not(windows))]
fn unprotect(data: &[u8]) -> Result<Vec<u8>, StorageError> {
    // Fallback for non-Windows (development only)
    Ok(data.to_vec())
}
