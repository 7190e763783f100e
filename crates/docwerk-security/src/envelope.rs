// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Passphrase envelope — age (scrypt recipient) over the whole document.
// The result is real encryption but not a PDF; it must be opened with the
// same passphrase before a viewer can read it.

use std::io::{Read, Write};

use age::secrecy::SecretString;
use docwerk_core::error::DocwerkError;
use tracing::{debug, instrument};

const AGE_MAGIC: &[u8] = b"age-encryption.org/v1";

pub struct PassphraseEnvelope {
    passphrase: SecretString,
}

impl PassphraseEnvelope {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: SecretString::from(passphrase.into()),
        }
    }

    /// Whether `bytes` start with an age header.
    pub fn is_sealed(bytes: &[u8]) -> bool {
        bytes.starts_with(AGE_MAGIC)
    }

    #[instrument(skip_all, fields(plaintext_len = plaintext.len()))]
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, DocwerkError> {
        let encryptor = age::Encryptor::with_user_passphrase(self.passphrase.clone());
        let mut sealed = Vec::with_capacity(plaintext.len() + 256);

        let mut writer = encryptor
            .wrap_output(&mut sealed)
            .map_err(|e| DocwerkError::Encryption(e.to_string()))?;
        writer
            .write_all(plaintext)
            .map_err(|e| DocwerkError::Encryption(e.to_string()))?;
        writer
            .finish()
            .map_err(|e| DocwerkError::Encryption(e.to_string()))?;

        debug!(sealed_len = sealed.len(), "envelope sealed");
        Ok(sealed)
    }

    #[instrument(skip_all, fields(sealed_len = sealed.len()))]
    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, DocwerkError> {
        let decryptor =
            age::Decryptor::new(sealed).map_err(|e| DocwerkError::Encryption(e.to_string()))?;
        let identity = age::scrypt::Identity::new(self.passphrase.clone());

        let mut reader = decryptor
            .decrypt(std::iter::once(&identity as &dyn age::Identity))
            .map_err(|e| DocwerkError::Encryption(e.to_string()))?;

        let mut plaintext = Vec::new();
        reader
            .read_to_end(&mut plaintext)
            .map_err(|e| DocwerkError::Encryption(e.to_string()))?;
        Ok(plaintext)
    }
}
