// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — load, inspect, and annotate existing PDF documents using the
// `lopdf` crate.

use std::collections::BTreeMap;
use std::sync::Arc;

use docwerk_core::error::DocwerkError;
use lopdf::encryption::crypt_filters::{Aes256CryptFilter, CryptFilter};
use lopdf::{Dictionary, Document, EncryptionState, EncryptionVersion, Object, ObjectId, Permissions};
use tracing::{debug, instrument};
use uuid::Uuid;

/// Name of the single crypt filter applied to strings and streams.
const CRYPT_FILTER: &[u8] = b"StdCF";

/// Reads existing PDFs and rewrites their document information dictionary.
pub struct PdfReader {
    document: Document,
}

impl PdfReader {
    /// Create a reader from raw PDF bytes already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, DocwerkError> {
        let document = Document::load_mem(data)
            .map_err(|err| DocwerkError::Pdf(format!("failed to load PDF from memory: {err}")))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self { document })
    }

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    // -- Text -----------------------------------------------------------------

    /// Extract the text of every page, pages separated by a blank line.
    #[instrument(skip(self), fields(pages = self.page_count()))]
    pub fn extract_text(&self) -> Result<String, DocwerkError> {
        let mut pages: Vec<u32> = self.document.get_pages().keys().copied().collect();
        pages.sort_unstable();

        let mut out = String::new();
        for page in pages {
            let text = self
                .document
                .extract_text(&[page])
                .map_err(|err| DocwerkError::Pdf(format!("text extraction failed on page {page}: {err}")))?;
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text.trim_end());
            out.push('\n');
        }
        Ok(out)
    }

    // -- Info dictionary ------------------------------------------------------

    /// Read a string entry from the document information dictionary.
    pub fn info_entry(&self, key: &str) -> Option<String> {
        let info_id = self.info_id()?;
        let dict = self.document.get_dictionary(info_id).ok()?;
        let raw = dict.get(key.as_bytes()).ok()?.as_str().ok()?;
        Some(String::from_utf8_lossy(raw).into_owned())
    }

    /// Set string entries in the information dictionary, creating it when the
    /// document has none, and return the re-serialised PDF.
    #[instrument(skip(self, entries), fields(count = entries.len()))]
    pub fn with_info_entries(&self, entries: &[(&str, String)]) -> Result<Vec<u8>, DocwerkError> {
        let mut doc = self.document.clone();

        let info_id = match self.info_id() {
            Some(id) => id,
            None => {
                let id = doc.add_object(Dictionary::new());
                doc.trailer.set("Info", Object::Reference(id));
                id
            }
        };

        let info = doc
            .get_object_mut(info_id)
            .and_then(Object::as_dict_mut)
            .map_err(|err| DocwerkError::Pdf(format!("Info entry is not a dictionary: {err}")))?;
        for (key, value) in entries {
            info.set(*key, Object::string_literal(value.as_str()));
        }

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| DocwerkError::Pdf(format!("failed to serialise PDF: {err}")))?;
        debug!(output_bytes = output.len(), "Info dictionary updated");
        Ok(output)
    }

    // -- Encryption -----------------------------------------------------------

    /// Encrypt with the standard security handler (AES-256, revision 6) and
    /// return the re-serialised PDF.
    ///
    /// `permission_bits` is the signed `/P` word; reserved bits are corrected
    /// by lopdf. Fails when the document already carries a security handler.
    #[instrument(skip(self, user_password, owner_password))]
    pub fn encrypt_aes256(
        &self,
        user_password: &str,
        owner_password: &str,
        permission_bits: i32,
    ) -> Result<Vec<u8>, DocwerkError> {
        let mut key = [0u8; 32];
        key[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        key[16..].copy_from_slice(Uuid::new_v4().as_bytes());

        let filter: Arc<dyn CryptFilter> = Arc::new(Aes256CryptFilter);
        let version = EncryptionVersion::V5 {
            encrypt_metadata: true,
            crypt_filters: BTreeMap::from([(CRYPT_FILTER.to_vec(), filter)]),
            file_encryption_key: &key,
            stream_filter: CRYPT_FILTER.to_vec(),
            string_filter: CRYPT_FILTER.to_vec(),
            owner_password,
            user_password,
            permissions: Permissions::from_bits_truncate(u64::from(permission_bits as u32)),
        };
        let state = EncryptionState::try_from(version)
            .map_err(|err| DocwerkError::Encryption(format!("cannot set up AES-256 handler: {err}")))?;

        let mut doc = self.document.clone();
        doc.encrypt(&state)
            .map_err(|err| DocwerkError::Encryption(format!("encryption failed: {err}")))?;

        let mut output = Vec::new();
        doc.save_to(&mut output)
            .map_err(|err| DocwerkError::Pdf(format!("failed to serialise encrypted PDF: {err}")))?;
        debug!(output_bytes = output.len(), "PDF encrypted in process");
        Ok(output)
    }

    fn info_id(&self) -> Option<ObjectId> {
        self.document
            .trailer
            .get(b"Info")
            .and_then(Object::as_reference)
            .ok()
    }
}

/// Whether `bytes` begin with a PDF header (leading whitespace tolerated).
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"%PDF-")
}

/// Whether the PDF declares a standard security handler.
///
/// Scans for an `/Encrypt` key instead of parsing, so it also works on
/// documents that lopdf cannot load without the password.
pub fn is_encrypted(bytes: &[u8]) -> bool {
    const NEEDLE: &[u8] = b"/Encrypt";
    bytes.windows(NEEDLE.len()).any(|w| w == NEEDLE)
}

/// Append a PDF comment after the final `%%EOF`. Readers ignore trailing
/// comments, so the document stays valid even when it could not be parsed.
pub fn append_comment(bytes: &[u8], comment: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + comment.len() + 4);
    out.extend_from_slice(bytes);
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(b"% ");
    out.extend_from_slice(comment.replace(['\r', '\n'], " ").as_bytes());
    out.push(b'\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::writer::PdfWriter;

    fn sample_pdf() -> Vec<u8> {
        PdfWriter::a4()
            .create_from_text("Quarterly report\nSecond line")
            .expect("create pdf")
    }

    #[test]
    fn loads_generated_pdf() {
        let reader = PdfReader::from_bytes(&sample_pdf()).expect("load");
        assert_eq!(reader.page_count(), 1);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            PdfReader::from_bytes(b"not a pdf at all"),
            Err(DocwerkError::Pdf(_))
        ));
    }

    #[test]
    fn info_entries_survive_reserialisation() {
        let reader = PdfReader::from_bytes(&sample_pdf()).expect("load");
        let updated = reader
            .with_info_entries(&[
                ("Subject", "Password protected document".to_string()),
                ("Keywords", "alpha;beta".to_string()),
            ])
            .expect("update info");

        let reread = PdfReader::from_bytes(&updated).expect("reload");
        assert_eq!(reread.info_entry("Keywords").as_deref(), Some("alpha;beta"));
        assert_eq!(
            reread.info_entry("Subject").as_deref(),
            Some("Password protected document")
        );
        assert!(!is_encrypted(&updated));
    }

    #[test]
    fn aes256_output_carries_a_security_handler() {
        let input = sample_pdf();
        let reader = PdfReader::from_bytes(&input).expect("load");
        let encrypted = reader.encrypt_aes256("user-pw", "owner-pw", -3904 | 4 | 2048).expect("encrypt");

        assert!(looks_like_pdf(&encrypted));
        assert!(is_encrypted(&encrypted));
        assert!(!is_encrypted(&input));
        assert_ne!(encrypted, input);
    }

    #[test]
    fn aes256_keys_differ_between_runs() {
        let reader = PdfReader::from_bytes(&sample_pdf()).expect("load");
        let first = reader.encrypt_aes256("pw", "pw", -4).expect("first");
        let second = reader.encrypt_aes256("pw", "pw", -4).expect("second");
        assert_ne!(first, second);
    }

    #[test]
    fn header_detection() {
        assert!(looks_like_pdf(b"%PDF-1.7\n"));
        assert!(looks_like_pdf(b"\n  %PDF-1.4"));
        assert!(!looks_like_pdf(b"PK\x03\x04"));
        assert!(!looks_like_pdf(b""));
    }

    #[test]
    fn encrypt_marker_scan() {
        assert!(is_encrypted(b"trailer << /Root 1 0 R /Encrypt 5 0 R >>"));
        assert!(!is_encrypted(b"trailer << /Root 1 0 R >>"));
    }

    #[test]
    fn comment_is_single_line_after_eof() {
        let out = append_comment(b"%PDF-1.4\n%%EOF", "a\nb");
        assert!(out.ends_with(b"%%EOF\n% a b\n"));
    }
}
