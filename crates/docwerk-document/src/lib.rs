// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// docwerk-document — Document handling that needs no external engine.
//
// PDF inspection, Info-dictionary editing and AES-256 encryption (lopdf),
// text-to-PDF layout (printpdf), and plain-text reconstruction of HTML and
// RTF.

pub mod pdf;
pub mod text;

pub use pdf::reader::{PdfReader, append_comment, is_encrypted, looks_like_pdf};
pub use pdf::writer::PdfWriter;
