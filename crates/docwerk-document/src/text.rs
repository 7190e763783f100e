// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-text reconstruction for lightweight markup formats.
//
// Formatting is discarded; only the readable text and paragraph breaks are
// carried across.

/// Strip HTML tags, drop `<script>`/`<style>` bodies, turn block-level tags
/// into line breaks, and decode the common character entities.
pub fn html_to_text(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        out.push_str(&decode_entities(&rest[..open]));
        let after = &rest[open + 1..];
        let Some(close) = after.find('>') else {
            rest = "";
            break;
        };
        let tag = after[..close].trim().to_ascii_lowercase();
        let name: String = tag
            .trim_start_matches('/')
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect();
        rest = &after[close + 1..];

        if !tag.starts_with('/') && (name == "script" || name == "style") {
            let end_tag = format!("</{name}");
            rest = match rest.to_ascii_lowercase().find(&end_tag) {
                Some(end) => rest[end..].find('>').map_or("", |gt| &rest[end + gt + 1..]),
                None => "",
            };
            continue;
        }

        if matches!(
            name.as_str(),
            "br" | "p" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
        ) {
            out.push('\n');
        }
    }
    out.push_str(&decode_entities(rest));

    collapse_blank_lines(&out)
}

fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Wrap text in a minimal HTML5 document, one `<p>` per paragraph.
pub fn text_to_html(text: &str, title: &str) -> String {
    let mut body = String::new();
    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        body.push_str("<p>");
        body.push_str(&escape_html(paragraph).replace('\n', "<br>\n"));
        body.push_str("</p>\n");
    }
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{body}</body>\n</html>\n",
        escape_html(title)
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Extract readable text from RTF.
///
/// Control words are dropped except `\par` and `\line` (line breaks), `\tab`,
/// and `\'hh` hex escapes. Destination groups (`{\*...}`, font and colour
/// tables, pictures) are skipped entirely.
pub fn rtf_to_text(rtf: &str) -> String {
    const SKIP_DESTINATIONS: &[&str] = &[
        "fonttbl", "colortbl", "stylesheet", "info", "pict", "header", "footer", "object",
    ];

    let chars: Vec<char> = rtf.chars().collect();
    let mut out = String::new();
    // Depth at which an ignored group started; text inside is dropped.
    let mut skip_depth: Option<usize> = None;
    let mut depth = 0usize;
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' => {
                depth += 1;
                i += 1;
            }
            '}' => {
                if skip_depth == Some(depth) {
                    skip_depth = None;
                }
                depth = depth.saturating_sub(1);
                i += 1;
            }
            '\\' => {
                i += 1;
                let Some(&next) = chars.get(i) else { break };
                if next == '*' {
                    skip_depth.get_or_insert(depth);
                    i += 1;
                } else if next == '\'' {
                    let hex: String = chars.iter().skip(i + 1).take(2).collect();
                    match u8::from_str_radix(&hex, 16) {
                        Ok(byte) if skip_depth.is_none() => out.push(byte as char),
                        _ => {}
                    }
                    i += 3;
                } else if next.is_ascii_alphabetic() {
                    let start = i;
                    while i < chars.len() && chars[i].is_ascii_alphabetic() {
                        i += 1;
                    }
                    let word: String = chars[start..i].iter().collect();
                    // Optional numeric parameter.
                    let param_start = i;
                    if i < chars.len() && (chars[i] == '-' || chars[i].is_ascii_digit()) {
                        i += 1;
                        while i < chars.len() && chars[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                    let param: Option<i32> = chars[param_start..i]
                        .iter()
                        .collect::<String>()
                        .parse()
                        .ok();
                    // A single space delimits the control word.
                    if i < chars.len() && chars[i] == ' ' {
                        i += 1;
                    }
                    if SKIP_DESTINATIONS.contains(&word.as_str()) {
                        skip_depth.get_or_insert(depth);
                    } else if skip_depth.is_none() {
                        match word.as_str() {
                            "par" | "line" => out.push('\n'),
                            "tab" => out.push('\t'),
                            "u" => {
                                // \uN is followed by one fallback character.
                                let code = param.unwrap_or(0i32).rem_euclid(65_536) as u32;
                                out.push(char::from_u32(code).unwrap_or('?'));
                                i += 1;
                            }
                            _ => {}
                        }
                    }
                } else {
                    // Escaped literal such as \\, \{ or \}.
                    if skip_depth.is_none() && matches!(next, '\\' | '{' | '}') {
                        out.push(next);
                    }
                    i += 1;
                }
            }
            '\r' | '\n' => i += 1,
            _ => {
                if skip_depth.is_none() {
                    out.push(c);
                }
                i += 1;
            }
        }
    }

    collapse_blank_lines(&out)
}

/// Encode plain text as a minimal RTF document. Non-ASCII characters are
/// written as `\uN?` escapes.
pub fn text_to_rtf(text: &str) -> String {
    let mut out = String::from("{\\rtf1\\ansi\\deff0{\\fonttbl{\\f0 Helvetica;}}\\f0\\fs22\n");
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '{' => out.push_str("\\{"),
            '}' => out.push_str("\\}"),
            '\n' => out.push_str("\\par\n"),
            '\t' => out.push_str("\\tab "),
            '\r' => {}
            c if c.is_ascii() => out.push(c),
            c => {
                // RTF \u takes a signed 16-bit value; astral chars degrade to '?'.
                match u16::try_from(u32::from(c)) {
                    Ok(v) => out.push_str(&format!("\\u{}?", v as i16)),
                    Err(_) => out.push('?'),
                }
            }
        }
    }
    out.push_str("\n}\n");
    out
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim_matches('\n').to_string()
}
