//! `Content-Disposition` values with ASCII and UTF-8 file names.

const ILLEGAL: &[char] = &['/', '?', '<', '>', '\\', ':', '*', '|', '"'];
const WINDOWS_RESERVED: &[&str] = &["con", "prn", "aux", "nul"];
const MAX_NAME_BYTES: usize = 255;

/// `attachment; filename="…"; filename*=UTF-8''…`
pub fn attachment(name: &str) -> String {
    disposition("attachment", name)
}

/// `inline; filename="…"; filename*=UTF-8''…`
pub fn inline(name: &str) -> String {
    disposition("inline", name)
}

fn disposition(kind: &str, name: &str) -> String {
    format!(
        "{kind}; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(name),
        urlencoding::encode(&sanitize(name))
    )
}

/// Replace everything outside `[A-Za-z0-9_.-]` with `_`.
pub fn ascii_fallback(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Make a name safe to save on any common filesystem.
pub fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| {
            let code = c as u32;
            if ILLEGAL.contains(&c) || code <= 0x1F || (0x80..=0x9F).contains(&code) {
                '_'
            } else {
                c
            }
        })
        .collect();

    if !out.is_empty() && out.chars().all(|c| c == '.') {
        out = "_".to_string();
    }

    let trimmed_len = out.trim_end_matches(['.', ' ']).len();
    if trimmed_len < out.len() {
        out.truncate(trimmed_len);
        out.push('_');
    }

    if is_windows_reserved(&out) {
        out.insert(0, '_');
    }

    if out.len() > MAX_NAME_BYTES {
        let mut cut = MAX_NAME_BYTES;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
    }
    out
}

fn is_windows_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_lowercase();
    if WINDOWS_RESERVED.contains(&stem.as_str()) {
        return true;
    }
    let bytes = stem.as_bytes();
    bytes.len() == 4
        && (stem.starts_with("com") || stem.starts_with("lpt"))
        && bytes[3].is_ascii_digit()
}
