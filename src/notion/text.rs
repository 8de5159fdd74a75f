//! Text normalization helpers for fuzzy name matching and file/sheet naming.

/// Maps an accented Latin character to its base form. Covers the Hungarian
/// alphabet plus the common Latin-1 accents seen in Notion content.
fn fold_char(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'ö' | 'ő' | 'õ' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Ő' | 'Õ' => 'O',
        'ú' | 'ù' | 'û' | 'ü' | 'ű' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' | 'Ű' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Accent-insensitive, case-insensitive, whitespace-collapsed form used for
/// matching property and section names.
pub fn normalize(s: &str) -> String {
    let folded: String = s.chars().map(fold_char).collect();
    let lowered = folded.to_lowercase();
    lowered.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Filename-safe slug: accents folded, lowercased, anything outside
/// `[a-z0-9_-]` collapsed into single dashes.
pub fn slugify(s: &str) -> String {
    let folded: String = s.chars().map(fold_char).collect();
    let lowered = folded.to_lowercase();

    let mut out = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for c in lowered.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c);
        } else {
            pending_dash = true;
        }
    }
    out.trim_matches('-').to_string()
}

/// Characters Excel forbids in sheet names.
const FORBIDDEN_SHEET_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];

/// Maximum sheet name length Excel accepts.
const MAX_SHEET_NAME_CHARS: usize = 31;

/// Replaces forbidden characters with `_` and caps the name at 31 characters.
pub fn sanitize_sheet_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if FORBIDDEN_SHEET_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .take(MAX_SHEET_NAME_CHARS)
        .collect()
}
