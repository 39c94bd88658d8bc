//! Recovery of message text from archived rich-text bodies.
//!
//! Recent stores leave `message.text` NULL and keep the body only in the
//! `attributedBody` blob, a typedstream-archived `NSAttributedString`. The
//! plain string follows the `NSString` class marker; when that layout is not
//! recognised the most sentence-like printable run is used instead.

/// Class marker preceding the archived string payload.
const NSSTRING_MARKER: &[u8] = b"NSString";

/// Archiver vocabulary that never belongs to user text.
const DISALLOWED_FRAGMENTS: &[&str] = &[
    "bplist00",
    "$objects",
    "$archiver",
    "$top",
    "nsmutableattributedstring",
    "nsattributedstring",
    "nsobject",
    "nsdictionary",
    "nsstring",
    "__kim",
];

/// Minimum length of a printable run considered as text.
const MIN_RUN_CHARS: usize = 8;

/// Picks the message text, falling back to the archived body.
///
/// Non-blank plain text is returned verbatim; decoded bodies are normalized.
#[must_use]
pub fn preferred_text(text: Option<&str>, attributed_body: Option<&[u8]>) -> Option<String> {
    if let Some(plain) = text.filter(|t| !t.trim().is_empty()) {
        return Some(plain.to_string());
    }
    attributed_body.and_then(decode_attributed_body)
}

/// Extracts the user-visible string from an `attributedBody` blob.
#[must_use]
pub fn decode_attributed_body(blob: &[u8]) -> Option<String> {
    if blob.is_empty() {
        return None;
    }
    archived_string(blob)
        .and_then(|s| normalize(&s))
        .or_else(|| best_printable_run(blob))
}

/// Reads the length-prefixed string after the `NSString` marker.
///
/// Layout after the marker: `0x01`, `0x94`/`0x95`, `0x84`, `0x01`, `+`, then a
/// length byte; `0x81` announces a little-endian u16, `0x82` a u32.
fn archived_string(blob: &[u8]) -> Option<String> {
    let marker = blob
        .windows(NSSTRING_MARKER.len())
        .position(|w| w == NSSTRING_MARKER)?;
    let mut rest = &blob[marker + NSSTRING_MARKER.len()..];

    let plus = rest.iter().take(8).position(|b| *b == b'+')?;
    rest = &rest[plus + 1..];

    let (&tag, tail) = rest.split_first()?;
    let (len, body) = match tag {
        0x81 => {
            let bytes: [u8; 2] = tail.get(..2)?.try_into().ok()?;
            (usize::from(u16::from_le_bytes(bytes)), &tail[2..])
        }
        0x82 => {
            let bytes: [u8; 4] = tail.get(..4)?.try_into().ok()?;
            (usize::try_from(u32::from_le_bytes(bytes)).ok()?, &tail[4..])
        }
        n if n < 0x80 => (usize::from(n), tail),
        _ => return None,
    };

    let raw = body.get(..len)?;
    String::from_utf8(raw.to_vec()).ok()
}

/// Scores printable runs and returns the most sentence-like one.
fn best_printable_run(blob: &[u8]) -> Option<String> {
    let decoded = String::from_utf8_lossy(blob);
    decoded
        .split(|c: char| c.is_control() || c == '\u{FFFD}')
        .filter_map(cleaned_candidate)
        .max_by_key(|c| score(c))
}

fn score(candidate: &str) -> usize {
    let words = candidate.split_whitespace().count();
    let letters = candidate.chars().filter(|c| c.is_alphabetic()).count();
    let punctuation = if candidate.contains(['.', '!', '?']) {
        20
    } else {
        0
    };
    words * 12 + letters + punctuation
}

fn cleaned_candidate(raw: &str) -> Option<String> {
    let value = normalize(raw)?;
    if value.chars().count() < MIN_RUN_CHARS {
        return None;
    }
    let lowered = value.to_lowercase();
    if DISALLOWED_FRAGMENTS.iter().any(|f| lowered.contains(f)) {
        return None;
    }
    let alnum = value.chars().filter(|c| c.is_alphanumeric()).count();
    if alnum < 4 || value.split_whitespace().count() < 2 {
        return None;
    }
    Some(value)
}

/// Strips object-replacement and NUL characters, collapses whitespace and
/// trims. Empty results become `None`.
#[must_use]
pub fn normalize(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '\u{FFFC}' && *c != '\0')
        .collect();
    let squashed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if squashed.is_empty() {
        None
    } else {
        Some(squashed)
    }
}
