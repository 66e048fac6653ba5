//! Static format table and content-type classification.
//!
//! Rules are matched in registration order and the first rule with a
//! matching MIME prefix wins. Two rules sharing a prefix therefore resolve
//! to whichever appears first in [`FORMAT_RULES`].

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// A logical format family and the MIME prefixes that select it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatRule {
    pub id: &'static str,
    pub mime_prefixes: &'static [&'static str],
}

impl FormatRule {
    /// Prefix match against an already lowercased content type.
    fn matches(&self, content_type: &str) -> bool {
        self.mime_prefixes
            .iter()
            .any(|prefix| content_type.starts_with(prefix))
    }
}

pub const FORMAT_RULES: &[FormatRule] = &[
    FormatRule {
        id: "pdf",
        mime_prefixes: &["application/pdf"],
    },
    FormatRule {
        id: "powerpoint",
        mime_prefixes: &[
            "application/vnd.ms-powerpoint",
            "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ],
    },
    FormatRule {
        id: "word",
        mime_prefixes: &[
            "application/msword",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ],
    },
    FormatRule {
        id: "excel",
        mime_prefixes: &[
            "application/vnd.ms-excel",
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ],
    },
    FormatRule {
        id: "image",
        mime_prefixes: &[
            "image/jpeg",
            "image/png",
            "image/gif",
            "image/bmp",
            "image/tiff",
            "image/webp",
        ],
    },
    FormatRule {
        id: "audio",
        mime_prefixes: &[
            "audio/mpeg",
            "audio/wav",
            "audio/ogg",
            "audio/m4a",
            "audio/mp3",
            "audio/aac",
        ],
    },
    FormatRule {
        id: "html",
        mime_prefixes: &["text/html"],
    },
    FormatRule {
        id: "text",
        mime_prefixes: &[
            "text/plain",
            "text/csv",
            "application/json",
            "application/xml",
            "text/xml",
        ],
    },
];

/// Classify a declared content type.
///
/// Returns `(true, format_id)` for the first rule whose prefix matches
/// (case-insensitive), or `(false, "")` when nothing matches.
pub fn classify(content_type: &str) -> (bool, &'static str) {
    classify_with(FORMAT_RULES, content_type)
}

fn classify_with(rules: &[FormatRule], content_type: &str) -> (bool, &'static str) {
    let lowered = content_type.to_ascii_lowercase();
    rules
        .iter()
        .find(|rule| rule.matches(&lowered))
        .map(|rule| (true, rule.id))
        .unwrap_or((false, ""))
}

// MIME type <-> extension pairs. The first entry for a MIME type is the
// extension used when writing uploads to disk.
const EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", ".pdf"),
    ("application/vnd.ms-powerpoint", ".ppt"),
    (
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        ".pptx",
    ),
    ("application/msword", ".doc"),
    (
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        ".docx",
    ),
    ("application/vnd.ms-excel", ".xls"),
    (
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        ".xlsx",
    ),
    ("image/jpeg", ".jpg"),
    ("image/jpeg", ".jpeg"),
    ("image/png", ".png"),
    ("image/gif", ".gif"),
    ("image/bmp", ".bmp"),
    ("image/tiff", ".tiff"),
    ("image/tiff", ".tif"),
    ("image/webp", ".webp"),
    ("audio/mpeg", ".mp3"),
    ("audio/mp3", ".mp3"),
    ("audio/wav", ".wav"),
    ("audio/ogg", ".ogg"),
    ("audio/m4a", ".m4a"),
    ("audio/aac", ".aac"),
    ("text/html", ".html"),
    ("text/html", ".htm"),
    ("text/plain", ".txt"),
    ("text/csv", ".csv"),
    ("application/json", ".json"),
    ("application/xml", ".xml"),
    ("text/xml", ".xml"),
];

static MIME_BY_EXTENSION: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (mime, ext) in EXTENSIONS {
        map.entry(*ext).or_insert(*mime);
    }
    map
});

/// Strip parameters and lowercase: `"Text/HTML; charset=utf-8"` -> `"text/html"`.
fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

/// File extension (with leading dot) for a content type, or `""` if unknown.
pub fn extension_for(content_type: &str) -> &'static str {
    let essence = essence(content_type);
    EXTENSIONS
        .iter()
        .find(|(mime, _)| *mime == essence)
        .map(|(_, ext)| *ext)
        .unwrap_or("")
}

/// Extension for a format family, taken from its first registered MIME type.
pub fn extension_for_format(format_id: &str) -> &'static str {
    FORMAT_RULES
        .iter()
        .find(|rule| rule.id == format_id)
        .and_then(|rule| rule.mime_prefixes.first())
        .map(|mime| extension_for(mime))
        .unwrap_or("")
}

/// Guess a content type from a file name's extension.
pub fn content_type_for_file_name(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let key = format!(".{}", ext.to_ascii_lowercase());
    MIME_BY_EXTENSION.get(key.as_str()).copied()
}
