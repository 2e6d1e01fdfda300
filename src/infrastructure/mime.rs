// Content-type guessing for stored images
use std::path::Path;

pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guess an image content type from the filename extension
pub fn guess_content_type(filename: &str) -> Option<&'static str> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// A declared type wins unless it is missing, blank or the generic octet-stream.
pub fn resolve_content_type(declared: Option<&str>, filename: &str, fallback: &str) -> String {
    match declared.map(str::trim) {
        Some(declared) if !declared.is_empty() && !declared.eq_ignore_ascii_case(OCTET_STREAM) => {
            declared.to_string()
        }
        _ => guess_content_type(filename).unwrap_or(fallback).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_known_extensions() {
        assert_eq!(guess_content_type("a.JPG"), Some("image/jpeg"));
        assert_eq!(guess_content_type("b.jpeg"), Some("image/jpeg"));
        assert_eq!(guess_content_type("c.bmp"), Some("image/bmp"));
        assert_eq!(guess_content_type("notes.txt"), None);
        assert_eq!(guess_content_type("no_extension"), None);
    }

    #[test]
    fn test_resolve_prefers_declared_type() {
        assert_eq!(resolve_content_type(Some("image/png"), "a.jpg", OCTET_STREAM), "image/png");
        assert_eq!(resolve_content_type(Some(OCTET_STREAM), "a.gif", OCTET_STREAM), "image/gif");
        assert_eq!(resolve_content_type(Some("  "), "a.webp", OCTET_STREAM), "image/webp");
        assert_eq!(resolve_content_type(None, "blob", "image/jpeg"), "image/jpeg");
    }
}
