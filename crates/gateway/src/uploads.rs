//! Uploaded-file name sanitation and storage.

use std::path::{Path, PathBuf};

use na_domain::error::Result;

const MAX_NAME_LEN: usize = 96;
const FALLBACK_NAME: &str = "upload.bin";

/// Sanitize an upload name: keep alphanumerics, `.`, `-`, `_`; replace
/// everything else with `_`; cap the length; fall back to `upload.bin`
/// when nothing survives.
pub fn sanitize_filename(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // A name of only separators or dots is as good as empty.
    let meaningful = cleaned.chars().any(|c| c.is_ascii_alphanumeric());
    if !meaningful {
        return FALLBACK_NAME.to_owned();
    }

    cleaned.chars().take(MAX_NAME_LEN).collect()
}

/// Persist an upload under the uploads root with a sanitized name.
/// Returns the final path.
pub fn save_upload(root: &Path, name: &str, body: &[u8]) -> Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let path = root.join(sanitize_filename(name));
    std::fs::write(&path, body)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_safe_characters() {
        assert_eq!(sanitize_filename("report-2024_v1.pdf"), "report-2024_v1.pdf");
    }

    #[test]
    fn replaces_unsafe_characters() {
        assert_eq!(sanitize_filename("a b/c\\d.txt"), "a_b_c_d.txt");
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
    }

    #[test]
    fn empty_and_degenerate_names_fall_back() {
        assert_eq!(sanitize_filename(""), FALLBACK_NAME);
        assert_eq!(sanitize_filename("   "), FALLBACK_NAME);
        assert_eq!(sanitize_filename("///"), FALLBACK_NAME);
        assert_eq!(sanitize_filename("..."), FALLBACK_NAME);
    }

    #[test]
    fn long_names_are_capped() {
        let long = "a".repeat(200);
        assert_eq!(sanitize_filename(&long).len(), 96);
    }

    #[test]
    fn save_writes_sanitized_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = save_upload(dir.path(), "weird name!.bin", b"data").unwrap();
        assert_eq!(path.file_name().unwrap(), "weird_name_.bin");
        assert_eq!(std::fs::read(&path).unwrap(), b"data");
    }
}
