//! Remote key validation.
//!
//! Keys are plain strings inside a single bucket. Forward slashes act as
//! virtual directories, so the same traversal rules as filesystem paths
//! apply: a key may never climb above the bucket root.

use crate::error::{ErrorKind, Result};

/// Validates and normalizes a remote object key.
///
/// Empty segments and `.` segments are dropped, `..` pops the previous
/// segment. A key that escapes the bucket root, contains a NUL byte or is
/// empty after normalization is rejected with
/// [`InvalidKey`](crate::error::ErrorKind::InvalidKey).
///
/// # Examples
///
/// ```
/// use cloudmd_storage::validate_key;
/// // Valid keys
/// assert!(validate_key("Shopping list.md").is_ok());
/// assert!(validate_key("journal/2024/march.md").is_ok());
/// // Invalid keys
/// assert!(validate_key("../secret.md").is_err());
/// assert!(validate_key("a\0b.md").is_err());
/// assert!(validate_key("").is_err());
/// // Keys get normalized
/// assert_eq!(validate_key("/journal//./old/../march.md").unwrap(), "journal/march.md");
/// ```
pub fn validate(key: impl AsRef<str>) -> Result<String> {
    let key = key.as_ref();
    if key.contains('\0') {
        exn::bail!(ErrorKind::InvalidKey(key.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in key.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidKey(key.to_string()));
                }
            },
            segment => segments.push(segment),
        }
    }
    match segments.is_empty() {
        true => exn::bail!(ErrorKind::InvalidKey(key.to_string())),
        false => Ok(segments.join("/")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("note.md", "note.md")]
    #[case("My Note.md", "My Note.md")]
    #[case("a/b/c.md", "a/b/c.md")]
    #[case("a//b//c.md", "a/b/c.md")]
    #[case("./a/./b.md", "a/b.md")]
    #[case("/leading.md", "leading.md")]
    #[case("a/b/../c.md", "a/c.md")]
    #[case("trailing/", "trailing")]
    fn test_valid_keys(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("/")]
    #[case(".")]
    #[case("..")]
    #[case("../escape.md")]
    #[case("a/../../b.md")]
    #[case("a\0b.md")]
    fn test_invalid_keys(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidKey(_)));
    }
}
