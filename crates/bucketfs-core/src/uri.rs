//! Scheme-qualified object paths.
//!
//! Paths take one of three shapes:
//!
//! - `s3a://` -- the store root, whose children are buckets
//! - `s3a://bucket` -- a bucket root
//! - `s3a://bucket/some/key` -- an object or (emulated) directory
//!
//! A trailing `/` on the key records directory intent. Keys are normalized:
//! leading separators are dropped and runs of separators collapse, so a
//! parsed key never starts with `/` and never has empty segments.
//!
//! Bucket names follow S3 naming rules:
//! - 3 to 63 characters
//! - lowercase ASCII letters, digits, `.` and `-` only
//! - must start and end with a letter or digit

use std::fmt;

use crate::error::{FsError, FsResult};

/// Separator between key segments.
pub const SEPARATOR: char = '/';

const SCHEME_DELIMITER: &str = "://";

/// A parsed, normalized object-store path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectPath {
    scheme: String,
    bucket: Option<String>,
    key: Option<String>,
    trailing_separator: bool,
}

impl ObjectPath {
    /// Parse `path`, accepting only `scheme` (compared case-insensitively).
    ///
    /// # Examples
    ///
    /// ```
    /// use bucketfs_core::uri::ObjectPath;
    ///
    /// let p = ObjectPath::parse("s3a://gethue/data//logs/", "s3a").unwrap();
    /// assert_eq!(p.bucket(), Some("gethue"));
    /// assert_eq!(p.key(), Some("data/logs"));
    /// assert!(p.has_trailing_separator());
    /// assert!(ObjectPath::parse("ftp://archive", "s3a").is_err());
    /// ```
    pub fn parse(path: &str, scheme: &str) -> FsResult<Self> {
        let rest = strip_scheme(path, scheme).ok_or_else(|| FsError::InvalidUri {
            path: path.to_string(),
            reason: format!("expected a {scheme}{SCHEME_DELIMITER} path"),
        })?;

        let (bucket, key) = rest.split_once(SEPARATOR).unwrap_or((rest, ""));
        if bucket.is_empty() {
            if !key.trim_matches(SEPARATOR).is_empty() {
                return Err(FsError::InvalidUri {
                    path: path.to_string(),
                    reason: "key given without a bucket".into(),
                });
            }
            return Ok(Self::root(scheme));
        }
        validate_bucket_name(bucket).map_err(|reason| FsError::InvalidUri {
            path: path.to_string(),
            reason,
        })?;

        Ok(Self::in_bucket(scheme, bucket, key))
    }

    /// The store root (`scheme://`).
    pub fn root(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: None,
            key: None,
            trailing_separator: false,
        }
    }

    /// A bucket root (`scheme://bucket`). The name is not validated.
    pub fn bucket_root(scheme: &str, bucket: &str) -> Self {
        Self::in_bucket(scheme, bucket, "")
    }

    /// A path inside `bucket`; `key` is normalized, an empty key yields the
    /// bucket root.
    pub(crate) fn in_bucket(scheme: &str, bucket: &str, key: &str) -> Self {
        let normalized = normalize_key(key);
        let trailing_separator = !normalized.is_empty() && key.ends_with(SEPARATOR);
        Self {
            scheme: scheme.to_ascii_lowercase(),
            bucket: Some(bucket.to_string()),
            key: (!normalized.is_empty()).then_some(normalized),
            trailing_separator,
        }
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn bucket(&self) -> Option<&str> {
        self.bucket.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns `true` for `scheme://`.
    pub fn is_root(&self) -> bool {
        self.bucket.is_none()
    }

    /// Returns `true` for `scheme://bucket`.
    pub fn is_bucket_root(&self) -> bool {
        self.bucket.is_some() && self.key.is_none()
    }

    /// Returns `true` if the path was written with a trailing `/`.
    pub fn has_trailing_separator(&self) -> bool {
        self.trailing_separator
    }

    /// Listing prefix for the path's children: `key/`, or `""` at a bucket
    /// root.
    pub fn dir_prefix(&self) -> String {
        match &self.key {
            Some(key) => format!("{key}{SEPARATOR}"),
            None => String::new(),
        }
    }

    /// Key of the zero-byte directory marker, if the path has a key.
    pub fn marker_key(&self) -> Option<String> {
        self.key.as_ref().map(|key| format!("{key}{SEPARATOR}"))
    }

    /// Last key segment, the bucket name at a bucket root, `""` at the root.
    pub fn basename(&self) -> &str {
        match (&self.bucket, &self.key) {
            (_, Some(key)) => key.rsplit(SEPARATOR).next().unwrap_or(key),
            (Some(bucket), None) => bucket,
            (None, None) => "",
        }
    }

    /// Enclosing path; `None` for the store root.
    pub fn parent(&self) -> Option<Self> {
        let bucket = self.bucket.as_deref()?;
        match self.key.as_deref() {
            None => Some(Self::root(&self.scheme)),
            Some(key) => {
                let parent_key = key.rsplit_once(SEPARATOR).map(|(p, _)| p).unwrap_or("");
                Some(Self::in_bucket(&self.scheme, bucket, parent_key))
            }
        }
    }

    /// Path of `relative` below this one. At the store root the first
    /// segment of `relative` names a bucket and is validated.
    pub fn child(&self, relative: &str) -> FsResult<Self> {
        let relative = relative.trim_start_matches(SEPARATOR);
        match (&self.bucket, &self.key) {
            (None, _) => {
                let joined = join(&self.to_string(), &[relative]);
                Self::parse(&joined, &self.scheme)
            }
            (Some(bucket), key) => {
                let joined = match key {
                    Some(key) => format!("{key}{SEPARATOR}{relative}"),
                    None => relative.to_string(),
                };
                Ok(Self::in_bucket(&self.scheme, bucket, &joined))
            }
        }
    }

    /// Same bucket and key, ignoring directory intent.
    pub fn same_location(&self, other: &Self) -> bool {
        self.bucket == other.bucket && self.key == other.key
    }

    /// Returns `true` if this path lies strictly below `ancestor`.
    pub fn is_within(&self, ancestor: &Self) -> bool {
        if ancestor.is_root() {
            return !self.is_root();
        }
        if self.bucket != ancestor.bucket {
            return false;
        }
        match (&self.key, &ancestor.key) {
            (Some(_), None) => true,
            (Some(key), Some(_)) => key.starts_with(&ancestor.dir_prefix()),
            (None, _) => false,
        }
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SCHEME_DELIMITER}", self.scheme)?;
        if let Some(bucket) = &self.bucket {
            write!(f, "{bucket}")?;
        }
        if let Some(key) = &self.key {
            write!(f, "{SEPARATOR}{key}")?;
            if self.trailing_separator {
                write!(f, "{SEPARATOR}")?;
            }
        }
        Ok(())
    }
}

/// Split a path into `(scheme, bucket, key)`.
pub fn parse_uri(path: &str, scheme: &str) -> FsResult<(String, Option<String>, Option<String>)> {
    let parsed = ObjectPath::parse(path, scheme)?;
    Ok((parsed.scheme, parsed.bucket, parsed.key))
}

/// Returns `true` if `path` starts with `scheme://`.
pub fn is_object_uri(path: &str, scheme: &str) -> bool {
    strip_scheme(path, scheme).is_some()
}

/// Append key segments to `base`, normalizing separators between them.
///
/// Existence is never checked. A trailing `/` on the last part is kept.
///
/// ```
/// use bucketfs_core::uri::join;
///
/// assert_eq!(join("s3a://", &["gethue"]), "s3a://gethue");
/// assert_eq!(join("s3a://gethue/dir/", &["/a/", "b"]), "s3a://gethue/dir/a/b");
/// assert_eq!(join("s3a://gethue", &["dir/"]), "s3a://gethue/dir/");
/// ```
pub fn join(base: &str, parts: &[&str]) -> String {
    let mut out = base.to_string();
    for part in parts {
        let trimmed = part.trim_matches(SEPARATOR);
        if trimmed.is_empty() {
            continue;
        }
        if !out.ends_with(SEPARATOR) {
            out.push(SEPARATOR);
        }
        out.push_str(trimmed);
    }
    if parts.last().is_some_and(|p| p.ends_with(SEPARATOR)) && !out.ends_with(SEPARATOR) {
        out.push(SEPARATOR);
    }
    out
}

/// Collapse repeated separators and drop a trailing one.
///
/// The `scheme://` delimiter itself is preserved, so `normpath("s3a://")`
/// is unchanged.
pub fn normpath(path: &str) -> String {
    let (prefix, rest) = match path.find(SCHEME_DELIMITER) {
        Some(idx) => path.split_at(idx + SCHEME_DELIMITER.len()),
        None => ("", path),
    };
    let leading = if prefix.is_empty() && rest.starts_with(SEPARATOR) { "/" } else { "" };
    let body = normalize_key(rest);
    format!("{prefix}{leading}{body}")
}

fn strip_scheme<'a>(path: &'a str, scheme: &str) -> Option<&'a str> {
    let head = path.get(..scheme.len())?;
    if !head.eq_ignore_ascii_case(scheme) {
        return None;
    }
    path[scheme.len()..].strip_prefix(SCHEME_DELIMITER)
}

fn normalize_key(key: &str) -> String {
    key.split(SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

fn validate_bucket_name(name: &str) -> Result<(), String> {
    if !(3..=63).contains(&name.len()) {
        return Err(format!("bucket name must be 3 to 63 characters: {name:?}"));
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '.' || *c == '-'))
    {
        return Err(format!("bucket name contains forbidden character: {ch:?}"));
    }
    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    if !name.starts_with(alnum) || !name.ends_with(alnum) {
        return Err("bucket name must start and end with a letter or digit".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(path: &str) -> ObjectPath {
        ObjectPath::parse(path, "s3a").unwrap()
    }

    #[test]
    fn root_paths() {
        for path in ["s3a://", "s3a:///", "S3A://"] {
            let p = parse(path);
            assert!(p.is_root(), "{path}");
            assert!(!p.is_bucket_root());
            assert_eq!(p.to_string(), "s3a://");
        }
    }

    #[test]
    fn bucket_root_paths() {
        for path in ["s3a://gethue", "s3a://gethue/", "s3a://gethue//"] {
            let p = parse(path);
            assert!(p.is_bucket_root(), "{path}");
            assert_eq!(p.bucket(), Some("gethue"));
            assert_eq!(p.key(), None);
            assert_eq!(p.to_string(), "s3a://gethue");
            assert_eq!(p.dir_prefix(), "");
        }
    }

    #[test]
    fn key_paths_are_normalized() {
        let p = parse("s3a://gethue//a///b/");
        assert_eq!(p.key(), Some("a/b"));
        assert!(p.has_trailing_separator());
        assert_eq!(p.to_string(), "s3a://gethue/a/b/");
        assert_eq!(p.dir_prefix(), "a/b/");
        assert_eq!(p.marker_key().as_deref(), Some("a/b/"));
        assert_eq!(p.basename(), "b");
    }

    #[test]
    fn parse_uri_components() {
        let (scheme, bucket, key) = parse_uri("s3a://gethue/data/file.txt", "s3a").unwrap();
        assert_eq!(scheme, "s3a");
        assert_eq!(bucket.as_deref(), Some("gethue"));
        assert_eq!(key.as_deref(), Some("data/file.txt"));
    }

    #[test]
    fn reject_wrong_scheme() {
        for path in ["ftp://archive", "s3://gethue", "gethue/key", "", "s3a:/gethue", "ś3a://x"] {
            assert!(
                matches!(ObjectPath::parse(path, "s3a"), Err(FsError::InvalidUri { .. })),
                "{path}"
            );
            assert!(!is_object_uri(path, "s3a"));
        }
    }

    #[test]
    fn reject_bad_bucket_names() {
        for path in ["s3a://ab", "s3a://Upper", "s3a://-dash", "s3a://dash-", "s3a://under_score", "s3a:///key"] {
            assert!(ObjectPath::parse(path, "s3a").is_err(), "{path}");
        }
        let long = format!("s3a://{}", "a".repeat(64));
        assert!(ObjectPath::parse(&long, "s3a").is_err());
    }

    #[test]
    fn parent_chain() {
        let p = parse("s3a://gethue/a/b/c");
        let parent = p.parent().unwrap();
        assert_eq!(parent.to_string(), "s3a://gethue/a/b");
        let bucket = parse("s3a://gethue/a").parent().unwrap();
        assert!(bucket.is_bucket_root());
        assert!(bucket.parent().unwrap().is_root());
        assert!(parse("s3a://").parent().is_none());
    }

    #[test]
    fn child_paths() {
        let root = parse("s3a://");
        assert_eq!(root.child("gethue").unwrap().to_string(), "s3a://gethue");
        assert!(root.child("Bad_Bucket").is_err());

        let bucket = parse("s3a://gethue");
        assert_eq!(bucket.child("a/b").unwrap().key(), Some("a/b"));
        let dir = parse("s3a://gethue/dir/");
        assert_eq!(dir.child("/x").unwrap().to_string(), "s3a://gethue/dir/x");
    }

    #[test]
    fn containment() {
        let dir = parse("s3a://gethue/dir");
        assert!(parse("s3a://gethue/dir/x").is_within(&dir));
        assert!(!parse("s3a://gethue/dir").is_within(&dir));
        assert!(!parse("s3a://gethue/dirx").is_within(&dir));
        assert!(parse("s3a://gethue/dir").is_within(&parse("s3a://gethue")));
        assert!(!parse("s3a://other/dir/x").is_within(&dir));
        assert!(parse("s3a://gethue/dir/").same_location(&dir));
    }

    #[test]
    fn join_segments() {
        assert_eq!(join("s3a://", &["gethue", "a"]), "s3a://gethue/a");
        assert_eq!(join("s3a://gethue", &[]), "s3a://gethue");
        assert_eq!(join("s3a://gethue/a", &["", "/", "b"]), "s3a://gethue/a/b");
        assert_eq!(join("s3a://gethue/a", &["b/"]), "s3a://gethue/a/b/");
    }

    #[test]
    fn normpath_collapses() {
        assert_eq!(normpath("s3a://"), "s3a://");
        assert_eq!(normpath("s3a://gethue//a///b/"), "s3a://gethue/a/b");
        assert_eq!(normpath("/tmp//x/"), "/tmp/x");
    }

    proptest! {
        #[test]
        fn parse_display_roundtrip(
            bucket in "[a-z0-9][a-z0-9-]{1,20}[a-z0-9]",
            segments in proptest::collection::vec("[a-zA-Z0-9_.]{1,8}", 0..5),
            trailing in any::<bool>(),
        ) {
            let mut path = format!("s3a://{bucket}");
            if !segments.is_empty() {
                path = join(&path, &segments.iter().map(String::as_str).collect::<Vec<_>>());
                if trailing {
                    path.push('/');
                }
            }
            let parsed = ObjectPath::parse(&path, "s3a").unwrap();
            prop_assert_eq!(parsed.to_string(), path.clone());
            prop_assert_eq!(ObjectPath::parse(&parsed.to_string(), "s3a").unwrap(), parsed);
        }

        #[test]
        fn parsed_keys_are_normalized(raw in "[a-z/]{0,24}") {
            let parsed = ObjectPath::parse(&format!("s3a://gethue/{raw}"), "s3a").unwrap();
            if let Some(key) = parsed.key() {
                prop_assert!(!key.starts_with('/'));
                prop_assert!(!key.ends_with('/'));
                prop_assert!(!key.contains("//"));
            }
        }

        #[test]
        fn child_of_parent_is_self(segments in proptest::collection::vec("[a-z0-9]{1,6}", 1..5)) {
            let path = join("s3a://gethue", &segments.iter().map(String::as_str).collect::<Vec<_>>());
            let parsed = ObjectPath::parse(&path, "s3a").unwrap();
            let parent = parsed.parent().unwrap();
            prop_assert_eq!(parent.child(parsed.basename()).unwrap(), parsed);
        }
    }
}
