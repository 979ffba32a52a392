//! Canonicalizes image references found in posts. Authors write image paths
//! in a handful of ways (`images/a.png`, `/assets/images/09/a.png`,
//! `../assets/images/a.png`, `/blog/images/a.png`); [`SiteBase::normalize`]
//! maps all of them onto one site-rooted form (`/blog/images/...`) and leaves
//! remote and `data:` references alone.
//!
//! Normalizing is pure and idempotent: feeding the output back in returns it
//! unchanged.

use serde::{Deserialize, Deserializer};
use std::borrow::Cow;
use std::fmt;

/// The legacy asset folder. Its subfolders are flattened into `images/`.
const LEGACY_PREFIX: &str = "assets/images/";

/// The canonical image folder under the site base.
const IMAGES_DIR: &str = "images/";

/// The path under which the site is served, e.g. `/blog/`. Always stored
/// with a leading and a trailing slash; the root is `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SiteBase {
    path: String,
}

impl Default for SiteBase {
    fn default() -> Self {
        SiteBase::new("/blog/")
    }
}

impl fmt::Display for SiteBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.path)
    }
}

impl<'de> Deserialize<'de> for SiteBase {
    fn deserialize<D>(deserializer: D) -> Result<SiteBase, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(SiteBase::new(&String::deserialize(deserializer)?))
    }
}

/// How an image reference was written. See [`SiteBase::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PathKind {
    /// `http://`, `https://`, protocol-relative `//`, or `data:`. Never
    /// rewritten.
    Remote,

    /// Already under the site base, e.g. `/blog/images/a.png`.
    SiteRooted,

    /// `assets/images/NN/...` where `NN` is exactly two digits.
    LegacyNumbered,

    /// Any other `assets/images/...` reference.
    LegacyNamed,

    /// Everything else: relative paths and root paths outside the base.
    PlainRelative,
}

/// A raw image reference together with its [`PathKind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageReference<'a> {
    pub raw: &'a str,
    pub kind: PathKind,
}

impl SiteBase {
    /// Constructs a [`SiteBase`] from a path with or without its surrounding
    /// slashes (`blog`, `/blog`, and `/blog/` are all the same base).
    pub fn new(path: &str) -> SiteBase {
        let trimmed = path.trim().trim_matches('/');
        SiteBase {
            path: match trimmed.is_empty() {
                true => String::from("/"),
                false => format!("/{}/", trimmed),
            },
        }
    }

    /// The base path with its leading and trailing slash.
    pub fn as_str(&self) -> &str {
        &self.path
    }

    /// Rewrites `src` into its canonical site-rooted form:
    ///
    /// 1. Remote and `data:` references, and the empty string, are returned
    ///    as-is.
    /// 2. The site base prefix (with or without its leading slash), or else a
    ///    single leading slash, is removed.
    /// 3. `.` and `..` segments are resolved. Excess `..` segments are
    ///    dropped.
    /// 4. `assets/images/NN/file` becomes `images/NN-file` and
    ///    `assets/images/dir/file` becomes `images/file`.
    /// 5. The result is prefixed with the site base.
    pub fn normalize<'a>(&self, src: &'a str) -> Cow<'a, str> {
        if src.is_empty() || is_remote(src) {
            return Cow::Borrowed(src);
        }
        let resolved = resolve_dots(self.strip_base(src));
        let relative = resolved.strip_prefix('/').unwrap_or(&*resolved);
        Cow::Owned(self.join(&flatten_legacy(relative)))
    }

    /// Pairs `raw` with its [`PathKind`].
    pub fn reference<'a>(&self, raw: &'a str) -> ImageReference<'a> {
        ImageReference {
            raw,
            kind: self.classify(raw),
        }
    }

    /// Determines how `src` was written.
    pub fn classify(&self, src: &str) -> PathKind {
        if is_remote(src) {
            return PathKind::Remote;
        }
        let resolved = resolve_dots(self.strip_base(src));
        let relative = resolved.strip_prefix('/').unwrap_or(&*resolved);
        match relative.strip_prefix(LEGACY_PREFIX) {
            Some(rest) => match rest.split_once('/') {
                Some((folder, _)) if is_two_digits(folder) => {
                    PathKind::LegacyNumbered
                }
                _ => PathKind::LegacyNamed,
            },
            None if src.starts_with(self.path.as_str()) => PathKind::SiteRooted,
            None => PathKind::PlainRelative,
        }
    }

    fn strip_base<'a>(&self, src: &'a str) -> &'a str {
        if let Some(rest) = src.strip_prefix(self.path.as_str()) {
            return rest;
        }
        let bare = &self.path[1..];
        if !bare.is_empty() {
            if let Some(rest) = src.strip_prefix(bare) {
                return rest;
            }
        }
        src.strip_prefix('/').unwrap_or(src)
    }

    fn join(&self, relative: &str) -> String {
        let mut out = String::with_capacity(self.path.len() + relative.len());
        out.push_str(&self.path);
        out.push_str(relative.strip_prefix('/').unwrap_or(relative));
        out
    }
}

/// Normalizes `src` against the default `/blog/` base. See
/// [`SiteBase::normalize`].
pub fn normalize(src: &str) -> String {
    SiteBase::default().normalize(src).into_owned()
}

/// Whether `src` is an absolute, protocol-relative, or `data:` reference.
pub fn is_remote(src: &str) -> bool {
    src.starts_with("//")
        || starts_with_ignore_case(src, "http://")
        || starts_with_ignore_case(src, "https://")
        || starts_with_ignore_case(src, "data:")
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Resolves `.` and `..` segments against an empty stack. Empty segments are
/// dropped; a leading slash survives.
fn resolve_dots(path: &str) -> Cow<'_, str> {
    let mut stack: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            ".." => {
                stack.pop();
            }
            "." | "" => {}
            _ => stack.push(segment),
        }
    }

    let joined = stack.join("/");
    match path.starts_with('/') {
        true => Cow::Owned(format!("/{}", joined)),
        false if joined == path => Cow::Borrowed(path),
        false => Cow::Owned(joined),
    }
}

/// `relative` must already be resolved (see [`resolve_dots`]) and must not
/// start with a slash.
fn flatten_legacy(relative: &str) -> Cow<'_, str> {
    let rest = match relative.strip_prefix(LEGACY_PREFIX) {
        Some(rest) => rest,
        None => return Cow::Borrowed(relative),
    };

    Cow::Owned(match rest.split_once('/') {
        Some((folder, file)) if is_two_digits(folder) => {
            format!("{}{}-{}", IMAGES_DIR, folder, file)
        }
        Some((_, file)) => format!("{}{}", IMAGES_DIR, file),
        None => format!("{}{}", IMAGES_DIR, rest),
    })
}

fn is_two_digits(segment: &str) -> bool {
    segment.len() == 2 && segment.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod test {
    use super::*;
    use proptest::prelude::*;

    struct TestCase {
        src: &'static str,
        wanted: &'static str,
    }

    fn fixture(base: &SiteBase, cases: &[TestCase]) {
        for case in cases {
            assert_eq!(
                case.wanted,
                base.normalize(case.src),
                "normalizing \"{}\" under \"{}\"",
                case.src,
                base
            );
        }
    }

    #[test]
    fn test_normalize_remote() {
        fixture(
            &SiteBase::default(),
            &[
                TestCase { src: "https://example.com/image.jpg", wanted: "https://example.com/image.jpg" },
                TestCase { src: "http://example.com/image.jpg", wanted: "http://example.com/image.jpg" },
                TestCase { src: "HTTPS://EXAMPLE.COM/a.png", wanted: "HTTPS://EXAMPLE.COM/a.png" },
                TestCase { src: "//cdn.example.com/a.png", wanted: "//cdn.example.com/a.png" },
                TestCase { src: "data:image/png;base64,iVBORw0KGgo=", wanted: "data:image/png;base64,iVBORw0KGgo=" },
                TestCase { src: "", wanted: "" },
            ],
        );
    }

    #[test]
    fn test_normalize_absolute() {
        fixture(
            &SiteBase::default(),
            &[
                TestCase { src: "/assets/images/test.jpg", wanted: "/blog/images/test.jpg" },
                TestCase { src: "/images/test.png", wanted: "/blog/images/test.png" },
                TestCase { src: "/favicon.ico", wanted: "/blog/favicon.ico" },
            ],
        );
    }

    #[test]
    fn test_normalize_relative() {
        fixture(
            &SiteBase::default(),
            &[
                TestCase { src: "assets/images/test.jpg", wanted: "/blog/images/test.jpg" },
                TestCase { src: "images/test.png", wanted: "/blog/images/test.png" },
                TestCase { src: "test.jpg", wanted: "/blog/test.jpg" },
                TestCase { src: "./a/./b/../c.png", wanted: "/blog/a/c.png" },
                TestCase { src: "../../../x.png", wanted: "/blog/x.png" },
                TestCase { src: "a//b.png", wanted: "/blog/a/b.png" },
                TestCase { src: ".", wanted: "/blog/" },
            ],
        );
    }

    #[test]
    fn test_normalize_base_prefix() {
        fixture(
            &SiteBase::default(),
            &[
                TestCase { src: "/blog/assets/images/test.jpg", wanted: "/blog/images/test.jpg" },
                TestCase { src: "/blog/images/test.png", wanted: "/blog/images/test.png" },
                TestCase { src: "blog/images/test.png", wanted: "/blog/images/test.png" },
                TestCase { src: "/blog/", wanted: "/blog/" },
                TestCase { src: "/blog//assets/images/09/a.png", wanted: "/blog/images/09-a.png" },
                TestCase { src: "/blogs/a.png", wanted: "/blog/blogs/a.png" },
            ],
        );
    }

    #[test]
    fn test_normalize_legacy() {
        fixture(
            &SiteBase::default(),
            &[
                TestCase { src: "assets/images/09/diagram.svg", wanted: "/blog/images/09-diagram.svg" },
                TestCase { src: "assets/images/foo/diagram.svg", wanted: "/blog/images/diagram.svg" },
                TestCase { src: "assets/images/09/nested/x.svg", wanted: "/blog/images/09-nested/x.svg" },
                TestCase { src: "assets/images/123/x.svg", wanted: "/blog/images/x.svg" },
                TestCase { src: "assets/images/09", wanted: "/blog/images/09" },
                TestCase { src: "assets/images/", wanted: "/blog/assets/images" },
                TestCase { src: "../assets/images/09/x.svg", wanted: "/blog/images/09-x.svg" },
                TestCase { src: "/assets/images/09/x.svg", wanted: "/blog/images/09-x.svg" },
            ],
        );
    }

    #[test]
    fn test_normalize_other_bases() {
        fixture(
            &SiteBase::new("docs"),
            &[
                TestCase { src: "/docs/assets/images/01/a.png", wanted: "/docs/images/01-a.png" },
                TestCase { src: "/blog/images/a.png", wanted: "/docs/blog/images/a.png" },
            ],
        );
        fixture(
            &SiteBase::new("/"),
            &[
                TestCase { src: "/assets/images/01/a.png", wanted: "/images/01-a.png" },
                TestCase { src: "a.png", wanted: "/a.png" },
            ],
        );
    }

    #[test]
    fn test_site_base_new() {
        assert_eq!("/blog/", SiteBase::new("blog").as_str());
        assert_eq!("/blog/", SiteBase::new("/blog").as_str());
        assert_eq!("/a/b/", SiteBase::new("/a/b/").as_str());
        assert_eq!("/", SiteBase::new("").as_str());
        assert_eq!("/", SiteBase::new("///").as_str());
    }

    #[test]
    fn test_unchanged_paths_are_borrowed() {
        assert!(matches!(resolve_dots("a/b.png"), Cow::Borrowed("a/b.png")));
        assert!(matches!(resolve_dots("a/../b.png"), Cow::Owned(ref s) if s == "b.png"));
        assert!(matches!(flatten_legacy("a/b.png"), Cow::Borrowed("a/b.png")));
    }

    #[test]
    fn test_classify() {
        let base = SiteBase::default();
        let cases = [
            ("https://example.com/a.png", PathKind::Remote),
            ("data:image/png;base64,AAAA", PathKind::Remote),
            ("/blog/images/a.png", PathKind::SiteRooted),
            ("assets/images/09/a.png", PathKind::LegacyNumbered),
            ("/blog/assets/images/09/a.png", PathKind::LegacyNumbered),
            ("assets/images/foo/a.png", PathKind::LegacyNamed),
            ("assets/images/a.png", PathKind::LegacyNamed),
            ("images/a.png", PathKind::PlainRelative),
            ("/favicon.ico", PathKind::PlainRelative),
        ];
        for (src, wanted) in cases.iter() {
            assert_eq!(*wanted, base.classify(src), "classifying \"{}\"", src);
        }
        assert_eq!(
            ImageReference { raw: "a.png", kind: PathKind::PlainRelative },
            base.reference("a.png")
        );
    }

    #[test]
    fn test_normalized_output_is_site_rooted() {
        let base = SiteBase::default();
        for src in ["a.png", "../assets/images/09/x.svg", "/blog/images/x.png"].iter() {
            assert_eq!(PathKind::SiteRooted, base.classify(&base.normalize(src)));
        }
    }

    fn file_name() -> impl Strategy<Value = String> {
        "[a-z0-9_-]{1,24}"
    }

    proptest! {
        #[test]
        fn prop_normalize_is_idempotent(src in "\\PC*") {
            let base = SiteBase::default();
            let once = base.normalize(&src).into_owned();
            prop_assert_eq!(&once, &base.normalize(&once));
        }

        #[test]
        fn prop_normalize_is_idempotent_on_path_like_input(
            parts in proptest::collection::vec("(\\.|\\.\\.|blog|assets|images|09|[a-z]{1,3}|)", 0..8),
            lead in "(/|)",
        ) {
            let src = format!("{}{}", lead, parts.join("/"));
            let base = SiteBase::default();
            let once = base.normalize(&src).into_owned();
            prop_assert_eq!(&once, &base.normalize(&once));
        }

        #[test]
        fn prop_remote_is_unchanged(
            scheme in "(http://|https://|data:)",
            rest in "\\PC*",
        ) {
            let src = format!("{}{}", scheme, rest);
            prop_assert_eq!(src.as_str(), SiteBase::default().normalize(&src));
        }

        #[test]
        fn prop_dot_segments_are_resolved(
            parts in proptest::collection::vec("(a|b|\\.|\\.\\.|)", 0..6),
            file in file_name(),
        ) {
            let prefix = parts.join("/");
            let src = match prefix.is_empty() {
                true => format!("images/{}.jpg", file),
                false => format!("{}/images/{}.jpg", prefix, file),
            };
            let out = normalize(&src);
            prop_assert!(out.starts_with("/blog/"));
            prop_assert!(!out.contains("/./"));
            prop_assert!(!out.contains("/../"));
            prop_assert!(!out.contains("assets/images"));
        }

        #[test]
        fn prop_legacy_folders_are_flattened(
            folder in "([0-9]{2}|[a-z]{1,12})",
            file in file_name(),
        ) {
            let out = normalize(&format!("assets/images/{}/{}.jpg", folder, file));
            match is_two_digits(&folder) {
                true => prop_assert_eq!(format!("/blog/images/{}-{}.jpg", folder, file), out),
                false => prop_assert_eq!(format!("/blog/images/{}.jpg", file), out),
            }
        }

        #[test]
        fn prop_leading_dots_and_slashes_agree(
            folder in "[0-9]{2}",
            file in file_name(),
            prefix in "(|/|\\./|\\.\\./|/blog/)",
        ) {
            let src = format!("{}assets/images/{}/{}.svg", prefix, folder, file);
            prop_assert_eq!(format!("/blog/images/{}-{}.svg", folder, file), normalize(&src));
        }
    }
}
