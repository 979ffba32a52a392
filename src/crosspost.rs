//! Prepares a post for cross-posting to an external blogging platform. Only
//! the text side lives here: image references are made absolute against the
//! blog's public URL, tags and title are fitted to the platform's limits, and
//! the result is an [`Article`] ready to be sent as `{ "article": {...} }`.

use crate::config::DEFAULT_PUBLIC_BASE_URL;
use crate::frontmatter::{split_tags, Document, Value};
use crate::path::{is_remote, SiteBase};
use crate::post::post_slug;
use regex::{Captures, Regex};
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;
use url::Url;

/// The most tags an article may carry.
pub const MAX_TAGS: usize = 4;

/// The longest title an article may carry, in characters.
pub const MAX_TITLE: usize = 128;

/// The public address of the blog, e.g. `https://wintrover.github.io/blog/`.
/// Its path always ends with a slash and contains the site base.
#[derive(Clone, Debug, PartialEq)]
pub struct PublicBase {
    url: Url,
    site_base: SiteBase,
}

impl PublicBase {
    /// Parses a public URL the way it tends to be configured:
    ///
    /// * quotes and surrounding whitespace are dropped;
    /// * a missing scheme means `https://`;
    /// * a bare host gets `site_base` as its path, and a path that doesn't
    ///   mention `site_base` gets it appended;
    /// * the path always ends with a slash.
    pub fn parse(raw: &str, site_base: &SiteBase) -> Result<PublicBase> {
        let trimmed: String = raw
            .trim()
            .chars()
            .filter(|&c| c != '"' && c != '\'')
            .collect();
        if trimmed.is_empty() {
            return Err(Error::Empty);
        }
        let lower = trimmed.to_ascii_lowercase();
        let mut url = if lower.starts_with("http://") || lower.starts_with("https://") {
            Url::parse(&trimmed)?
        } else {
            Url::parse(&format!("https://{}", trimmed.trim_start_matches('/')))?
        };

        let needle = site_base.as_str().trim_end_matches('/');
        let path = url.path().to_owned();
        if path == "/" {
            url.set_path(site_base.as_str());
        } else if !path.contains(needle) {
            url.set_path(&format!("{}{}", path.trim_end_matches('/'), site_base));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        let site_base = SiteBase::new(url.path());
        Ok(PublicBase { url, site_base })
    }

    /// Like [`PublicBase::parse`], but falls back to
    /// [`DEFAULT_PUBLIC_BASE_URL`] when `raw` can't be parsed.
    pub fn resolve(raw: &str, site_base: &SiteBase) -> Result<PublicBase> {
        match PublicBase::parse(raw, site_base) {
            Ok(base) => Ok(base),
            Err(e) => {
                warn!(url = raw, error = %e, "invalid public base URL, using the default");
                PublicBase::parse(DEFAULT_PUBLIC_BASE_URL, site_base)
            }
        }
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// The site base taken from the public URL's path.
    pub fn site_base(&self) -> &SiteBase {
        &self.site_base
    }

    /// The in-app URL of the post with the given slug.
    pub fn post_url(&self, slug: &str) -> String {
        format!("{}#/post/{}", self.url, slug)
    }

    /// Makes an image reference absolute. Remote and `data:` references are
    /// returned as they are; anything else loses a leading `public/`, is
    /// normalized against the public site base, and is joined onto the
    /// public origin.
    pub fn absolutize(&self, src: &str) -> String {
        let trimmed = src.trim().trim_matches(|c: char| c == '"' || c == '\'');
        if trimmed.is_empty() || is_remote(trimmed) {
            return trimmed.to_owned();
        }
        let asset = trimmed.replace('\\', "/");
        let asset = asset.strip_prefix('/').unwrap_or(&asset);
        let asset = asset.strip_prefix("public/").unwrap_or(asset);
        let path = self.site_base.normalize(asset);
        match self.url.join(&path) {
            Ok(url) => url.into(),
            Err(_) => format!("{}{}", self.url.origin().ascii_serialization(), path),
        }
    }

    /// Rewrites every markdown image (`![alt](src "title")`) and HTML
    /// `<img src="...">` in `markdown` with [`PublicBase::absolutize`].
    /// Returns the rewritten text and the first image's absolute URL.
    pub fn absolutize_images(&self, markdown: &str) -> (String, Option<String>) {
        static IMAGE: OnceLock<Regex> = OnceLock::new();
        let image = IMAGE.get_or_init(|| {
            // should always succeed
            Regex::new(concat!(
                r#"(?i:<img\s+([^>]*?)src=["']([^"']+)["']([^>]*)>)"#,
                r#"|!\[([^\]]*)\]\(\s*<?([^)\s>]+)>?([^)]*)\)"#,
            ))
            .unwrap()
        });

        let mut first = None;
        let out = image.replace_all(markdown, |caps: &Captures| {
            let rewritten = match caps.get(2) {
                Some(src) => {
                    let abs = self.absolutize(src.as_str());
                    let html = format!(r#"<img {}src="{}"{}>"#, &caps[1], abs, &caps[3]);
                    (abs, html)
                }
                None => {
                    let abs = self.absolutize(&caps[5]);
                    let md = format!("![{}]({}{})", &caps[4], abs, &caps[6]);
                    (abs, md)
                }
            };
            let (abs, text) = rewritten;
            first.get_or_insert(abs);
            text
        });
        (out.into_owned(), first)
    }
}

impl fmt::Display for PublicBase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Normalizes a configured public URL (see [`PublicBase::parse`]), falling
/// back to [`DEFAULT_PUBLIC_BASE_URL`].
pub fn normalize_public_base_url(raw: &str, site_base: &SiteBase) -> String {
    match PublicBase::parse(raw, site_base) {
        Ok(base) => base.to_string(),
        Err(_) => String::from(DEFAULT_PUBLIC_BASE_URL),
    }
}

/// Lowercases each tag and keeps only `[a-z0-9]`. Empty and repeated tags are
/// dropped, and at most [`MAX_TAGS`] are kept.
pub fn sanitize_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(MAX_TAGS);
    for tag in tags {
        let clean: String = tag
            .as_ref()
            .chars()
            .flat_map(char::to_lowercase)
            .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
            .collect();
        if !clean.is_empty() && !out.contains(&clean) {
            out.push(clean);
        }
        if out.len() == MAX_TAGS {
            break;
        }
    }
    out
}

/// Shortens titles longer than [`MAX_TITLE`] characters to
/// `MAX_TITLE - 3` characters followed by `...`.
pub fn clamp_title(title: &str) -> String {
    if title.chars().count() <= MAX_TITLE {
        return title.to_owned();
    }
    let mut out: String = title.chars().take(MAX_TITLE - 3).collect();
    out.push_str("...");
    out
}

/// An article as the cross-posting platform expects it. Articles are always
/// created as drafts.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Article {
    pub title: String,
    pub published: bool,
    pub body_markdown: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub canonical_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover_image: Option<String>,
}

#[derive(Serialize)]
struct Payload<'a> {
    article: &'a Article,
}

impl Article {
    /// Builds the article for a post source. `file_stem` is the source file
    /// name less its extension; it stands in for a missing title.
    pub fn from_source(input: &str, file_stem: &str, base: &PublicBase) -> Article {
        let document = Document::parse(input);
        let title = document
            .text("title")
            .unwrap_or_else(|| file_stem.to_owned());
        let slug = post_slug(&title, file_stem);
        let (body_markdown, first_image) = base.absolutize_images(&document.body);
        let tags = match document.metadata.get("tags") {
            Some(Value::List(tags)) => sanitize_tags(tags.as_slice()),
            Some(other) => sanitize_tags(split_tags(&other.to_string()).as_slice()),
            None => Vec::new(),
        };
        Article {
            title: clamp_title(&title),
            published: false,
            body_markdown,
            tags,
            description: document
                .text("excerpt")
                .or_else(|| document.text("description")),
            canonical_url: document
                .text("canonical_url")
                .unwrap_or_else(|| base.post_url(&slug)),
            cover_image: document.text("cover_image").or(first_image),
        }
    }

    /// The request body: `{ "article": {...} }`.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&Payload { article: self })
    }
}

/// Represents the result of a cross-posting operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error preparing an article.
#[derive(Debug)]
pub enum Error {
    /// Returned when the public URL is blank.
    Empty,

    /// Returned when the public URL can't be parsed.
    UrlParse(url::ParseError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Empty => write!(f, "public base URL is empty"),
            Error::UrlParse(err) => err.fmt(f),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Empty => None,
            Error::UrlParse(err) => Some(err),
        }
    }
}

impl From<url::ParseError> for Error {
    /// Converts a [`url::ParseError`] into an [`Error`]. It allows us to use
    /// the `?` operator for URL parsing.
    fn from(err: url::ParseError) -> Error {
        Error::UrlParse(err)
    }
}
