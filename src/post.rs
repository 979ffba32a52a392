//! Defines the [`Post`], [`Library`], and [`Error`] types. A library is every
//! markdown file under the posts directory, parsed once, sorted newest first,
//! and indexed by slug for the `#/post/{slug}` route.

use crate::config::Categories;
use crate::frontmatter::{split_tags, Document, Metadata, Value};
use crate::markdown::{self, Rendered};
use crate::path::SiteBase;
use crate::slug::slugify;
use chrono::NaiveDate;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

const MARKDOWN_EXTENSION: &str = "md";

/// Marks the end of a post's summary.
const FOLD_TAG: &str = "<!-- more -->";

/// The length of a summary taken from a post without a fold tag.
pub const SUMMARY_WORDS: usize = 30;

/// A post, as listed by the blog.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Post {
    /// The source file name, less the extension.
    pub file_name: String,

    /// The name of the directory holding the source file, relative to the
    /// posts directory. Empty for top-level posts.
    pub folder: String,
    pub slug: String,
    pub title: String,

    /// `YYYY-MM-DD` as written in the front matter, or the load date.
    pub date: String,
    pub category: String,
    pub tags: Vec<String>,
    pub excerpt: String,

    /// The markdown body, front matter removed.
    #[serde(skip)]
    pub content: String,

    /// All front matter fields, including the ones above.
    pub metadata: Metadata,
}

impl Post {
    /// Builds a post from its source. `relative_path` is the path of the
    /// source file relative to the posts directory, e.g. `project/intro.md`.
    pub fn from_source(
        relative_path: &Path,
        input: &str,
        categories: &Categories,
    ) -> Post {
        let file_name = relative_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let folder = relative_path
            .parent()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Document { metadata, body } = Document::parse(input);
        let text = |key: &str| {
            metadata
                .get(key)
                .filter(|v| !v.is_blank())
                .map(|v| v.to_string())
        };

        let title = text("title").unwrap_or_else(|| file_name.clone());
        let slug = post_slug(&title, &file_name);
        let date = text("date").unwrap_or_else(today);
        let category = categories.resolve(text("category"), &folder);
        let excerpt = text("excerpt")
            .or_else(|| text("description"))
            .unwrap_or_default();
        let tags = match metadata.get("tags") {
            Some(Value::List(tags)) => tags.clone(),
            Some(other) => split_tags(&other.to_string()),
            None => Vec::new(),
        };

        Post {
            file_name,
            folder,
            slug,
            title,
            date,
            category,
            tags,
            excerpt,
            content: body,
            metadata,
        }
    }

    /// The parsed date, if it starts with `YYYY-MM-DD`.
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        let date = self.date.get(..10).unwrap_or(&self.date);
        NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
    }

    /// Returns the summary of the post and whether it was cut short. The
    /// summary is the markdown before the fold tag (`<!-- more -->`) when there
    /// is one, or else the first [`SUMMARY_WORDS`] words of the text.
    pub fn summary(&self) -> (String, bool) {
        match self.content.find(FOLD_TAG) {
            Some(i) => (self.content[..i].trim_end().to_owned(), true),
            None => truncate_words(&self.content, SUMMARY_WORDS),
        }
    }

    /// Renders the body of the post to HTML.
    pub fn render(&self, base: &SiteBase) -> markdown::Result<Rendered> {
        Ok(Rendered {
            metadata: self.metadata.clone(),
            html: markdown::try_render_body(&self.content, base)?,
        })
    }
}

/// The slug of a post titled `title`, from the file `file_name`. Titles
/// without a single ASCII letter or digit fall back to the file name's slug,
/// and when that is empty too, to `post-` followed by the file name's UTF-8
/// bytes in hex. Every result is a valid slug.
pub fn post_slug(title: &str, file_name: &str) -> String {
    let slug = slugify(title);
    if !slug.is_empty() {
        return slug;
    }
    let slug = slugify(file_name);
    if !slug.is_empty() {
        return slug;
    }
    let mut slug = String::from("post");
    if !file_name.is_empty() {
        slug.push('-');
        for byte in file_name.bytes() {
            slug.push_str(&format!("{:02x}", byte));
        }
    }
    slug
}

fn today() -> String {
    chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// Strips HTML tags from `text` and keeps its first `limit` words, followed by
/// `...` when words were dropped.
pub fn truncate_words(text: &str, limit: usize) -> (String, bool) {
    static TAG: OnceLock<Regex> = OnceLock::new();
    // should always succeed
    let tag = TAG.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let plain = tag.replace_all(text, "");
    let words: Vec<&str> = plain.split_whitespace().collect();
    if words.len() <= limit {
        (words.join(" "), false)
    } else {
        (format!("{}...", words[..limit].join(" ")), true)
    }
}

/// Every post under a directory, newest first.
#[derive(Clone, Debug, Default)]
pub struct Library {
    posts: Vec<Post>,
    by_slug: HashMap<String, usize>,
}

impl Library {
    /// Sorts `posts` newest first and indexes them by slug. Posts whose date
    /// can't be parsed sort last; ties keep their input order. When two posts
    /// share a slug, the first one (after sorting) wins.
    pub fn new(mut posts: Vec<Post>) -> Library {
        posts.sort_by(|a, b| b.parsed_date().cmp(&a.parsed_date()));
        let mut by_slug: HashMap<String, usize> = HashMap::with_capacity(posts.len());
        for (i, post) in posts.iter().enumerate() {
            if let Some(&first) = by_slug.get(&post.slug) {
                let first: &Post = &posts[first];
                warn!(
                    slug = %post.slug,
                    kept = %first.file_name,
                    ignored = %post.file_name,
                    "duplicate slug"
                );
                continue;
            }
            by_slug.insert(post.slug.clone(), i);
        }
        Library { posts, by_slug }
    }

    /// Loads every `*.md` file under `source_directory`. Files that can't be
    /// read are logged and skipped; failing to walk the directory itself is
    /// an error.
    pub fn load(source_directory: &Path, categories: &Categories) -> Result<Library> {
        let mut posts = Vec::new();
        let walker = WalkDir::new(source_directory)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()));
        for result in walker {
            let entry = match result {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(Error::Annotated(
                        format!("loading posts from `{}`", source_directory.display()),
                        Box::new(Error::WalkDir(e)),
                    ))
                }
                Err(e) => {
                    error!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let is_markdown = entry.file_type().is_file()
                && entry.path().extension().map_or(false, |ext| ext == MARKDOWN_EXTENSION);
            if !is_markdown {
                continue;
            }
            let relative_path = entry
                .path()
                .strip_prefix(source_directory)
                .unwrap_or_else(|_| entry.path());
            match load_post(entry.path(), relative_path, categories) {
                Ok(post) => {
                    debug!(path = %relative_path.display(), slug = %post.slug, "loaded post");
                    posts.push(post);
                }
                Err(e) => error!(error = %e, "skipping post"),
            }
        }
        Ok(Library::new(posts))
    }

    /// All posts, newest first.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Looks up a post by slug.
    pub fn get(&self, slug: &str) -> Option<&Post> {
        self.by_slug.get(slug).map(|&i| &self.posts[i])
    }

    /// Renders the post with the given slug. A post that fails to render is
    /// logged and replaced by the degraded page; `None` means no such post.
    pub fn render(&self, slug: &str, base: &SiteBase) -> Option<Rendered> {
        let post = match self.get(slug) {
            Some(post) => post,
            None => {
                warn!(slug, "post not found");
                return None;
            }
        };
        Some(match post.render(base) {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(slug, error = %e, "rendering post");
                Rendered::degraded(&e)
            }
        })
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }
}

fn load_post(path: &Path, relative_path: &Path, categories: &Categories) -> Result<Post> {
    match fs::read_to_string(path) {
        Ok(input) => Ok(Post::from_source(relative_path, &input, categories)),
        Err(e) => Err(Error::Annotated(
            format!("reading post `{}`", relative_path.display()),
            Box::new(Error::Io(e)),
        )),
    }
}

/// Represents the result of loading posts.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error loading posts.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O errors reading a post.
    Io(std::io::Error),

    /// Returned for errors walking the posts directory.
    WalkDir(walkdir::Error),

    /// An error with an annotation.
    Annotated(String, Box<Error>),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::WalkDir(err) => err.fmt(f),
            Error::Annotated(annotation, err) => {
                write!(f, "{}: {}", &annotation, err)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::WalkDir(err) => Some(err),
            Error::Annotated(_, err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Error {
        Error::WalkDir(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::path::PathBuf;

    fn post(relative_path: &str, input: &str) -> Post {
        Post::from_source(Path::new(relative_path), input, &Categories::default())
    }

    #[test]
    fn test_post_fields() {
        let p = post(
            "project/cvfactory.md",
            "---\ntitle: CVFactory Backend\ndate: 2025-06-25\ntags: rust, blog\n\
             description: How it was built\nseries: 2\n---\n\n# Body\n",
        );
        assert_eq!("cvfactory", p.file_name);
        assert_eq!("project", p.folder);
        assert_eq!("cvfactory-backend", p.slug);
        assert_eq!("CVFactory Backend", p.title);
        assert_eq!("2025-06-25", p.date);
        assert_eq!("Project", p.category);
        assert_eq!(vec!["rust", "blog"], p.tags);
        assert_eq!("How it was built", p.excerpt);
        assert_eq!("# Body", p.content);
        assert_eq!(Some(&Value::Number(2.0)), p.metadata.get("series"));
    }

    #[test]
    fn test_post_fallbacks() {
        let p = post("notes.md", "Just a body.");
        assert_eq!("notes", p.title);
        assert_eq!("notes", p.slug);
        assert_eq!("", p.folder);
        assert_eq!("General", p.category);
        assert!(p.tags.is_empty());
        assert_eq!("", p.excerpt);
        assert!(p.parsed_date().is_some(), "date defaults to today: {}", p.date);

        let p = post(
            "company/q3.md",
            "---\ntitle: 회고\ncategory: Essay\nexcerpt: short\ndescription: long\n---\n",
        );
        assert_eq!("q3", p.slug);
        assert_eq!("Essay", p.category);
        assert_eq!("short", p.excerpt);

        let p = post("tutorial/한국어.md", "---\ntitle: 제목\n---\n");
        assert_eq!("post-ed959ceab5adec96b4", p.slug);
        assert_eq!("Tutorial", p.category);
    }

    #[test]
    fn test_post_slug_is_always_a_slug() {
        let re = Regex::new(r"^[a-z0-9]*(?:-[a-z0-9]+)*$").unwrap();
        let cases = [
            ("Hello World", "notes", "hello-world"),
            ("회고", "q3-review", "q3-review"),
            ("회고", "한국어", "post-ed959ceab5adec96b4"),
            ("", "", "post"),
            ("!!!", "___", "post-5f5f5f"),
        ];
        for (title, file_name, wanted) in cases.iter() {
            let slug = post_slug(title, file_name);
            assert_eq!(*wanted, slug, "slug for {:?} / {:?}", title, file_name);
            assert!(re.is_match(&slug), "bad slug {:?}", slug);
        }
    }

    #[test]
    fn test_summary() {
        let p = post("a.md", "Intro *text*.\n\n<!-- more -->\n\nThe rest.");
        assert_eq!((String::from("Intro *text*."), true), p.summary());

        let p = post("a.md", "A <b>short</b> post.");
        assert_eq!((String::from("A short post."), false), p.summary());

        let (summary, truncated) = truncate_words("one two three four", 2);
        assert_eq!("one two...", summary);
        assert!(truncated);
        assert_eq!((String::new(), false), truncate_words("", 2));
    }

    #[test]
    fn test_library_order_and_index() {
        let library = Library::new(vec![
            post("old.md", "---\ntitle: Old\ndate: 2023-01-05\n---\n"),
            post("undated.md", "---\ntitle: Undated\ndate: someday\n---\n"),
            post("new.md", "---\ntitle: New\ndate: 2025-03-01\n---\n"),
            post("twin.md", "---\ntitle: Old\ndate: 2022-12-31\n---\n"),
        ]);
        let order: Vec<&str> = library
            .posts()
            .iter()
            .map(|p| p.file_name.as_str())
            .collect();
        assert_eq!(vec!["new", "old", "twin", "undated"], order);
        assert_eq!(4, library.len());

        assert_eq!(Some("old"), library.get("old").map(|p| p.file_name.as_str()));
        assert_eq!(Some("new"), library.get("new").map(|p| p.file_name.as_str()));
        assert!(library.get("missing").is_none());
    }

    #[test]
    fn test_library_render() {
        let library = Library::new(vec![post(
            "a.md",
            "---\ntitle: Pictures\n---\n![cat](images/cat.png)",
        )]);
        let rendered = library.render("pictures", &SiteBase::default()).unwrap();
        assert_eq!(
            r#"<p><img src="/blog/images/cat.png" alt="cat" /></p>"#,
            rendered.html.trim_end()
        );
        assert_eq!(Some("Pictures"), rendered.metadata["title"].as_str());
        assert!(library.render("nope", &SiteBase::default()).is_none());
    }

    #[test]
    fn test_load() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let root: PathBuf = dir.path().to_owned();
        fs::create_dir_all(root.join("project"))?;
        fs::create_dir_all(root.join("tutorial/deep"))?;
        fs::write(
            root.join("project/one.md"),
            "---\ntitle: One\ndate: 2024-01-01\n---\nfirst",
        )?;
        fs::write(
            root.join("tutorial/deep/two.md"),
            "---\ntitle: Two\ndate: 2024-02-01\n---\nsecond",
        )?;
        fs::write(root.join("notes.txt"), "not a post")?;
        fs::write(root.join("broken.md"), [0xff, 0xfe, 0x00])?;

        let library = Library::load(&root, &Categories::default())?;
        let slugs: Vec<&str> = library.posts().iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(vec!["two", "one"], slugs);
        assert_eq!("deep", library.posts()[0].folder);
        assert_eq!("General", library.posts()[0].category);
        assert_eq!("Project", library.posts()[1].category);
        Ok(())
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        match Library::load(&missing, &Categories::default()) {
            Err(Error::Annotated(_, inner)) => assert!(matches!(*inner, Error::WalkDir(_))),
            other => panic!("wanted walk error, got {:?}", other.map(|l| l.len())),
        }
    }
}
