//! Converts post markdown into the HTML the blog front end mounts. Parsing is
//! done by [`pulldown_cmark`]; this module only decides how images and code
//! blocks come out:
//!
//! * image sources are rewritten with [`SiteBase::normalize`];
//! * `mermaid` code blocks become a placeholder `<div>` carrying the
//!   URL-encoded diagram source, for the front end's diagram engine to pick
//!   up;
//! * every other code block is escaped and wrapped with the copy and
//!   theme-toggle buttons the front end wires up.
//!
//! [`render`] never fails: if the markdown can't be rendered the result is a
//! short error page with empty metadata.

use crate::frontmatter::{Document, Metadata};
use crate::htmlrenderer::{CodeBlock, EscapeHref, EscapeHtml, HtmlRenderer, Image};
use crate::path::SiteBase;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use pulldown_cmark::{Options, Parser};
use serde::Serialize;
use std::any::Any;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io;
use std::panic::{self, AssertUnwindSafe};

/// Fenced code blocks with this language are diagrams, not code.
pub const DIAGRAM_LANG: &str = "mermaid";

/// The characters `encodeURIComponent` leaves alone, so the front end can
/// decode the diagram source with `decodeURIComponent`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const CODE_BUTTONS: &str = concat!(
    r#"<div class="devsite-code-buttons-container" role="group" aria-label="Action buttons">"#,
    r#"<button type="button" class="devsite-icon-theme-toggle" aria-label="Toggle theme" data-title="Toggle theme"></button>"#,
    r#"<button type="button" class="devsite-icon-copy" aria-label="Copy code sample" data-title="Copy code sample"></button>"#,
    "</div>",
);

/// The markdown extensions enabled for posts: GitHub-style tables,
/// strikethrough, task lists, and footnotes.
pub fn options() -> Options {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_FOOTNOTES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_TASKLISTS);
    options
}

/// Converts markdown to HTML, appending the result to `out`. Images are
/// emitted by `image_handler` and code blocks by `code_handler`; everything
/// else is standard. Soft line breaks become `<br />`.
pub fn to_html_with<I, C>(
    out: &mut String,
    markdown: &str,
    image_handler: I,
    code_handler: C,
) -> Result<()>
where
    I: FnMut(&Image) -> String,
    C: FnMut(&CodeBlock) -> String,
{
    let mut renderer =
        HtmlRenderer::new(image_handler, code_handler).with_line_breaks(true);
    for ev in Parser::new_ext(markdown, options()) {
        renderer.on_event(out, ev)?;
    }
    Ok(())
}

/// Converts markdown to HTML with the blog's own image and code block
/// handlers ([`image_handler`] and [`code_handler`]).
pub fn to_html(out: &mut String, base: &SiteBase, markdown: &str) -> Result<()> {
    to_html_with(out, markdown, image_handler(base), code_handler(markdown))
}

/// Emits images with their source normalized against `base`.
pub fn image_handler(base: &SiteBase) -> impl FnMut(&Image) -> String + '_ {
    move |image: &Image| image_html(base, image)
}

/// Emits diagrams as placeholders with ids `mermaid-<doc>-1`,
/// `mermaid-<doc>-2`, ... in document order, and all other code blocks via
/// [`code_html`]. `<doc>` is [`document_id`] of `markdown`, so diagrams from
/// different documents shown on one page never share an id.
pub fn code_handler(markdown: &str) -> impl FnMut(&CodeBlock) -> String {
    let document = document_id(markdown);
    let mut diagrams = 0;
    move |block: &CodeBlock| match block.lang {
        Some(DIAGRAM_LANG) => {
            diagrams += 1;
            diagram_html(&format!("mermaid-{}-{}", document, diagrams), block.code)
        }
        _ => code_html(block),
    }
}

/// A short hex digest of `markdown`, stable for the same input within a
/// build.
pub fn document_id(markdown: &str) -> String {
    let mut hasher = DefaultHasher::new();
    markdown.hash(&mut hasher);
    format!("{:08x}", hasher.finish() as u32)
}

/// `<img src="{normalized}" alt="{alt}" title="{title}" />`, with the title
/// omitted when empty.
pub fn image_html(base: &SiteBase, image: &Image) -> String {
    let src = base.normalize(image.dest);
    let mut out = format!(
        r#"<img src="{}" alt="{}""#,
        EscapeHref(&src),
        EscapeHtml(image.alt)
    );
    if !image.title.is_empty() {
        out.push_str(&format!(r#" title="{}""#, EscapeHtml(image.title)));
    }
    out.push_str(" />");
    out
}

/// An escaped code block preceded by the copy and theme-toggle buttons.
pub fn code_html(block: &CodeBlock) -> String {
    let class = match block.lang {
        Some(lang) => format!(r#" class="language-{}""#, EscapeHtml(lang)),
        None => String::new(),
    };
    format!(
        "<pre>{}<code{}>{}</code></pre>",
        CODE_BUTTONS,
        class,
        EscapeHtml(block.code)
    )
}

/// A placeholder for the front end's diagram engine. The source is carried
/// URL-encoded in `data-mermaid-code` and, escaped, as the element's text.
pub fn diagram_html(id: &str, code: &str) -> String {
    format!(
        r#"<div class="mermaid-diagram" data-mermaid-code="{}" id="{}">{}</div>"#,
        utf8_percent_encode(code, URI_COMPONENT),
        EscapeHtml(id),
        EscapeHtml(code)
    )
}

/// A rendered post: its front matter and its HTML body.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Rendered {
    pub metadata: Metadata,
    pub html: String,
}

impl Rendered {
    /// The page shown in place of a post that couldn't be rendered.
    pub fn degraded(err: &Error) -> Rendered {
        Rendered {
            metadata: Metadata::new(),
            html: format!(
                "<p>Error parsing markdown content: {}</p>",
                EscapeHtml(&err.to_string())
            ),
        }
    }
}

/// Splits `input` into front matter and body and renders the body. Panics
/// raised while parsing the markdown are caught and returned as
/// [`Error::Panic`].
pub fn try_render(input: &str, base: &SiteBase) -> Result<Rendered> {
    let document = Document::parse(input);
    let html = try_render_body(&document.body, base)?;
    Ok(Rendered {
        metadata: document.metadata,
        html,
    })
}

/// Renders a body that has already been split from its front matter,
/// catching panics like [`try_render`].
pub fn try_render_body(body: &str, base: &SiteBase) -> Result<String> {
    guarded(|out| to_html(out, base, body))
}

/// Like [`try_render`], but any failure becomes [`Rendered::degraded`].
/// Callers that want to log the failure should use [`try_render`].
pub fn render(input: &str, base: &SiteBase) -> Rendered {
    match try_render(input, base) {
        Ok(rendered) => rendered,
        Err(err) => Rendered::degraded(&err),
    }
}

fn guarded<F>(f: F) -> Result<String>
where
    F: FnOnce(&mut String) -> Result<()>,
{
    let mut out = String::new();
    match panic::catch_unwind(AssertUnwindSafe(|| f(&mut out))) {
        Ok(result) => result.map(|_| out),
        Err(payload) => Err(Error::Panic(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast_ref::<&str>() {
            Some(message) => (*message).to_owned(),
            None => String::from("markdown renderer panicked"),
        },
    }
}

/// The result of a fallible rendering operation.
pub type Result<T> = std::result::Result<T, Error>;

/// Represents an error converting markdown to HTML.
#[derive(Debug)]
pub enum Error {
    /// Returned for I/O errors from the output writer.
    Io(io::Error),

    /// Returned when the markdown parser panicked. Holds the panic message.
    Panic(String),
}

impl fmt::Display for Error {
    /// Displays an [`Error`] as human-readable text.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Io(err) => err.fmt(f),
            Error::Panic(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for Error {
    /// Implements the [`std::error::Error`] trait for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Panic(_) => None,
        }
    }
}

impl From<io::Error> for Error {
    /// Converts a [`io::Error`] into an [`Error`]. It allows us to use
    /// the `?` operator for IO operations.
    fn from(err: io::Error) -> Error {
        Error::Io(err)
    }
}
