//! Implements a custom [`push_html`] whose image and code-block output is
//! produced by caller-supplied handlers. [`pulldown_cmark::html::push_html`]
//! writes images and code blocks itself, but posts need their image paths
//! normalized and their code blocks decorated (or, for diagrams, replaced by
//! a placeholder), so those two elements are buffered here and handed to the
//! handlers whole.

use pulldown_cmark::escape::{escape_href, escape_html, StrWrite};
use pulldown_cmark::{Alignment, CodeBlockKind, CowStr, Event, LinkType, Tag};
use std::fmt::{self, Display};
use std::io;

struct Adaptor<'a, T> {
    formatter: &'a mut T,
    result: fmt::Result,
}

impl<T> Adaptor<'_, T> {
    fn handle_result(&mut self, result: fmt::Result) -> io::Result<()> {
        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                self.result = result;
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

impl<T: fmt::Write> StrWrite for Adaptor<'_, T> {
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        let result = self.formatter.write_str(s);
        self.handle_result(result)
    }

    fn write_fmt(&mut self, args: fmt::Arguments) -> io::Result<()> {
        let result = self.formatter.write_fmt(args);
        self.handle_result(result)
    }
}

/// Displays a URL escaped for use in an `href` or `src` attribute.
pub struct EscapeHref<'a>(pub &'a str);

impl<'a> Display for EscapeHref<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };
        let _ = escape_href(&mut adaptor, self.0);
        adaptor.result
    }
}

/// Displays text escaped for use in HTML content or attribute values.
pub struct EscapeHtml<'a>(pub &'a str);

impl<'a> Display for EscapeHtml<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut adaptor = Adaptor {
            formatter: f,
            result: Ok(()),
        };

        let _ = escape_html(&mut adaptor, self.0);
        adaptor.result
    }
}

/// An image as handed to the image handler. `dest` is the destination as
/// written in the source; `alt` is the plain text of the image description.
#[derive(Debug, PartialEq)]
pub struct Image<'a> {
    pub dest: &'a str,
    pub title: &'a str,
    pub alt: &'a str,
}

/// A code block as handed to the code handler. `lang` is the first word of
/// a fenced block's info string; indented blocks have none.
#[derive(Debug, PartialEq)]
pub struct CodeBlock<'a> {
    pub lang: Option<&'a str>,
    pub code: &'a str,
}

enum TableState {
    Head,
    Body,
}

struct PendingImage {
    dest: String,
    title: String,
    alt: String,

    /// Images nested inside the description (`![![a](b)](c)`). Only the
    /// outermost one is emitted.
    nesting: usize,
}

struct PendingCode {
    lang: Option<String>,
    code: String,
}

/// Renders markdown [`Event`]s into HTML. This is largely modeled after
/// [`pulldown_cmark`]'s private [`HtmlWriter`
/// struct](https://github.com/raphlinus/pulldown-cmark/blob/bf0a1a4938dbd2ec41c3add069b3d361d11731f4/src/html.rs#L36-L50).
pub struct HtmlRenderer<I, C> {
    table_alignments: Vec<Alignment>,
    table_state: TableState,
    table_cell_index: usize,

    /// Render soft line breaks as `<br />`.
    line_breaks: bool,

    image_handler: I,
    code_handler: C,

    image: Option<PendingImage>,
    code: Option<PendingCode>,
}

impl<I, C> HtmlRenderer<I, C>
where
    I: FnMut(&Image) -> String,
    C: FnMut(&CodeBlock) -> String,
{
    /// Constructs a renderer which emits images through `image_handler` and
    /// code blocks through `code_handler`.
    pub fn new(image_handler: I, code_handler: C) -> Self {
        HtmlRenderer {
            table_alignments: Vec::default(),
            table_state: TableState::Head,
            table_cell_index: usize::default(),
            line_breaks: false,
            image_handler,
            code_handler,
            image: None,
            code: None,
        }
    }

    /// Renders every soft line break as a hard one, the way GitHub renders
    /// comments.
    pub fn with_line_breaks(mut self, line_breaks: bool) -> Self {
        self.line_breaks = line_breaks;
        self
    }

    pub fn on_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'_>,
    ) -> io::Result<()> {
        if self.image.is_some() {
            return self.on_image_event(w, event);
        }
        if self.code.is_some() {
            return self.on_code_event(w, event);
        }
        match event {
            Event::Start(tag) => self.on_start(w, tag),
            Event::End(tag) => self.on_end(w, tag),
            Event::Code(code) => self.on_code(w, code),
            Event::FootnoteReference(name) => write!(
                w,
                r##"<sup class="footnote-reference"><a href="#{}">{}</a></sup>"##,
                EscapeHtml(&name),
                EscapeHtml(&name),
            ),
            Event::HardBreak => self.on_hard_break(w),
            Event::Html(html) => self.on_html(w, html),
            Event::Rule => self.on_rule(w),
            Event::SoftBreak => self.on_soft_break(w),
            Event::TaskListMarker(checked) => {
                self.on_task_list_marker(w, checked)
            }
            Event::Text(text) => self.on_text(w, text),
        }
    }

    /// Collects the image description as plain text until the image closes,
    /// then emits the whole image through the image handler.
    fn on_image_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'_>,
    ) -> io::Result<()> {
        let pending = match self.image.as_mut() {
            Some(pending) => pending,
            None => return Ok(()),
        };
        match event {
            Event::Start(Tag::Image(..)) => pending.nesting += 1,
            Event::End(Tag::Image(..)) if pending.nesting > 0 => {
                pending.nesting -= 1
            }
            Event::End(Tag::Image(..)) => {
                if let Some(image) = self.image.take() {
                    let html = (self.image_handler)(&Image {
                        dest: &image.dest,
                        title: &image.title,
                        alt: &image.alt,
                    });
                    w.write_str(&html)?;
                }
            }
            Event::Text(text) | Event::Code(text) | Event::Html(text) => {
                pending.alt.push_str(&text)
            }
            Event::SoftBreak | Event::HardBreak | Event::Rule => {
                pending.alt.push(' ')
            }
            Event::FootnoteReference(name) => {
                pending.alt.push_str(&format!("[^{}]", name))
            }
            Event::TaskListMarker(true) => pending.alt.push_str("[x]"),
            Event::TaskListMarker(false) => pending.alt.push_str("[ ]"),
            Event::Start(_) | Event::End(_) => {}
        }
        Ok(())
    }

    /// Collects the code block text until the block closes, then emits it
    /// through the code handler.
    fn on_code_event<W: StrWrite>(
        &mut self,
        w: &mut W,
        event: Event<'_>,
    ) -> io::Result<()> {
        match event {
            Event::Text(text) => {
                if let Some(pending) = self.code.as_mut() {
                    pending.code.push_str(&text);
                }
                Ok(())
            }
            Event::End(Tag::CodeBlock(_)) => match self.code.take() {
                Some(block) => {
                    let html = (self.code_handler)(&CodeBlock {
                        lang: block.lang.as_deref(),
                        code: &block.code,
                    });
                    w.write_str(&html)
                }
                None => Ok(()),
            },
            _ => Ok(()),
        }
    }

    fn on_start<W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'_>,
    ) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("<blockquote>"),
            Tag::CodeBlock(kind) => {
                self.code = Some(PendingCode {
                    lang: match kind {
                        CodeBlockKind::Fenced(info) => {
                            info.split_whitespace().next().map(str::to_owned)
                        }
                        CodeBlockKind::Indented => None,
                    },
                    code: String::new(),
                });
                Ok(())
            }
            Tag::Emphasis => w.write_str("<em>"),
            Tag::FootnoteDefinition(name) => {
                let name = EscapeHtml(&name);
                write!(
                    w,
                    r#"<div class="footnote-definition" id="{}"><sup class="footnote-definition-label">{}</sup>"#,
                    &name, &name,
                )
            }
            Tag::Heading(size) => write!(w, "<h{}>", size),
            Tag::Image(_link_type, dest, title) => {
                self.image = Some(PendingImage {
                    dest: dest.into_string(),
                    title: title.into_string(),
                    alt: String::new(),
                    nesting: 0,
                });
                Ok(())
            }
            Tag::Item => w.write_str("<li>"),
            Tag::Link(LinkType::Email, dest, title) => {
                w.write_str(r#"<a href="mailto:"#)?;
                self.write_link_rest(w, &dest, &title)
            }
            Tag::Link(_link_type, dest, title) => {
                w.write_str(r#"<a href=""#)?;
                self.write_link_rest(w, &dest, &title)
            }
            Tag::List(None) => w.write_str("<ul>"),
            Tag::List(Some(1)) => w.write_str("<ol>"),
            Tag::List(Some(start)) => write!(w, r#"<ol start="{}">"#, start),
            Tag::Paragraph => w.write_str("<p>"),
            Tag::Strikethrough => w.write_str("<del>"),
            Tag::Strong => w.write_str("<strong>"),
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                w.write_str("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                w.write_str("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                w.write_str("<tr>")
            }
            Tag::TableCell => write!(
                w,
                "<{}{}>",
                match self.table_state {
                    TableState::Head => "th",
                    TableState::Body => "td",
                },
                match self.table_alignments.get(self.table_cell_index) {
                    Some(Alignment::Left) => r#" align="left""#,
                    Some(Alignment::Right) => r#" align="right""#,
                    Some(Alignment::Center) => r#" align="center""#,
                    _ => "",
                }
            ),
        }
    }

    fn write_link_rest<W: StrWrite>(
        &mut self,
        w: &mut W,
        dest: &str,
        title: &str,
    ) -> io::Result<()> {
        match title.is_empty() {
            true => write!(w, r#"{}">"#, EscapeHref(dest)),
            false => write!(
                w,
                r#"{}" title="{}">"#,
                EscapeHref(dest),
                EscapeHtml(title)
            ),
        }
    }

    fn on_end<W: StrWrite>(
        &mut self,
        w: &mut W,
        tag: Tag<'_>,
    ) -> io::Result<()> {
        match tag {
            Tag::BlockQuote => w.write_str("</blockquote>"),
            Tag::CodeBlock(_) => Ok(()), // handled in on_code_event
            Tag::Emphasis => w.write_str("</em>"),
            Tag::FootnoteDefinition(_) => w.write_str("</div>"),
            Tag::Heading(level) => write!(w, "</h{}>", level),
            Tag::Image(_, _, _) => Ok(()), // handled in on_image_event
            Tag::Item => w.write_str("</li>"),
            Tag::Link(_, _, _) => w.write_str("</a>"),
            Tag::List(Some(_)) => w.write_str("</ol>"),
            Tag::List(None) => w.write_str("</ul>"),
            Tag::Paragraph => w.write_str("</p>"),
            Tag::Strikethrough => w.write_str("</del>"),
            Tag::Strong => w.write_str("</strong>"),
            Tag::Table(_) => w.write_str("</tbody></table>"),
            Tag::TableHead => {
                self.table_state = TableState::Body;
                w.write_str("</tr></thead><tbody>")
            }
            Tag::TableRow => w.write_str("</tr>"),
            Tag::TableCell => {
                self.table_cell_index += 1;
                w.write_str(match self.table_state {
                    TableState::Head => "</th>",
                    TableState::Body => "</td>",
                })
            }
        }
    }

    fn on_text<W: StrWrite>(
        &mut self,
        w: &mut W,
        s: CowStr,
    ) -> io::Result<()> {
        escape_html(w, &s)
    }

    fn on_code<W: StrWrite>(
        &mut self,
        w: &mut W,
        s: CowStr,
    ) -> io::Result<()> {
        write!(w, "<code>{}</code>", EscapeHtml(&s))
    }

    fn on_html<W: StrWrite>(
        &mut self,
        w: &mut W,
        s: CowStr,
    ) -> io::Result<()> {
        w.write_str(&s)
    }

    fn on_soft_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        match self.line_breaks {
            true => w.write_str("<br />\n"),
            false => w.write_str("\n"),
        }
    }

    fn on_hard_break<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<br />\n")
    }

    fn on_rule<W: StrWrite>(&mut self, w: &mut W) -> io::Result<()> {
        w.write_str("<hr />")
    }

    fn on_task_list_marker<W: StrWrite>(
        &mut self,
        w: &mut W,
        checked: bool,
    ) -> io::Result<()> {
        write!(
            w,
            r#"<input disabled="" type="checkbox" {}/>"#,
            match checked {
                true => r#"checked="" "#,
                false => "",
            }
        )
    }
}

/// Converts [`Event`]s into an HTML string much like
/// `pulldown_cmark::html::push_html` except that images and code blocks are
/// emitted by `image_handler` and `code_handler`. See the module description
/// for more details.
pub fn push_html<'a, E, I, C>(
    out: &mut String,
    events: E,
    image_handler: I,
    code_handler: C,
) -> io::Result<()>
where
    E: Iterator<Item = Event<'a>>,
    I: FnMut(&Image) -> String,
    C: FnMut(&CodeBlock) -> String,
{
    let mut renderer = HtmlRenderer::new(image_handler, code_handler);
    for event in events {
        renderer.on_event(out, event)?;
    }
    Ok(())
}
