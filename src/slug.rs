//! Derives URL-safe identifiers from post titles and file names. The same
//! slug is used for in-app routes (`#/post/{slug}`) and for the canonical
//! URL of cross-posted articles, so both sides must agree on it.

/// Lowercases `text`, drops every character outside `[a-z0-9]`, whitespace,
/// and `-`, turns whitespace runs into a single hyphen, collapses hyphen
/// runs, and trims hyphens from both ends. Non-ASCII letters are dropped
/// rather than transliterated. Whitespace is the ECMAScript `\s` class (see
/// [`is_separator_space`]), so route slugs agree with the front end.
///
/// ```
/// assert_eq!("hello-world", blogmark::slug::slugify("  Hello, World! "));
/// assert_eq!("", blogmark::slug::slugify("한국어"));
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        match c {
            'a'..='z' | '0'..='9' => {
                if pending_hyphen && !slug.is_empty() {
                    slug.push('-');
                }
                pending_hyphen = false;
                slug.push(c);
            }
            '-' => pending_hyphen = true,
            c if is_separator_space(c) => pending_hyphen = true,
            _ => {}
        }
    }
    slug
}

/// ECMAScript whitespace and line terminators. Unlike [`char::is_whitespace`]
/// this includes U+FEFF and excludes U+0085.
pub fn is_separator_space(c: char) -> bool {
    match c {
        '\u{85}' => false,
        '\u{FEFF}' => true,
        c => c.is_whitespace(),
    }
}
