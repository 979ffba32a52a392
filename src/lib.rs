//! The library code for `blogmark`, the text-processing core of a markdown
//! blog. A post goes through three steps:
//!
//! 1. Splitting the source into front matter and body ([`crate::frontmatter`])
//! 2. Rendering the body to HTML ([`crate::markdown`]), rewriting image paths
//!    on the way ([`crate::path`])
//! 3. Deriving its route from the title ([`crate::slug`])
//!
//! On top of that, [`crate::post`] loads a whole directory of posts and
//! [`crate::crosspost`] prepares a post for publishing elsewhere, with
//! absolute image URLs and a canonical link back to the blog.

#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]

pub mod config;
pub mod crosspost;
pub mod frontmatter;
pub mod htmlrenderer;
pub mod markdown;
pub mod path;
pub mod post;
pub mod slug;
