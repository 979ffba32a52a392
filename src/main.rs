use anyhow::{anyhow, Result};
use blogmark::config::Config;
use blogmark::crosspost::{Article, PublicBase};
use blogmark::markdown::{self, Rendered};
use blogmark::post::Library;
use blogmark::slug::slugify;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// The environment variable holding the log filter, e.g. `blogmark=debug`.
const LOG_ENV: &str = "BLOGMARK_LOG";

fn main() -> Result<()> {
    let file = || {
        Arg::with_name("file")
            .required(true)
            .help("A markdown post")
    };
    let matches = App::new("blogmark")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Renders and inspects markdown blog posts")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("project")
                .long("project")
                .takes_value(true)
                .global(true)
                .help("The project file (default: the nearest blogmark.yaml)"),
        )
        .arg(
            Arg::with_name("verbose")
                .short("v")
                .long("verbose")
                .global(true)
                .help("Log debug output to stderr"),
        )
        .subcommand(
            SubCommand::with_name("render")
                .about("Renders a post and prints its metadata and HTML as JSON")
                .arg(file()),
        )
        .subcommand(
            SubCommand::with_name("list")
                .about("Lists the posts in the posts directory, newest first"),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Renders the post with the given slug")
                .arg(Arg::with_name("slug").required(true)),
        )
        .subcommand(
            SubCommand::with_name("normalize")
                .about("Prints the canonical form of image paths")
                .arg(Arg::with_name("src").required(true).multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("slugify")
                .about("Prints the slug of each argument")
                .arg(Arg::with_name("text").required(true).multiple(true)),
        )
        .subcommand(
            SubCommand::with_name("article")
                .about("Prints the cross-posting payload for a post as JSON")
                .arg(file()),
        )
        .get_matches();

    let (name, sub) = match matches.subcommand() {
        (name, Some(sub)) => (name, sub),
        (name, None) => return Err(anyhow!("Missing arguments for `{}`", name)),
    };
    init_logging(matches.is_present("verbose") || sub.is_present("verbose"));

    if name == "slugify" {
        for text in values(sub, "text") {
            println!("{}", slugify(text));
        }
        return Ok(());
    }

    let config = load_config(matches.value_of("project").or_else(|| sub.value_of("project")))?;
    match name {
        "render" => {
            let path = Path::new(sub.value_of("file").unwrap_or_default());
            let input = read(path)?;
            let rendered = match markdown::try_render(&input, &config.site_base) {
                Ok(rendered) => rendered,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "rendering post");
                    Rendered::degraded(&e)
                }
            };
            print_json(&rendered)
        }
        "list" => {
            let library = Library::load(&config.posts_directory, &config.categories)?;
            let summaries: Vec<Summary> = library
                .posts()
                .iter()
                .map(|post| {
                    let (summary, summarized) = post.summary();
                    Summary {
                        slug: &post.slug,
                        title: &post.title,
                        date: &post.date,
                        category: &post.category,
                        tags: &post.tags,
                        excerpt: &post.excerpt,
                        summary,
                        summarized,
                    }
                })
                .collect();
            print_json(&summaries)
        }
        "show" => {
            let slug = sub.value_of("slug").unwrap_or_default();
            let library = Library::load(&config.posts_directory, &config.categories)?;
            match library.render(slug, &config.site_base) {
                Some(rendered) => print_json(&rendered),
                None => Err(anyhow!("No post with slug `{}`", slug)),
            }
        }
        "normalize" => {
            for src in values(sub, "src") {
                println!("{}", config.site_base.normalize(src));
            }
            Ok(())
        }
        "article" => {
            let path = Path::new(sub.value_of("file").unwrap_or_default());
            let input = read(path)?;
            let base = PublicBase::resolve(&config.public_base_url, &config.site_base)?;
            let stem = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let article = Article::from_source(&input, &stem, &base);
            println!("{}", article.to_json()?);
            Ok(())
        }
        other => Err(anyhow!("Unknown command `{}`", other)),
    }
}

/// A post as printed by `list`.
#[derive(Serialize)]
struct Summary<'a> {
    slug: &'a str,
    title: &'a str,
    date: &'a str,
    category: &'a str,
    tags: &'a [String],
    excerpt: &'a str,
    summary: String,
    summarized: bool,
}

fn init_logging(verbose: bool) {
    let filter = match verbose {
        true => EnvFilter::new("debug"),
        false => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(project: Option<&str>) -> Result<Config> {
    match project {
        Some(path) => Config::from_project_file(Path::new(path)),
        None => Config::from_directory(&std::env::current_dir()?),
    }
}

fn values<'a>(matches: &'a ArgMatches<'a>, name: &str) -> impl Iterator<Item = &'a str> {
    matches.values_of(name).into_iter().flatten()
}

fn read(path: &Path) -> Result<String> {
    match fs::read_to_string(path) {
        Err(e) => Err(anyhow!("Reading `{}`: {}", path.display(), e)),
        Ok(input) => Ok(input),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
