//! Loads the project file, `blogmark.yaml`. Every field is optional:
//!
//! ```yaml
//! site_base: /blog/
//! public_base_url: https://wintrover.github.io/blog/
//! posts_directory: posts
//! categories:
//!   default: General
//!   auto_assign_by_folder: true
//!   folders:
//!     project: Project
//!     tutorial: Tutorial
//! ```

use crate::path::SiteBase;
use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

/// The name of the project file searched for by [`Config::from_directory`].
pub const PROJECT_FILE: &str = "blogmark.yaml";

/// The public URL used when none is configured.
pub const DEFAULT_PUBLIC_BASE_URL: &str = "https://wintrover.github.io/blog/";

/// How posts are assigned a category when their front matter names none.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Categories {
    /// The category of posts that match nothing else.
    pub default: String,

    /// Whether a post's parent folder picks its category (see `folders`).
    pub auto_assign_by_folder: bool,

    /// Folder name to category name.
    pub folders: BTreeMap<String, String>,
}

impl Default for Categories {
    fn default() -> Self {
        let folders = [
            ("company", "Company Work"),
            ("general", "General"),
            ("project", "Project"),
            ("tutorial", "Tutorial"),
        ];
        Categories {
            default: String::from("General"),
            auto_assign_by_folder: true,
            folders: folders
                .iter()
                .map(|(folder, category)| (folder.to_string(), category.to_string()))
                .collect(),
        }
    }
}

impl Categories {
    /// Picks the category for a post in `folder` whose front matter names
    /// `explicit`.
    pub fn resolve(&self, explicit: Option<String>, folder: &str) -> String {
        if let Some(category) = explicit {
            return category;
        }
        if self.auto_assign_by_folder {
            if let Some(category) = self.folders.get(folder) {
                return category.clone();
            }
        }
        self.default.clone()
    }
}

#[derive(Deserialize)]
#[serde(default)]
struct Project {
    site_base: SiteBase,
    public_base_url: String,
    posts_directory: PathBuf,
    categories: Categories,
}

impl Default for Project {
    fn default() -> Self {
        Project {
            site_base: SiteBase::default(),
            public_base_url: String::from(DEFAULT_PUBLIC_BASE_URL),
            posts_directory: PathBuf::from("posts"),
            categories: Categories::default(),
        }
    }
}

/// The resolved project configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// The directory holding the project file (or the directory the search
    /// started from, when there is none).
    pub project_root: PathBuf,
    pub site_base: SiteBase,
    pub public_base_url: String,

    /// Absolute, or relative to the working directory.
    pub posts_directory: PathBuf,
    pub categories: Categories,
}

impl Config {
    /// Looks for [`PROJECT_FILE`] in `dir` and then in each of its parents.
    /// When no project file exists the defaults apply, rooted at `dir`.
    pub fn from_directory(dir: &Path) -> Result<Config> {
        match find_project_file(dir) {
            Some(path) => Config::from_project_file(&path),
            None => {
                debug!(dir = %dir.display(), "no project file found, using defaults");
                Ok(Config::from_project(dir, Project::default()))
            }
        }
    }

    /// Loads the project file at `path`.
    pub fn from_project_file(path: &Path) -> Result<Config> {
        let project: Project = match serde_yaml::from_reader(open(path, "project")?) {
            Ok(project) => project,
            Err(e) => {
                return Err(anyhow!(
                    "Loading configuration `{}`: {}",
                    path.display(),
                    e
                ))
            }
        };
        match path.parent() {
            None => Err(anyhow!(
                "Can't get parent directory for provided project file path '{:?}'",
                path
            )),
            Some(project_root) => {
                debug!(path = %path.display(), "loaded project file");
                Ok(Config::from_project(project_root, project))
            }
        }
    }

    fn from_project(project_root: &Path, project: Project) -> Config {
        Config {
            project_root: project_root.to_owned(),
            site_base: project.site_base,
            public_base_url: project.public_base_url,
            posts_directory: project_root.join(project.posts_directory),
            categories: project.categories,
        }
    }
}

/// Returns the path of the nearest [`PROJECT_FILE`] at or above `dir`.
pub fn find_project_file(dir: &Path) -> Option<PathBuf> {
    dir.ancestors()
        .map(|ancestor| ancestor.join(PROJECT_FILE))
        .find(|path| path.is_file())
}

fn open(path: &Path, kind: &str) -> Result<File> {
    match File::open(path) {
        Err(e) => Err(anyhow!("Opening {} file `{}`: {}", kind, path.display(), e)),
        Ok(file) => Ok(file),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fs;

    #[test]
    fn test_defaults_without_project_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = Config::from_directory(dir.path())?;
        assert_eq!(dir.path(), config.project_root);
        assert_eq!("/blog/", config.site_base.as_str());
        assert_eq!(DEFAULT_PUBLIC_BASE_URL, config.public_base_url);
        assert_eq!(dir.path().join("posts"), config.posts_directory);
        assert_eq!(Categories::default(), config.categories);
        Ok(())
    }

    #[test]
    fn test_project_file_found_in_parent() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(
            dir.path().join(PROJECT_FILE),
            "site_base: docs\nposts_directory: content/posts\n",
        )?;
        let nested = dir.path().join("content").join("posts").join("project");
        fs::create_dir_all(&nested)?;

        let config = Config::from_directory(&nested)?;
        assert_eq!(dir.path(), config.project_root);
        assert_eq!("/docs/", config.site_base.as_str());
        assert_eq!(dir.path().join("content/posts"), config.posts_directory);
        assert_eq!(DEFAULT_PUBLIC_BASE_URL, config.public_base_url);
        Ok(())
    }

    #[test]
    fn test_categories_override() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(
            &path,
            "categories:\n  default: Misc\n  auto_assign_by_folder: false\n",
        )?;
        let config = Config::from_project_file(&path)?;
        assert_eq!("Misc", config.categories.default);
        assert!(!config.categories.auto_assign_by_folder);
        assert_eq!(Categories::default().folders, config.categories.folders);
        Ok(())
    }

    #[test]
    fn test_invalid_project_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(PROJECT_FILE);
        fs::write(&path, "categories: [not, a, map]\n")?;
        assert!(Config::from_project_file(&path).is_err());
        assert!(Config::from_project_file(&dir.path().join("missing.yaml")).is_err());
        Ok(())
    }

    #[test]
    fn test_resolve_category() {
        let categories = Categories::default();
        assert_eq!(
            "Essay",
            categories.resolve(Some(String::from("Essay")), "project")
        );
        assert_eq!("Project", categories.resolve(None, "project"));
        assert_eq!("Company Work", categories.resolve(None, "company"));
        assert_eq!("General", categories.resolve(None, "drafts"));
        assert_eq!("General", categories.resolve(None, ""));

        let manual = Categories {
            auto_assign_by_folder: false,
            ..Categories::default()
        };
        assert_eq!("General", manual.resolve(None, "project"));
    }
}
