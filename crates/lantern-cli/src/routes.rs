//! Route list files.
//!
//! ```toml
//! [[routes]]
//! path = "/"
//!
//! [[routes]]
//! path = "/blog/hello-world"
//! name = "blog-slug"
//! component = "pages/blog/[slug].vue"
//! ```

use anyhow::{Context, Result};
use lantern_core::{CustomSampling, Route, RouteDefinition};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<RouteEntry>,
}

#[derive(Debug, Deserialize)]
struct RouteEntry {
    path: String,
    name: Option<String>,
    component: Option<PathBuf>,
}

/// Parse a route list, applying custom sampling rules to every route.
pub fn parse(contents: &str, sampling: &CustomSampling) -> Result<Vec<Route>> {
    let file: RouteFile = toml::from_str(contents).context("invalid route file")?;

    file.routes
        .into_iter()
        .map(|entry| -> Result<Route> {
            let route = Route::new(entry.path)?.with_definition(RouteDefinition {
                name: entry.name,
                component: entry.component,
            });
            Ok(sampling.apply(route))
        })
        .collect()
}

/// Read and parse a route list file.
pub fn load(path: &Path, sampling: &CustomSampling) -> Result<Vec<Route>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read route file {}", path.display()))?;
    parse(&contents, sampling).with_context(|| format!("in {}", path.display()))
}
