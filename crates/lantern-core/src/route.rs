//! Route types shared across Lantern.
//!
//! A [`Route`] is one crawlable target. Routes are produced by discovery (a
//! sitemap, a framework's router, or a user-supplied list) and never change
//! afterwards; the scanner only reads them.

use crate::error::{ConfigError, LanternError};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Number of digest bytes kept when deriving a [`RouteId`] from a path.
const ROUTE_ID_BYTES: usize = 6;

/// Newtype for route identifiers.
///
/// Route IDs are lowercase alphanumeric with hyphens, 1-64 characters. IDs
/// derived with [`RouteId::from_path`] are stable across runs, so a route
/// that is rediscovered or requeued keeps its identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteId(String);

impl RouteId {
    /// Create a new `RouteId` from a string.
    ///
    /// # Errors
    /// Returns error if the ID doesn't match the required format.
    pub fn new(id: impl Into<String>) -> Result<Self, LanternError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// Derive the identifier of a route from its path.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let digest = Sha256::digest(path.as_bytes());
        Self(hex::encode(&digest[..ROUTE_ID_BYTES]))
    }

    /// Get the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> Result<(), LanternError> {
        static ROUTE_ID_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex = ROUTE_ID_REGEX.get_or_init(|| {
            Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,62}[a-z0-9])?$").expect("valid regex")
        });

        if regex.is_match(id) {
            Ok(())
        } else {
            Err(LanternError::Validation(format!(
                "invalid route ID: must be 1-64 lowercase alphanumeric characters or hyphens, got '{id}'"
            )))
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a route came from: the named route definition and the source file
/// (page component) that renders it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RouteDefinition {
    /// Route definition name, e.g. `blog-slug` for `/blog/:slug`
    pub name: Option<String>,
    /// Source file that renders this route
    pub component: Option<PathBuf>,
}

/// One crawlable target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    id: RouteId,
    path: String,
    #[serde(default)]
    definition: RouteDefinition,
}

impl Route {
    /// Create a route for a site-relative path.
    ///
    /// # Errors
    /// Returns error if the path is empty or not absolute.
    pub fn new(path: impl Into<String>) -> Result<Self, LanternError> {
        let path = path.into().trim().to_string();
        if !path.starts_with('/') {
            return Err(LanternError::Route(format!(
                "route path must start with '/', got '{path}'"
            )));
        }

        Ok(Self {
            id: RouteId::from_path(&path),
            path,
            definition: RouteDefinition::default(),
        })
    }

    /// Attach the originating route definition.
    #[must_use]
    pub fn with_definition(mut self, definition: RouteDefinition) -> Self {
        self.definition = definition;
        self
    }

    /// Stable route identifier.
    #[must_use]
    pub fn id(&self) -> &RouteId {
        &self.id
    }

    /// Site-relative path, always starting with `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Originating route definition.
    #[must_use]
    pub fn definition(&self) -> &RouteDefinition {
        &self.definition
    }

    /// Whether this route was produced from the given source file.
    #[must_use]
    pub fn is_defined_by(&self, file: &Path) -> bool {
        self.definition.component.as_deref() == Some(file)
    }
}

/// Which route attribute clusters routes for sampling and sorting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupRoutesKey {
    /// Group by route definition name, falling back to the path
    #[default]
    #[serde(rename = "route.definition.name")]
    DefinitionName,
    /// Group by the raw path
    #[serde(rename = "route.path")]
    Path,
}

impl GroupRoutesKey {
    /// Compute the group value of a route.
    #[must_use]
    pub fn group_of<'a>(&self, route: &'a Route) -> &'a str {
        match self {
            Self::DefinitionName => route.definition.name.as_deref().unwrap_or(&route.path),
            Self::Path => &route.path,
        }
    }
}

/// A `custom_sampling` config entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomSamplingEntry {
    /// Definition name assigned to matching routes
    pub name: String,
}

/// Ordered path rules that assign a definition name to matching routes.
///
/// Dynamic paths such as `/guide/intro` and `/guide/setup` usually have no
/// router definition of their own; a rule like `/guide/(.*?)` folds them into
/// one sampling group.
#[derive(Debug, Clone, Default)]
pub struct CustomSampling {
    rules: Vec<(Regex, String)>,
}

impl CustomSampling {
    /// Compile the rules from configuration, keeping their order.
    ///
    /// # Errors
    /// Returns error if any pattern is not a valid regular expression.
    pub fn from_config(entries: &IndexMap<String, CustomSamplingEntry>) -> Result<Self, ConfigError> {
        let rules = entries
            .iter()
            .map(|(pattern, entry)| {
                Regex::new(pattern)
                    .map(|regex| (regex, entry.name.clone()))
                    .map_err(|e| ConfigError::InvalidValue {
                        field: format!("scanner.custom_sampling.{pattern}"),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Whether no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Apply the first matching rule to a route.
    #[must_use]
    pub fn apply(&self, mut route: Route) -> Route {
        if let Some((_, name)) = self.rules.iter().find(|(regex, _)| regex.is_match(&route.path)) {
            route.definition.name = Some(name.clone());
        }
        route
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(path: &str, name: &str) -> Route {
        Route::new(path).expect("valid route").with_definition(RouteDefinition {
            name: Some(name.to_string()),
            component: None,
        })
    }

    #[test]
    fn test_route_id_from_path_is_stable() {
        let a = RouteId::from_path("/blog/hello");
        let b = RouteId::from_path("/blog/hello");
        let c = RouteId::from_path("/blog/world");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str().len(), ROUTE_ID_BYTES * 2);
        assert!(RouteId::new(a.as_str()).is_ok());
    }

    #[test]
    fn test_route_id_invalid() {
        let too_long = "a".repeat(65);
        for id in ["", "Upper", "with space", "-leading", "trailing-", too_long.as_str()] {
            assert!(RouteId::new(id).is_err(), "Should fail for: {id}");
        }
    }

    #[test]
    fn test_route_requires_absolute_path() {
        assert!(Route::new("about").is_err());
        assert!(Route::new("").is_err());

        let route = Route::new("  /about ").expect("valid route");
        assert_eq!(route.path(), "/about");
        assert_eq!(route.id(), &RouteId::from_path("/about"));
    }

    #[test]
    fn test_group_key_falls_back_to_path() {
        let plain = Route::new("/contact").expect("valid route");
        let blog = named("/blog/a", "blog-slug");

        assert_eq!(GroupRoutesKey::DefinitionName.group_of(&plain), "/contact");
        assert_eq!(GroupRoutesKey::DefinitionName.group_of(&blog), "blog-slug");
        assert_eq!(GroupRoutesKey::Path.group_of(&blog), "/blog/a");
    }

    #[test]
    fn test_group_key_serde_names() {
        let key: GroupRoutesKey =
            serde_json::from_str("\"route.path\"").expect("deserialize group key");
        assert_eq!(key, GroupRoutesKey::Path);
        assert_eq!(
            serde_json::to_string(&GroupRoutesKey::DefinitionName).expect("serialize group key"),
            "\"route.definition.name\""
        );
    }

    #[test]
    fn test_is_defined_by() {
        let route = Route::new("/about").expect("valid route").with_definition(RouteDefinition {
            name: Some("about".to_string()),
            component: Some(PathBuf::from("pages/about.vue")),
        });
        assert!(route.is_defined_by(Path::new("pages/about.vue")));
        assert!(!route.is_defined_by(Path::new("pages/index.vue")));
    }

    #[test]
    fn test_custom_sampling_first_match_wins() {
        let mut entries = IndexMap::new();
        entries.insert(
            "/guide/(.*?)".to_string(),
            CustomSamplingEntry { name: "guide".to_string() },
        );
        entries.insert(
            "/guide/advanced".to_string(),
            CustomSamplingEntry { name: "advanced".to_string() },
        );
        let sampling = CustomSampling::from_config(&entries).expect("compile rules");

        let route = sampling.apply(Route::new("/guide/advanced").expect("valid route"));
        assert_eq!(route.definition().name.as_deref(), Some("guide"));

        let untouched = sampling.apply(Route::new("/api/intro").expect("valid route"));
        assert_eq!(untouched.definition().name, None);
    }

    #[test]
    fn test_custom_sampling_invalid_regex() {
        let mut entries = IndexMap::new();
        entries.insert("/guide/(".to_string(), CustomSamplingEntry { name: "guide".to_string() });
        let err = CustomSampling::from_config(&entries).expect_err("invalid regex");
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
