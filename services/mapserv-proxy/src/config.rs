//! Proxy configuration loader.
//!
//! Loads the map registry and renderer settings from a single YAML file:
//!
//! ```yaml
//! listen: 0.0.0.0:8080
//! mapserv: /usr/bin/mapserv
//! directory: /srv/mapfiles
//! maps:
//!   - name: world
//!     projections: [3857, 4326]
//!     aliases:
//!       3857: [900913, 102100]
//!     path: /maps/world
//! ```
//!
//! The configuration is read once at startup and shared read-only.

use anyhow::{Context, Result};
use map_common::{MapDefinition, MapError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_MAPSERV: &str = "/usr/bin/mapserv";

/// Immutable proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Address the HTTP server binds to
    pub listen: String,
    /// Renderer executable
    pub mapserv: PathBuf,
    /// Working directory the renderer runs in, where the mapfiles live
    pub directory: PathBuf,
    /// Registered maps, in config order
    pub maps: Vec<Arc<MapDefinition>>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            mapserv: PathBuf::from(DEFAULT_MAPSERV),
            directory: PathBuf::from("."),
            maps: Vec::new(),
        }
    }
}

// ============================================================================
// YAML Parsing Structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct YamlConfigFile {
    #[serde(default)]
    listen: Option<String>,
    #[serde(default)]
    mapserv: Option<PathBuf>,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    maps: Vec<YamlMap>,
}

#[derive(Debug, Deserialize)]
struct YamlMap {
    name: String,
    #[serde(default)]
    projections: Vec<YamlId>,
    #[serde(default)]
    aliases: BTreeMap<YamlId, Vec<YamlId>>,
    #[serde(default)]
    path: Option<String>,
}

/// Projection codes are usually written bare (`3857`), which YAML reads as
/// integers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(untagged)]
enum YamlId {
    Number(u64),
    Text(String),
}

impl From<YamlId> for String {
    fn from(id: YamlId) -> Self {
        match id {
            YamlId::Number(n) => n.to_string(),
            YamlId::Text(s) => s,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_yaml_str(&contents)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        info!(
            path = %path.display(),
            maps = config.maps.len(),
            mapserv = %config.mapserv.display(),
            directory = %config.directory.display(),
            "Loaded proxy config"
        );

        Ok(config)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let yaml: YamlConfigFile = serde_yaml::from_str(contents).context("Failed to parse YAML")?;
        let defaults = Self::default();

        let mut maps = Vec::with_capacity(yaml.maps.len());
        for m in yaml.maps {
            // String keys keep the BTreeMap in lexical order regardless of
            // how the YAML spelled them.
            let aliases: BTreeMap<String, Vec<String>> = m
                .aliases
                .into_iter()
                .map(|(k, v)| (k.into(), v.into_iter().map(String::from).collect()))
                .collect();
            let projections = m.projections.into_iter().map(String::from).collect();

            let map = MapDefinition::new(m.name, projections, aliases, m.path.as_deref())?;
            maps.push(Arc::new(map));
        }

        validate_url_paths(&maps)?;

        Ok(Self {
            listen: yaml.listen.unwrap_or(defaults.listen),
            mapserv: yaml.mapserv.unwrap_or(defaults.mapserv),
            directory: yaml.directory.unwrap_or(defaults.directory),
            maps,
        })
    }

    /// Find a map by name
    pub fn get_map(&self, name: &str) -> Option<&Arc<MapDefinition>> {
        self.maps.iter().find(|m| m.name() == name)
    }

    pub fn map_names(&self) -> Vec<&str> {
        self.maps.iter().map(|m| m.name()).collect()
    }
}

/// Characters the router reads as captures or wildcards.
const ROUTER_SYNTAX: [char; 4] = ['*', ':', '{', '}'];

/// Every map needs its own literal URL prefix, and prefixes may not nest
/// (other than under `/`, which only catches what no other map serves).
fn validate_url_paths(maps: &[Arc<MapDefinition>]) -> Result<(), MapError> {
    for map in maps {
        if let Some(found) = map.url_path().chars().find(|c| ROUTER_SYNTAX.contains(c)) {
            return Err(MapError::InvalidUrlPath {
                path: map.url_path().to_string(),
                name: map.name().to_string(),
                found,
            });
        }
    }

    for (i, a) in maps.iter().enumerate() {
        for b in &maps[i + 1..] {
            if a.url_path() == b.url_path() {
                return Err(MapError::DuplicateUrlPath {
                    path: a.url_path().to_string(),
                    first: a.name().to_string(),
                    second: b.name().to_string(),
                });
            }

            let (outer, inner) = if a.url_path().len() < b.url_path().len() {
                (a, b)
            } else {
                (b, a)
            };
            if outer.url_path() != "/" && inner.url_path().starts_with(outer.url_path()) {
                return Err(MapError::NestedUrlPath {
                    outer: outer.url_path().to_string(),
                    inner: inner.url_path().to_string(),
                });
            }
        }
    }
    Ok(())
}
