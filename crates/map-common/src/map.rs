//! Map definitions and mapfile selection.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::error::{MapError, MapResult};
use crate::srs::resolve_projection;

/// A map served by the proxy, backed by one or more mapfiles on disk.
///
/// Built once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapDefinition {
    /// Map identifier, also the stem of every mapfile name
    name: String,
    /// Projections with a dedicated `<name>_<projection>.map`, in config order
    projections: Vec<String>,
    /// Canonical projection -> alternate spellings of it
    aliases: BTreeMap<String, Vec<String>>,
    /// Normalized URL path prefix, always starting and ending with `/`
    url_path: String,
}

impl MapDefinition {
    /// Create a map definition.
    ///
    /// Duplicate projections are dropped (first occurrence kept). `path`
    /// defaults to the map name and is normalized to start and end with `/`.
    pub fn new(
        name: impl Into<String>,
        projections: Vec<String>,
        aliases: BTreeMap<String, Vec<String>>,
        path: Option<&str>,
    ) -> MapResult<Self> {
        let name = name.into();
        validate_file_component(&name, &name)?;

        let mut unique: Vec<String> = Vec::with_capacity(projections.len());
        for projection in projections {
            validate_file_component(&name, &projection)?;
            if unique.contains(&projection) {
                warn!(map = %name, projection = %projection, "Dropping duplicate projection");
                continue;
            }
            unique.push(projection);
        }

        for projection in aliases.keys() {
            if !unique.contains(projection) {
                warn!(
                    map = %name,
                    projection = %projection,
                    "Alias target has no dedicated mapfile, aliases will fall back to the default"
                );
            }
        }

        let url_path = normalize_url_path(path.unwrap_or(""), &name);

        Ok(Self {
            name,
            projections: unique,
            aliases,
            url_path,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn projections(&self) -> &[String] {
        &self.projections
    }

    pub fn aliases(&self) -> &BTreeMap<String, Vec<String>> {
        &self.aliases
    }

    /// URL path prefix this map is served under, e.g. `/world/`.
    pub fn url_path(&self) -> &str {
        &self.url_path
    }

    /// Whether the map has a dedicated mapfile for a canonical projection.
    pub fn has_projection(&self, projection: &str) -> bool {
        self.projections.iter().any(|p| p == projection)
    }

    /// Mapfile name for a canonical projection identifier.
    ///
    /// `<name>_<projection>.map` for registered projections, `<name>.map`
    /// for anything else.
    pub fn select_mapfile(&self, projection: &str) -> String {
        if self.has_projection(projection) {
            format!("{}_{}.map", self.name, projection)
        } else {
            format!("{}.map", self.name)
        }
    }

    /// Mapfile name for a raw SRS token such as `EPSG:900913`.
    pub fn mapfile(&self, srs: &str) -> String {
        self.select_mapfile(&resolve_projection(self, srs))
    }
}

/// Normalize a URL path prefix so it starts and ends with `/`.
///
/// An empty path falls back to the map name.
pub fn normalize_url_path(path: &str, name: &str) -> String {
    let mut p = if path.is_empty() {
        name.to_string()
    } else {
        path.to_string()
    };

    if !p.starts_with('/') {
        p.insert(0, '/');
    }
    if !p.ends_with('/') {
        p.push('/');
    }

    p
}

/// Names and projections end up in file names, so they may not carry path
/// separators.
fn validate_file_component(map: &str, value: &str) -> MapResult<()> {
    let message = if value.is_empty() {
        "must not be empty"
    } else if value.contains(['/', '\\', '\0']) {
        "must not contain path separators"
    } else {
        return Ok(());
    };

    Err(MapError::InvalidMapName {
        name: map.to_string(),
        message: format!("'{}' {}", value, message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> MapDefinition {
        let mut aliases = BTreeMap::new();
        aliases.insert("3857".to_string(), vec!["900913".to_string()]);
        MapDefinition::new("world", vec!["3857".to_string()], aliases, None).unwrap()
    }

    #[test]
    fn test_select_mapfile() {
        let map = world();
        assert_eq!(map.select_mapfile("3857"), "world_3857.map");
        assert_eq!(map.select_mapfile("4326"), "world.map");
        assert_eq!(map.select_mapfile(""), "world.map");
        assert_eq!(map.select_mapfile("../../etc/passwd"), "world.map");
    }

    #[test]
    fn test_mapfile_from_srs() {
        let map = world();
        assert_eq!(map.mapfile("EPSG:900913"), "world_3857.map");
        assert_eq!(map.mapfile("EPSG:3857"), "world_3857.map");
        assert_eq!(map.mapfile("EPSG:4326"), "world.map");
    }

    #[test]
    fn test_alias_target_without_projection_falls_back() {
        let mut aliases = BTreeMap::new();
        aliases.insert("4326".to_string(), vec!["4269".to_string()]);
        let map = MapDefinition::new("world", vec!["3857".to_string()], aliases, None).unwrap();

        assert_eq!(map.mapfile("EPSG:4269"), "world.map");
    }

    #[test]
    fn test_url_path_normalization() {
        assert_eq!(normalize_url_path("", "world"), "/world/");
        assert_eq!(normalize_url_path("maps/world", "world"), "/maps/world/");
        assert_eq!(normalize_url_path("/maps/world", "world"), "/maps/world/");
        assert_eq!(normalize_url_path("maps/world/", "world"), "/maps/world/");
        assert_eq!(normalize_url_path("/", "world"), "/");
    }

    #[test]
    fn test_duplicate_projections_dropped() {
        let map = MapDefinition::new(
            "world",
            vec!["3857".into(), "4326".into(), "3857".into()],
            BTreeMap::new(),
            Some("/w"),
        )
        .unwrap();

        assert_eq!(map.projections(), &["3857".to_string(), "4326".to_string()]);
        assert_eq!(map.url_path(), "/w/");
    }

    #[test]
    fn test_invalid_names_rejected() {
        assert!(MapDefinition::new("", vec![], BTreeMap::new(), None).is_err());
        assert!(MapDefinition::new("a/b", vec![], BTreeMap::new(), None).is_err());
        assert!(MapDefinition::new("world", vec!["../x".into()], BTreeMap::new(), None).is_err());
    }
}
