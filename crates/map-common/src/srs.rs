//! SRS token handling and alias resolution.
//!
//! Clients spell the same coordinate system in several ways (`EPSG:900913`,
//! `EPSG:102100`, `EPSG:3857`). A map registers which spellings stand for
//! which of its projections; resolution maps a raw token onto that
//! canonical identifier so the mapfile selector only has to look up one name.

use crate::map::MapDefinition;

/// Extract the working identifier from a raw SRS token.
///
/// The identifier is everything after the last `:`, so `EPSG:4326`,
/// `urn:ogc:def:crs:EPSG::4326` and `4326` all yield `4326`.
pub fn srid_of(token: &str) -> &str {
    match token.rfind(':') {
        Some(idx) => &token[idx + 1..],
        None => token,
    }
}

/// Resolve a raw SRS token to the map's canonical projection identifier.
///
/// Every alias set is checked against the identifier taken from the token,
/// visiting sets in ascending order of their projection identifier. When the
/// token appears in several sets the projection that sorts last wins.
/// Replacements are not chained: a resolved projection is never looked up
/// again. Tokens that match nothing pass through as-is.
pub fn resolve_projection(map: &MapDefinition, token: &str) -> String {
    let srid = srid_of(token);

    map.aliases()
        .iter()
        .filter(|(_, aliases)| aliases.iter().any(|alias| alias == srid))
        .map(|(projection, _)| projection.clone())
        .last()
        .unwrap_or_else(|| srid.to_string())
}
