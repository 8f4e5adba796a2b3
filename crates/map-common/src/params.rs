//! Parameter normalization for renderer requests.
//!
//! The renderer takes exactly one value per parameter and reads the mapfile
//! to load from `MAP`. Normalization runs these steps in order:
//!
//! 1. uppercase every key, keeping the first value seen for each
//! 2. default `REQUEST` to `GetCapabilities` and `SERVICE` to `WMS`
//! 3. replace `MAP` with the mapfile selected from `SRS`
//! 4. force `EXCEPTIONS` to `xml` unless it is a known format

use crate::map::MapDefinition;
use crate::query::RequestParameters;

/// Exception formats the renderer accepts, compared case-insensitively.
pub const EXCEPTION_FORMATS: [&str; 3] = ["blank", "image", "xml"];

pub const DEFAULT_REQUEST: &str = "GetCapabilities";
pub const DEFAULT_SERVICE: &str = "WMS";
pub const DEFAULT_EXCEPTIONS: &str = "xml";

/// Run the full normalization over decoded query pairs.
pub fn normalize(pairs: Vec<(String, String)>, map: &MapDefinition) -> RequestParameters {
    let mut params = normalize_keys(pairs);
    inject_defaults(&mut params);
    override_mapfile(&mut params, map);
    sanitize_exceptions(&mut params);
    params
}

/// Uppercase keys and collapse repeated parameters to their first value.
///
/// Keys that only differ in case collapse together; the pair that came first
/// in the request wins. Later values are dropped since the renderer would
/// ignore them anyway.
pub fn normalize_keys<I>(pairs: I) -> RequestParameters
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut params = RequestParameters::new();
    for (key, value) in pairs {
        params.entry(key.to_uppercase()).or_insert(value);
    }
    params
}

/// Fill in `REQUEST` and `SERVICE` when absent or empty.
pub fn inject_defaults(params: &mut RequestParameters) {
    set_if_blank(params, "REQUEST", DEFAULT_REQUEST);
    set_if_blank(params, "SERVICE", DEFAULT_SERVICE);
}

/// Replace whatever `MAP` the client sent with the mapfile for its `SRS`.
///
/// Letting the caller pick the file would hand them arbitrary paths on disk.
pub fn override_mapfile(params: &mut RequestParameters, map: &MapDefinition) {
    params.remove("MAP");
    let srs = params.get("SRS").map(String::as_str).unwrap_or("");
    let mapfile = map.mapfile(srs);
    params.insert("MAP".to_string(), mapfile);
}

/// Force `EXCEPTIONS` to `xml` unless it names an accepted format.
///
/// A valid value keeps the client's casing.
pub fn sanitize_exceptions(params: &mut RequestParameters) {
    let valid = params
        .get("EXCEPTIONS")
        .map(|v| is_exception_format(v))
        .unwrap_or(false);

    if !valid {
        params.insert("EXCEPTIONS".to_string(), DEFAULT_EXCEPTIONS.to_string());
    }
}

pub fn is_exception_format(value: &str) -> bool {
    EXCEPTION_FORMATS
        .iter()
        .any(|format| format.eq_ignore_ascii_case(value))
}

fn set_if_blank(params: &mut RequestParameters, key: &str, default: &str) {
    let blank = params.get(key).map(|v| v.is_empty()).unwrap_or(true);
    if blank {
        params.insert(key.to_string(), default.to_string());
    }
}
