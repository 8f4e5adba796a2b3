//! Query string decoding and encoding.

use std::collections::BTreeMap;

use crate::error::{MapError, MapResult};

/// Normalized request parameters, one value per key.
///
/// Ordered so the query string handed to the renderer is deterministic.
pub type RequestParameters = BTreeMap<String, String>;

/// Decode an `application/x-www-form-urlencoded` string into ordered pairs.
///
/// Unlike [`form_urlencoded::parse`] this refuses input a strict parser would
/// reject: a `;` separator, or a `%` that is not followed by two hex digits.
/// Repeated keys are kept in request order.
pub fn parse_query(raw: &str) -> MapResult<Vec<(String, String)>> {
    if raw.contains(';') {
        return Err(MapError::MalformedQuery(
            "semicolon separators are not allowed".to_string(),
        ));
    }

    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(MapError::MalformedQuery(format!(
                    "invalid escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                )));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    Ok(form_urlencoded::parse(bytes)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

/// Encode parameters as a query string, keys in ascending order.
pub fn encode_query(params: &RequestParameters) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}
