//! Request-to-mapfile resolution shared by the mapserv proxy services.
//!
//! Everything here is synchronous and free of I/O: map definitions, SRS alias
//! resolution, mapfile selection, query decoding and the parameter normalizer
//! that turns a client query into the one handed to the renderer.

pub mod error;
pub mod map;
pub mod params;
pub mod query;
pub mod srs;

pub use error::{MapError, MapResult};
pub use map::MapDefinition;
pub use params::{normalize, EXCEPTION_FORMATS};
pub use query::{encode_query, parse_query, RequestParameters};
pub use srs::{resolve_projection, srid_of};
