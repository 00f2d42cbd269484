//! The reactive render pipeline: lazy typed streams over content
//! discovery, parsing, and rendering, with disk-backed memoization at
//! stable edges (parse, page).

pub mod disk_cache;
pub mod stream;

pub use disk_cache::StreamCache;
pub use stream::{
    CollectStream, CombineStream, FilterStream, FlatMapStream, MapStream, SourceStream, Stream,
    StreamHandle, StreamItem, StreamKey,
};
