//! Lazy typed stream primitives for the render pipeline.
//!
//! A [`Stream<T>`] is a handle to a (possibly not-yet-materialized)
//! sequence of [`StreamItem<T>`]s. Operators compose streams without
//! doing work until [`Stream::collect_items`] is called by a consumer
//! (the build pipeline, or a test).

use super::disk_cache::StreamCache;
use crate::hash::hash_str;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Identifies one item's place in the stream graph: which stream
/// produced it, its identity within that stream, and a version token
/// used for cache invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamKey {
    pub source: String,
    pub id: String,
    pub version: String,
}

impl StreamKey {
    pub fn new(source: impl Into<String>, id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            id: id.into(),
            version: version.into(),
        }
    }

    fn rekeyed(&self, source: &str) -> Self {
        Self {
            source: source.to_string(),
            id: self.id.clone(),
            version: self.version.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamItem<T> {
    pub key: StreamKey,
    pub value: T,
}

impl<T> StreamItem<T> {
    pub fn new(key: StreamKey, value: T) -> Self {
        Self { key, value }
    }
}

/// A lazily-evaluated, typed stream of items.
pub trait Stream<T>: Send + Sync {
    fn collect_items(&self) -> Vec<StreamItem<T>>;
}

pub type StreamHandle<T> = Arc<dyn Stream<T>>;

// ---------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------

pub struct SourceStream<T> {
    name: String,
    producer: Box<dyn Fn() -> Vec<StreamItem<T>> + Send + Sync>,
}

impl<T: Send + Sync + 'static> SourceStream<T> {
    pub fn new(
        name: impl Into<String>,
        producer: impl Fn() -> Vec<StreamItem<T>> + Send + Sync + 'static,
    ) -> StreamHandle<T> {
        Arc::new(Self {
            name: name.into(),
            producer: Box::new(producer),
        })
    }
}

impl<T: Send + Sync> Stream<T> for SourceStream<T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        let _ = &self.name;
        (self.producer)()
    }
}

// ---------------------------------------------------------------------
// Map (and its parallel variant)
// ---------------------------------------------------------------------

/// A `map` stage. Kept as a distinct type (rather than erased into
/// `StreamHandle`) so [`MapStream::into_parallel`] can reach past this
/// stage to its own upstream, applying `f` via a worker pool exactly
/// once per item instead of once sequentially here and then again in a
/// naively-generic parallel wrapper.
pub struct MapStream<S, T> {
    name: String,
    upstream: StreamHandle<S>,
    f: Arc<dyn Fn(S) -> T + Send + Sync>,
}

impl<S: Send + Sync + 'static, T: Send + Sync + 'static> MapStream<S, T> {
    pub fn new(
        name: impl Into<String>,
        upstream: StreamHandle<S>,
        f: impl Fn(S) -> T + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            upstream,
            f: Arc::new(f),
        }
    }

    pub fn into_handle(self) -> StreamHandle<T> {
        Arc::new(self)
    }

    /// Run `f` across a worker pool instead of sequentially, preserving
    /// the upstream's original item order in the output (not completion
    /// order, so downstream consumers see deterministic results).
    pub fn into_parallel(self, workers: usize) -> StreamHandle<T> {
        Arc::new(ParallelMapStream {
            name: self.name,
            upstream: self.upstream,
            f: self.f,
            workers,
        })
    }
}

impl<S: Send + Sync, T: Send + Sync> Stream<T> for MapStream<S, T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        self.upstream
            .collect_items()
            .into_iter()
            .map(|item| {
                let key = item.key.rekeyed(&self.name);
                StreamItem::new(key, (self.f)(item.value))
            })
            .collect()
    }
}

impl<S: Send + Sync + 'static, T: Send + Sync + 'static> MapStream<S, T> {
    /// Check `cache` before invoking `f`, keyed by the rekeyed
    /// [`StreamKey`]; a version mismatch (or absent entry) is a miss,
    /// never an error, so a stale entry is just silently recomputed.
    pub fn into_disk_cached(self, cache: Arc<StreamCache>) -> StreamHandle<T>
    where
        T: Serialize + DeserializeOwned,
    {
        Arc::new(DiskCachedMapStream {
            name: self.name,
            upstream: self.upstream,
            f: self.f,
            cache,
        })
    }
}

struct DiskCachedMapStream<S, T> {
    name: String,
    upstream: StreamHandle<S>,
    f: Arc<dyn Fn(S) -> T + Send + Sync>,
    cache: Arc<StreamCache>,
}

impl<S: Send + Sync, T: Send + Sync + Serialize + DeserializeOwned> Stream<T> for DiskCachedMapStream<S, T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        self.upstream
            .collect_items()
            .into_iter()
            .map(|item| {
                let key = item.key.rekeyed(&self.name);
                if let Some(cached) = self.cache.get(&key).and_then(|v| serde_json::from_value(v).ok()) {
                    return StreamItem::new(key, cached);
                }
                let value = (self.f)(item.value);
                if let Ok(json) = serde_json::to_value(&value) {
                    self.cache.put(&key, json);
                }
                StreamItem::new(key, value)
            })
            .collect()
    }
}

struct ParallelMapStream<S, T> {
    name: String,
    upstream: StreamHandle<S>,
    f: Arc<dyn Fn(S) -> T + Send + Sync>,
    workers: usize,
}

impl<S: Send + Sync, T: Send + Sync> Stream<T> for ParallelMapStream<S, T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        let source_items = self.upstream.collect_items();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers.max(1))
            .build()
            .expect("worker pool construction");

        // Apply `f` exactly once per source item, in parallel, then
        // restore the original source order — never completion order —
        // so output is deterministic regardless of worker scheduling.
        pool.install(|| {
            use rayon::prelude::*;
            source_items
                .into_par_iter()
                .map(|item| {
                    let key = item.key.rekeyed(&self.name);
                    StreamItem::new(key, (self.f)(item.value))
                })
                .collect()
        })
    }
}

// ---------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------

pub struct FilterStream<T> {
    upstream: StreamHandle<T>,
    predicate: Arc<dyn Fn(&T) -> bool + Send + Sync>,
}

impl<T: Send + Sync + 'static> FilterStream<T> {
    pub fn new(
        upstream: StreamHandle<T>,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
    ) -> StreamHandle<T> {
        Arc::new(Self {
            upstream,
            predicate: Arc::new(predicate),
        })
    }
}

impl<T: Send + Sync> Stream<T> for FilterStream<T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        self.upstream
            .collect_items()
            .into_iter()
            .filter(|item| (self.predicate)(&item.value))
            .collect()
    }
}

// ---------------------------------------------------------------------
// FlatMap
// ---------------------------------------------------------------------

pub struct FlatMapStream<S, T> {
    name: String,
    upstream: StreamHandle<S>,
    f: Arc<dyn Fn(S) -> Vec<T> + Send + Sync>,
}

impl<S: Send + Sync + 'static, T: Send + Sync + 'static> FlatMapStream<S, T> {
    pub fn new(
        name: impl Into<String>,
        upstream: StreamHandle<S>,
        f: impl Fn(S) -> Vec<T> + Send + Sync + 'static,
    ) -> StreamHandle<T> {
        Arc::new(Self {
            name: name.into(),
            upstream,
            f: Arc::new(f),
        })
    }
}

impl<S: Send + Sync, T: Send + Sync> Stream<T> for FlatMapStream<S, T> {
    fn collect_items(&self) -> Vec<StreamItem<T>> {
        self.upstream
            .collect_items()
            .into_iter()
            .flat_map(|item| {
                let values = (self.f)(item.value);
                let source = format!("{}:{}", self.name, item.key.id);
                values.into_iter().enumerate().map(move |(i, value)| {
                    StreamItem::new(StreamKey::new(source.clone(), format!("{i}"), item.key.version.clone()), value)
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------
// Collect (barrier)
// ---------------------------------------------------------------------

pub struct CollectStream<T> {
    name: String,
    upstream: StreamHandle<T>,
}

impl<T: Send + Sync + 'static> CollectStream<T> {
    pub fn new(name: impl Into<String>, upstream: StreamHandle<T>) -> StreamHandle<Vec<T>> {
        Arc::new(Self {
            name: name.into(),
            upstream,
        })
    }
}

impl<T: Send + Sync> Stream<Vec<T>> for CollectStream<T> {
    fn collect_items(&self) -> Vec<StreamItem<Vec<T>>> {
        let items = self.upstream.collect_items();
        if items.is_empty() {
            return vec![StreamItem::new(
                StreamKey::new(self.name.clone(), "all", "empty"),
                Vec::new(),
            )];
        }
        let versions = items
            .iter()
            .map(|i| i.key.version.as_str())
            .collect::<Vec<_>>()
            .join(":");
        let version = hash_str(&versions);
        let values = items.into_iter().map(|i| i.value).collect();
        vec![StreamItem::new(
            StreamKey::new(self.name.clone(), "all", version),
            values,
        )]
    }
}

// ---------------------------------------------------------------------
// Combine (barrier, homogeneous upstream type)
// ---------------------------------------------------------------------

/// Combines several same-typed streams into one `Vec<Vec<T>>` item (one
/// inner `Vec` per upstream, preserving upstream order). If any upstream
/// is empty, the whole combine yields a single all-empty item with
/// version `"empty"`.
pub struct CombineStream<T> {
    name: String,
    upstreams: Vec<StreamHandle<T>>,
}

impl<T: Send + Sync + 'static> CombineStream<T> {
    pub fn new(name: impl Into<String>, upstreams: Vec<StreamHandle<T>>) -> StreamHandle<Vec<Vec<T>>> {
        Arc::new(Self {
            name: name.into(),
            upstreams,
        })
    }
}

impl<T: Send + Sync> Stream<Vec<Vec<T>>> for CombineStream<T> {
    fn collect_items(&self) -> Vec<StreamItem<Vec<Vec<T>>>> {
        let mut per_stream_values = Vec::new();
        let mut per_stream_versions = Vec::new();

        for upstream in &self.upstreams {
            let items = upstream.collect_items();
            if items.is_empty() {
                return vec![StreamItem::new(
                    StreamKey::new(self.name.clone(), "all", "empty"),
                    Vec::new(),
                )];
            }
            let version = if items.len() == 1 {
                items[0].key.version.clone()
            } else {
                let joined = items
                    .iter()
                    .map(|i| i.key.version.as_str())
                    .collect::<Vec<_>>()
                    .join(":");
                hash_str(&joined)
            };
            per_stream_versions.push(version);
            per_stream_values.push(items.into_iter().map(|i| i.value).collect::<Vec<_>>());
        }

        let final_version = hash_str(&per_stream_versions.join(":"));
        vec![StreamItem::new(
            StreamKey::new(self.name.clone(), "all", final_version),
            per_stream_values,
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_of(values: Vec<i32>) -> StreamHandle<i32> {
        SourceStream::new("nums", move || {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| StreamItem::new(StreamKey::new("nums", format!("{i}"), format!("{i}")), *v))
                .collect()
        })
    }

    #[test]
    fn map_transforms_values() {
        let stream = MapStream::new("double", source_of(vec![1, 2, 3]), |v| v * 2).into_handle();
        let values: Vec<_> = stream.collect_items().into_iter().map(|i| i.value).collect();
        assert_eq!(values, vec![2, 4, 6]);
    }

    #[test]
    fn filter_keeps_matching_items() {
        let stream = FilterStream::new(source_of(vec![1, 2, 3, 4]), |v| v % 2 == 0);
        let values: Vec<_> = stream.collect_items().into_iter().map(|i| i.value).collect();
        assert_eq!(values, vec![2, 4]);
    }

    #[test]
    fn flat_map_expands_and_ids_are_indexed() {
        let stream = FlatMapStream::new("expand", source_of(vec![1, 2]), |v| vec![v, v * 10]);
        let items = stream.collect_items();
        let values: Vec<_> = items.iter().map(|i| i.value).collect();
        assert_eq!(values, vec![1, 10, 2, 20]);
        assert_eq!(items[0].key.id, "0");
        assert_eq!(items[1].key.id, "1");
    }

    #[test]
    fn collect_is_a_single_barrier_item() {
        let stream = CollectStream::new("all", source_of(vec![1, 2, 3]));
        let items = stream.collect_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value, vec![1, 2, 3]);
        assert_eq!(items[0].key.id, "all");
    }

    #[test]
    fn collect_of_empty_stream_has_empty_version() {
        let stream = CollectStream::new("all", source_of(vec![]));
        let items = stream.collect_items();
        assert_eq!(items[0].key.version, "empty");
    }

    #[test]
    fn parallel_map_preserves_source_order_and_applies_fn_once_per_item() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let calls_clone = Arc::clone(&calls);

        let map_stage = MapStream::new("inc", source_of((0..50).collect()), move |v| {
            calls_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            v + 1
        });
        let parallel = map_stage.into_parallel(4);

        let values: Vec<_> = parallel.collect_items().into_iter().map(|i| i.value).collect();
        let expected: Vec<i32> = (1..=50).collect();
        assert_eq!(values, expected, "output must preserve original source order");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 50);
    }

    #[test]
    fn combine_empty_upstream_short_circuits_to_empty_version() {
        let combined = CombineStream::new("combo", vec![source_of(vec![1]), source_of(vec![])]);
        let items = combined.collect_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.version, "empty");
    }

    #[test]
    fn combine_joins_per_stream_versions() {
        let combined = CombineStream::new("combo", vec![source_of(vec![1, 2]), source_of(vec![3])]);
        let items = combined.collect_items();
        assert_eq!(items[0].value, vec![vec![1, 2], vec![3]]);
    }

    #[test]
    fn disk_cached_map_skips_f_on_a_repeat_run_with_the_same_version() {
        let cache = Arc::new(StreamCache::new(std::path::PathBuf::from("/tmp/does-not-exist-stream-test.json")));
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let run = |cache: Arc<StreamCache>, calls: Arc<std::sync::atomic::AtomicUsize>| {
            MapStream::new("double", source_of(vec![1, 2, 3]), move |v| {
                calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                v * 2
            })
            .into_disk_cached(cache)
        };

        let first: Vec<_> = run(Arc::clone(&cache), Arc::clone(&calls))
            .collect_items()
            .into_iter()
            .map(|i| i.value)
            .collect();
        assert_eq!(first, vec![2, 4, 6]);
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 3);

        let second: Vec<_> = run(Arc::clone(&cache), Arc::clone(&calls))
            .collect_items()
            .into_iter()
            .map(|i| i.value)
            .collect();
        assert_eq!(second, vec![2, 4, 6]);
        assert_eq!(
            calls.load(std::sync::atomic::Ordering::SeqCst),
            3,
            "second run should hit the disk cache and never call f again"
        );
    }

    #[test]
    fn disk_cached_map_recomputes_on_version_change() {
        let cache = Arc::new(StreamCache::new(std::path::PathBuf::from("/tmp/does-not-exist-stream-test2.json")));

        let stream_v1 = MapStream::new(
            "double",
            SourceStream::new("nums", || vec![StreamItem::new(StreamKey::new("nums", "0", "v1"), 1)]),
            |v: i32| v * 2,
        )
        .into_disk_cached(Arc::clone(&cache));
        let first = stream_v1.collect_items();
        assert_eq!(first[0].value, 2);

        let stream_v2 = MapStream::new(
            "double",
            SourceStream::new("nums", || vec![StreamItem::new(StreamKey::new("nums", "0", "v2"), 5)]),
            |v: i32| v * 2,
        )
        .into_disk_cached(Arc::clone(&cache));
        let second = stream_v2.collect_items();
        assert_eq!(second[0].value, 10, "version change must be treated as a miss, not stale data");
    }
}
