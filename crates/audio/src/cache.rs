use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use fretwise_domain::EngineError;

use crate::decode::decode_bytes;
use crate::sample::SampleAsset;
use crate::synth::{synthesize_click, synthesize_note};

/// Maximum decoded samples held before eviction kicks in.
const MAX_CACHE_SIZE: usize = 100;

/// How many of the oldest entries one eviction pass removes.
const EVICT_COUNT: usize = 10;

/// Samples fetched concurrently during a preload pass.
const PRELOAD_BATCH: usize = 5;

/// Pause between preload batches so loading never starves playback.
const PRELOAD_BATCH_PAUSE: Duration = Duration::from_millis(10);

/// Retrieves raw audio bytes for a URL. Swapped for a canned fetcher in
/// tests.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError>;
}

/// Fetches samples over HTTP relative to a base URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        let full = format!("{}{}", self.base_url.trim_end_matches('/'), url);
        let response = self
            .client
            .get(&full)
            .send()
            .await
            .map_err(|e| EngineError::sample_load(e.to_string()))?
            .error_for_status()
            .map_err(|e| EngineError::sample_load(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| EngineError::sample_load(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Fetcher that fails every request. Useful when only synthesized assets
/// are wanted, and in tests.
pub struct NullFetcher;

#[async_trait]
impl AssetFetcher for NullFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::sample_load(format!("no fetcher for {url}")))
    }
}

type LoadResult = Result<Arc<SampleAsset>, EngineError>;

struct CacheInner {
    entries: HashMap<String, Arc<SampleAsset>>,
    /// Insertion order; eviction is strictly oldest-first, untouched by
    /// cache hits.
    order: VecDeque<String>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub in_flight: usize,
}

/// Decoded-sample store with FIFO eviction and in-flight request
/// de-duplication: concurrent loads of the same URL share one fetch, and
/// a shared failure. Failures are never cached, so the next call retries.
pub struct SampleCache {
    fetcher: Arc<dyn AssetFetcher>,
    inner: Mutex<CacheInner>,
    in_flight: Mutex<HashMap<String, watch::Receiver<Option<LoadResult>>>>,
}

impl SampleCache {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    /// Returns the decoded sample for `url`, fetching and decoding on a
    /// miss. Concurrent callers for the same URL wait on the first one.
    pub async fn load_sample(&self, url: &str) -> LoadResult {
        if let Some(asset) = self.get(url) {
            return Ok(asset);
        }

        // The lock guard must not live across an await, so decide leader vs
        // follower while locked and wait afterwards.
        let role = {
            let mut in_flight = self.in_flight.lock().expect("in-flight map poisoned");
            match in_flight.get(url) {
                Some(rx) => Err(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(url.to_string(), rx);
                    Ok(tx)
                }
            }
        };
        let leader_tx = match role {
            Err(mut rx) => {
                // Another caller is already fetching; wait on it.
                loop {
                    if let Some(result) = rx.borrow().clone() {
                        return result;
                    }
                    if rx.changed().await.is_err() {
                        return Err(EngineError::sample_load(format!(
                            "load of {url} was abandoned"
                        )));
                    }
                }
            }
            Ok(tx) => tx,
        };

        let result = self.fetch_and_decode(url).await;
        if let Ok(asset) = &result {
            self.insert(url, asset.clone());
        }
        self.in_flight
            .lock()
            .expect("in-flight map poisoned")
            .remove(url);
        let _ = leader_tx.send(Some(result.clone()));
        result
    }

    async fn fetch_and_decode(&self, url: &str) -> LoadResult {
        debug!(url, "loading sample");
        let bytes = self.fetcher.fetch(url).await?;
        let asset = decode_bytes(bytes, url)?;
        Ok(Arc::new(asset))
    }

    /// Cache hit lookup. Hits do not refresh eviction order.
    pub fn get(&self, key: &str) -> Option<Arc<SampleAsset>> {
        self.inner
            .lock()
            .expect("cache poisoned")
            .entries
            .get(key)
            .cloned()
    }

    pub fn is_cached(&self, key: &str) -> bool {
        self.inner
            .lock()
            .expect("cache poisoned")
            .entries
            .contains_key(key)
    }

    /// Inserts a ready-made asset under its key, evicting if full.
    pub fn insert_asset(&self, asset: Arc<SampleAsset>) {
        let key = asset.key.clone();
        self.insert(&key, asset);
    }

    fn insert(&self, key: &str, asset: Arc<SampleAsset>) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        if inner.entries.contains_key(key) {
            inner.entries.insert(key.to_string(), asset);
            return;
        }
        if inner.entries.len() >= MAX_CACHE_SIZE {
            for _ in 0..EVICT_COUNT {
                if let Some(oldest) = inner.order.pop_front() {
                    inner.entries.remove(&oldest);
                } else {
                    break;
                }
            }
            debug!(evicted = EVICT_COUNT, "sample cache evicted oldest entries");
        }
        inner.entries.insert(key.to_string(), asset);
        inner.order.push_back(key.to_string());
    }

    /// Synthesized note, cached under its deterministic key.
    pub fn note_asset(&self, frequency: f32, duration: f32, sample_rate: u32) -> Arc<SampleAsset> {
        let asset = synthesize_note(frequency, duration, sample_rate);
        if let Some(cached) = self.get(&asset.key) {
            return cached;
        }
        let asset = Arc::new(asset);
        self.insert_asset(asset.clone());
        asset
    }

    /// Synthesized metronome click, cached under its deterministic key.
    pub fn click_asset(&self, frequency: f32, duration: f32, sample_rate: u32) -> Arc<SampleAsset> {
        let asset = synthesize_click(frequency, duration, sample_rate);
        if let Some(cached) = self.get(&asset.key) {
            return cached;
        }
        let asset = Arc::new(asset);
        self.insert_asset(asset.clone());
        asset
    }

    /// Warms the cache in small batches. Already-cached URLs are skipped;
    /// failures are logged. Preloading is best-effort.
    pub async fn preload(self: &Arc<Self>, urls: Vec<String>) {
        let urls: Vec<String> = urls.into_iter().filter(|url| !self.is_cached(url)).collect();
        for batch in urls.chunks(PRELOAD_BATCH) {
            let tasks: Vec<_> = batch
                .iter()
                .cloned()
                .map(|url| {
                    let cache = Arc::clone(self);
                    tokio::spawn(async move {
                        if let Err(e) = cache.load_sample(&url).await {
                            warn!(url = %url, error = %e, "preload skipped");
                        }
                    })
                })
                .collect();
            for task in tasks {
                let _ = task.await;
            }
            tokio::time::sleep(PRELOAD_BATCH_PAUSE).await;
        }
    }

    /// Preloads chord samples by name, skipping any in `blocked`.
    pub async fn preload_chord_samples(self: &Arc<Self>, names: &[&str], blocked: &[&str]) {
        let urls = names
            .iter()
            .filter(|name| !blocked.contains(name))
            .map(|name| chord_sample_url(name))
            .collect();
        self.preload(urls).await;
    }

    /// Preloads single-note samples for the given string/fret pairs.
    pub async fn preload_note_samples(self: &Arc<Self>, notes: &[(&str, u8)]) {
        let urls = notes
            .iter()
            .map(|(note, fret)| note_sample_url(note, *fret))
            .collect();
        self.preload(urls).await;
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache poisoned");
        inner.entries.clear();
        inner.order.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache poisoned");
        CacheStats {
            entries: inner.entries.len(),
            capacity: MAX_CACHE_SIZE,
            in_flight: self.in_flight.lock().expect("in-flight map poisoned").len(),
        }
    }
}

/// URL for a strummed chord sample, e.g. `/samples/chords/a_major.wav`.
pub fn chord_sample_url(name: &str) -> String {
    let slug = name.trim().to_lowercase().replace([' ', '#'], "_");
    format!("/samples/chords/{slug}.wav")
}

/// URL for a fretted single-note sample, e.g. `/samples/notes/e2_fret3.wav`.
pub fn note_sample_url(note: &str, fret: u8) -> String {
    let slug = note.trim().to_lowercase().replace('#', "sharp");
    format!("/samples/notes/{slug}_fret{fret}.wav")
}
