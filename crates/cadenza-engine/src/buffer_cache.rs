//! Decoded clip buffers, memoized by clip id.
//!
//! Each clip id owns one slot holding a [`tokio::sync::OnceCell`]. The first
//! [`BufferCache::decode`] call for an id fetches, decodes and resamples the
//! source on the blocking pool; concurrent callers for the same id await the
//! same initialization instead of decoding twice. A failed decode leaves the
//! slot empty so a later call can retry.
//!
//! The slot map lock is only held to look up or replace a slot, never across
//! an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use cadenza_analysis::{WaveformBucket, waveform_summary};
use cadenza_core::{ClipId, SourceRef, Track};
use cadenza_io::{DecodedBuffer, DefaultFetcher, SourceFetcher, decode_bytes, resample};

use crate::error::DecodeError;

type Slot = Arc<OnceCell<Arc<DecodedBuffer>>>;

/// Shared, cloneable cache of decoded clip audio at one sample rate.
#[derive(Clone)]
pub struct BufferCache {
    sample_rate: u32,
    fetcher: Arc<dyn SourceFetcher>,
    slots: Arc<Mutex<HashMap<ClipId, Slot>>>,
}

impl BufferCache {
    /// A cache producing buffers at `sample_rate`, reading sources with
    /// [`DefaultFetcher`].
    pub fn new(sample_rate: u32) -> Self {
        Self::with_fetcher(sample_rate, Arc::new(DefaultFetcher))
    }

    /// A cache with a custom source fetcher.
    pub fn with_fetcher(sample_rate: u32, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            sample_rate,
            fetcher,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Rate every cached buffer is converted to.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// A cache at `sample_rate` sharing this cache's fetcher. Returns a
    /// clone of `self` when the rate already matches.
    pub fn at_rate(&self, sample_rate: u32) -> Self {
        if sample_rate == self.sample_rate {
            return self.clone();
        }
        Self::with_fetcher(sample_rate, Arc::clone(&self.fetcher))
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ClipId, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, clip_id: &ClipId) -> Slot {
        Arc::clone(self.lock().entry(clip_id.clone()).or_default())
    }

    /// Decode `source` for `clip_id`, or return the buffer already cached.
    pub async fn decode(
        &self,
        clip_id: &ClipId,
        source: &SourceRef,
    ) -> Result<Arc<DecodedBuffer>, DecodeError> {
        let slot = self.slot(clip_id);
        let result = slot
            .get_or_try_init(|| {
                load(
                    Arc::clone(&self.fetcher),
                    source.clone(),
                    self.sample_rate,
                )
            })
            .await
            .cloned();

        match &result {
            Ok(buffer) => debug!(
                clip_id = %clip_id,
                frames = buffer.frames(),
                channels = buffer.channel_count(),
                "clip buffer ready"
            ),
            Err(error) => warn!(clip_id = %clip_id, %error, "clip decode failed"),
        }
        result
    }

    /// Decode every clip of `tracks` concurrently. A failing clip never
    /// stops the others; failures are returned.
    pub async fn load_tracks(&self, tracks: &[Track]) -> Vec<(ClipId, DecodeError)> {
        let mut tasks = JoinSet::new();
        for clip in tracks.iter().flat_map(|track| &track.clips) {
            let cache = self.clone();
            let id = clip.id.clone();
            let source = clip.source.clone();
            tasks.spawn(async move {
                let result = cache.decode(&id, &source).await;
                (id, result)
            });
        }
        let mut failures = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(_))) => {}
                Ok((id, Err(err))) => failures.push((id, err)),
                Err(err) => warn!(error = %err, "clip load task failed"),
            }
        }
        failures
    }

    /// The cached buffer for `clip_id`, if decoding has completed.
    pub fn get(&self, clip_id: &ClipId) -> Option<Arc<DecodedBuffer>> {
        self.lock().get(clip_id).and_then(|slot| slot.get().cloned())
    }

    /// Store an already-decoded buffer, replacing any previous entry.
    ///
    /// Buffers at another rate are resampled first.
    pub fn insert(
        &self,
        clip_id: ClipId,
        buffer: DecodedBuffer,
    ) -> Result<Arc<DecodedBuffer>, DecodeError> {
        let buffer = Arc::new(conform(buffer, self.sample_rate)?);
        let slot = Arc::new(OnceCell::new_with(Some(Arc::clone(&buffer))));
        self.lock().insert(clip_id, slot);
        Ok(buffer)
    }

    /// Drop the entry for `clip_id`, returning its buffer if one was decoded.
    pub fn evict(&self, clip_id: &ClipId) -> Option<Arc<DecodedBuffer>> {
        let slot = self.lock().remove(clip_id)?;
        slot.get().cloned()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let drained: Vec<Slot> = self.lock().drain().map(|(_, slot)| slot).collect();
        debug!(entries = drained.len(), "buffer cache cleared");
    }

    /// Number of decoded buffers held.
    pub fn len(&self) -> usize {
        self.lock().values().filter(|slot| slot.initialized()).count()
    }

    /// Whether no decoded buffers are held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time copy of every decoded buffer.
    pub fn snapshot(&self) -> HashMap<ClipId, Arc<DecodedBuffer>> {
        self.lock()
            .iter()
            .filter_map(|(id, slot)| slot.get().map(|buf| (id.clone(), Arc::clone(buf))))
            .collect()
    }

    /// Peak/average overview of `source` in exactly `bucket_count` buckets.
    ///
    /// Decodes independently of the cache, at the source's own rate, and
    /// summarizes the mono mixdown.
    pub async fn waveform_summary(
        &self,
        source: &SourceRef,
        bucket_count: usize,
    ) -> Result<Vec<WaveformBucket>, DecodeError> {
        let fetcher = Arc::clone(&self.fetcher);
        let source = source.clone();
        tokio::task::spawn_blocking(move || {
            let decoded = fetch_and_decode(fetcher.as_ref(), &source)?;
            Ok(waveform_summary(&decoded.to_mono(), bucket_count))
        })
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

impl std::fmt::Debug for BufferCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferCache")
            .field("sample_rate", &self.sample_rate)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

async fn load(
    fetcher: Arc<dyn SourceFetcher>,
    source: SourceRef,
    sample_rate: u32,
) -> Result<Arc<DecodedBuffer>, DecodeError> {
    tokio::task::spawn_blocking(move || {
        let decoded = fetch_and_decode(fetcher.as_ref(), &source)?;
        conform(decoded, sample_rate).map(Arc::new)
    })
    .await
    .map_err(|e| DecodeError::Task(e.to_string()))?
}

fn fetch_and_decode(
    fetcher: &dyn SourceFetcher,
    source: &SourceRef,
) -> Result<DecodedBuffer, DecodeError> {
    let bytes = fetcher.fetch(source)?;
    let hint = source.extension_hint();
    Ok(decode_bytes(&bytes, hint.as_deref())?)
}

fn conform(buffer: DecodedBuffer, sample_rate: u32) -> Result<DecodedBuffer, DecodeError> {
    if buffer.sample_rate() == sample_rate {
        return Ok(buffer);
    }
    let channels = resample(buffer.channels(), buffer.sample_rate(), sample_rate)?;
    Ok(DecodedBuffer::new(sample_rate, channels)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wav_bytes(rate: u32, samples: &[f32]) -> Arc<[u8]> {
        cadenza_io::encode_wav_pcm16(samples, 1, rate).unwrap().into()
    }

    /// Counts fetches so memoization is observable.
    struct CountingFetcher {
        calls: AtomicUsize,
    }

    impl SourceFetcher for CountingFetcher {
        fn fetch(&self, source: &SourceRef) -> cadenza_io::Result<Arc<[u8]>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            DefaultFetcher.fetch(source)
        }
    }

    #[tokio::test]
    async fn second_decode_hits_cache() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = BufferCache::with_fetcher(48_000, fetcher.clone());
        let source = SourceRef::bytes(wav_bytes(48_000, &[0.5; 480]));
        let id = ClipId::new("a");

        let first = cache.decode(&id, &source).await.unwrap();
        let second = cache.decode(&id, &source).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_decodes_share_one_fetch() {
        let fetcher = Arc::new(CountingFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = BufferCache::with_fetcher(48_000, fetcher.clone());
        let source = SourceRef::bytes(wav_bytes(48_000, &[0.25; 4800]));
        let id = ClipId::new("shared");

        let (a, b) = tokio::join!(cache.decode(&id, &source), cache.decode(&id, &source));
        assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_leaves_slot_retryable() {
        let cache = BufferCache::new(48_000);
        let id = ClipId::new("x");

        let err = cache
            .decode(&id, &SourceRef::bytes(vec![1u8, 2, 3, 4]))
            .await
            .unwrap_err();
        assert!(matches!(err, DecodeError::Unsupported(_)));
        assert!(cache.get(&id).is_none());
        assert!(cache.is_empty());

        let ok = cache
            .decode(&id, &SourceRef::bytes(wav_bytes(48_000, &[0.1; 100])))
            .await;
        assert!(ok.is_ok());
        assert!(cache.get(&id).is_some());
    }

    #[tokio::test]
    async fn resamples_to_cache_rate() {
        let cache = BufferCache::new(48_000);
        let source = SourceRef::bytes(wav_bytes(24_000, &[0.5; 2400]));
        let buffer = cache.decode(&ClipId::new("r"), &source).await.unwrap();
        assert_eq!(buffer.sample_rate(), 48_000);
        assert_eq!(buffer.frames(), 4800);
    }

    #[test]
    fn insert_evict_clear() {
        let cache = BufferCache::new(48_000);
        let buffer = DecodedBuffer::mono(48_000, vec![0.0; 10]).unwrap();
        cache.insert(ClipId::new("a"), buffer.clone()).unwrap();
        cache.insert(ClipId::new("b"), buffer).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.snapshot().len(), 2);

        assert!(cache.evict(&ClipId::new("a")).is_some());
        assert!(cache.evict(&ClipId::new("a")).is_none());
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn clones_share_entries() {
        let cache = BufferCache::new(48_000);
        let other = cache.clone();
        let buffer = DecodedBuffer::mono(48_000, vec![0.0; 10]).unwrap();
        cache.insert(ClipId::new("a"), buffer).unwrap();
        assert!(other.get(&ClipId::new("a")).is_some());
    }

    #[tokio::test]
    async fn waveform_bypasses_cache() {
        let cache = BufferCache::new(48_000);
        let mut samples = vec![0.0f32; 1000];
        samples[10] = -0.5;
        let summary = cache
            .waveform_summary(&SourceRef::bytes(wav_bytes(8_000, &samples)), 10)
            .await
            .unwrap();
        assert_eq!(summary.len(), 10);
        assert!((summary[0].peak - 0.5).abs() < 1e-3);
        assert_eq!(summary[9].peak, 0.0);
        assert!(cache.is_empty());
    }
}
