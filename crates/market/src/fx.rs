//! The process-wide FX rate cell and its refresh plumbing.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use kimp_core::{FxRate, FxSourceTag, Result};

/// How long a cached rate may substitute for a failing live source.
pub const CACHE_TTL: Duration = Duration::from_secs(300);

fn tag_to_u8(tag: FxSourceTag) -> u8 {
    match tag {
        FxSourceTag::Investing => 0,
        FxSourceTag::Bok => 1,
        FxSourceTag::Fallback => 2,
        FxSourceTag::Cached => 3,
    }
}

fn tag_from_u8(v: u8) -> FxSourceTag {
    match v {
        1 => FxSourceTag::Bok,
        2 => FxSourceTag::Fallback,
        3 => FxSourceTag::Cached,
        _ => FxSourceTag::Investing,
    }
}

/// Lock-free KRW-per-USD cell, shared by everything that normalizes
/// prices. A rate of zero means "not yet initialized" and suppresses
/// conversions downstream.
pub struct FxCell {
    bits: AtomicU64,
    source: AtomicU8,
    timestamp_us: AtomicI64,
}

impl FxCell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bits: AtomicU64::new(0f64.to_bits()),
            source: AtomicU8::new(0),
            timestamp_us: AtomicI64::new(0),
        }
    }

    /// Cell pre-seeded with a rate (startup before the first fetch).
    #[must_use]
    pub fn with_rate(rate: f64) -> Self {
        let cell = Self::new();
        cell.store(FxRate::new(rate, FxSourceTag::Fallback, kimp_core::time::now_us()));
        cell
    }

    pub fn store(&self, rate: FxRate) {
        self.bits.store(rate.rate.to_bits(), Ordering::Release);
        self.source.store(tag_to_u8(rate.source), Ordering::Release);
        self.timestamp_us
            .store(rate.timestamp_us, Ordering::Release);
    }

    /// Current rate value; `0.0` before initialization.
    #[must_use]
    pub fn rate(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Acquire))
    }

    #[must_use]
    pub fn load(&self) -> FxRate {
        FxRate::new(
            self.rate(),
            tag_from_u8(self.source.load(Ordering::Acquire)),
            self.timestamp_us.load(Ordering::Acquire),
        )
    }
}

impl Default for FxCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Anything that yields a current FX observation.
#[async_trait]
pub trait FxSource: Send + Sync {
    async fn fetch(&self) -> Result<FxRate>;
}

/// Wraps a live source with a last-good cache: when the live fetch fails
/// and the cache is younger than [`CACHE_TTL`], the cached rate is served
/// tagged [`FxSourceTag::Cached`].
pub struct CachedFxSource<S> {
    inner: S,
    cache: Mutex<Option<(FxRate, Instant)>>,
    ttl: Duration,
}

impl<S: FxSource> CachedFxSource<S> {
    #[must_use]
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            cache: Mutex::new(None),
            ttl: CACHE_TTL,
        }
    }

    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

#[async_trait]
impl<S: FxSource> FxSource for CachedFxSource<S> {
    async fn fetch(&self) -> Result<FxRate> {
        match self.inner.fetch().await {
            Ok(rate) => {
                *self.cache.lock() = Some((rate, Instant::now()));
                Ok(rate)
            }
            Err(err) => {
                if let Some((cached, at)) = *self.cache.lock() {
                    if at.elapsed() <= self.ttl {
                        warn!(%err, "fx source failed, serving cached rate");
                        return Ok(FxRate::new(
                            cached.rate,
                            FxSourceTag::Cached,
                            cached.timestamp_us,
                        ));
                    }
                }
                Err(err)
            }
        }
    }
}

/// Refreshes `cell` from `source` on a fixed cadence until aborted.
pub fn spawn_refresh(
    source: Arc<dyn FxSource>,
    cell: Arc<FxCell>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match source.fetch().await {
                Ok(rate) => {
                    info!(rate = rate.rate, source = rate.source.as_str(), "fx updated");
                    cell.store(rate);
                }
                Err(err) => warn!(%err, "fx refresh failed"),
            }
            tokio::time::sleep(interval).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kimp_core::Error;
    use std::sync::atomic::AtomicBool;

    struct FlakySource {
        fail: AtomicBool,
    }

    #[async_trait]
    impl FxSource for FlakySource {
        async fn fetch(&self) -> Result<FxRate> {
            if self.fail.load(Ordering::SeqCst) {
                Err(Error::network("fx fetch down"))
            } else {
                Ok(FxRate::new(1400.0, FxSourceTag::Investing, 1))
            }
        }
    }

    #[test]
    fn test_cell_round_trip() {
        let cell = FxCell::new();
        assert_eq!(cell.rate(), 0.0);
        cell.store(FxRate::new(1400.5, FxSourceTag::Bok, 99));
        let loaded = cell.load();
        assert_eq!(loaded.rate, 1400.5);
        assert_eq!(loaded.source, FxSourceTag::Bok);
        assert_eq!(loaded.timestamp_us, 99);
    }

    #[tokio::test]
    async fn test_cached_source_serves_cache_on_failure() {
        let source = CachedFxSource::new(FlakySource {
            fail: AtomicBool::new(false),
        });
        let first = source.fetch().await.unwrap();
        assert_eq!(first.source, FxSourceTag::Investing);

        source.inner.fail.store(true, Ordering::SeqCst);
        let second = source.fetch().await.unwrap();
        assert_eq!(second.rate, 1400.0);
        assert_eq!(second.source, FxSourceTag::Cached);
    }

    #[tokio::test]
    async fn test_cached_source_expires() {
        let source = CachedFxSource::new(FlakySource {
            fail: AtomicBool::new(false),
        })
        .with_ttl(Duration::from_millis(0));
        source.fetch().await.unwrap();
        source.inner.fail.store(true, Ordering::SeqCst);
        assert!(source.fetch().await.is_err());
    }

    #[tokio::test]
    async fn test_cold_cache_propagates_error() {
        let source = CachedFxSource::new(FlakySource {
            fail: AtomicBool::new(true),
        });
        assert!(source.fetch().await.is_err());
    }
}
