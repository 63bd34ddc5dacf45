//! Exchange rate resolution with provider failover
//!
//! Fetches a spot rate between two currency codes from a primary provider,
//! falls back to a secondary provider with a direct pair lookup, and as a
//! last resort degrades to the identity rate so a conversion never blocks on
//! FX availability. Resolved rates are cached in-process per pair.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::FxConfig;

/// Rate resolution error
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    #[error("rate request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider {provider} returned no rate for {currency}")]
    MissingRate { provider: String, currency: String },
}

pub type RateResult<T> = Result<T, RateError>;

/// Rate provider trait for fetching exchange rates
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetch current rate between two currencies
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<f64>;

    /// Get provider name
    fn name(&self) -> &str;
}

/// JSON body shared by both provider APIs: a `rates` map keyed by currency code
#[derive(Debug, serde::Deserialize)]
struct RatesBody {
    rates: HashMap<String, f64>,
}

/// Primary provider: whole-table lookup, `GET {base}/v4/latest/{from}`
pub struct LatestTableProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LatestTableProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RateResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RateProvider for LatestTableProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<f64> {
        let url = format!("{}/v4/latest/{}", self.base_url.trim_end_matches('/'), from);
        let body: RatesBody = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.rates
            .get(to)
            .copied()
            .ok_or_else(|| RateError::MissingRate {
                provider: self.name().to_string(),
                currency: to.to_string(),
            })
    }

    fn name(&self) -> &str {
        "latest_table"
    }
}

/// Secondary provider: direct pair lookup, `GET {base}/latest?from={from}&to={to}`
pub struct PairLookupProvider {
    client: reqwest::Client,
    base_url: String,
}

impl PairLookupProvider {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> RateResult<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl RateProvider for PairLookupProvider {
    async fn fetch_rate(&self, from: &str, to: &str) -> RateResult<f64> {
        let url = format!(
            "{}/latest?from={}&to={}",
            self.base_url.trim_end_matches('/'),
            from,
            to
        );
        let body: RatesBody = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        body.rates
            .get(to)
            .copied()
            .ok_or_else(|| RateError::MissingRate {
                provider: self.name().to_string(),
                currency: to.to_string(),
            })
    }

    fn name(&self) -> &str {
        "pair_lookup"
    }
}

/// Provider pinned to a constant rate, for tests and controlled environments
pub struct FixedRateProvider {
    rate: f64,
}

impl FixedRateProvider {
    pub fn new(rate: f64) -> Self {
        Self { rate }
    }
}

#[async_trait]
impl RateProvider for FixedRateProvider {
    async fn fetch_rate(&self, _from: &str, _to: &str) -> RateResult<f64> {
        Ok(self.rate)
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct RateResolverConfig {
    pub cache_ttl: Duration,
}

impl Default for RateResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedRate {
    rate: f64,
    fetched_at: Instant,
}

/// Exchange rate resolver with ordered provider failover
pub struct RateResolver {
    providers: Vec<Arc<dyn RateProvider>>,
    cache: RwLock<HashMap<(String, String), CachedRate>>,
    config: RateResolverConfig,
}

impl RateResolver {
    pub fn new(config: RateResolverConfig) -> Self {
        Self {
            providers: Vec::new(),
            cache: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Add rate provider; providers are consulted in insertion order
    pub fn add_provider(mut self, provider: Arc<dyn RateProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Build the production resolver: primary table lookup, secondary pair lookup
    pub fn from_config(fx: &FxConfig) -> RateResult<Self> {
        let timeout = Duration::from_secs(fx.request_timeout);
        let config = RateResolverConfig {
            cache_ttl: Duration::from_secs(fx.cache_ttl),
        };

        Ok(Self::new(config)
            .add_provider(Arc::new(LatestTableProvider::new(
                fx.primary_url.clone(),
                timeout,
            )?))
            .add_provider(Arc::new(PairLookupProvider::new(
                fx.secondary_url.clone(),
                timeout,
            )?)))
    }

    /// Resolve the spot rate for a currency pair.
    ///
    /// Infallible by policy: identical currencies short-circuit to `1` with
    /// no network call, and when every provider fails the resolver degrades
    /// to `1` with a warning rather than failing the caller. The fallback is
    /// never cached, so a recovered provider is picked up on the next call.
    pub async fn resolve(&self, from: &str, to: &str) -> f64 {
        if from == to {
            return 1.0;
        }

        if let Some(rate) = self.cached(from, to).await {
            debug!(%from, %to, rate, "rate cache hit");
            return rate;
        }

        for provider in &self.providers {
            match provider.fetch_rate(from, to).await {
                Ok(rate) if rate > 0.0 => {
                    debug!(provider = provider.name(), %from, %to, rate, "rate resolved");
                    self.store(from, to, rate).await;
                    return rate;
                }
                Ok(rate) => {
                    warn!(
                        provider = provider.name(),
                        rate, "ignoring non-positive rate from provider"
                    );
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "rate provider failed");
                }
            }
        }

        warn!(
            %from,
            %to,
            "all rate providers failed, falling back to identity rate"
        );
        1.0
    }

    async fn cached(&self, from: &str, to: &str) -> Option<f64> {
        let cache = self.cache.read().await;
        let entry = cache.get(&(from.to_string(), to.to_string()))?;
        if entry.fetched_at.elapsed() < self.config.cache_ttl {
            Some(entry.rate)
        } else {
            None
        }
    }

    async fn store(&self, from: &str, to: &str, rate: f64) {
        let mut cache = self.cache.write().await;
        cache.insert(
            (from.to_string(), to.to_string()),
            CachedRate {
                rate,
                fetched_at: Instant::now(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockRateProvider {
        rate: Option<f64>,
        calls: AtomicUsize,
    }

    impl MockRateProvider {
        fn new(rate: f64) -> Self {
            Self {
                rate: Some(rate),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                rate: None,
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl RateProvider for MockRateProvider {
        async fn fetch_rate(&self, _from: &str, to: &str) -> RateResult<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rate.ok_or_else(|| RateError::MissingRate {
                provider: self.name().to_string(),
                currency: to.to_string(),
            })
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn test_identity_pair_makes_no_provider_call() {
        let mock = Arc::new(MockRateProvider::new(2.0));
        let resolver = RateResolver::new(RateResolverConfig::default()).add_provider(mock.clone());

        let rate = resolver.resolve("USD", "USD").await;

        assert_eq!(rate, 1.0);
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_provider_wins() {
        let primary = Arc::new(MockRateProvider::new(0.9));
        let secondary = Arc::new(MockRateProvider::new(0.5));
        let resolver = RateResolver::new(RateResolverConfig::default())
            .add_provider(primary.clone())
            .add_provider(secondary.clone());

        let rate = resolver.resolve("USD", "EUR").await;

        assert_eq!(rate, 0.9);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_failover_to_secondary() {
        let primary = Arc::new(MockRateProvider::failing());
        let secondary = Arc::new(MockRateProvider::new(1.25));
        let resolver = RateResolver::new(RateResolverConfig::default())
            .add_provider(primary.clone())
            .add_provider(secondary.clone());

        let rate = resolver.resolve("USD", "GBP").await;

        assert_eq!(rate, 1.25);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_providers_down_falls_back_to_identity() {
        let primary = Arc::new(MockRateProvider::failing());
        let secondary = Arc::new(MockRateProvider::failing());
        let resolver = RateResolver::new(RateResolverConfig::default())
            .add_provider(primary)
            .add_provider(secondary);

        let rate = resolver.resolve("USD", "EUR").await;

        assert_eq!(rate, 1.0);
    }

    #[tokio::test]
    async fn test_non_positive_rate_is_skipped() {
        let primary = Arc::new(MockRateProvider::new(0.0));
        let secondary = Arc::new(MockRateProvider::new(3.0));
        let resolver = RateResolver::new(RateResolverConfig::default())
            .add_provider(primary)
            .add_provider(secondary);

        let rate = resolver.resolve("USD", "JPY").await;

        assert_eq!(rate, 3.0);
    }

    #[tokio::test]
    async fn test_resolved_rate_is_cached_per_pair() {
        let mock = Arc::new(MockRateProvider::new(0.8));
        let resolver = RateResolver::new(RateResolverConfig::default()).add_provider(mock.clone());

        let first = resolver.resolve("USD", "EUR").await;
        let second = resolver.resolve("USD", "EUR").await;

        assert_eq!(first, second);
        assert_eq!(mock.calls(), 1);

        // A different pair misses the cache
        let _ = resolver.resolve("EUR", "USD").await;
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let mock = Arc::new(MockRateProvider::failing());
        let resolver = RateResolver::new(RateResolverConfig::default()).add_provider(mock.clone());

        let _ = resolver.resolve("USD", "EUR").await;
        let _ = resolver.resolve("USD", "EUR").await;

        // Both calls reached the provider: the identity fallback never lands in the cache
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_fixed_rate_provider() {
        let provider = FixedRateProvider::new(0.9);
        let rate = provider.fetch_rate("USD", "EUR").await.unwrap();
        assert_eq!(rate, 0.9);
    }
}
