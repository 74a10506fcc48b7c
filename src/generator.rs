//! The public entry point: normalize, consult the cache, coalesce, render.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::cache::{CacheStats, CacheStore};
use crate::coalesce::Coalescer;
use crate::config::{BatchMode, GeneratorConfig};
use crate::error::{QrError, Result};
use crate::matrix::{QrEncoder, SymbolEncoder};
use crate::normalize::normalize;
use crate::render::{Artifact, ImageLogoDecoder, LogoDecoder, Renderer};
use crate::request::GenerationRequest;

/// Value rendered by [`QrGenerator::warmup`].
const WARMUP_VALUE: &str = "warmup";

/// Generates styled QR images, memoizing results and deduplicating concurrent work.
///
/// Instances are independent: each owns its cache and in-flight table. Share one
/// between tasks by wrapping it in an [`Arc`].
///
/// ```no_run
/// # async fn run() -> qistyle::Result<()> {
/// use qistyle::{GenerationRequest, GeneratorConfig, QrGenerator};
///
/// let generator = QrGenerator::new(GeneratorConfig::default());
/// let artifact = generator.generate(&GenerationRequest::new("https://example.com", 300)).await?;
/// assert!(artifact.as_str().starts_with("data:image/png;base64,"));
/// # Ok(())
/// # }
/// ```
pub struct QrGenerator<E = QrEncoder, D = ImageLogoDecoder> {
    config: GeneratorConfig,
    renderer: Arc<Renderer<E, D>>,
    cache: Arc<CacheStore>,
    coalescer: Coalescer,
    warmed: OnceCell<()>,
    destroyed: Arc<AtomicBool>,
}

impl QrGenerator {
    /// A generator backed by the built-in encoder and logo decoder.
    ///
    /// Runs under any executor, except that logos given as file paths are read through
    /// `tokio::fs` and fail with [`QrError::LogoDecodeFailure`] outside a Tokio runtime.
    pub fn new(config: GeneratorConfig) -> Self {
        Self::with_renderer(config, Renderer::default())
    }
}

impl<E: SymbolEncoder, D: LogoDecoder> QrGenerator<E, D> {
    pub fn with_renderer(config: GeneratorConfig, renderer: Renderer<E, D>) -> Self {
        let cache = CacheStore::new(config.cache_capacity);
        Self {
            config,
            renderer: Arc::new(renderer),
            cache: Arc::new(cache),
            coalescer: Coalescer::new(),
            warmed: OnceCell::new(),
            destroyed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    fn ensure_live(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(QrError::GeneratorDestroyed);
        }
        Ok(())
    }

    /// Generates the artifact for one request.
    ///
    /// Validation errors are returned before the cache or the in-flight table is
    /// touched. A render failure is shared with every concurrent caller of the same
    /// request and is not cached, so the next call retries.
    pub async fn generate(&self, request: &GenerationRequest) -> Result<Artifact> {
        self.ensure_live()?;
        let (key, validated) = normalize(request, &self.config.size_bounds)?;
        if let Some(artifact) = self.cache.get(&key) {
            return Ok(artifact);
        }

        let renderer = Arc::clone(&self.renderer);
        let cache = Arc::clone(&self.cache);
        let destroyed = Arc::clone(&self.destroyed);
        let render_key = key.clone();
        self.coalescer
            .get_or_render(&key, move || async move {
                // A render for this key may have settled between our miss and now
                if let Some(artifact) = cache.peek(&render_key) {
                    return Ok(artifact);
                }
                match renderer.render(&validated).await {
                    Ok(artifact) => {
                        if !destroyed.load(Ordering::Acquire) {
                            cache.put(render_key, artifact.clone());
                        }
                        Ok(artifact)
                    }
                    Err(err) => {
                        warn!(key = ?render_key, error = %err, "QR render failed");
                        Err(err)
                    }
                }
            })
            .await
    }

    /// Generates every request concurrently, returning results in input order.
    ///
    /// Identical requests in the batch share one render. With [`BatchMode::PerSlot`]
    /// each slot carries its own outcome. With [`BatchMode::AllOrNothing`] the first
    /// failing slot (by input position) fails the call with [`QrError::BatchFailed`],
    /// and a successful call has only `Ok` slots.
    pub async fn generate_batch(&self, requests: &[GenerationRequest]) -> Result<Vec<Result<Artifact>>> {
        self.ensure_live()?;
        let started = Instant::now();
        let results = join_all(requests.iter().map(|request| self.generate(request))).await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        debug!(
            requests = requests.len(),
            failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Generated QR batch"
        );

        if self.config.batch_mode == BatchMode::AllOrNothing {
            let first_failure = results
                .iter()
                .enumerate()
                .find_map(|(index, result)| result.as_ref().err().map(|err| (index, err.clone())));
            if let Some((index, err)) = first_failure {
                return Err(QrError::BatchFailed {
                    index,
                    source: Box::new(err),
                });
            }
        }
        Ok(results)
    }

    /// Renders one throwaway image so the first real caller does not pay for lazy
    /// initialization. Only the first successful call does any work; the probe is
    /// not cached.
    pub async fn warmup(&self) -> Result<()> {
        self.ensure_live()?;
        self.warmed
            .get_or_try_init(|| async {
                let started = Instant::now();
                let probe = GenerationRequest::new(WARMUP_VALUE, i64::from(self.config.size_bounds.min));
                let (_, validated) = normalize(&probe, &self.config.size_bounds)?;
                self.renderer.render(&validated).await?;
                debug!(elapsed_ms = started.elapsed().as_millis() as u64, "Warmed up QR generator");
                Ok::<_, QrError>(())
            })
            .await?;
        Ok(())
    }

    /// Drops every cached artifact. Returns how many were dropped.
    pub fn clear_cache(&self) -> Result<usize> {
        self.ensure_live()?;
        Ok(self.cache.clear())
    }

    /// Releases the cache and forgets in-flight renders. Every later call fails with
    /// [`QrError::GeneratorDestroyed`], including a second `destroy`.
    ///
    /// Callers already waiting on a render still receive its outcome, but it is not
    /// cached.
    pub fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Err(QrError::GeneratorDestroyed);
        }
        let cleared = self.cache.clear();
        let abandoned = self.coalescer.abandon_all();
        debug!(cleared, abandoned, "Destroyed QR generator");
        Ok(())
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Number of distinct renders currently running.
    pub fn in_flight(&self) -> usize {
        self.coalescer.in_flight()
    }
}
