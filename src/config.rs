//! Generator configuration.

use serde::Deserialize;

use crate::error::{QrError, Result};

/// Configuration for a [`QrGenerator`](crate::generator::QrGenerator).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Bound on the artifact cache.
    pub cache_capacity: CacheCapacity,
    /// What a failing request does to the rest of its batch.
    pub batch_mode: BatchMode,
    /// Accepted output edge lengths, in pixels.
    pub size_bounds: SizeBounds,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            cache_capacity: CacheCapacity::Entries(256),
            batch_mode: BatchMode::PerSlot,
            size_bounds: SizeBounds::default(),
        }
    }
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache_capacity(mut self, capacity: CacheCapacity) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_batch_mode(mut self, mode: BatchMode) -> Self {
        self.batch_mode = mode;
        self
    }

    pub fn with_size_bounds(mut self, min: u32, max: u32) -> Self {
        self.size_bounds = SizeBounds { min, max };
        self
    }
}

/// How the cache store is bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCapacity {
    /// At most this many artifacts.
    Entries(usize),
    /// At most this many bytes of encoded artifact data.
    Bytes(usize),
}

/// Failure semantics of [`QrGenerator::generate_batch`](crate::generator::QrGenerator::generate_batch).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// Every slot carries its own result; one failure does not affect the others.
    #[default]
    PerSlot,
    /// The whole batch fails with the first failing slot (in input order).
    AllOrNothing,
}

/// Inclusive range of accepted output sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SizeBounds {
    pub min: u32,
    pub max: u32,
}

impl Default for SizeBounds {
    fn default() -> Self {
        Self { min: 32, max: 4096 }
    }
}

impl SizeBounds {
    /// Returns `size` as a pixel count if it is within bounds.
    pub fn check(&self, size: i64) -> Result<u32> {
        match u32::try_from(size) {
            Ok(px) if (self.min..=self.max).contains(&px) => Ok(px),
            _ => Err(QrError::InvalidSize {
                size,
                min: self.min,
                max: self.max,
            }),
        }
    }
}
