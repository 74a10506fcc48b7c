//! An optional process-wide generator.
//!
//! Nothing here is created implicitly: call [`init`] once at startup, [`global`] wherever
//! the instance is needed, and [`teardown`] on shutdown. Code that wants isolation (tests,
//! multi-tenant hosts) should construct its own [`QrGenerator`] instead.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::GeneratorConfig;
use crate::error::{QrError, Result};
use crate::generator::QrGenerator;

static SHARED: RwLock<Option<Arc<QrGenerator>>> = parking_lot::const_rwlock(None);

/// Installs the shared generator, or returns the one already installed (in which case
/// `config` is ignored).
pub fn init(config: GeneratorConfig) -> Arc<QrGenerator> {
    let mut slot = SHARED.write();
    if let Some(existing) = slot.as_ref() {
        return Arc::clone(existing);
    }
    let generator = Arc::new(QrGenerator::new(config));
    *slot = Some(Arc::clone(&generator));
    debug!("Installed shared QR generator");
    generator
}

/// The shared generator. Fails with [`QrError::GeneratorDestroyed`] before [`init`] and
/// after [`teardown`].
pub fn global() -> Result<Arc<QrGenerator>> {
    SHARED.read().clone().ok_or(QrError::GeneratorDestroyed)
}

/// Uninstalls and destroys the shared generator. Returns `false` if none was installed.
///
/// Handles obtained earlier from [`global`] stay valid as values but every call on them
/// fails with [`QrError::GeneratorDestroyed`].
pub fn teardown() -> bool {
    let Some(generator) = SHARED.write().take() else {
        return false;
    };
    if generator.destroy().is_err() {
        debug!("Shared QR generator was already destroyed");
    }
    true
}
