//! Process-wide detector.
//!
//! The model is loaded on first use and lives until the process exits. All
//! runs share it; a run holds the lock for as long as it is pulling frames.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;

/// Cloneable handle to a detector backend.
#[derive(Clone)]
pub struct SharedDetector {
    inner: Arc<Mutex<Box<dyn DetectorBackend>>>,
    name: &'static str,
}

impl SharedDetector {
    pub fn from_boxed(backend: Box<dyn DetectorBackend>) -> Self {
        let name = backend.name();
        Self {
            inner: Arc::new(Mutex::new(backend)),
            name,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Exclusive access for the duration of a run.
    pub fn lock(&self) -> Result<MutexGuard<'_, Box<dyn DetectorBackend>>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("detector lock poisoned"))
    }

    pub fn ptr_eq(&self, other: &SharedDetector) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

static GLOBAL_DETECTOR: OnceLock<SharedDetector> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Return the process-wide detector, loading it with `loader` on first call.
///
/// Concurrent first callers are serialized: exactly one runs its loader and
/// the rest receive that instance. If the loader fails nothing is cached and a
/// later call may try again.
pub fn shared_detector<F>(loader: F) -> Result<SharedDetector>
where
    F: FnOnce() -> Result<Box<dyn DetectorBackend>>,
{
    if let Some(detector) = GLOBAL_DETECTOR.get() {
        return Ok(detector.clone());
    }
    let _guard = INIT_LOCK
        .lock()
        .map_err(|_| anyhow!("detector init lock poisoned"))?;
    if let Some(detector) = GLOBAL_DETECTOR.get() {
        return Ok(detector.clone());
    }

    let mut backend = loader()?;
    backend.warm_up()?;
    let detector = SharedDetector::from_boxed(backend);
    log::info!("detector '{}' loaded", detector.name());
    Ok(GLOBAL_DETECTOR.get_or_init(|| detector).clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::StubBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn loads_once_across_threads() {
        static LOADS: AtomicUsize = AtomicUsize::new(0);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                thread::spawn(|| {
                    shared_detector(|| {
                        LOADS.fetch_add(1, Ordering::SeqCst);
                        Ok(Box::new(StubBackend::new()) as Box<dyn DetectorBackend>)
                    })
                    .unwrap()
                })
            })
            .collect();
        let detectors: Vec<SharedDetector> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(LOADS.load(Ordering::SeqCst), 1);
        assert!(detectors.windows(2).all(|w| w[0].ptr_eq(&w[1])));

        // later loaders are ignored
        let again = shared_detector(|| Err(anyhow!("should not be called"))).unwrap();
        assert!(again.ptr_eq(&detectors[0]));
    }
}
