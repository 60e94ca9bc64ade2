use std::path::Path;

use crate::worker::domain::engine::{EngineError, RecognitionEngine};
use crate::worker::domain::module_loader::{InitError, ModuleLoader};
use crate::worker::infrastructure::resource_resolver::{ResolveError, ResourceResolver};

/// Builds an engine from a resolved resource file.
pub type EngineFactory =
    Box<dyn Fn(&Path) -> Result<Box<dyn RecognitionEngine>, EngineError> + Send>;

/// Loads an engine by resolving its resource (local, cached, bundled or
/// downloaded) and handing the file to a factory.
///
/// Download bytes are mapped to load progress; 100 is only reported once
/// the engine is constructed.
pub struct ResourceModuleLoader {
    resolver: ResourceResolver,
    factory: EngineFactory,
}

impl ResourceModuleLoader {
    pub fn new(resolver: ResourceResolver, factory: EngineFactory) -> Self {
        Self { resolver, factory }
    }
}

impl ModuleLoader for ResourceModuleLoader {
    fn load(
        &self,
        location: &str,
        progress: &mut dyn FnMut(u8),
    ) -> Result<Box<dyn RecognitionEngine>, InitError> {
        progress(0);
        let path = self
            .resolver
            .resolve(location, &mut |done: u64, total: u64| {
                progress(download_percent(done, total));
            })
            .map_err(|e| match e {
                ResolveError::Download { url, source } => InitError::Network {
                    context: format!("downloading {url}"),
                    reason: source.to_string(),
                },
                other => InitError::ModuleLoad {
                    location: location.to_string(),
                    reason: other.to_string(),
                },
            })?;

        log::debug!("constructing engine from {}", path.display());
        let engine = (self.factory)(&path).map_err(|e| InitError::ModuleLoad {
            location: location.to_string(),
            reason: e.to_string(),
        })?;
        progress(100);
        Ok(engine)
    }
}

/// Download share of load progress, capped below completion.
fn download_percent(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.saturating_mul(99) / total).min(99) as u8
}
