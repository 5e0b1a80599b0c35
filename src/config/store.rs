use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{ConfigError, ConfigResult, RouterConfig};

/// Process-wide holder for the live router configuration.
///
/// Cascade runs read a consistent snapshot at start; the only runtime
/// mutation is the tuner writing a layer's confidence threshold back.
pub struct ConfigStore {
    path: Option<PathBuf>,
    current: RwLock<Arc<RouterConfig>>,
}

impl ConfigStore {
    pub fn new(config: RouterConfig) -> ConfigResult<Self> {
        config.validate()?;
        Ok(Self {
            path: None,
            current: RwLock::new(Arc::new(config)),
        })
    }

    pub fn from_path(path: PathBuf) -> ConfigResult<Self> {
        let config = RouterConfig::load(&path)?;
        Ok(Self {
            path: Some(path),
            current: RwLock::new(Arc::new(config)),
        })
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, Arc<RouterConfig>> {
        match self.current.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, Arc<RouterConfig>> {
        match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Consistent view of the configuration; an in-progress cascade keeps
    /// the Arc it took at start and never observes later mutations.
    pub fn snapshot(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.read_lock())
    }

    pub fn reload(&self) -> ConfigResult<()> {
        let path = self.path.as_ref().ok_or(ConfigError::NoBackingFile)?;
        let config = RouterConfig::load(path)?;
        *self.write_lock() = Arc::new(config);
        Ok(())
    }

    /// Replace one layer's confidence threshold, returning the old value.
    /// Persists to the backing file when the store is file-backed.
    pub fn set_threshold(&self, layer_name: &str, value: f64) -> ConfigResult<f64> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ConfigError::InvalidConfig(format!(
                "Threshold {value} for layer '{layer_name}' is outside [0, 1]"
            )));
        }

        let mut guard = self.write_lock();
        let mut updated = (**guard).clone();
        let layer = updated
            .layers
            .iter_mut()
            .find(|l| l.name == layer_name)
            .ok_or_else(|| ConfigError::LayerNotFound {
                layer: layer_name.to_string(),
            })?;

        let old = layer.confidence_threshold;
        layer.confidence_threshold = value;

        if let Some(path) = &self.path {
            updated.save(path)?;
        }

        *guard = Arc::new(updated);
        tracing::info!(
            event = "config.threshold_updated",
            layer = %layer_name,
            old_threshold = old,
            new_threshold = value,
        );
        Ok(old)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LAYER_SEMANTIC;

    #[test]
    fn test_snapshot_is_isolated_from_later_updates() {
        let store = ConfigStore::new(RouterConfig::default()).unwrap();
        let before = store.snapshot();
        let old_threshold = before.layer(LAYER_SEMANTIC).unwrap().confidence_threshold;

        store.set_threshold(LAYER_SEMANTIC, 0.42).unwrap();

        assert_eq!(
            before.layer(LAYER_SEMANTIC).unwrap().confidence_threshold,
            old_threshold
        );
        assert_eq!(
            store
                .snapshot()
                .layer(LAYER_SEMANTIC)
                .unwrap()
                .confidence_threshold,
            0.42
        );
    }

    #[test]
    fn test_set_threshold_returns_old_value() {
        let store = ConfigStore::new(RouterConfig::default()).unwrap();
        let old = store.set_threshold(LAYER_SEMANTIC, 0.55).unwrap();
        assert_eq!(old, 0.70);
    }

    #[test]
    fn test_set_threshold_unknown_layer_fails() {
        let store = ConfigStore::new(RouterConfig::default()).unwrap();
        assert!(store.set_threshold("no-such-layer", 0.5).is_err());
    }

    #[test]
    fn test_set_threshold_out_of_range_fails() {
        let store = ConfigStore::new(RouterConfig::default()).unwrap();
        assert!(store.set_threshold(LAYER_SEMANTIC, 1.5).is_err());
    }

    #[test]
    fn test_reload_without_backing_file_fails() {
        let store = ConfigStore::new(RouterConfig::default()).unwrap();
        assert!(matches!(
            store.reload(),
            Err(ConfigError::NoBackingFile)
        ));
    }

    #[test]
    fn test_file_backed_store_persists_threshold() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("router.toml");
        RouterConfig::default().save(&path).unwrap();

        let store = ConfigStore::from_path(path.clone()).unwrap();
        store.set_threshold(LAYER_SEMANTIC, 0.61).unwrap();

        let reloaded = RouterConfig::load(&path).unwrap();
        assert_eq!(
            reloaded.layer(LAYER_SEMANTIC).unwrap().confidence_threshold,
            0.61
        );
    }
}
