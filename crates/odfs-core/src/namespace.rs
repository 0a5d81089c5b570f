//! Container-name namespace at the mount root.

use crate::error::{OdfsError, OdfsResult};
use crate::path_cache::PathCache;
use crate::remote::RemoteStore;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use tracing::{debug, warn};

/// Container caches keyed by name, with names kept in listing order.
struct ContainerMap {
    names: Vec<String>,
    caches: HashMap<String, Arc<PathCache>>,
}

/// Maps container names to their [`PathCache`].
///
/// Containers are listed once, on first use. A failed listing is not
/// remembered; the next call tries again.
pub struct RootNamespace {
    remote: Arc<dyn RemoteStore>,
    containers: Mutex<Option<Arc<ContainerMap>>>,
}

impl RootNamespace {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            remote,
            containers: Mutex::new(None),
        }
    }

    fn containers(&self) -> OdfsResult<Arc<ContainerMap>> {
        let mut slot = self.containers.lock();
        if let Some(map) = slot.as_ref() {
            return Ok(Arc::clone(map));
        }

        debug!("Listing containers");
        let listed = self.remote.list_containers()?;
        let mut names = Vec::with_capacity(listed.len());
        let mut caches = HashMap::with_capacity(listed.len());
        for container in listed {
            let cache = Arc::new(PathCache::new(container.id, Arc::clone(&self.remote)));
            match caches.entry(container.name) {
                Entry::Occupied(mut existing) => {
                    // Names must be unique; the later container shadows the earlier one.
                    warn!(
                        name = %existing.key(),
                        id = %container.id,
                        "Duplicate container name, later entry wins"
                    );
                    existing.insert(cache);
                }
                Entry::Vacant(vacant) => {
                    names.push(vacant.key().clone());
                    vacant.insert(cache);
                }
            }
        }

        let map = Arc::new(ContainerMap { names, caches });
        *slot = Some(Arc::clone(&map));
        Ok(map)
    }

    /// Lists containers on first call; later calls return immediately.
    pub fn ensure_containers(&self) -> OdfsResult<()> {
        self.containers().map(|_| ())
    }

    /// Path cache of the container called `name`.
    pub fn resolve(&self, name: &str) -> OdfsResult<Arc<PathCache>> {
        self.containers()?
            .caches
            .get(name)
            .cloned()
            .ok_or_else(|| OdfsError::NotFound(format!("/{name}")))
    }

    /// Container names in listing order, each once.
    pub fn container_names(&self) -> OdfsResult<Vec<String>> {
        Ok(self.containers()?.names.clone())
    }
}
