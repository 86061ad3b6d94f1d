//! Resource loaders.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::backend::ResourceLoader;
use fable_core::{FableError, FableResult, ResourceKind};
use fable_ir::ResourceHandle;

/// Resolves resource names against a bundle directory.
#[derive(Debug, Clone)]
pub struct BundleLoader {
    root: PathBuf,
}

impl BundleLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

#[async_trait]
impl ResourceLoader for BundleLoader {
    async fn load_resource(&self, name: &str) -> FableResult<ResourceHandle> {
        let path = self.resolve(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                let kind = path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(ResourceKind::from_extension)
                    .unwrap_or(ResourceKind::Other);
                tracing::debug!("resolved '{}' to {} ({})", name, path.display(), kind);
                Ok(ResourceHandle::new(name, kind))
            }
            Ok(_) | Err(_) => {
                tracing::warn!("resource '{}' not found at {}", name, path.display());
                Err(FableError::resource_not_found(name))
            }
        }
    }
}

/// Serves handles from memory. Useful for tests and generated content.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    handles: HashMap<String, ResourceHandle>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a handle under its name.
    pub fn with(mut self, handle: ResourceHandle) -> Self {
        self.insert(handle);
        self
    }

    pub fn insert(&mut self, handle: ResourceHandle) {
        self.handles.insert(handle.name.clone(), handle);
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    async fn load_resource(&self, name: &str) -> FableResult<ResourceHandle> {
        self.handles
            .get(name)
            .cloned()
            .ok_or_else(|| FableError::resource_not_found(name))
    }
}
