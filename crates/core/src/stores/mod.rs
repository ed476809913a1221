pub mod memory;
pub mod qdrant;

pub use memory::InMemoryStore;
pub use qdrant::QdrantStore;

use crate::config::{PipelineConfig, ProviderSettings, VectorStoreKind};
use crate::error::ConfigError;
use crate::traits::{StoreFactory, VectorIndex};

/// Opens the backing store selected in the pipeline config.
#[derive(Debug, Clone)]
pub struct ConfiguredStores {
    kind: VectorStoreKind,
    index_name: String,
    settings: Option<ProviderSettings>,
}

impl ConfiguredStores {
    pub fn in_memory() -> Self {
        Self {
            kind: VectorStoreKind::InMemory,
            index_name: String::new(),
            settings: None,
        }
    }

    pub fn from_config(
        config: &PipelineConfig,
        settings: &ProviderSettings,
    ) -> Result<Self, ConfigError> {
        match config.vector_store {
            VectorStoreKind::InMemory => Ok(Self::in_memory()),
            VectorStoreKind::Managed => {
                // fail at startup rather than on the first process action
                QdrantStore::new(settings, config.index_name.clone())?;
                Ok(Self {
                    kind: VectorStoreKind::Managed,
                    index_name: config.index_name.clone(),
                    settings: Some(settings.clone()),
                })
            }
        }
    }
}

impl StoreFactory for ConfiguredStores {
    fn open(&self) -> Result<Box<dyn VectorIndex>, ConfigError> {
        match (self.kind, &self.settings) {
            (VectorStoreKind::Managed, Some(settings)) => {
                Ok(Box::new(QdrantStore::new(settings, self.index_name.clone())?))
            }
            (VectorStoreKind::Managed, None) => Err(ConfigError::Invalid(
                "managed vector store has no connection settings".to_string(),
            )),
            (VectorStoreKind::InMemory, _) => Ok(Box::new(InMemoryStore::new())),
        }
    }
}
