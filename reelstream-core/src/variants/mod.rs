pub mod error;
pub mod models;
pub mod store;

pub use error::{RegistryError, RegistryResult};
pub use models::{CompletedArtifact, EncodingStatus, VariantKey, VariantSummary, VideoVariant};
pub use store::{JobVariants, SqliteVariantStore, SqliteVariantStoreBuilder};
