pub mod metadata_cache;
pub mod normalizer;

pub use metadata_cache::{InstrumentMetadata, InstrumentMetadataCache, MetadataSource};
pub use normalizer::{PriceNormalizer, PriceRole};
