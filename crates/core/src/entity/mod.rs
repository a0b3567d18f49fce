mod error;
mod keys;
mod resolver;
mod shape;

pub use error::{ConfigurationError, UnsupportedKeyTypeError};
pub use keys::{ensure_key, KeyGeneration, RepositoryKey};
pub use resolver::{
    describe_key, find_annotated_key, find_conventional_key, resolve_key, KeyDescriptor,
};
pub use shape::{normalize_name, short_type_name, Entity, EntityShape, Member};
