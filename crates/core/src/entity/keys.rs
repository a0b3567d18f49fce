use std::any::Any;
use std::fmt::{Debug, Display};
use std::hash::Hash;

use uuid::Uuid;

use super::{KeyDescriptor, UnsupportedKeyTypeError};

/// Who assigns new key values for a key type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    /// The repository generates the value before handing the entity to the store.
    Client,
    /// The store assigns the value (auto-increment style).
    Store,
}

/// A type usable as an entity primary key.
///
/// The default value of the type means "unassigned".
pub trait RepositoryKey:
    Any + Clone + Default + Eq + Hash + Debug + Display + Send + Sync
{
    const GENERATION: KeyGeneration = KeyGeneration::Store;

    /// Produces a fresh key value.
    fn generate() -> Result<Self, UnsupportedKeyTypeError> {
        Err(UnsupportedKeyTypeError::new::<Self>())
    }

    /// Maps a store sequence number onto this key type, if the type supports
    /// sequential assignment.
    fn from_sequence(_sequence: u64) -> Option<Self> {
        None
    }

    /// Inverse of [`from_sequence`](Self::from_sequence): the sequence number
    /// this key occupies, if any.
    fn to_sequence(&self) -> Option<u64> {
        None
    }

    /// Returns true when the value equals the type's default.
    fn is_unassigned(&self) -> bool {
        *self == Self::default()
    }
}

impl RepositoryKey for Uuid {
    const GENERATION: KeyGeneration = KeyGeneration::Client;

    fn generate() -> Result<Self, UnsupportedKeyTypeError> {
        Ok(Uuid::new_v4())
    }
}

impl RepositoryKey for String {
    const GENERATION: KeyGeneration = KeyGeneration::Client;

    fn generate() -> Result<Self, UnsupportedKeyTypeError> {
        Ok(Uuid::new_v4().to_string())
    }
}

macro_rules! sequential_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl RepositoryKey for $ty {
                fn from_sequence(sequence: u64) -> Option<Self> {
                    <$ty>::try_from(sequence).ok()
                }

                fn to_sequence(&self) -> Option<u64> {
                    u64::try_from(*self).ok()
                }
            }
        )*
    };
}

sequential_key!(i16, i32, i64, i128, u16, u32, u64, u128, usize, isize);

/// Writes a generated key onto `entity` when its key type is client-generated
/// and the current value is unassigned.
///
/// Returns true if a key was generated. Store-assigned key types are left
/// untouched and never reach [`RepositoryKey::generate`].
pub fn ensure_key<T, K: RepositoryKey>(
    descriptor: &KeyDescriptor<T, K>,
    entity: &mut T,
) -> Result<bool, UnsupportedKeyTypeError> {
    if K::GENERATION != KeyGeneration::Client || !descriptor.get_ref(entity).is_unassigned() {
        return Ok(false);
    }
    descriptor.set(entity, K::generate()?);
    Ok(true)
}
