use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::sync::Arc;

/// A record type a repository can manage.
///
/// Rust has no runtime reflection, so each entity lists its members once in
/// [`Entity::describe`]. Key discovery, include-path validation and cache
/// namespacing all work from that declaration.
///
/// ```
/// use repokit_core::entity::{Entity, EntityShape};
/// use uuid::Uuid;
///
/// struct Customer {
///     id: Uuid,
///     name: String,
/// }
///
/// impl Entity for Customer {
///     fn describe(shape: &mut EntityShape<Self>) {
///         shape
///             .field("id", |c| &c.id, |c| &mut c.id)
///             .field("name", |c| &c.name, |c| &mut c.name);
///     }
/// }
///
/// let shape = EntityShape::<Customer>::of();
/// assert_eq!(shape.entity_name(), "Customer");
/// assert_eq!(shape.members().len(), 2);
/// ```
pub trait Entity: Sized + Send + Sync + 'static {
    /// Declares the members of this entity on `shape`.
    fn describe(shape: &mut EntityShape<Self>);

    /// Short type name, used for key naming conventions and cache keys.
    fn entity_name() -> &'static str {
        short_type_name(type_name::<Self>())
    }
}

/// Strips the module path and generic arguments from a type name.
pub fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Typed accessor pair for one member.
pub(crate) struct Accessor<T, F> {
    pub(crate) get: fn(&T) -> &F,
    pub(crate) get_mut: fn(&mut T) -> &mut F,
}

impl<T, F> Clone for Accessor<T, F> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, F> Copy for Accessor<T, F> {}

trait ErasedAccessor<T>: Send + Sync {
    fn declared_type(&self) -> TypeId;
    fn declared_type_name(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

impl<T: 'static, F: Any> ErasedAccessor<T> for Accessor<T, F> {
    fn declared_type(&self) -> TypeId {
        TypeId::of::<F>()
    }

    fn declared_type_name(&self) -> &'static str {
        type_name::<F>()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// One declared member of an entity.
pub struct Member<T> {
    name: &'static str,
    key: bool,
    accessor: Arc<dyn ErasedAccessor<T>>,
}

impl<T> Clone for Member<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            key: self.key,
            accessor: Arc::clone(&self.accessor),
        }
    }
}

impl<T: 'static> Member<T> {
    fn new<F: Any>(
        name: &'static str,
        key: bool,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> Self {
        Self {
            name,
            key,
            accessor: Arc::new(Accessor { get, get_mut }),
        }
    }

    /// The member name as declared.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the member carries the explicit key annotation.
    pub fn is_key(&self) -> bool {
        self.key
    }

    /// The declared type of the member.
    pub fn declared_type(&self) -> TypeId {
        self.accessor.declared_type()
    }

    /// The declared type name of the member (for diagnostics).
    pub fn declared_type_name(&self) -> &'static str {
        self.accessor.declared_type_name()
    }

    /// Returns true if the member is declared with type `F`.
    pub fn is_of<F: Any>(&self) -> bool {
        self.declared_type() == TypeId::of::<F>()
    }

    pub(crate) fn accessor<F: Any>(&self) -> Option<Accessor<T, F>> {
        self.accessor
            .as_any()
            .downcast_ref::<Accessor<T, F>>()
            .copied()
    }
}

impl<T: 'static> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("type", &self.declared_type_name())
            .finish()
    }
}

/// The declared members of an entity type.
pub struct EntityShape<T> {
    entity_name: &'static str,
    members: Vec<Member<T>>,
}

impl<T: Entity> EntityShape<T> {
    /// Builds the shape of `T` from its [`Entity::describe`] declaration.
    pub fn of() -> Self {
        let mut shape = Self::named(T::entity_name());
        T::describe(&mut shape);
        shape
    }
}

impl<T: 'static> EntityShape<T> {
    /// Creates an empty shape with an explicit entity name.
    pub fn named(entity_name: &'static str) -> Self {
        Self {
            entity_name,
            members: Vec::new(),
        }
    }

    /// Declares a plain member.
    pub fn field<F: Any>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.members.push(Member::new(name, false, get, get_mut));
        self
    }

    /// Declares a member annotated as the primary key.
    pub fn key<F: Any>(
        &mut self,
        name: &'static str,
        get: fn(&T) -> &F,
        get_mut: fn(&mut T) -> &mut F,
    ) -> &mut Self {
        self.members.push(Member::new(name, true, get, get_mut));
        self
    }

    pub fn entity_name(&self) -> &'static str {
        self.entity_name
    }

    pub fn members(&self) -> &[Member<T>] {
        &self.members
    }

    /// Finds a member by name, ignoring case and underscores.
    pub fn member(&self, name: &str) -> Option<&Member<T>> {
        let wanted = normalize_name(name);
        self.members
            .iter()
            .find(|member| normalize_name(member.name()) == wanted)
    }
}

impl<T: 'static> fmt::Debug for EntityShape<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityShape")
            .field("entity_name", &self.entity_name)
            .field("members", &self.members)
            .finish()
    }
}

/// Lowercases a member or type name and drops underscores, so that `Id`,
/// `id`, `CustomerId` and `customer_id` compare as expected.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
