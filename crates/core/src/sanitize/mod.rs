//! Cache-safe materialization.
//!
//! Entities handed out by a store can carry live store state: deferred
//! navigations holding a loader, shared nodes, `Weak` back-references to a
//! parent. Before such a value goes into a cache it is rebuilt with
//! [`sanitize`], which produces a detached deep copy:
//!
//! - every [`Related::Deferred`] becomes [`Related::Loaded`] (if its value was
//!   already fetched) or is resolved per [`DeferredPolicy`];
//! - every `Arc` is reallocated, with sharing inside the graph preserved;
//! - `Weak` back-references point into the copy, or are emptied when their
//!   target is not part of it;
//! - a loaded navigation that leads back to a node still being copied is
//!   left unloaded, so sanitizing always terminates.
//!
//! There is no same-type shortcut: the result never aliases the source.

mod context;
mod impls;
mod related;

pub use context::{DeferredPolicy, SanitizeContext};
pub use related::{Deferred, Loader, Related};

/// Field-by-field detached copy.
///
/// Implement it for entity types by sanitizing each field:
///
/// ```
/// use repokit_core::sanitize::{sanitize, Related, Sanitize, SanitizeContext};
///
/// #[derive(Debug, PartialEq)]
/// struct Order {
///     number: u32,
///     lines: Related<Vec<String>>,
/// }
///
/// impl Sanitize for Order {
///     fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
///         Self {
///             number: self.number.sanitize(cx),
///             lines: self.lines.sanitize(cx),
///         }
///     }
/// }
///
/// let order = Order {
///     number: 1,
///     lines: Related::Loaded(vec!["widget".to_string()]),
/// };
/// assert_eq!(sanitize(&order), order);
/// ```
pub trait Sanitize: Sized {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self;
}

/// Sanitizes `source` with the default [`DeferredPolicy`].
pub fn sanitize<T: Sanitize>(source: &T) -> T {
    sanitize_with(source, DeferredPolicy::default())
}

pub fn sanitize_with<T: Sanitize>(source: &T, policy: DeferredPolicy) -> T {
    let mut cx = SanitizeContext::new(policy);
    source.sanitize(&mut cx)
}
