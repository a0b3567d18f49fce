use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Arc, Weak};

use uuid::Uuid;

use super::{Sanitize, SanitizeContext};

macro_rules! sanitize_by_clone {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Sanitize for $ty {
                fn sanitize(&self, _cx: &mut SanitizeContext) -> Self {
                    self.clone()
                }
            }
        )*
    };
}

sanitize_by_clone!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
    String, Uuid,
);

impl<T: Sanitize> Sanitize for Option<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.as_ref().map(|value| value.sanitize(cx))
    }
}

impl<T: Sanitize> Sanitize for Box<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        Box::new(T::sanitize(self, cx))
    }
}

impl<T: Sanitize> Sanitize for Vec<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.iter().map(|value| value.sanitize(cx)).collect()
    }
}

impl<K, V> Sanitize for HashMap<K, V>
where
    K: Sanitize + Eq + Hash,
    V: Sanitize,
{
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.iter()
            .map(|(key, value)| (key.sanitize(cx), value.sanitize(cx)))
            .collect()
    }
}

impl<K, V> Sanitize for BTreeMap<K, V>
where
    K: Sanitize + Ord,
    V: Sanitize,
{
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.iter()
            .map(|(key, value)| (key.sanitize(cx), value.sanitize(cx)))
            .collect()
    }
}

impl<T: Sanitize + Eq + Hash> Sanitize for HashSet<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.iter().map(|value| value.sanitize(cx)).collect()
    }
}

impl<T: Sanitize + Ord> Sanitize for BTreeSet<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        self.iter().map(|value| value.sanitize(cx)).collect()
    }
}

impl<A: Sanitize, B: Sanitize> Sanitize for (A, B) {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        (self.0.sanitize(cx), self.1.sanitize(cx))
    }
}

/// Shared nodes are copied once per run. The copy is allocated with
/// [`Arc::new_cyclic`] and registered before its contents are copied, so a
/// `Weak` reaching back to this node from inside resolves to the copy.
///
/// Reaching a node whose copy is still being built closes a strong cycle. A
/// throwaway shallow copy is returned and the enclosing navigation drops it.
impl<T: Sanitize + 'static> Sanitize for Arc<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        let source = Arc::as_ptr(self);
        if cx.is_shallow() {
            return Arc::new(T::sanitize(self, cx));
        }
        if cx.is_building::<T>(source) {
            return cx.close_cycle(|cx| Arc::new(T::sanitize(self, cx)));
        }
        if let Some(copy) = cx.copy_of::<T>(source).and_then(Weak::upgrade) {
            return copy;
        }
        cx.building(source, |cx| {
            Arc::new_cyclic(|copy| {
                cx.remember(source, copy.clone());
                T::sanitize(self, cx)
            })
        })
    }
}

/// A `Weak` resolves to the copy of its target when the target was copied
/// earlier in the same run, and to an empty `Weak` otherwise.
impl<T: Sanitize + 'static> Sanitize for Weak<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        cx.copy_of::<T>(self.as_ptr()).cloned().unwrap_or_default()
    }
}
