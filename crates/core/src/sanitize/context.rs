use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Weak;

/// What to do with a deferred navigation that has not been loaded yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeferredPolicy {
    /// Replace it with [`Related::Unloaded`](super::Related::Unloaded).
    #[default]
    Detach,
    /// Load it once through its loader, then copy the result.
    Materialize,
}

type NodeId = (usize, TypeId);

fn node_id<T: 'static>(source: *const T) -> NodeId {
    (source as *const () as usize, TypeId::of::<T>())
}

/// State for one sanitize run.
///
/// Remembers every `Arc` already copied, keyed by the source allocation, so
/// that shared nodes stay shared in the copy and `Weak` back-references can
/// be pointed at the copied ancestor.
///
/// Also tracks the nodes whose copy is still under construction. Reaching one
/// of them again means a strong cycle; the navigation that closed it is left
/// unloaded in the copy, whatever containers sit in between.
pub struct SanitizeContext {
    policy: DeferredPolicy,
    copies: HashMap<NodeId, Box<dyn Any>>,
    building: HashSet<NodeId>,
    cycle_closed: bool,
    shallow: bool,
}

impl SanitizeContext {
    pub fn new(policy: DeferredPolicy) -> Self {
        Self {
            policy,
            copies: HashMap::new(),
            building: HashSet::new(),
            cycle_closed: false,
            shallow: false,
        }
    }

    pub fn policy(&self) -> DeferredPolicy {
        self.policy
    }

    /// Number of distinct shared allocations copied so far.
    pub fn shared_nodes(&self) -> usize {
        self.copies.len()
    }

    pub(crate) fn copy_of<T: 'static>(&self, source: *const T) -> Option<&Weak<T>> {
        self.copies
            .get(&node_id(source))
            .and_then(|copy| copy.downcast_ref::<Weak<T>>())
    }

    pub(crate) fn remember<T: 'static>(&mut self, source: *const T, copy: Weak<T>) {
        self.copies.insert(node_id(source), Box::new(copy));
    }

    pub(crate) fn is_building<T: 'static>(&self, source: *const T) -> bool {
        self.building.contains(&node_id(source))
    }

    /// Runs `copy` with `source` marked as under construction.
    pub(crate) fn building<T: 'static, R>(
        &mut self,
        source: *const T,
        copy: impl FnOnce(&mut Self) -> R,
    ) -> R {
        self.building.insert(node_id(source));
        let result = copy(self);
        self.building.remove(&node_id(source));
        result
    }

    /// True while copying a node reached through a closed cycle. Such a copy
    /// is thrown away, so navigations inside it are not followed.
    pub(crate) fn is_shallow(&self) -> bool {
        self.shallow
    }

    /// Records a closed cycle and runs `copy` in shallow mode.
    pub(crate) fn close_cycle<R>(&mut self, copy: impl FnOnce(&mut Self) -> R) -> R {
        self.cycle_closed = true;
        let outer = std::mem::replace(&mut self.shallow, true);
        let result = copy(self);
        self.shallow = outer;
        result
    }

    /// Runs `copy` as a trial; returns `None` if it closed a cycle.
    pub(crate) fn unless_cycle<R>(&mut self, copy: impl FnOnce(&mut Self) -> R) -> Option<R> {
        let outer = std::mem::replace(&mut self.cycle_closed, false);
        let result = copy(self);
        let closed = std::mem::replace(&mut self.cycle_closed, outer);
        (!closed).then_some(result)
    }
}

impl Default for SanitizeContext {
    fn default() -> Self {
        Self::new(DeferredPolicy::default())
    }
}
