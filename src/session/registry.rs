//! Thread-local table of indirect roots.
//!
//! Native memory carries a [`RootId`] as its user data instead of a pointer to
//! the session. The id resolves through this table to a weak reference to the
//! session core, so a callback arriving after teardown finds nothing rather
//! than a dangling pointer. Ids are never reused within a thread.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::num::NonZeroU64;
use std::rc::{Rc, Weak};

/// Identity of a session's root cell. Stable for the life of the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(NonZeroU64);

impl RootId {
    /// Encode as the opaque user-data pointer handed to native code.
    pub(crate) fn to_user_data(self) -> *mut c_void {
        self.0.get() as usize as *mut c_void
    }

    /// Decode a user-data pointer; null is never a valid id.
    pub(crate) fn from_user_data(user_data: *mut c_void) -> Option<Self> {
        NonZeroU64::new(user_data as usize as u64).map(RootId)
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "root#{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    last: u64,
    roots: HashMap<RootId, Weak<dyn Any>>,
}

thread_local! {
    static REGISTRY: RefCell<Registry> = RefCell::new(Registry::default());
}

fn register(target: Weak<dyn Any>) -> RootId {
    REGISTRY.with(|r| {
        let mut r = r.borrow_mut();
        r.last += 1;
        // `last` starts at zero and only grows, so the id is non-zero.
        let id = RootId(NonZeroU64::MIN.saturating_add(r.last - 1));
        r.roots.insert(id, target);
        id
    })
}

fn release(id: RootId) -> bool {
    REGISTRY.with(|r| r.borrow_mut().roots.remove(&id).is_some())
}

/// Upgrade the root to the object it designates, if it is still alive.
pub(crate) fn resolve(id: RootId) -> Option<Rc<dyn Any>> {
    REGISTRY.with(|r| r.borrow().roots.get(&id).and_then(Weak::upgrade))
}

/// Whether `id` still designates a live session on this thread.
pub fn is_live(id: RootId) -> bool {
    resolve(id).is_some()
}

/// Number of roots currently registered on this thread.
pub fn live_roots() -> usize {
    REGISTRY.with(|r| r.borrow().roots.len())
}

/// Registration of one root; released when dropped.
pub(crate) struct RootGuard {
    id: RootId,
}

impl RootGuard {
    pub fn register(target: Weak<dyn Any>) -> Self {
        Self { id: register(target) }
    }

    pub fn id(&self) -> RootId {
        self.id
    }
}

impl Drop for RootGuard {
    fn drop(&mut self) {
        if release(self.id) {
            log::trace!("released {}", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::rc::Rc;

    use super::*;

    #[test]
    fn released_roots_no_longer_resolve() {
        let target: Rc<dyn Any> = Rc::new(7_u32);
        let guard = RootGuard::register(Rc::downgrade(&target));
        let id = guard.id();
        let resolved = resolve(id).unwrap();
        assert_eq!(resolved.downcast_ref::<u32>(), Some(&7));
        drop(resolved);
        let before = live_roots();
        drop(guard);
        assert!(!is_live(id));
        assert_eq!(live_roots(), before - 1);
    }

    #[test]
    fn dropped_target_does_not_resolve() {
        let target: Rc<dyn Any> = Rc::new("session");
        let guard = RootGuard::register(Rc::downgrade(&target));
        drop(target);
        assert!(!is_live(guard.id()));
    }

    #[test]
    fn ids_are_distinct_and_not_reused() {
        let target: Rc<dyn Any> = Rc::new(());
        let a = RootGuard::register(Rc::downgrade(&target));
        let a_id = a.id();
        drop(a);
        let b = RootGuard::register(Rc::downgrade(&target));
        assert_ne!(a_id, b.id());
        assert_eq!(RootId::from_user_data(b.id().to_user_data()), Some(b.id()));
        assert_eq!(RootId::from_user_data(std::ptr::null_mut()), None);
    }
}
