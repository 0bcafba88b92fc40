//! Carries a callback fault from the trampoline to the session call that
//! triggered it.

use std::any::Any;
use std::cell::RefCell;
use std::error::Error as StdError;
use std::panic;

use crate::error::Error;

/// A failure raised inside a callback.
pub(crate) enum Fault {
    /// The error the callback returned, untouched.
    Error(Box<dyn StdError + Send + Sync>),
    /// The payload of a panic caught at the trampoline.
    Panic(Box<dyn Any + Send>),
}

impl Fault {
    /// Re-raise at the managed call site: errors become
    /// [`Error::Callback`], panics resume unwinding with their payload.
    pub fn raise(self) -> Error {
        match self {
            Fault::Error(e) => Error::Callback(e),
            Fault::Panic(payload) => panic::resume_unwind(payload),
        }
    }
}

/// One slot per session. The first fault stored during a native call wins;
/// later ones are dropped.
#[derive(Default)]
pub(crate) struct FaultSlot(RefCell<Option<Fault>>);

impl FaultSlot {
    /// Store `fault` unless the slot is already populated. Returns whether it
    /// was stored.
    pub fn store(&self, fault: Fault) -> bool {
        let mut slot = self.0.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(fault);
        true
    }

    pub fn take(&self) -> Option<Fault> {
        self.0.borrow_mut().take()
    }

    pub fn is_empty(&self) -> bool {
        self.0.borrow().is_none()
    }
}
