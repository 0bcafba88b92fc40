//! Entry from native code into session callbacks.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{CallbackError, CallbackResult, RecoverableFailure};

use super::registry::{self, RootId};
use super::transport::Fault;
use super::{Core, ErrorDetails, Family};

/// Whether the native caller can act on a recoverable failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Recovery {
    /// Return `1` and let the solver retry.
    Allowed,
    /// Record [`RecoverableFailure`] and return `-1`.
    Forbidden,
}

/// Abort on a broken invariant of the bridge itself.
///
/// Unwinding here would cross the `extern "C"` boundary.
#[cold]
fn protocol_violation(family: &str, what: &str, detail: &str) -> ! {
    log::error!("{family} {what} callback: {detail}; aborting");
    std::process::abort()
}

fn resolve_core<F: Family>(user_data: *mut c_void, what: &str) -> Rc<Core<F>> {
    let Some(id) = RootId::from_user_data(user_data) else {
        protocol_violation(F::NAME, what, "null user data")
    };
    let Some(target) = registry::resolve(id) else {
        protocol_violation(F::NAME, what, &format!("{id} is no longer live"))
    };
    match target.downcast::<Core<F>>() {
        Ok(core) => core,
        Err(_) => protocol_violation(F::NAME, what, &format!("{id} belongs to another solver family")),
    }
}

/// Run `body` against the session registered under `user_data` and
/// translate its outcome into the native return convention.
pub(crate) fn dispatch<F: Family>(
    user_data: *mut c_void,
    what: &'static str,
    recovery: Recovery,
    body: impl FnOnce(&mut F::Callbacks) -> CallbackResult,
) -> c_int {
    let core = resolve_core::<F>(user_data, what);
    let Ok(mut callbacks) = core.callbacks.try_borrow_mut() else {
        protocol_violation(F::NAME, what, "re-entered while another callback is running")
    };
    log::trace!("{} {what} callback", F::NAME);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *callbacks)));
    drop(callbacks);

    let fault = match outcome {
        Ok(Ok(())) => return 0,
        Ok(Err(CallbackError::Recoverable)) if recovery == Recovery::Allowed => return 1,
        Ok(Err(CallbackError::Recoverable)) => Fault::Error(Box::new(RecoverableFailure)),
        Ok(Err(CallbackError::Failed(e))) => Fault::Error(e),
        Err(payload) => Fault::Panic(payload),
    };
    if !core.fault.store(fault) {
        log::trace!("{} {what} callback: dropping fault, one is already pending", F::NAME);
    }
    -1
}

pub(crate) unsafe fn lossy(s: *const c_char) -> String {
    if s.is_null() {
        String::new()
    } else {
        CStr::from_ptr(s).to_string_lossy().into_owned()
    }
}

/// Native error handler forwarding to the session's error handler closure.
pub(crate) unsafe extern "C" fn err_handler<F: Family>(
    error_code: c_int,
    module: *const c_char,
    function: *const c_char,
    msg: *mut c_char,
    user_data: *mut c_void,
) {
    let details = ErrorDetails {
        error_code,
        module: lossy(module),
        function: lossy(function),
        message: lossy(msg),
    };
    dispatch::<F>(user_data, "error handler", Recovery::Forbidden, |cb| {
        match F::err_handler_slot(cb).as_mut() {
            Some(handler) => handler(&details),
            None => {
                log::warn!("{details}");
                Ok(())
            }
        }
    });
}
