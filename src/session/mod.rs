//! Managed solver sessions.
//!
//! A [`Session`] ties together three things with one lifetime:
//!
//! - the native solver memory (an opaque handle, freed exactly once),
//! - an indirect root registered in a thread-local table, whose id is the
//!   native memory's user data,
//! - the callback closures and the fault slot, shared with the trampolines
//!   through a reference-counted core.
//!
//! Native code only ever sees the root id. Trampolines resolve it back to the
//! core, run the closure, catch whatever it raises and park it in the fault
//! slot; the session re-raises it when the native call returns. After
//! [`Session::destroy`] (or drop) the handle is freed and the root released,
//! so the id resolves to nothing.

use std::any::Any;
use std::cell::RefCell;
use std::ffi::{c_int, c_long, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::error::{CallbackResult, Error};
use crate::native::{CounterFn, RealFn};
use crate::Float;

mod registry;
mod trampoline;
mod transport;

pub use registry::{is_live, live_roots, RootId};

pub(crate) use trampoline::{dispatch, err_handler, lossy, Recovery};

use registry::RootGuard;
use transport::FaultSlot;

mod private {
    pub trait Sealed {}
}

/// A solver family (ODE, DAE or nonlinear system).
///
/// Implemented by the marker types [`Cvode`](crate::cvode::Cvode),
/// [`Ida`](crate::ida::Ida) and [`Kinsol`](crate::kinsol::Kinsol).
pub trait Family: private::Sealed + Sized + 'static {
    /// Name used in log messages.
    const NAME: &'static str;

    /// Status reported when native memory cannot be allocated.
    #[doc(hidden)]
    const MEM_FAIL: c_int;

    /// Closures a session of this family can hold.
    type Callbacks: Default + 'static;

    /// Library objects owned next to the solver memory and freed after it.
    #[doc(hidden)]
    type Workspace: 'static;

    #[doc(hidden)]
    unsafe fn free(mem: *mut *mut c_void);

    #[doc(hidden)]
    unsafe fn set_user_data(mem: *mut c_void, user_data: *mut c_void) -> c_int;

    /// Route native error reports to [`err_handler`] with `eh_data`.
    #[doc(hidden)]
    unsafe fn set_err_handler_fn(mem: *mut c_void, eh_data: *mut c_void) -> c_int;

    /// Translate a failing status of `call`.
    #[doc(hidden)]
    fn error(call: &'static str, flag: c_int) -> Error;

    #[doc(hidden)]
    fn err_handler_slot(callbacks: &mut Self::Callbacks) -> &mut Option<ErrHandler>;
}

pub(crate) use private::Sealed;

/// An error reported by the native solver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorDetails {
    pub error_code: c_int,
    pub module: String,
    pub function: String,
    pub message: String,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} ERROR] {} (flag {}): {}",
            self.module, self.function, self.error_code, self.message
        )
    }
}

/// Replacement for the native error output.
pub type ErrHandler = Box<dyn FnMut(&ErrorDetails) -> CallbackResult>;

/// State shared between a session and its trampolines.
pub(crate) struct Core<F: Family> {
    pub callbacks: RefCell<F::Callbacks>,
    pub fault: FaultSlot,
}

/// Owns native solver memory and its workspace.
///
/// The memory is freed in `drop`; the workspace fields drop afterwards.
struct NativeHandle<F: Family> {
    mem: NonNull<c_void>,
    workspace: F::Workspace,
    _family: PhantomData<F>,
}

impl<F: Family> NativeHandle<F> {
    fn as_ptr(&self) -> *mut c_void {
        self.mem.as_ptr()
    }
}

impl<F: Family> Drop for NativeHandle<F> {
    fn drop(&mut self) {
        let mut mem = self.mem.as_ptr();
        // SAFETY: the handle came from the family's create call and this is
        // the only owner.
        unsafe { F::free(&mut mem) };
    }
}

/// A live solver session of family `F`.
///
/// Sessions are `!Send`: callbacks run on the thread that drives the solver.
pub struct Session<F: Family> {
    handle: Option<NativeHandle<F>>,
    root: Option<RootGuard>,
    core: Rc<Core<F>>,
    extension: Option<Box<dyn Any>>,
    pub(crate) len: usize,
    pub(crate) nroots: usize,
}

impl<F: Family> Session<F> {
    /// Build a session around freshly created native memory.
    ///
    /// `create` allocates the memory and its workspace; `init` configures it
    /// through the new session. If any step fails, whatever was acquired so
    /// far is released before the error is returned.
    pub(crate) fn create(
        callbacks: F::Callbacks,
        len: usize,
        create: impl FnOnce() -> Result<(*mut c_void, F::Workspace), Error>,
        init: impl FnOnce(&mut Self) -> Result<(), Error>,
    ) -> Result<Self, Error> {
        let core = Rc::new(Core {
            callbacks: RefCell::new(callbacks),
            fault: FaultSlot::default(),
        });
        let weak = Rc::downgrade(&core);
        let root = RootGuard::register(weak);

        let (mem, workspace) = create()?;
        let Some(mem) = NonNull::new(mem) else {
            return Err(F::error("create", F::MEM_FAIL));
        };
        let handle = NativeHandle::<F> {
            mem,
            workspace,
            _family: PhantomData,
        };

        let user_data = root.id().to_user_data();
        // SAFETY: the handle is live; the id stays valid as long as `root`.
        let flag = unsafe { F::set_user_data(handle.as_ptr(), user_data) };
        if flag < 0 {
            return Err(F::error("set_user_data", flag));
        }
        // SAFETY: as above.
        let flag = unsafe { F::set_err_handler_fn(handle.as_ptr(), user_data) };
        if flag < 0 {
            return Err(F::error("set_err_handler_fn", flag));
        }

        let mut session = Session {
            handle: Some(handle),
            root: Some(root),
            core,
            extension: None,
            len,
            nroots: 0,
        };
        init(&mut session)?;
        log::debug!("created {} session {}", F::NAME, session.root_id_or_dead());
        Ok(session)
    }

    fn root_id_or_dead(&self) -> String {
        self.root_id().map_or_else(|| "(destroyed)".to_string(), |id| id.to_string())
    }

    /// Native memory, or [`Error::Destroyed`].
    pub(crate) fn mem(&self) -> Result<*mut c_void, Error> {
        self.handle.as_ref().map(NativeHandle::as_ptr).ok_or(Error::Destroyed)
    }

    pub(crate) fn workspace(&mut self) -> Result<&mut F::Workspace, Error> {
        self.handle.as_mut().map(|h| &mut h.workspace).ok_or(Error::Destroyed)
    }

    fn call_mapped(
        &mut self,
        name: &'static str,
        translate: fn(&'static str, c_int) -> Error,
        f: impl FnOnce(*mut c_void, &mut F::Workspace) -> c_int,
    ) -> Result<c_int, Error> {
        let handle = self.handle.as_mut().ok_or(Error::Destroyed)?;
        debug_assert!(self.core.fault.is_empty());
        let mem = handle.as_ptr();
        let flag = f(mem, &mut handle.workspace);
        if let Some(fault) = self.core.fault.take() {
            log::trace!("{} {name}: callback fault (status {flag})", F::NAME);
            return Err(fault.raise());
        }
        if flag < 0 {
            return Err(translate(name, flag));
        }
        Ok(flag)
    }

    /// Run one native call and surface what happened during it.
    ///
    /// A fault raised by a callback takes precedence over the status code: a
    /// stored error is returned as [`Error::Callback`], a stored panic resumes
    /// unwinding. Otherwise negative statuses are translated by the family and
    /// non-negative ones returned.
    pub(crate) fn call(&mut self, name: &'static str, f: impl FnOnce(*mut c_void) -> c_int) -> Result<c_int, Error> {
        self.call_mapped(name, F::error, |mem, _| f(mem))
    }

    /// [`call`](Self::call) with access to the workspace.
    pub(crate) fn call_with(
        &mut self,
        name: &'static str,
        f: impl FnOnce(*mut c_void, &mut F::Workspace) -> c_int,
    ) -> Result<c_int, Error> {
        self.call_mapped(name, F::error, f)
    }

    /// A call into the linear solver interface, whose statuses are numbered
    /// apart from the family's and are reported as [`Error::Native`].
    pub(crate) fn call_linear(
        &mut self,
        name: &'static str,
        f: impl FnOnce(*mut c_void, &mut F::Workspace) -> c_int,
    ) -> Result<c_int, Error> {
        self.call_mapped(name, |call, flag| Error::Native { call, flag }, f)
    }

    /// Read one counter with a getter such as `CVodeGetNumSteps`.
    pub(crate) fn counter(&mut self, name: &'static str, get: CounterFn) -> Result<c_long, Error> {
        let mut value = 0;
        // SAFETY: `mem` is live memory of this family.
        self.call(name, |mem| unsafe { get(mem, &mut value) })?;
        Ok(value)
    }

    /// Read one real quantity with a getter such as `CVodeGetCurrentTime`.
    pub(crate) fn real(&mut self, name: &'static str, get: RealFn) -> Result<Float, Error> {
        let mut value = 0.0;
        // SAFETY: as in `counter`.
        self.call(name, |mem| unsafe { get(mem, &mut value) })?;
        Ok(value)
    }

    /// Register a callback with the solver, then store its closure.
    ///
    /// The closure slot is only written once `native` succeeded, so a
    /// rejected call leaves the previous callback in place.
    pub(crate) fn install(
        &mut self,
        name: &'static str,
        native: impl FnOnce(*mut c_void) -> c_int,
        commit: impl FnOnce(&mut F::Callbacks),
    ) -> Result<(), Error> {
        self.call(name, native)?;
        self.with_callbacks(commit)
    }

    /// Mutable access to the callback closures between solver calls.
    pub(crate) fn with_callbacks<R>(&mut self, f: impl FnOnce(&mut F::Callbacks) -> R) -> Result<R, Error> {
        self.mem()?;
        let mut callbacks = self.core.callbacks.borrow_mut();
        Ok(f(&mut *callbacks))
    }

    /// Workspace and closures together, between solver calls.
    pub(crate) fn with_parts<R>(
        &mut self,
        f: impl FnOnce(&mut F::Workspace, &mut F::Callbacks) -> R,
    ) -> Result<R, Error> {
        let handle = self.handle.as_mut().ok_or(Error::Destroyed)?;
        let mut callbacks = self.core.callbacks.borrow_mut();
        Ok(f(&mut handle.workspace, &mut *callbacks))
    }

    /// Check a vector argument against the problem size.
    pub(crate) fn check_len(&self, what: &'static str, got: usize) -> Result<(), Error> {
        if got != self.len {
            return Err(Error::LengthMismatch {
                what,
                expected: self.len,
                got,
            });
        }
        Ok(())
    }

    /// Route native error messages to `handler` instead of the log.
    pub fn set_err_handler(
        &mut self,
        handler: impl FnMut(&ErrorDetails) -> CallbackResult + 'static,
    ) -> Result<(), Error> {
        self.with_callbacks(|cb| *F::err_handler_slot(cb) = Some(Box::new(handler)))
    }

    /// Restore the default error output (a `log::warn!` record).
    pub fn clear_err_handler(&mut self) -> Result<(), Error> {
        self.with_callbacks(|cb| *F::err_handler_slot(cb) = None)
    }

    /// Release the native memory and the root. Later calls do nothing.
    pub fn destroy(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        log::debug!("destroying {} session {}", F::NAME, self.root_id_or_dead());
        drop(handle);
        self.root.take();
        self.extension.take();
    }

    pub fn is_destroyed(&self) -> bool {
        self.handle.is_none()
    }

    /// The session's root id; `None` once destroyed.
    pub fn root_id(&self) -> Option<RootId> {
        self.root.as_ref().map(RootGuard::id)
    }

    /// The opaque native handle; `None` once destroyed.
    pub fn raw_handle(&self) -> Option<NonNull<c_void>> {
        self.handle.as_ref().map(|h| h.mem)
    }

    /// Problem size fixed at creation.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Attach per-session data owned by an extension (e.g. a sensitivity
    /// context), replacing any previous value.
    pub fn set_extension<T: Any>(&mut self, value: T) {
        self.extension = Some(Box::new(value));
    }

    pub fn extension<T: Any>(&self) -> Option<&T> {
        self.extension.as_ref()?.downcast_ref()
    }

    pub fn extension_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.extension.as_mut()?.downcast_mut()
    }

    pub fn take_extension<T: Any>(&mut self) -> Option<T> {
        match self.extension.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.extension = Some(other);
                None
            }
        }
    }
}

impl<F: Family> Drop for Session<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl<F: Family> fmt::Debug for Session<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("family", &F::NAME)
            .field("root", &self.root_id())
            .field("len", &self.len)
            .field("nroots", &self.nroots)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
