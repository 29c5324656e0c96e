//! Type-erased trampoline storage.

use std::fmt;
use std::sync::Arc;

use crate::error::VmError;
use crate::vm::Vm;

/// A generated trampoline with the VM's fixed calling signature.
///
/// Wraps any `Fn(&mut Vm) -> Result<usize, VmError>`, allowing trampolines
/// built from callables of different shapes and signatures to be stored
/// uniformly in method tables. The returned `usize` is the number of result
/// values the call pushed (0 or 1 for generated trampolines; raw entry
/// points may push more).
///
/// Cloning shares the underlying callable.
#[derive(Clone)]
pub struct NativeFn {
    inner: Arc<dyn Fn(&mut Vm) -> Result<usize, VmError> + Send + Sync>,
}

impl NativeFn {
    /// Wrap a raw VM entry point.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&mut Vm) -> Result<usize, VmError> + Send + Sync + 'static,
    {
        Self { inner: Arc::new(f) }
    }

    /// Invoke the trampoline.
    pub fn call(&self, vm: &mut Vm) -> Result<usize, VmError> {
        (self.inner)(vm)
    }
}

impl fmt::Debug for NativeFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFn").finish_non_exhaustive()
    }
}
