//! The VM-side boundary.
//!
//! [`Vm`] bundles the value stack, the object heap, and a frozen
//! [`TypeRegistry`], and exposes the primitives every generated trampoline
//! is written against: `check_value` / `check_array` / `check_map` /
//! `check_user_data` for argument extraction, `push` / `push_nil` for result
//! conversion, and `raise_error` for VM-level error signaling.
//!
//! It also carries the call drivers an embedder (or a test) uses to invoke
//! bound code: `call_global`, `call_method`, `call_static`, `construct`,
//! and `collect`. A call executes synchronously on the calling thread;
//! extraction, invocation, and result conversion happen as one
//! uninterrupted sequence.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::convert::{FromVm, ToVm};
use crate::error::{ConversionError, VmError};
use crate::object::{Instance, ObjectHandle, ObjectHeap, ScriptObject, ScriptType};
use crate::registry::TypeRegistry;
use crate::stack::{RECEIVER_SLOT, Stack};
use crate::value::Value;

/// A VM instance: stack, heap, and the shared frozen registry.
pub struct Vm {
    stack: Stack,
    heap: ObjectHeap,
    registry: Arc<TypeRegistry>,
}

impl Vm {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            stack: Stack::new(),
            heap: ObjectHeap::new(),
            registry,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    // =========================================================================
    // Stack primitives
    // =========================================================================

    /// Push a raw value.
    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Convert a Rust value and push it.
    pub fn push_value<T: ToVm>(&mut self, value: T) -> Result<(), VmError> {
        let converted = value.to_vm(self)?;
        self.stack.push(converted);
        Ok(())
    }

    /// Push the nil sentinel.
    pub fn push_nil(&mut self) {
        self.stack.push(Value::Nil);
    }

    /// Pop the top value.
    pub fn pop(&mut self) -> Option<Value> {
        self.stack.pop()
    }

    /// Position of the top slot; 0 when the stack is empty.
    pub fn top(&self) -> usize {
        self.stack.top()
    }

    /// Drop everything on the stack.
    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    /// Read the value at a 1-based position.
    pub fn slot(&self, pos: usize) -> Result<&Value, VmError> {
        self.stack.get(pos).ok_or(VmError::InvalidSlot(pos))
    }

    // =========================================================================
    // Extraction primitives
    // =========================================================================

    /// Extract a scalar/object value from a stack position.
    pub fn check_value<T: FromVm>(&self, pos: usize) -> Result<T, VmError> {
        let value = self.slot(pos)?;
        T::from_vm(value).map_err(|source| VmError::BadArgument { pos, source })
    }

    /// Extract an array-like value from a stack position.
    pub fn check_array<T: FromVm>(&self, pos: usize) -> Result<Vec<T>, VmError> {
        match self.slot(pos)? {
            Value::Array(items) => items
                .iter()
                .map(T::from_vm)
                .collect::<Result<_, _>>()
                .map_err(|source| VmError::BadArgument { pos, source }),
            other => Err(VmError::BadArgument {
                pos,
                source: ConversionError::TypeMismatch {
                    expected: "array",
                    actual: other.type_name(),
                },
            }),
        }
    }

    /// Extract a map-like value from a stack position.
    pub fn check_map<T: FromVm>(&self, pos: usize) -> Result<FxHashMap<String, T>, VmError> {
        match self.slot(pos)? {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| T::from_vm(v).map(|t| (k.clone(), t)))
                .collect::<Result<_, _>>()
                .map_err(|source| VmError::BadArgument { pos, source }),
            other => Err(VmError::BadArgument {
                pos,
                source: ConversionError::TypeMismatch {
                    expected: "map",
                    actual: other.type_name(),
                },
            }),
        }
    }

    /// Resolve the wrapped instance at a stack position, verifying the
    /// object is (or embeds, through its base chain) a `T`.
    pub fn check_user_data<T: ScriptType>(&self, pos: usize) -> Result<Instance, VmError> {
        match self.slot(pos)? {
            Value::UserData(instance) => {
                let obj = self.heap.get(instance.handle).ok_or(VmError::StaleHandle)?;
                if obj.view::<T>().is_none() {
                    return Err(VmError::BadReceiver {
                        pos,
                        expected: T::NAME,
                        actual: obj.type_name(),
                    });
                }
                Ok(*instance)
            }
            other => Err(VmError::BadReceiver {
                pos,
                expected: T::NAME,
                actual: other.type_name(),
            }),
        }
    }

    /// Signal a VM-level error from native code.
    ///
    /// The returned error aborts the current call when propagated; it is
    /// catchable by the script caller, not a native fault.
    pub fn raise_error(&self, message: impl Into<String>) -> VmError {
        VmError::Script(message.into())
    }

    // =========================================================================
    // Wrapped objects
    // =========================================================================

    /// Move a native object into the heap and wrap it.
    ///
    /// The type name is resolved here, once: `obj.type_name()` reports the
    /// most-derived registered name (falling back to `T::NAME` in the
    /// conventional implementation), so method lookup on the wrapped
    /// instance starts at the concrete type.
    pub fn wrap<T: ScriptType>(&mut self, obj: T, owned: bool) -> Instance {
        let type_name = obj.type_name();
        let handle = self.heap.allocate(obj);
        Instance {
            handle,
            owned,
            type_name,
        }
    }

    /// Wrap an object handed over as a trait object (a base-typed handle).
    ///
    /// `type_name` still resolves the concrete type's registered name.
    pub fn wrap_boxed(&mut self, obj: Box<dyn ScriptObject>, owned: bool) -> Instance {
        let type_name = obj.type_name();
        let handle = self.heap.allocate_boxed(obj);
        Instance {
            handle,
            owned,
            type_name,
        }
    }

    /// Typed view of a heap object, walking its base chain.
    pub fn object_view<T: ScriptType>(&self, handle: ObjectHandle) -> Result<&T, VmError> {
        let obj = self.heap.get(handle).ok_or(VmError::StaleHandle)?;
        let actual = obj.type_name();
        obj.view::<T>().ok_or(VmError::BadReceiver {
            pos: RECEIVER_SLOT,
            expected: T::NAME,
            actual,
        })
    }

    /// Mutable typed view of a heap object.
    pub fn object_view_mut<T: ScriptType>(
        &mut self,
        handle: ObjectHandle,
    ) -> Result<&mut T, VmError> {
        let obj = self.heap.get_mut(handle).ok_or(VmError::StaleHandle)?;
        let actual = obj.type_name();
        obj.view_mut::<T>().ok_or(VmError::BadReceiver {
            pos: RECEIVER_SLOT,
            expected: T::NAME,
            actual,
        })
    }

    /// Destroy a heap object from the native side (for non-owned wrappers
    /// whose real owner is done with them).
    pub fn free_object(&mut self, handle: ObjectHandle) -> bool {
        self.heap.free(handle)
    }

    /// Whether the object behind a handle is still alive.
    pub fn object_alive(&self, handle: ObjectHandle) -> bool {
        self.heap.get(handle).is_some()
    }

    /// Number of live heap objects.
    pub fn live_objects(&self) -> usize {
        self.heap.live()
    }

    // =========================================================================
    // Call drivers
    // =========================================================================

    /// Invoke a global function. Arguments occupy stack slots 1.., results
    /// are pushed on top; returns the result count.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_global(&mut self, name: &str) -> Result<usize, VmError> {
        let func = self
            .registry
            .global(name)
            .ok_or_else(|| VmError::UnknownGlobal(name.to_string()))?
            .clone();
        func.call(self)
    }

    /// Invoke an instance method on the wrapped instance in slot 1.
    ///
    /// Lookup starts at the instance's resolved (most-derived) type name and
    /// walks the base chain.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_method(&mut self, name: &str) -> Result<usize, VmError> {
        let instance = match self.slot(RECEIVER_SLOT)? {
            Value::UserData(instance) => *instance,
            other => {
                return Err(VmError::BadReceiver {
                    pos: RECEIVER_SLOT,
                    expected: "userdata",
                    actual: other.type_name(),
                });
            }
        };
        let entry = self
            .registry
            .lookup_method(instance.type_name, name)
            .ok_or_else(|| VmError::UnknownMethod {
                type_name: instance.type_name.to_string(),
                method: name.to_string(),
            })?;
        let func = entry.func.clone();
        func.call(self)
    }

    /// Invoke a static method of a type. Arguments occupy slots 1...
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn call_static(&mut self, type_name: &str, name: &str) -> Result<usize, VmError> {
        let entry = self
            .registry
            .lookup_method(type_name, name)
            .ok_or_else(|| VmError::UnknownMethod {
                type_name: type_name.to_string(),
                method: name.to_string(),
            })?;
        let func = entry.func.clone();
        func.call(self)
    }

    /// Invoke a type's constructor.
    ///
    /// Slot 1 holds the type-table placeholder the script call site left
    /// behind; constructor arguments occupy slots 2... Raises the fixed
    /// "cannot be called" error for types finished without a constructor.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn construct(&mut self, type_name: &str) -> Result<usize, VmError> {
        let ty = self
            .registry
            .get_type(type_name)
            .ok_or_else(|| VmError::UnknownType(type_name.to_string()))?;
        let func = ty.constructor().clone();
        func.call(self)
    }

    /// Collect a wrapped instance: run its type's finalizer, which destroys
    /// the native object only if the wrapper owns it.
    ///
    /// Collection is synchronous with call execution; the generational heap
    /// makes a second collect of the same instance a no-op.
    pub fn collect(&mut self, instance: Instance) {
        let finalizer = self
            .registry
            .get_type(instance.type_name)
            .map(|ty| ty.finalizer().clone());
        match finalizer {
            Some(finalize) => finalize(&mut self.heap, instance),
            // Type never registered: fall back to plain ownership handling.
            None => {
                if instance.owned {
                    self.heap.free(instance.handle);
                }
            }
        }
    }
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("stack_top", &self.stack.top())
            .field("heap", &self.heap)
            .field("registry", &*self.registry)
            .finish()
    }
}
