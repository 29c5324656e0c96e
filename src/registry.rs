//! Type and function registration.
//!
//! Registration is two-phase. A [`RegistryBuilder`] is the mutable,
//! append-only side used during startup: types are declared and finished
//! through [`TypeBuilder`], global functions and extension methods are
//! attached directly. [`RegistryBuilder::build`] then resolves every base
//! chain (tolerating out-of-order declarations), rejects unknown bases and
//! cycles, and freezes the result into an immutable [`TypeRegistry`] that is
//! shared via `Arc` for the rest of the process. Script execution only ever
//! reads the frozen registry, so no locking is involved.
//!
//! The protocol makes the illegal transitions unrepresentable rather than
//! checked at call time: a [`TypeBuilder`] is consumed by `finish`, so
//! methods cannot be added to a finalized type (extension methods are the
//! sanctioned path for that), and a type name can only be declared once.

use std::marker::PhantomData;
use std::sync::Arc;

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::binding::{IntoConstructor, IntoNativeFn, IntoNativeMethod, IntoNativeMethodMut};
use crate::error::{RegistryError, VmError};
use crate::native_fn::NativeFn;
use crate::object::{Instance, ObjectHeap, ScriptType};
use crate::type_hash::TypeHash;
use crate::vm::Vm;

bitflags! {
    /// Classification of a method-table entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MethodFlags: u8 {
        /// Takes a receiver from stack slot 1.
        const INSTANCE = 1 << 0;
        /// Called on the type itself; arguments start at slot 1.
        const STATIC = 1 << 1;
        /// Attached after the type was finished, possibly by another
        /// subsystem.
        const EXTENSION = 1 << 2;
    }
}

/// One entry in a type's method table.
#[derive(Debug)]
pub struct MethodEntry {
    pub name: String,
    pub func: NativeFn,
    pub flags: MethodFlags,
}

/// Ownership-aware collection hook, run when the VM collects a wrapped
/// instance of the type.
pub type Finalizer = Arc<dyn Fn(&mut ObjectHeap, Instance) + Send + Sync>;

/// A finalized, script-visible type.
pub struct BoundType {
    name: String,
    hash: TypeHash,
    bases: Vec<String>,
    methods: FxHashMap<TypeHash, MethodEntry>,
    constructor: NativeFn,
    constructible: bool,
    finalizer: Finalizer,
}

impl BoundType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn hash(&self) -> TypeHash {
        self.hash
    }

    /// Base-type names, in declaration order.
    pub fn bases(&self) -> &[String] {
        &self.bases
    }

    /// Look up a method in this type's own table only.
    pub fn method(&self, name: &str) -> Option<&MethodEntry> {
        self.methods.get(&TypeHash::from_method(self.hash, name))
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// The constructor trampoline, or the "cannot be called" guard when the
    /// type was finished without one.
    pub fn constructor(&self) -> &NativeFn {
        &self.constructor
    }

    pub fn is_constructible(&self) -> bool {
        self.constructible
    }

    pub fn finalizer(&self) -> &Finalizer {
        &self.finalizer
    }
}

impl std::fmt::Debug for BoundType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundType")
            .field("name", &self.name)
            .field("bases", &self.bases)
            .field("methods", &self.methods.len())
            .field("constructible", &self.constructible)
            .finish()
    }
}

struct GlobalEntry {
    name: String,
    func: NativeFn,
}

/// Mutable registration-phase state.
pub struct RegistryBuilder {
    types: FxHashMap<TypeHash, BoundType>,
    globals: FxHashMap<TypeHash, GlobalEntry>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self {
            types: FxHashMap::default(),
            globals: FxHashMap::default(),
        }
    }

    /// Begin registering type `T` under its script-visible name.
    ///
    /// Returns a [`TypeBuilder`]; the type becomes visible once
    /// [`TypeBuilder::finish`] runs. Declaring an already-registered name is
    /// an error.
    pub fn declare_type<T: ScriptType>(&mut self) -> Result<TypeBuilder<'_, T>, RegistryError> {
        let hash = TypeHash::from_name(T::NAME);
        if self.types.contains_key(&hash) {
            return Err(RegistryError::DuplicateType(T::NAME.to_string()));
        }
        Ok(TypeBuilder {
            registry: self,
            hash,
            bases: Vec::new(),
            methods: FxHashMap::default(),
            constructor: None,
            destructor: None,
            _marker: PhantomData,
        })
    }

    /// Register a free function in the VM's global namespace.
    pub fn global<F, Args, Ret>(&mut self, name: &str, f: F) -> Result<&mut Self, RegistryError>
    where
        F: IntoNativeFn<Args, Ret>,
    {
        self.insert_global(name, f.into_native_fn())
    }

    /// Register a raw entry point in the global namespace.
    pub fn global_raw<F>(&mut self, name: &str, f: F) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&mut Vm) -> Result<usize, VmError> + Send + Sync + 'static,
    {
        self.insert_global(name, NativeFn::new(f))
    }

    fn insert_global(&mut self, name: &str, func: NativeFn) -> Result<&mut Self, RegistryError> {
        let key = TypeHash::from_global(name);
        if self.globals.contains_key(&key) {
            return Err(RegistryError::DuplicateGlobal(name.to_string()));
        }
        log::debug!("registered global function '{name}'");
        self.globals.insert(
            key,
            GlobalEntry {
                name: name.to_string(),
                func,
            },
        );
        Ok(self)
    }

    /// Attach a method to an already-finished type's table.
    ///
    /// The target may be a type this registration code does not own; its
    /// declaration is not revisited and it is not re-finalized. The receiver
    /// type `T` must still match the wrapped native objects the method will
    /// be called on (directly or through their base chain).
    pub fn extension_method<T, F, Args, Ret>(
        &mut self,
        type_name: &str,
        name: &str,
        f: F,
    ) -> Result<&mut Self, RegistryError>
    where
        T: ScriptType,
        F: IntoNativeMethod<T, Args, Ret>,
    {
        self.insert_extension(
            type_name,
            name,
            f.into_native_method(),
            MethodFlags::INSTANCE | MethodFlags::EXTENSION,
        )
    }

    /// Attach a raw entry point as an extension method.
    pub fn extension_method_raw<F>(
        &mut self,
        type_name: &str,
        name: &str,
        f: F,
    ) -> Result<&mut Self, RegistryError>
    where
        F: Fn(&mut Vm) -> Result<usize, VmError> + Send + Sync + 'static,
    {
        self.insert_extension(
            type_name,
            name,
            NativeFn::new(f),
            MethodFlags::INSTANCE | MethodFlags::EXTENSION,
        )
    }

    fn insert_extension(
        &mut self,
        type_name: &str,
        name: &str,
        func: NativeFn,
        flags: MethodFlags,
    ) -> Result<&mut Self, RegistryError> {
        let ty = self
            .types
            .get_mut(&TypeHash::from_name(type_name))
            .ok_or_else(|| RegistryError::UnknownExtensionTarget(type_name.to_string()))?;
        let key = TypeHash::from_method(ty.hash, name);
        if ty.methods.contains_key(&key) {
            return Err(RegistryError::DuplicateMethod {
                type_name: type_name.to_string(),
                method: name.to_string(),
            });
        }
        log::debug!("registered extension method '{type_name}.{name}'");
        ty.methods.insert(
            key,
            MethodEntry {
                name: name.to_string(),
                func,
                flags,
            },
        );
        Ok(self)
    }

    /// Resolve base chains and freeze into an immutable [`TypeRegistry`].
    ///
    /// Base names may reference types declared in any order; here every name
    /// must resolve and the base graph must be acyclic.
    pub fn build(self) -> Result<TypeRegistry, RegistryError> {
        for ty in self.types.values() {
            for base in &ty.bases {
                if !self.types.contains_key(&TypeHash::from_name(base)) {
                    return Err(RegistryError::UnknownBase {
                        type_name: ty.name.clone(),
                        base: base.clone(),
                    });
                }
            }
        }
        for ty in self.types.values() {
            if self.reaches(ty.hash, ty.hash, &mut Vec::new()) {
                return Err(RegistryError::BaseCycle(ty.name.clone()));
            }
        }
        log::debug!(
            "registry frozen: {} types, {} globals",
            self.types.len(),
            self.globals.len()
        );
        Ok(TypeRegistry {
            types: self.types,
            globals: self.globals,
        })
    }

    /// Whether `target` is reachable from `from` through base edges.
    fn reaches(&self, from: TypeHash, target: TypeHash, seen: &mut Vec<TypeHash>) -> bool {
        let Some(ty) = self.types.get(&from) else {
            return false;
        };
        for base in &ty.bases {
            let base_hash = TypeHash::from_name(base);
            if base_hash == target {
                return true;
            }
            if seen.contains(&base_hash) {
                continue;
            }
            seen.push(base_hash);
            if self.reaches(base_hash, target, seen) {
                return true;
            }
        }
        false
    }
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryBuilder")
            .field("types", &self.types.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}

/// Per-type registration state: declared, collecting methods, consumed by
/// [`finish`](Self::finish).
pub struct TypeBuilder<'r, T: ScriptType> {
    registry: &'r mut RegistryBuilder,
    hash: TypeHash,
    bases: Vec<String>,
    methods: FxHashMap<TypeHash, MethodEntry>,
    constructor: Option<NativeFn>,
    destructor: Option<Arc<dyn Fn(&mut T) + Send + Sync>>,
    _marker: PhantomData<T>,
}

impl<'r, T: ScriptType> TypeBuilder<'r, T> {
    /// Append a base type to the inheritance chain.
    ///
    /// The base need not be registered yet; names resolve at
    /// [`RegistryBuilder::build`] time.
    pub fn base(mut self, name: &str) -> Self {
        self.bases.push(name.to_string());
        self
    }

    /// Register an instance method with a shared receiver.
    pub fn method<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: IntoNativeMethod<T, Args, Ret>,
    {
        self.insert_method(name, f.into_native_method(), MethodFlags::INSTANCE)
    }

    /// Register an instance method with a mutable receiver.
    pub fn method_mut<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: IntoNativeMethodMut<T, Args, Ret>,
    {
        self.insert_method(name, f.into_native_method_mut(), MethodFlags::INSTANCE)
    }

    /// Register a static method (no receiver; arguments start at slot 1).
    pub fn static_method<F, Args, Ret>(self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: IntoNativeFn<Args, Ret>,
    {
        self.insert_method(name, f.into_native_fn(), MethodFlags::STATIC)
    }

    /// Register a raw entry point as an instance method.
    ///
    /// The callable owns the whole stack protocol: receiver at slot 1,
    /// arguments from slot 2, and it reports its own result count.
    pub fn method_raw<F>(self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(&mut Vm) -> Result<usize, VmError> + Send + Sync + 'static,
    {
        self.insert_method(name, NativeFn::new(f), MethodFlags::INSTANCE)
    }

    fn insert_method(
        mut self,
        name: &str,
        func: NativeFn,
        flags: MethodFlags,
    ) -> Result<Self, RegistryError> {
        let key = TypeHash::from_method(self.hash, name);
        if self.methods.contains_key(&key) {
            return Err(RegistryError::DuplicateMethod {
                type_name: T::NAME.to_string(),
                method: name.to_string(),
            });
        }
        self.methods.insert(
            key,
            MethodEntry {
                name: name.to_string(),
                func,
                flags,
            },
        );
        Ok(self)
    }

    /// Register the constructor.
    ///
    /// Without one, invoking the type from a script raises the fixed
    /// "cannot be called" error.
    pub fn constructor<F, Args>(mut self, f: F) -> Self
    where
        F: IntoConstructor<Args, T>,
    {
        self.constructor = Some(f.into_constructor());
        self
    }

    /// Register a hook run on collection, before ownership-conditional
    /// destruction.
    pub fn destructor<F>(mut self, f: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.destructor = Some(Arc::new(f));
        self
    }

    /// Finalize the type: attach constructor guard and finalizer, and make
    /// it visible to scripts.
    ///
    /// Consumes the builder, so no further methods can be attached; a
    /// dropped builder registers nothing.
    pub fn finish(self) -> Result<(), RegistryError> {
        let constructible = self.constructor.is_some();
        let constructor = self.constructor.unwrap_or_else(|| {
            NativeFn::new(move |_vm: &mut Vm| -> Result<usize, VmError> {
                Err(VmError::NotConstructible {
                    type_name: T::NAME.to_string(),
                })
            })
        });

        let hook = self.destructor;
        let finalizer: Finalizer = Arc::new(move |heap, instance| {
            if let Some(hook) = &hook
                && let Some(obj) = heap.get_mut(instance.handle)
                && let Some(this) = obj.view_mut::<T>()
            {
                hook(this);
            }
            if instance.owned {
                heap.free(instance.handle);
            }
        });

        log::debug!(
            "registered type '{}' ({} methods, {} bases)",
            T::NAME,
            self.methods.len(),
            self.bases.len()
        );
        self.registry.types.insert(
            self.hash,
            BoundType {
                name: T::NAME.to_string(),
                hash: self.hash,
                bases: self.bases,
                methods: self.methods,
                constructor,
                constructible,
                finalizer,
            },
        );
        Ok(())
    }
}

impl<T: ScriptType> std::fmt::Debug for TypeBuilder<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBuilder")
            .field("name", &T::NAME)
            .field("bases", &self.bases)
            .field("methods", &self.methods.len())
            .field("constructible", &self.constructor.is_some())
            .finish()
    }
}

/// The frozen, process-wide registry.
///
/// Append-only during registration, read-only afterwards; shared across the
/// VM via `Arc`.
pub struct TypeRegistry {
    types: FxHashMap<TypeHash, BoundType>,
    globals: FxHashMap<TypeHash, GlobalEntry>,
}

impl TypeRegistry {
    /// Get a type by its registered name.
    pub fn get_type(&self, name: &str) -> Option<&BoundType> {
        self.types.get(&TypeHash::from_name(name))
    }

    /// Get a global function by name.
    pub fn global(&self, name: &str) -> Option<&NativeFn> {
        self.globals
            .get(&TypeHash::from_global(name))
            .map(|entry| &entry.func)
    }

    /// Resolve a method against a type and its base chain.
    ///
    /// The type's own table is consulted first, then each base depth-first
    /// in declaration order.
    pub fn lookup_method(&self, type_name: &str, method: &str) -> Option<&MethodEntry> {
        let ty = self.get_type(type_name)?;
        if let Some(entry) = ty.method(method) {
            return Some(entry);
        }
        for base in ty.bases() {
            if let Some(entry) = self.lookup_method(base, method) {
                return Some(entry);
            }
        }
        None
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.len()
    }

    /// Iterate registered global function names.
    pub fn global_names(&self) -> impl Iterator<Item = &str> {
        self.globals.values().map(|entry| entry.name.as_str())
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types.len())
            .field("globals", &self.globals.len())
            .finish()
    }
}
