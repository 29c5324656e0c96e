//! Binding generator for native Rust code in an embedded scripting VM.
//!
//! This crate adapts native functions, methods, and types to a stack-based
//! VM's calling convention without hand-written glue per binding. A
//! registration pass builds trampolines from ordinary Rust callables; at
//! call time a trampoline extracts arguments from fixed stack positions,
//! invokes the native callable, and converts the result back into a VM
//! value.
//!
//! # Registration
//!
//! ```ignore
//! struct Point { x: f32, y: f32 }
//! script_type!(Point, "Point");
//!
//! let mut builder = RegistryBuilder::new();
//! builder
//!     .declare_type::<Point>()?
//!     .constructor(|x: f32, y: f32| Point { x, y })
//!     .method("getX", |p: &Point| p.x)?
//!     .method_mut("move", |p: &mut Point, dx: f32, dy: f32| {
//!         p.x += dx;
//!         p.y += dy;
//!     })?
//!     .finish()?;
//! builder.global("hypot", |x: f64, y: f64| (x * x + y * y).sqrt())?;
//! let registry = Arc::new(builder.build()?);
//!
//! let mut vm = Vm::new(registry);
//! ```
//!
//! # Architecture
//!
//! - Conversion: [`FromVm`] / [`ToVm`] per value type, [`FromStack`]
//!   selecting the extraction strategy per declared parameter type,
//!   [`StackArgs`] expanding parameter tuples against consecutive stack
//!   offsets.
//! - Adaptation: [`IntoNativeFn`], [`IntoNativeMethod`],
//!   [`IntoNativeMethodMut`], and [`IntoConstructor`] normalize the
//!   supported callable shapes into [`NativeFn`] trampolines;
//!   [`ScriptReturn`] handles void, nullable, and owned-object results.
//! - Registration: [`RegistryBuilder`] / [`TypeBuilder`] build an immutable
//!   [`TypeRegistry`] (types with base chains, method tables, constructors,
//!   finalizers; global functions; extension methods on foreign types).
//! - Execution: [`Vm`] holds the stack and the [`ObjectHeap`] of wrapped
//!   instances and drives calls into the registered trampolines.
//!
//! Registration happens once at startup; the frozen registry is shared
//! read-only across the process, so script calls never contend on it.

mod args;
mod binding;
mod convert;
mod error;
mod native_fn;
mod object;
mod registry;
mod stack;
mod type_hash;
mod value;
mod vm;

pub use args::{FromStack, StackArgs};
pub use binding::{
    IntoConstructor, IntoNativeFn, IntoNativeMethod, IntoNativeMethodMut, ScriptReturn,
};
pub use convert::{FromVm, Owned, ToVm};
pub use error::{ConversionError, RegistryError, VmError};
pub use native_fn::NativeFn;
pub use object::{Instance, ObjectHandle, ObjectHeap, ScriptObject, ScriptType};
pub use registry::{
    BoundType, Finalizer, MethodEntry, MethodFlags, RegistryBuilder, TypeBuilder, TypeRegistry,
};
pub use stack::{
    CONSTRUCTOR_ARGS_START, FUNCTION_ARGS_START, METHOD_ARGS_START, RECEIVER_SLOT, Stack,
};
pub use type_hash::TypeHash;
pub use value::Value;
pub use vm::Vm;
