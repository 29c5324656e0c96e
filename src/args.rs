//! Argument extraction from stack positions.
//!
//! [`FromStack`] decides the extraction strategy for one declared parameter
//! type: array-like types go through [`Vm::check_array`], map-like types
//! through [`Vm::check_map`], everything else through [`Vm::check_value`].
//!
//! [`StackArgs`] expands a whole parameter tuple against consecutive stack
//! offsets `start, start + 1, …`. Extraction is sequenced strictly
//! left-to-right in increasing offset order; the ordering is part of the
//! contract, not an evaluation-order accident.

use rustc_hash::FxHashMap;

use crate::convert::FromVm;
use crate::error::VmError;
use crate::object::Instance;
use crate::value::Value;
use crate::vm::Vm;

/// Extract one declared parameter from a stack position.
pub trait FromStack: Sized {
    fn from_stack(vm: &Vm, pos: usize) -> Result<Self, VmError>;
}

macro_rules! scalar_from_stack {
    ($($ty:ty),* $(,)?) => {
        $(
            impl FromStack for $ty {
                fn from_stack(vm: &Vm, pos: usize) -> Result<Self, VmError> {
                    vm.check_value(pos)
                }
            }
        )*
    };
}

scalar_from_stack!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, Value, Instance,
);

impl<T: FromVm> FromStack for Vec<T> {
    fn from_stack(vm: &Vm, pos: usize) -> Result<Self, VmError> {
        vm.check_array(pos)
    }
}

impl<T: FromVm> FromStack for FxHashMap<String, T> {
    fn from_stack(vm: &Vm, pos: usize) -> Result<Self, VmError> {
        vm.check_map(pos)
    }
}

/// A parameter tuple extractable from consecutive stack positions.
pub trait StackArgs: Sized {
    /// Number of explicit parameters.
    const ARITY: usize;

    /// Extract every parameter, parameter `k` from position `start + k`.
    fn extract(vm: &Vm, start: usize) -> Result<Self, VmError>;
}

impl StackArgs for () {
    const ARITY: usize = 0;

    fn extract(_vm: &Vm, _start: usize) -> Result<Self, VmError> {
        Ok(())
    }
}

macro_rules! impl_stack_args {
    ($count:expr => $($arg:ident @ $idx:expr),+) => {
        impl<$($arg: FromStack),+> StackArgs for ($($arg,)+) {
            const ARITY: usize = $count;

            #[allow(non_snake_case)]
            fn extract(vm: &Vm, start: usize) -> Result<Self, VmError> {
                $(let $arg = <$arg as FromStack>::from_stack(vm, start + $idx)?;)+
                Ok(($($arg,)+))
            }
        }
    };
}

impl_stack_args!(1 => A1 @ 0);
impl_stack_args!(2 => A1 @ 0, A2 @ 1);
impl_stack_args!(3 => A1 @ 0, A2 @ 1, A3 @ 2);
impl_stack_args!(4 => A1 @ 0, A2 @ 1, A3 @ 2, A4 @ 3);
impl_stack_args!(5 => A1 @ 0, A2 @ 1, A3 @ 2, A4 @ 3, A5 @ 4);
impl_stack_args!(6 => A1 @ 0, A2 @ 1, A3 @ 2, A4 @ 3, A5 @ 4, A6 @ 5);
impl_stack_args!(7 => A1 @ 0, A2 @ 1, A3 @ 2, A4 @ 3, A5 @ 4, A6 @ 5, A7 @ 6);
impl_stack_args!(8 => A1 @ 0, A2 @ 1, A3 @ 2, A4 @ 3, A5 @ 4, A6 @ 5, A7 @ 6, A8 @ 7);
