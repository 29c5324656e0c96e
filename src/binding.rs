//! Trampoline generation for native callables.
//!
//! This is the core adaptation layer: it normalizes the supported callable
//! shapes into [`NativeFn`] trampolines sharing one marshaling algorithm.
//!
//! - [`IntoNativeFn`] adapts free callables `Fn(A…) -> R`; arguments are
//!   extracted starting at stack position 1.
//! - [`IntoNativeMethod`] adapts `Fn(&T, A…) -> R`; the receiver is resolved
//!   from position 1 via `check_user_data`, arguments start at position 2.
//! - [`IntoNativeMethodMut`] adapts `Fn(&mut T, A…) -> R`; same layout.
//! - [`IntoConstructor`] adapts `Fn(A…) -> T`; arguments start at position 2
//!   (the script's call site puts the type table in slot 1), and the built
//!   object is wrapped with `owned = true`.
//! - Raw entry points `Fn(&mut Vm) -> Result<usize, VmError>` bypass
//!   marshaling entirely via [`NativeFn::new`].
//!
//! Void returns need no dedicated shape: `R = ()` pushes nothing through
//! [`ScriptReturn`]. Implementations are generated for arities 0 through 8.
//!
//! A method trampoline resolves its receiver before any argument is
//! extracted. Arguments are extracted strictly left-to-right, and the result
//! conversion runs only after every borrow of the heap has ended.

use rustc_hash::FxHashMap;

use crate::args::{FromStack, StackArgs};
use crate::convert::{Owned, ToVm};
use crate::error::VmError;
use crate::native_fn::NativeFn;
use crate::object::{Instance, ScriptType};
use crate::stack::{CONSTRUCTOR_ARGS_START, FUNCTION_ARGS_START, METHOD_ARGS_START, RECEIVER_SLOT};
use crate::value::Value;
use crate::vm::Vm;

/// Result conversion for bound callables.
///
/// Pushes the converted return value(s) and reports how many were pushed.
/// `()` pushes nothing; `Option<T>` pushes the nil sentinel when `None` and
/// the converted value when `Some` (a present value is never nil-coalesced);
/// everything else pushes exactly one value.
pub trait ScriptReturn {
    fn push_results(self, vm: &mut Vm) -> Result<usize, VmError>;
}

impl ScriptReturn for () {
    fn push_results(self, _vm: &mut Vm) -> Result<usize, VmError> {
        Ok(0)
    }
}

impl<T: ToVm> ScriptReturn for Option<T> {
    fn push_results(self, vm: &mut Vm) -> Result<usize, VmError> {
        match self {
            Some(value) => {
                let converted = value.to_vm(vm)?;
                vm.push(converted);
            }
            None => vm.push_nil(),
        }
        Ok(1)
    }
}

macro_rules! single_value_return {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ScriptReturn for $ty {
                fn push_results(self, vm: &mut Vm) -> Result<usize, VmError> {
                    let converted = self.to_vm(vm)?;
                    vm.push(converted);
                    Ok(1)
                }
            }
        )*
    };
}

single_value_return!(
    bool, i8, i16, i32, i64, u8, u16, u32, u64, f32, f64, String, &'static str, Value, Instance,
);

impl<T: ToVm> ScriptReturn for Vec<T> {
    fn push_results(self, vm: &mut Vm) -> Result<usize, VmError> {
        let converted = self.to_vm(vm)?;
        vm.push(converted);
        Ok(1)
    }
}

impl<T: ToVm> ScriptReturn for FxHashMap<String, T> {
    fn push_results(self, vm: &mut Vm) -> Result<usize, VmError> {
        let converted = self.to_vm(vm)?;
        vm.push(converted);
        Ok(1)
    }
}

impl<T: ScriptType> ScriptReturn for Owned<T> {
    fn push_results(self, vm: &mut Vm) -> Result<usize, VmError> {
        let converted = self.to_vm(vm)?;
        vm.push(converted);
        Ok(1)
    }
}

/// Adapt a free callable into a trampoline.
pub trait IntoNativeFn<Args, Ret>: Send + Sync + 'static {
    fn into_native_fn(self) -> NativeFn;
}

/// Adapt a `&T`-receiver callable into a trampoline.
pub trait IntoNativeMethod<This, Args, Ret>: Send + Sync + 'static {
    fn into_native_method(self) -> NativeFn;
}

/// Adapt a `&mut T`-receiver callable into a trampoline.
pub trait IntoNativeMethodMut<This, Args, Ret>: Send + Sync + 'static {
    fn into_native_method_mut(self) -> NativeFn;
}

/// Adapt a constructor callable (`Fn(A…) -> T`) into a trampoline.
pub trait IntoConstructor<Args, This>: Send + Sync + 'static {
    fn into_constructor(self) -> NativeFn;
}

macro_rules! impl_callable_shapes {
    ($($arg:ident),*) => {
        impl<Fun, Ret, $($arg,)*> IntoNativeFn<($($arg,)*), Ret> for Fun
        where
            Fun: Fn($($arg),*) -> Ret + Send + Sync + 'static,
            Ret: ScriptReturn,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_native_fn(self) -> NativeFn {
                NativeFn::new(move |vm: &mut Vm| {
                    let ($($arg,)*) =
                        <($($arg,)*) as StackArgs>::extract(vm, FUNCTION_ARGS_START)?;
                    (self)($($arg),*).push_results(vm)
                })
            }
        }

        impl<Fun, This, Ret, $($arg,)*> IntoNativeMethod<This, ($($arg,)*), Ret> for Fun
        where
            Fun: Fn(&This, $($arg),*) -> Ret + Send + Sync + 'static,
            This: ScriptType,
            Ret: ScriptReturn,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_native_method(self) -> NativeFn {
                NativeFn::new(move |vm: &mut Vm| {
                    let instance = vm.check_user_data::<This>(RECEIVER_SLOT)?;
                    let ($($arg,)*) =
                        <($($arg,)*) as StackArgs>::extract(vm, METHOD_ARGS_START)?;
                    let ret = {
                        let this = vm.object_view::<This>(instance.handle)?;
                        (self)(this, $($arg),*)
                    };
                    ret.push_results(vm)
                })
            }
        }

        impl<Fun, This, Ret, $($arg,)*> IntoNativeMethodMut<This, ($($arg,)*), Ret> for Fun
        where
            Fun: Fn(&mut This, $($arg),*) -> Ret + Send + Sync + 'static,
            This: ScriptType,
            Ret: ScriptReturn,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_native_method_mut(self) -> NativeFn {
                NativeFn::new(move |vm: &mut Vm| {
                    let instance = vm.check_user_data::<This>(RECEIVER_SLOT)?;
                    let ($($arg,)*) =
                        <($($arg,)*) as StackArgs>::extract(vm, METHOD_ARGS_START)?;
                    let ret = {
                        let this = vm.object_view_mut::<This>(instance.handle)?;
                        (self)(this, $($arg),*)
                    };
                    ret.push_results(vm)
                })
            }
        }

        impl<Fun, This, $($arg,)*> IntoConstructor<($($arg,)*), This> for Fun
        where
            Fun: Fn($($arg),*) -> This + Send + Sync + 'static,
            This: ScriptType,
            $($arg: FromStack,)*
        {
            #[allow(non_snake_case)]
            fn into_constructor(self) -> NativeFn {
                NativeFn::new(move |vm: &mut Vm| {
                    let ($($arg,)*) =
                        <($($arg,)*) as StackArgs>::extract(vm, CONSTRUCTOR_ARGS_START)?;
                    Owned((self)($($arg),*)).push_results(vm)
                })
            }
        }
    };
}

impl_callable_shapes!();
impl_callable_shapes!(A1);
impl_callable_shapes!(A1, A2);
impl_callable_shapes!(A1, A2, A3);
impl_callable_shapes!(A1, A2, A3, A4);
impl_callable_shapes!(A1, A2, A3, A4, A5);
impl_callable_shapes!(A1, A2, A3, A4, A5, A6);
impl_callable_shapes!(A1, A2, A3, A4, A5, A6, A7);
impl_callable_shapes!(A1, A2, A3, A4, A5, A6, A7, A8);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use crate::script_type;
    use std::sync::Arc;

    fn empty_vm() -> Vm {
        Vm::new(Arc::new(RegistryBuilder::new().build().unwrap()))
    }

    struct Probe {
        hits: i64,
    }
    script_type!(Probe, "Probe");

    #[test]
    fn free_fn_extracts_and_converts() {
        let trampoline = (|a: i64, b: i64| a + b).into_native_fn();

        let mut vm = empty_vm();
        vm.push(Value::Int(2));
        vm.push(Value::Int(3));

        assert_eq!(trampoline.call(&mut vm).unwrap(), 1);
        assert_eq!(vm.pop(), Some(Value::Int(5)));
    }

    #[test]
    fn void_return_reports_zero_results() {
        let trampoline = (|_a: i64| ()).into_native_fn();

        let mut vm = empty_vm();
        vm.push(Value::Int(1));
        let before = vm.top();

        assert_eq!(trampoline.call(&mut vm).unwrap(), 0);
        assert_eq!(vm.top(), before);
    }

    #[test]
    fn none_return_pushes_exactly_one_nil() {
        let trampoline = (|| -> Option<i64> { None }).into_native_fn();

        let mut vm = empty_vm();
        assert_eq!(trampoline.call(&mut vm).unwrap(), 1);
        assert_eq!(vm.pop(), Some(Value::Nil));
    }

    #[test]
    fn some_return_is_never_nil_coalesced() {
        let trampoline = (|| -> Option<i64> { Some(0) }).into_native_fn();

        let mut vm = empty_vm();
        assert_eq!(trampoline.call(&mut vm).unwrap(), 1);
        assert_eq!(vm.pop(), Some(Value::Int(0)));
    }

    #[test]
    fn method_reads_receiver_from_slot_one() {
        let trampoline = (|p: &Probe, delta: i64| p.hits + delta).into_native_method();

        let mut vm = empty_vm();
        let instance = vm.wrap(Probe { hits: 40 }, true);
        vm.push(Value::UserData(instance));
        vm.push(Value::Int(2));

        assert_eq!(trampoline.call(&mut vm).unwrap(), 1);
        assert_eq!(vm.pop(), Some(Value::Int(42)));
    }

    #[test]
    fn method_mut_mutates_receiver() {
        let trampoline = (|p: &mut Probe, delta: i64| {
            p.hits += delta;
        })
        .into_native_method_mut();

        let mut vm = empty_vm();
        let instance = vm.wrap(Probe { hits: 1 }, true);
        vm.push(Value::UserData(instance));
        vm.push(Value::Int(9));

        assert_eq!(trampoline.call(&mut vm).unwrap(), 0);
        assert_eq!(vm.object_view::<Probe>(instance.handle).unwrap().hits, 10);
    }

    #[test]
    fn method_with_missing_receiver_fails_before_invoke() {
        let trampoline = (|_p: &Probe| 1i64).into_native_method();

        let mut vm = empty_vm();
        vm.push(Value::Int(5)); // not a userdata

        let err = trampoline.call(&mut vm).unwrap_err();
        assert!(matches!(err, VmError::BadReceiver { pos: 1, .. }));
    }

    #[test]
    fn bad_argument_aborts_before_invoke() {
        let invoked = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let trampoline = (move |_a: i64| {
            flag.store(true, std::sync::atomic::Ordering::SeqCst);
        })
        .into_native_fn();

        let mut vm = empty_vm();
        vm.push(Value::Str("not an int".into()));

        assert!(trampoline.call(&mut vm).is_err());
        assert!(!invoked.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn constructor_skips_type_table_slot() {
        let trampoline = (|hits: i64| Probe { hits }).into_constructor();

        let mut vm = empty_vm();
        vm.push(Value::Nil); // type-table slot
        vm.push(Value::Int(5));

        assert_eq!(trampoline.call(&mut vm).unwrap(), 1);
        let Value::UserData(instance) = vm.pop().unwrap() else {
            panic!("expected userdata result");
        };
        assert!(instance.owned);
        assert_eq!(vm.object_view::<Probe>(instance.handle).unwrap().hits, 5);
    }

    #[test]
    fn arity_eight_extracts_in_declaration_order() {
        let recorded: Arc<std::sync::Mutex<Vec<i64>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&recorded);
        let trampoline = (move |a: i64, b: i64, c: i64, d: i64, e: i64, f: i64, g: i64, h: i64| {
            sink.lock().unwrap().extend([a, b, c, d, e, f, g, h]);
        })
        .into_native_fn();

        let mut vm = empty_vm();
        for i in 1..=8 {
            vm.push(Value::Int(i));
        }

        trampoline.call(&mut vm).unwrap();
        assert_eq!(*recorded.lock().unwrap(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }
}
