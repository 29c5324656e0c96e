//! Value conversion traits.
//!
//! [`FromVm`] reads a Rust value out of a VM [`Value`] (argument direction),
//! [`ToVm`] produces a VM [`Value`] from a Rust value (result direction).
//! `ToVm` takes the VM because converting an [`Owned`] native object
//! allocates it into the object heap.

use rustc_hash::FxHashMap;

use crate::error::{ConversionError, VmError};
use crate::object::{Instance, ScriptType};
use crate::value::Value;
use crate::vm::Vm;

/// Convert from a VM value to a Rust type (for extracting arguments).
pub trait FromVm: Sized {
    fn from_vm(value: &Value) -> Result<Self, ConversionError>;
}

/// Convert a Rust value into a VM value (for results).
pub trait ToVm {
    fn to_vm(self, vm: &mut Vm) -> Result<Value, VmError>;
}

/// A native object transferred into the VM with ownership.
///
/// Returning `Owned<T>` from a bound callable allocates the object into the
/// heap and pushes a wrapped instance with `owned = true`; collection of
/// that instance destroys the object. A callable that can fail to produce an
/// object returns `Option<Owned<T>>`, which pushes nil on `None`.
pub struct Owned<T: ScriptType>(pub T);

// =============================================================================
// FromVm implementations
// =============================================================================

impl FromVm for bool {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Bool(v) => Ok(*v),
            _ => Err(ConversionError::TypeMismatch {
                expected: "bool",
                actual: value.type_name(),
            }),
        }
    }
}

macro_rules! from_vm_int {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromVm for $ty {
                fn from_vm(value: &Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::Int(v) => <$ty>::try_from(*v).map_err(|_| {
                            ConversionError::IntegerOverflow {
                                value: *v,
                                target_type: $name,
                            }
                        }),
                        _ => Err(ConversionError::TypeMismatch {
                            expected: $name,
                            actual: value.type_name(),
                        }),
                    }
                }
            }
        )*
    };
}

from_vm_int! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    u8 => "u8",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
}

impl FromVm for i64 {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Int(v) => Ok(*v),
            _ => Err(ConversionError::TypeMismatch {
                expected: "i64",
                actual: value.type_name(),
            }),
        }
    }
}

impl FromVm for f32 {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(v) => Ok(*v as f32),
            _ => Err(ConversionError::TypeMismatch {
                expected: "f32",
                actual: value.type_name(),
            }),
        }
    }
}

impl FromVm for f64 {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Float(v) => Ok(*v),
            _ => Err(ConversionError::TypeMismatch {
                expected: "f64",
                actual: value.type_name(),
            }),
        }
    }
}

impl FromVm for String {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Str(s) => Ok(s.clone()),
            _ => Err(ConversionError::TypeMismatch {
                expected: "string",
                actual: value.type_name(),
            }),
        }
    }
}

impl FromVm for Value {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        Ok(value.clone())
    }
}

impl FromVm for Instance {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::UserData(instance) => Ok(*instance),
            _ => Err(ConversionError::TypeMismatch {
                expected: "userdata",
                actual: value.type_name(),
            }),
        }
    }
}

impl<T: FromVm> FromVm for Vec<T> {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Array(items) => items.iter().map(T::from_vm).collect(),
            _ => Err(ConversionError::TypeMismatch {
                expected: "array",
                actual: value.type_name(),
            }),
        }
    }
}

impl<T: FromVm> FromVm for FxHashMap<String, T> {
    fn from_vm(value: &Value) -> Result<Self, ConversionError> {
        match value {
            Value::Map(entries) => entries
                .iter()
                .map(|(k, v)| T::from_vm(v).map(|t| (k.clone(), t)))
                .collect(),
            _ => Err(ConversionError::TypeMismatch {
                expected: "map",
                actual: value.type_name(),
            }),
        }
    }
}

// =============================================================================
// ToVm implementations
// =============================================================================

impl ToVm for bool {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::Bool(self))
    }
}

macro_rules! to_vm_int {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ToVm for $ty {
                fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
                    Ok(Value::Int(self as i64))
                }
            }
        )*
    };
}

to_vm_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl ToVm for f32 {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::Float(self as f64))
    }
}

impl ToVm for f64 {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::Float(self))
    }
}

impl ToVm for String {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::Str(self))
    }
}

impl ToVm for &str {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::Str(self.to_string()))
    }
}

impl ToVm for Value {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(self)
    }
}

impl ToVm for Instance {
    fn to_vm(self, _vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::UserData(self))
    }
}

impl<T: ScriptType> ToVm for Owned<T> {
    fn to_vm(self, vm: &mut Vm) -> Result<Value, VmError> {
        Ok(Value::UserData(vm.wrap(self.0, true)))
    }
}

impl<T: ToVm> ToVm for Vec<T> {
    fn to_vm(self, vm: &mut Vm) -> Result<Value, VmError> {
        let mut items = Vec::with_capacity(self.len());
        for item in self {
            items.push(item.to_vm(vm)?);
        }
        Ok(Value::Array(items))
    }
}

impl<T: ToVm> ToVm for FxHashMap<String, T> {
    fn to_vm(self, vm: &mut Vm) -> Result<Value, VmError> {
        let mut entries = FxHashMap::default();
        for (key, item) in self {
            entries.insert(key, item.to_vm(vm)?);
        }
        Ok(Value::Map(entries))
    }
}
