//! Value adapters.
//!
//! Wrapped metrics read their value through a [`Getter`], which returns a dynamically typed [`Value`]. The value is
//! only coerced to the kind a metric needs at snapshot time, so a single getter can feed any metric type as long as
//! the value it produces is compatible.

use std::sync::{
    atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use crate::Error;

/// A dynamically typed metric value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// No value.
    Null,

    /// A signed integer of any width.
    Int(i64),

    /// An unsigned 64-bit integer, kept apart from [`Value::Int`] so that values above `i64::MAX` survive until
    /// coercion.
    UInt(u64),

    /// A floating-point number of any width.
    Float(f64),

    /// A string.
    Str(String),
}

impl Value {
    const fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
        }
    }

    /// Coerces the value to a signed 64-bit integer.
    ///
    /// Integer kinds widen. Unsigned values above `i64::MAX`, floats, strings and null cannot be coerced.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalType`] if the value cannot be represented as an `i64`.
    pub fn as_i64(&self) -> Result<i64, Error> {
        match self {
            Value::Int(v) => Ok(*v),
            Value::UInt(v) => i64::try_from(*v).map_err(|_| Error::IllegalType("uint out of range")),
            other => Err(Error::IllegalType(other.kind())),
        }
    }

    /// Coerces the value to a 64-bit float. Only float kinds coerce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalType`] for any non-float value.
    pub fn as_f64(&self) -> Result<f64, Error> {
        match self {
            Value::Float(v) => Ok(*v),
            other => Err(Error::IllegalType(other.kind())),
        }
    }

    /// Coerces the value to a string slice. Only string kinds coerce.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IllegalType`] for any non-string value.
    pub fn as_str(&self) -> Result<&str, Error> {
        match self {
            Value::Str(v) => Ok(v),
            other => Err(Error::IllegalType(other.kind())),
        }
    }
}

// Every integer kind that fits losslessly in an `i64`.
macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Reads a live value.
pub trait Getter: Send + Sync {
    /// Returns the current value.
    ///
    /// # Errors
    ///
    /// Implementations may fail for any reason; a failing getter simply contributes nothing to a report.
    fn get(&self) -> Result<Value, Error>;
}

/// A [`Getter`] whose underlying storage can be atomically decremented.
///
/// Wrapped counters use this to acknowledge what was reported without losing increments that landed in between.
pub trait Subtractor: Getter {
    /// Atomically subtracts `delta` from the underlying value.
    fn subtract(&self, delta: i64);
}

impl<G: Getter + ?Sized> Getter for Arc<G> {
    fn get(&self) -> Result<Value, Error> {
        (**self).get()
    }
}

impl<S: Subtractor + ?Sized> Subtractor for Arc<S> {
    fn subtract(&self, delta: i64) {
        (**self).subtract(delta);
    }
}

/// A [`Getter`] that always returns the same value.
#[derive(Clone, Debug)]
pub struct ValueWrapper(Value);

impl ValueWrapper {
    /// Creates a new `ValueWrapper` around `value`.
    pub fn new<V: Into<Value>>(value: V) -> Self {
        Self(value.into())
    }
}

impl Getter for ValueWrapper {
    fn get(&self) -> Result<Value, Error> {
        Ok(self.0.clone())
    }
}

/// A [`Getter`] that calls a function on every read.
pub struct FunctionGetter<F>(F);

impl<F> FunctionGetter<F>
where
    F: Fn() -> Result<Value, Error> + Send + Sync,
{
    /// Creates a new `FunctionGetter` from `f`.
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> Getter for FunctionGetter<F>
where
    F: Fn() -> Result<Value, Error> + Send + Sync,
{
    fn get(&self) -> Result<Value, Error> {
        (self.0)()
    }
}

macro_rules! impl_std_atomic {
    ($($atomic:ty => $prim:ty),*) => {
        $(
            impl Getter for $atomic {
                fn get(&self) -> Result<Value, Error> {
                    Ok(Value::from(self.load(Ordering::SeqCst)))
                }
            }

            impl Subtractor for $atomic {
                fn subtract(&self, delta: i64) {
                    self.fetch_sub(delta as $prim, Ordering::SeqCst);
                }
            }
        )*
    };
}

impl_std_atomic!(AtomicI32 => i32, AtomicI64 => i64, AtomicU32 => u32, AtomicU64 => u64);

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    };

    use super::{FunctionGetter, Getter as _, Subtractor as _, Value, ValueWrapper};
    use crate::Error;

    #[test]
    fn integer_kinds_widen() {
        assert_eq!(Value::from(-3i8).as_i64().unwrap(), -3);
        assert_eq!(Value::from(u32::MAX).as_i64().unwrap(), i64::from(u32::MAX));
        assert_eq!(Value::from(i64::MIN).as_i64().unwrap(), i64::MIN);
        assert_eq!(Value::from(7usize).as_i64().unwrap(), 7);
    }

    #[test]
    fn large_unsigned_does_not_coerce() {
        let value = Value::from(1u64 << 63);
        assert!(matches!(value.as_i64(), Err(Error::IllegalType(_))));

        let value = Value::from(i64::MAX as u64);
        assert_eq!(value.as_i64().unwrap(), i64::MAX);
    }

    #[test]
    fn floats_and_strings_stay_in_their_lane() {
        assert!(Value::from(1.5f64).as_i64().is_err());
        assert!(Value::from("12").as_i64().is_err());
        assert!(Value::Null.as_i64().is_err());

        assert_eq!(Value::from(2.5f32).as_f64().unwrap(), 2.5);
        assert!(Value::from(2i32).as_f64().is_err());

        assert_eq!(Value::from("abc").as_str().unwrap(), "abc");
        assert!(Value::from(1u8).as_str().is_err());
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some(4i64)), Value::Int(4));
    }

    #[test]
    fn value_wrapper_returns_fixed_value() {
        let getter = ValueWrapper::new(42u16);
        assert_eq!(getter.get().unwrap(), Value::Int(42));
        assert_eq!(getter.get().unwrap(), Value::Int(42));
    }

    #[test]
    fn function_getter_is_called_each_time() {
        let source = Arc::new(AtomicI64::new(0));
        let captured = Arc::clone(&source);
        let getter = FunctionGetter::new(move || Ok(Value::from(captured.fetch_add(1, Ordering::SeqCst))));

        assert_eq!(getter.get().unwrap(), Value::Int(0));
        assert_eq!(getter.get().unwrap(), Value::Int(1));
        assert_eq!(source.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn shared_atomic_is_read_live() {
        let shared = Arc::new(AtomicU64::new(5));
        let getter = Arc::clone(&shared);

        assert_eq!(getter.get().unwrap(), Value::UInt(5));
        shared.store(9, Ordering::SeqCst);
        assert_eq!(getter.get().unwrap(), Value::UInt(9));

        getter.subtract(4);
        assert_eq!(shared.load(Ordering::SeqCst), 5);
    }
}
