//! Lock-free integer cells that can be handed to wrapped metrics.
//!
//! Each type exposes `set`, `inc`, `value` and `subtract`, and implements both [`Getter`] and [`Subtractor`], so it
//! can back a [`WrappedGauge`](crate::WrappedGauge), a [`WrappedCounter`](crate::WrappedCounter) or a
//! [`WrappedCumulativeCounter`](crate::WrappedCumulativeCounter) while application code keeps mutating it.

use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, AtomicU64, Ordering};

use crate::{
    value::{Getter, Subtractor, Value},
    Error,
};

macro_rules! atomic_cell {
    ($(#[$doc:meta])* $name:ident, $atomic:ty, $prim:ty) => {
        $(#[$doc])*
        #[derive(Debug, Default)]
        pub struct $name($atomic);

        impl $name {
            /// Creates a new cell holding `value`.
            pub const fn new(value: $prim) -> Self {
                Self(<$atomic>::new(value))
            }

            /// Stores `value`.
            pub fn set(&self, value: $prim) {
                self.0.store(value, Ordering::SeqCst);
            }

            /// Adds `delta`, wrapping on overflow, and returns the new value.
            pub fn inc(&self, delta: $prim) -> $prim {
                self.0.fetch_add(delta, Ordering::SeqCst).wrapping_add(delta)
            }

            /// Returns the current value.
            pub fn value(&self) -> $prim {
                self.0.load(Ordering::SeqCst)
            }
        }

        impl Getter for $name {
            fn get(&self) -> Result<Value, Error> {
                Ok(Value::from(self.value()))
            }
        }

        impl Subtractor for $name {
            fn subtract(&self, delta: i64) {
                self.0.fetch_sub(delta as $prim, Ordering::SeqCst);
            }
        }
    };
}

atomic_cell!(
    /// An atomically updated `i32`.
    Int32,
    AtomicI32,
    i32
);

atomic_cell!(
    /// An atomically updated `i64`.
    Int64,
    AtomicI64,
    i64
);

atomic_cell!(
    /// An atomically updated `u32`.
    UInt32,
    AtomicU32,
    u32
);

atomic_cell!(
    /// An atomically updated `u64`.
    UInt64,
    AtomicU64,
    u64
);
