//! # Kernel Event Tracing
//!
//! With the `defmt` feature enabled, scheduler events — task creation,
//! context switches, blocking, tickless spans — are emitted as `defmt`
//! trace frames over the probe link. Without the feature every trace
//! point compiles to nothing.

#[cfg(feature = "defmt")]
macro_rules! trace {
    ($($arg:tt)*) => {
        defmt::trace!($($arg)*)
    };
}

#[cfg(not(feature = "defmt"))]
macro_rules! trace {
    ($($arg:tt)*) => {{}};
}

pub(crate) use trace;
