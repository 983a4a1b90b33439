//! Supporting macros shared across modules.

/// Trace a frontend/backend message when the `log` feature is enabled.
macro_rules! verbose {
    ($($tt:tt)*) => {
        #[cfg(feature = "log")]
        log::trace!($($tt)*)
    };
}

pub(crate) use verbose;
