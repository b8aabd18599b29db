//! Utility macros and functions for the response crate.
//!
//! This module provides helper macros and functions that are used internally
//! by the response pipeline implementation.

/// A macro for early returns with an error if a condition is not met.
///
/// This is similar to the `assert!` macro, but returns an error instead of panicking.
/// It's used for state checks on the response, where a misuse by the caller must be
/// reported before any malformed bytes reach the transport.
///
/// # Arguments
///
/// * `$predicate` - A boolean expression that should evaluate to true
/// * `$error` - The error value to return if the predicate is false
///
/// # Example
///
/// ```ignore
/// ensure!(self.state.is_mutable(), SendError::HeadersSent);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
