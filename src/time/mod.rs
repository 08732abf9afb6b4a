//! Reactor-backed time utilities.
//!
//! The I/O layer builds no timeout policy into its operations; these
//! primitives are the composable pieces left to callers:
//! - [`sleep`] schedules a wake-up on a reactor's timer queue,
//! - [`timeout`] races any future against a sleep and cancels it on
//!   expiry.

mod sleep;
mod timeout;

pub use sleep::{Sleep, sleep, sleep_with};
pub use timeout::{Timeout, timeout};
