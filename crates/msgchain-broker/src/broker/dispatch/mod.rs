//! Command handling: admission, fan-out into HMI requests and folding of
//! HMI responses back into one mobile response.
//!
//! ## Structure
//!
//! - [`handler`] - [`handler::Dispatcher`] and its chain payload.

pub mod handler;
