#![doc = include_str!("../README.md")]

mod allocator;
mod chain;
mod coordinator;
mod error;
mod id;
mod mutex;
mod request;
mod time;

pub use crate::allocator::*;
pub use crate::chain::*;
pub use crate::coordinator::*;
pub use crate::error::*;
pub use crate::id::*;
pub use crate::request::*;
pub use crate::time::*;
