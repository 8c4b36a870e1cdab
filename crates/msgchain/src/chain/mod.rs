mod record;
mod status;
mod store;

pub use record::*;
pub use status::*;
pub use store::*;
