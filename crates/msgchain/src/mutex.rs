// parking_lot mutexes do not poison, so no lock error ever crosses the
// chaining core's boundary.
pub(crate) use parking_lot::{Mutex, MutexGuard};
