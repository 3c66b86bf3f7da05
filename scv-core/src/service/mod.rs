pub mod injector;
pub mod manager;
mod target;

pub use injector::Injector;
pub use manager::{Manager, TargetOccupancy};
