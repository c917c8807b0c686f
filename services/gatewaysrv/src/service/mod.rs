pub mod reconnect;
pub mod sampler;
pub mod store;

pub use store::{DataPoint, DataPointStore, StoreEntry};
