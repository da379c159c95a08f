pub mod gateway;
pub mod keys;
pub mod memory;
pub mod traits;

pub use gateway::{EditGeneration, HydrationGuard, WriteGateway};
pub use memory::MemoryStore;
pub use traits::KeyValueStore;
