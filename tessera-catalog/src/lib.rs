pub mod inventory;
pub mod schedule;

pub use inventory::{InMemoryInventory, InventoryLevel};
pub use schedule::SalesPolicy;
