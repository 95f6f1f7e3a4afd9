pub mod definition;
pub mod registry;

pub use definition::{ShopDefinition, ShopStockEntry};
pub use registry::ShopRegistry;
