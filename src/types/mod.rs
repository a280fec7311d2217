pub mod asset;
pub mod cache_key;
pub mod performance;
pub mod price;

pub use asset::*;
pub use cache_key::*;
pub use performance::*;
pub use price::*;
