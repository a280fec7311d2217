//! Calltrack - price resolution and performance scoring for public bull/bear calls

pub mod config;
pub mod error;
pub mod services;
pub mod sources;
pub mod types;

pub use config::Config;
pub use error::{AppError, Result};
pub use services::PriceService;
pub use types::*;
