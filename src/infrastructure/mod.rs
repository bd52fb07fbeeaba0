pub mod auth;
pub mod config;
pub mod image_provider;
pub mod payments;
pub mod repository;
pub mod storage;

pub use auth::*;
pub use config::*;
pub use image_provider::*;
pub use payments::*;
pub use repository::*;
pub use storage::*;
