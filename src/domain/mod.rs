pub mod account;
pub mod catalog;
pub mod image;
pub mod purchase;

pub use account::*;
pub use catalog::*;
pub use image::*;
pub use purchase::*;
