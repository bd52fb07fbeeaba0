pub mod gallery;
pub mod generation;
pub mod ledger;
pub mod monetization;
pub mod retention;

pub use gallery::*;
pub use generation::*;
pub use ledger::*;
pub use monetization::*;
pub use retention::*;
