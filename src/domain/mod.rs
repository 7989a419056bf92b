pub mod order;
pub mod quote;
pub mod state;
pub mod update;

pub use order::*;
pub use quote::*;
pub use state::*;
pub use update::*;
