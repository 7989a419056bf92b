pub mod memory;
pub mod postgres;
pub mod simulated;

pub use memory::MemoryOrderStore;
pub use postgres::PostgresStore;
pub use simulated::{SimulatedQuoteProvider, SimulatedVenue};
