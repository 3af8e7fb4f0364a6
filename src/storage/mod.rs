//! SQLite storage backends for user contexts

mod append_log;
mod single_slot;

pub use append_log::AppendLogStorage;
pub use single_slot::SingleSlotStorage;
