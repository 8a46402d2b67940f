pub mod api;
pub mod models;
pub mod selection;
pub mod state;
pub mod stats;
pub mod store;

pub use api::{ExpenseApi, HttpExpenseApi};
pub use models::*;
pub use selection::SelectionSet;
pub use state::{ExpenseState, FetchGeneration};
pub use stats::{ExpenseStats, SelectionSummary};
pub use store::ExpenseStore;
