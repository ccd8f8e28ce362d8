mod api;
mod runtime;
pub mod utils;

pub use utils::{test_db, test_utils};
