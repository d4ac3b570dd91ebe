mod api;
mod config;
mod registry;
mod utils;

pub use utils::test_utils;
