//! Command implementations.

pub mod append;
pub mod config;
pub mod consequence;
pub mod forsering;
pub mod grade;
pub mod log;
pub mod preclusion;
pub mod status;

pub use self::append::execute_append;
pub use self::config::execute_config;
pub use self::consequence::execute_consequence;
pub use self::forsering::execute_forsering;
pub use self::grade::execute_grade;
pub use self::log::{execute_cases, execute_log};
pub use self::preclusion::execute_preclusion;
pub use self::status::execute_status;
