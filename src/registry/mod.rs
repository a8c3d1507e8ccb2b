//! Central registry tying tasks, groups, pools and primitives together.

pub mod manager;
pub mod session_log;
pub mod types;


pub use manager::*;
pub use session_log::read_session_log;
pub use types::*;
