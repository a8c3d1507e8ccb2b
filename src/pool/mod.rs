pub mod future;
pub mod worker;


pub use future::*;
pub use worker::*;
