pub mod group;
pub mod managed;
pub mod types;

#[cfg(test)]
mod tests;

pub use group::*;
pub use managed::*;
pub use types::*;
