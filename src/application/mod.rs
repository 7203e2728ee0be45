//! Application services: artifact store and print orchestration.

pub mod clock;
pub mod error;
pub(crate) mod lock;
pub mod print;
pub mod render;
pub mod store;
