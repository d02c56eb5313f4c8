pub mod domain;
pub mod error;
pub mod ports;

pub use domain::*;
pub use error::{Error, Result};
