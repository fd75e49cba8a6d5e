pub mod command;
pub mod config;
pub mod error;
pub mod grouper;
pub mod installer;
pub mod schedule;
pub mod spat;

pub use error::{Result, TspError};
