//! Per-utterance streaming recognition driver.

pub mod driver;

pub use driver::SessionDriver;
