//! Route handlers

pub mod detect;
pub mod drivers;
pub mod stream;
