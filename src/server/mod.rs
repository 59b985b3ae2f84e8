//! Socket-level server: worker threads, accept loops and the bundled handler.

pub mod demo;
pub mod listener;
pub mod worker;
