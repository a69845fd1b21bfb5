//! Adapters binding the ports to real infrastructure.

pub mod http;
pub mod kafka;
pub mod postgres;
