//! Built-in check families.

pub mod aws;
pub mod http;
pub mod network;
pub mod script;
pub mod tls;
pub mod webhook;
