//! The L7 reverse proxy: target extraction, fault injection, and forwarding.

mod client;
mod fault;
mod forwarding;
mod headers;
mod response_ext;
mod server;
mod target;

pub use server::HttpProxyServer;
