mod adapter;
mod client;
mod json_rpc;

pub use adapter::*;
pub use client::*;
pub use json_rpc::*;

#[cfg(test)]
mod adapter_test;
#[cfg(test)]
mod json_rpc_test;
