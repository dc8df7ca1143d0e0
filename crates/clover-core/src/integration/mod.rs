//! Integration layer: channel provider registries and the cross-plugin adapter.

pub mod adapter;
pub mod registry;

pub use adapter::Adapter;
pub use registry::{Provider, ProviderFuture, ProviderRegistry, Sender, SenderFuture, select_inputs};
