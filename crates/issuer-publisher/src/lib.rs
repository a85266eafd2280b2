#![forbid(unsafe_code)]

mod bindings;
mod chain;
mod publisher;

pub use bindings::StateTransitionContract;
pub use chain::{ChainPublisher, EthersChainPublisher};
pub use publisher::{Publisher, TransitionRequest, ZkProofTriple};

pub use ethers::types::{Address, H256, U256};
