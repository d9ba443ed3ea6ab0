//! Gateway implementations

pub mod global_collect;
pub mod pay_dollar;

pub use global_collect::{GlobalCollectConfig, GlobalCollectGateway};
pub use pay_dollar::{PayDollarConfig, PayDollarGateway};
