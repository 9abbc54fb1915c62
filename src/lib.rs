pub mod cmp;
pub mod config;
pub mod cookies;
pub mod errors;
pub mod net;
pub mod tcf;

pub use cmp::{CmpServices, ConsentManager, ConsentUpdate, LifecycleState, TcfApiStub};
pub use config::{CmpConfig, CmpConfigError};
pub use errors::CmpError;
