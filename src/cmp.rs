//! Consent management: from banner categories to a published TC string.
//!
//! [`ConsentManager`] is the entry point. It is wired to its collaborators
//! through [`CmpServices`]; [`TcfApiStub`] is the `__tcfapi` global that
//! third-party scripts call, before and after the manager is ready.

mod api;
mod categories;
mod clock;
mod codec;
mod manager;
mod publisher;
mod stub;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use api::{
    CmpApi, CmpResponse, CmpStatus, ConsentVector, DisplayStatus, EventStatus, PingReturn, PublisherData, TcData,
    TcfCallback, TcfCommand, API_VERSION, SUPPORTED_VERSION,
};
pub use categories::{purposes_for, special_features_for, Category, UnknownCategory, NECESSARY_PURPOSES};
pub use clock::{Clock, SystemClock};
pub use codec::{CmpIdentity, ConsentCodec, TcfCodec, Upgrade};
pub use manager::{CmpServices, ConsentManager, ConsentUpdate, LifecycleState};
pub use publisher::{SubscriptionId, TcStringCallback, TcStringPublisher, Unsubscribe};
pub use stub::{StubCall, TcfApiStub};

pub use crate::errors::CmpError;
