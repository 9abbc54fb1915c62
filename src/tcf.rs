//! TCF consent model and its compact string form.
//!
//! [`TcModel`] holds every field a TC string carries. [`TcString`] converts between
//! the two. [`VendorList`] is the Global Vendor List the model is validated against,
//! retrieved through a [`VendorListSource`].

mod bits;
mod errors;
mod id_set;
mod model;
mod string;
pub mod vendor_list;

pub use errors::{TcStringError, VendorListError};
pub use id_set::IdSet;
pub use model::{
    day_stamp, PublisherRestriction, PublisherSegment, RestrictionType, TcModel, PURPOSE_BITS,
    SPECIAL_FEATURE_BITS,
};
pub use string::{TcString, TC_STRING_VERSION};
pub use vendor_list::{Declaration, HttpVendorListSource, Vendor, VendorList, VendorListSource};
