//! RADIUS attributes and the attribute type registry

mod attribute;
mod types;

pub use attribute::{Attribute, VendorSpecific};
pub use types::AttributeType;
