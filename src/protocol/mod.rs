//! Network protocol parsing
//!
//! The decision engine decodes delivered packets up to the IP layer;
//! nothing above L3 is interpreted here.

mod cidr;
pub mod ipv4;
pub mod ipv6;

pub use cidr::{IpCidr, Ipv4Cidr, Ipv6Cidr};
