//! Public extension contracts.
//!
//! Request objects are produced by a host-supplied [`RequestObjectBuilder`] so the crate stays
//! free of JOSE dependencies.

pub mod request_object;

pub use request_object::*;
