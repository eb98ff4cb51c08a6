//! Grant envelopes, scope sets, and redacted token secrets.

pub mod grant;
pub mod scope;
pub mod secret;

pub use grant::*;
pub use scope::*;
pub use secret::*;
