//! Optional observability helpers for consumer operations.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oidc_consumer.flow` with the `flow`
//!   (operation family) and `stage` (call site) fields, plus debug events for consumers
//!   configured with `debug = true`.
//! - Enable `metrics` to increment the `oidc_consumer_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Operation families observed by the consumer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Authorization request construction.
	Begin,
	/// Authorization callback handling.
	Callback,
	/// Authorization code redemption.
	TokenExchange,
	/// Userinfo retrieval.
	UserInfo,
	/// Issuer and provider configuration discovery.
	Discovery,
	/// Dynamic client registration.
	Registration,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Begin => "begin",
			FlowKind::Callback => "callback",
			FlowKind::TokenExchange => "token_exchange",
			FlowKind::UserInfo => "userinfo",
			FlowKind::Discovery => "discovery",
			FlowKind::Registration => "registration",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a consumer operation.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
