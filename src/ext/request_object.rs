//! Request-object contract used when the authorization request travels as a signed object.

// self
use crate::message::AuthorizationRequest;

/// Boxed error returned by [`RequestObjectBuilder`] implementations.
pub type RequestObjectError = Box<dyn std::error::Error + Send + Sync>;

/// Serializes (and usually signs) an authorization request into an OpenID request object.
///
/// The consumer calls the builder for the `parameter` and `file` request methods and never
/// for `simple`. The returned string is used verbatim as the `request` parameter or as the
/// request file contents, so signing and encryption stay entirely with the implementer.
pub trait RequestObjectBuilder
where
	Self: Send + Sync,
{
	/// Builds the request object for `request` using the configured `key`.
	fn build(&self, request: &AuthorizationRequest, key: &str) -> Result<String, RequestObjectError>;
}
impl<F> RequestObjectBuilder for F
where
	F: Send + Sync + Fn(&AuthorizationRequest, &str) -> Result<String, RequestObjectError>,
{
	fn build(&self, request: &AuthorizationRequest, key: &str) -> Result<String, RequestObjectError> {
		self(request, key)
	}
}
