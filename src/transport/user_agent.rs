//! User-Agent augmentation from request-scoped metadata.

// self
use crate::{
	_prelude::*,
	transport::{HttpRequest, HttpTransport, TransportFuture},
};

/// Request-scoped metadata rendered into extra `User-Agent` segments.
///
/// Attached with [`add_user_agent_extra`], never through a header set by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserAgentExtra {
	/// Kind of object being operated on (`Type/…`).
	pub kind: String,
	/// Object name (`Name/…`).
	pub name: String,
	/// Operation label (`Operation/…`).
	pub operation: String,
	/// Location of the calling script (`ScriptLocation/…`).
	pub script_location: String,
	/// Free-form extra segments, rendered in key order.
	pub extras: BTreeMap<String, String>,
}
impl UserAgentExtra {
	/// Overlays `other` on `self`.
	///
	/// Non-empty scalar fields of `other` win; `extras` is the union of both maps with
	/// `other` winning on shared keys.
	pub fn combine(&self, other: &Self) -> Self {
		let pick = |base: &String, over: &String| {
			if over.is_empty() { base.clone() } else { over.clone() }
		};
		let mut extras = self.extras.clone();

		extras.extend(other.extras.iter().map(|(key, value)| (key.clone(), value.clone())));

		Self {
			kind: pick(&self.kind, &other.kind),
			name: pick(&self.name, &other.name),
			operation: pick(&self.operation, &other.operation),
			script_location: pick(&self.script_location, &other.script_location),
			extras,
		}
	}

	/// Renders non-empty fields as space-separated `Key/Value` segments.
	pub fn to_header_value(&self) -> String {
		let fixed = [
			("Type", &self.kind),
			("Name", &self.name),
			("Operation", &self.operation),
			("ScriptLocation", &self.script_location),
		];

		fixed
			.into_iter()
			.chain(self.extras.iter().map(|(key, value)| (key.as_str(), value)))
			.filter(|(_, value)| !value.is_empty())
			.map(|(key, value)| format!("{key}/{value}"))
			.collect::<Vec<_>>()
			.join(" ")
	}
}

/// Attaches `extra` to `request`, combining with any value already present.
pub fn add_user_agent_extra(request: &mut HttpRequest, extra: UserAgentExtra) {
	let combined = match request.extensions().get::<UserAgentExtra>() {
		Some(existing) => existing.combine(&extra),
		None => extra,
	};

	request.extensions_mut().insert(combined);
}

/// Reads the metadata attached to `request`, if any.
pub fn read_user_agent_extra(request: &HttpRequest) -> Option<&UserAgentExtra> {
	request.extensions().get::<UserAgentExtra>()
}

/// Appends request-scoped [`UserAgentExtra`] segments to the `User-Agent` header.
#[derive(Clone, Debug)]
pub struct UserAgentTransport<T> {
	inner: T,
	enabled: bool,
}
impl<T> UserAgentTransport<T> {
	/// Wraps `inner`; `enabled = false` makes the node a passthrough.
	pub fn new(inner: T, enabled: bool) -> Self {
		Self { inner, enabled }
	}
}
impl<T> HttpTransport for UserAgentTransport<T>
where
	T: HttpTransport,
{
	fn round_trip(&self, mut request: HttpRequest) -> TransportFuture<'_> {
		if self.enabled {
			let segments = read_user_agent_extra(&request)
				.map(UserAgentExtra::to_header_value)
				.unwrap_or_default();

			if !segments.is_empty() {
				let appended =
					append_segments(request.headers().get(http::header::USER_AGENT), &segments);

				match appended {
					Some(value) => {
						request.headers_mut().insert(http::header::USER_AGENT, value);
					},
					None => {
						tracing::warn!(%segments, "User-Agent extra could not be appended.");
					},
				}
			}
		}

		self.inner.round_trip(request)
	}
}

/// Joins `segments` onto `base`; `None` leaves the header as sent.
fn append_segments(base: Option<&http::HeaderValue>, segments: &str) -> Option<http::HeaderValue> {
	let combined = match base.map(http::HeaderValue::to_str) {
		None | Some(Ok("")) => segments.to_owned(),
		Some(Ok(base)) => format!("{base} {segments}"),
		Some(Err(_)) => return None,
	};

	http::HeaderValue::from_str(&combined).ok()
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::_preludet::{ScriptedTransport, get};

	fn extra(name: &str, operation: &str) -> UserAgentExtra {
		UserAgentExtra { name: name.into(), operation: operation.into(), ..Default::default() }
	}

	#[test]
	fn combine_overrides_non_empty_fields() {
		assert_eq!(extra("B", "C").combine(&extra("Y", "Z")), extra("Y", "Z"));
		assert_eq!(extra("B", "C").combine(&UserAgentExtra::default()), extra("B", "C"));
		assert_eq!(extra("B", "C").combine(&extra("", "Z")), extra("B", "Z"));
	}

	#[test]
	fn combine_unions_extras() {
		let mut base = extra("B", "");
		let mut over = UserAgentExtra::default();

		base.extras.insert("Provider".into(), "aws".into());
		base.extras.insert("Mode".into(), "old".into());
		over.extras.insert("Mode".into(), "new".into());

		let combined = base.combine(&over);

		assert_eq!(combined.extras.get("Provider").map(String::as_str), Some("aws"));
		assert_eq!(combined.extras.get("Mode").map(String::as_str), Some("new"));
		assert_eq!(combined.name, "B");
	}

	#[test]
	fn header_value_skips_empty_segments() {
		let mut value = UserAgentExtra {
			kind: "cluster".into(),
			operation: "create".into(),
			..Default::default()
		};

		value.extras.insert("Empty".into(), String::new());
		value.extras.insert("Alpha".into(), "1".into());

		assert_eq!(value.to_header_value(), "Type/cluster Operation/create Alpha/1");
	}

	#[tokio::test]
	async fn appends_segments_from_request_metadata() {
		let scripted = Arc::new(ScriptedTransport::default());
		let node = UserAgentTransport::new(Arc::clone(&scripted), true);
		let mut request = get("https://example.com/");

		request.headers_mut().insert(http::header::USER_AGENT, http::HeaderValue::from_static("base/1.0"));
		add_user_agent_extra(&mut request, extra("N", ""));
		add_user_agent_extra(&mut request, extra("", "Op"));
		node.round_trip(request).await.expect("Scripted OK.");

		let plain = get("https://example.com/");

		node.round_trip(plain).await.expect("Scripted OK.");

		let requests = scripted.requests();

		assert_eq!(requests[0].headers()[http::header::USER_AGENT], "base/1.0 Name/N Operation/Op");
		assert!(requests[1].headers().get(http::header::USER_AGENT).is_none());
	}

	#[tokio::test]
	async fn opaque_base_header_is_kept() {
		let scripted = Arc::new(ScriptedTransport::default());
		let node = UserAgentTransport::new(Arc::clone(&scripted), true);
		let mut request = get("https://example.com/");
		let base = http::HeaderValue::from_bytes(b"atlas-transport/1.0 caf\xe9")
			.expect("Obs-text is a valid header value.");

		request.headers_mut().insert(http::header::USER_AGENT, base.clone());
		add_user_agent_extra(&mut request, extra("N", "Op"));
		node.round_trip(request).await.expect("Scripted OK.");

		assert_eq!(scripted.requests()[0].headers()[http::header::USER_AGENT], base);
	}

	#[tokio::test]
	async fn disabled_node_leaves_header_untouched() {
		let scripted = Arc::new(ScriptedTransport::default());
		let node = UserAgentTransport::new(Arc::clone(&scripted), false);
		let mut request = get("https://example.com/");

		request.headers_mut().insert(http::header::USER_AGENT, http::HeaderValue::from_static("base/1.0"));
		add_user_agent_extra(&mut request, extra("N", "Op"));
		node.round_trip(request).await.expect("Scripted OK.");

		assert_eq!(scripted.requests()[0].headers()[http::header::USER_AGENT], "base/1.0");
	}
}
