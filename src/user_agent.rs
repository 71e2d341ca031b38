//! User-Agent string sent by the session for catalog, asset and login requests.

/// Project URL advertised in the User-Agent.
const PROJECT_UA_URL: &str = "https://github.com/jlhg/mox";

/// Default User-Agent for every session request.
#[must_use]
pub(crate) fn default_session_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("mox/{version} (+{PROJECT_UA_URL})")
}
