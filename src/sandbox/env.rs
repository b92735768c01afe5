//! Environment scrubbing for the child process.

/// Keep only the variables whose names are on `allowlist`.
///
/// The child's environment is built from this list alone; everything else in
/// the host environment (API keys, database URLs, tokens) never reaches it.
pub fn scrub_environment<I, K, V>(host: I, allowlist: &[String]) -> Vec<(String, String)>
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    host.into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .filter(|(key, _)| allowlist.iter().any(|allowed| allowed == key))
        .collect()
}

/// Scrub the current process environment.
///
/// Variables that are not valid Unicode are dropped.
pub fn scrubbed_host_environment(allowlist: &[String]) -> Vec<(String, String)> {
    let host = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)));
    scrub_environment(host, allowlist)
}
