use reqwest::Url;

use crate::error::CoreError;

/// Validate a configured node host and normalise it for path joining.
///
/// Accepts `http://` and `https://` base URLs; a trailing slash is removed
/// so that `host + API_PATH` never doubles it.
pub(crate) fn parse_host(host: &str) -> Result<String, CoreError> {
    let trimmed = host.trim();
    let parsed = Url::parse(trimmed).map_err(|e| {
        CoreError::Config(format!(
            "invalid node host `{trimmed}`: expected HTTP(S) URL ({e})"
        ))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_owned()),
        other => Err(CoreError::Config(format!(
            "unsupported node host scheme `{other}`; expected http or https"
        ))),
    }
}
