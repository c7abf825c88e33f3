//! Secret-phrase scrubbing for rendered error and log text.
//!
//! The node API takes the account seed as a `secretPhrase` query parameter,
//! so transport errors and echoed request bodies can carry it verbatim.

const SECRET_KEY: &str = "secretPhrase=";

fn is_terminator(c: char) -> bool {
    c == '"' || c == '&'
}

/// Remove every `secretPhrase=` payload from `input`.
///
/// The key is kept and followed directly by the terminator (`"` or `&`)
/// that ended the payload. When no terminator follows, the key and the
/// rest of the input are dropped.
pub fn scrub_secrets(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find(SECRET_KEY) {
        let payload_start = start + SECRET_KEY.len();
        match rest[payload_start..].find(is_terminator) {
            Some(len) => {
                out.push_str(&rest[..payload_start]);
                rest = &rest[payload_start + len..];
            }
            None => {
                out.push_str(&rest[..start]);
                return out;
            }
        }
    }

    out.push_str(rest);
    out
}
