use percent_encoding::percent_decode_str;
use crate::utils::{PipelineError, PipelineResult};

/// Returns the first parameter, failing with `what` when it is missing or empty.
pub fn require_first<'a>(params: &'a [String], what: &str) -> PipelineResult<&'a str> {
    match params.first() {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(PipelineError::argument(format!("{} can not be empty", what))),
    }
}

/// Fails unless at least `min` lookup parameters were supplied.
pub fn require_params(params: &[String], min: usize, source: &str) -> PipelineResult<()> {
    if params.len() < min {
        return Err(PipelineError::argument(format!(
            "{} source expects at least {} parameter(s), got {}",
            source, min, params.len()
        )));
    }
    Ok(())
}

/// Integer argument of the DSL; anything unparsable becomes 0.
pub fn int_or_zero(value: Option<&String>) -> i64 {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// Decodes a query-escaped DSL argument (`+` is a space, `%XX` a byte).
///
/// Malformed escapes and non UTF-8 results are argument errors.
pub fn query_unescape(value: &str) -> PipelineResult<String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.len() > i + 2
                && bytes[i + 1].is_ascii_hexdigit()
                && bytes[i + 2].is_ascii_hexdigit();
            if !valid {
                return Err(PipelineError::argument(format!("invalid URL escape in {:?}", value)));
            }
            i += 3;
        } else {
            i += 1;
        }
    }

    let spaced = value.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| PipelineError::argument(format!("invalid URL escape in {:?}: {}", value, e)))
}
