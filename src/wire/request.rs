//! Request construction.
//!
//! Remote calls are built from a small fixed set of templates parameterized
//! only by validated identifiers or JSON text, never by raw caller strings,
//! so a variable name cannot smuggle arbitrary code into the companion.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::wire::WireError;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
    })
}

/// Check that `name` is a valid Python identifier.
///
/// # Errors
///
/// Returns [`WireError::InvalidIdentifier`] if the name does not match
/// `^[A-Za-z_][A-Za-z0-9_]*$`.
pub fn validate_identifier(name: &str) -> Result<(), WireError> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(WireError::InvalidIdentifier(name.to_string()))
    }
}

/// Build an execute request from a batch of statements.
///
/// Statements are joined with newlines into one text block; the companion
/// runs the block as a unit and replies with everything it printed.
#[must_use]
pub fn exec_request(statements: &[String]) -> String {
    statements.join("\n")
}

/// Build a get-variable request.
///
/// The companion serializes the named variable through its JSON hook and
/// prints the result as a single line.
///
/// # Errors
///
/// Returns [`WireError::InvalidIdentifier`] if `name` is not a valid
/// identifier.
pub fn get_request(name: &str) -> Result<String, WireError> {
    validate_identifier(name)?;
    Ok(format!("print(PYSOCK_JSON_DUMPS({name}))"))
}

/// Build a set-variables request from a mapping of name to JSON value.
///
/// All names are validated before any serialization happens, so a bad name
/// fails the whole call with no bytes sent. The mapping is serialized to one
/// JSON object and routed through the companion's JSON-load hook; embedding
/// the object as a string literal keeps JSON-only literals such as `true`
/// and `null` out of Python source.
///
/// # Errors
///
/// Returns [`WireError::InvalidIdentifier`] for the first invalid name, or
/// [`WireError::Decode`] if the mapping cannot be serialized.
pub fn set_request<'a, I>(variables: I) -> Result<String, WireError>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut object = serde_json::Map::new();
    for (name, value) in variables {
        validate_identifier(name)?;
        object.insert(name.to_string(), value.clone());
    }
    let json = serde_json::to_string(&Value::Object(object))?;
    // A JSON-encoded string is also a valid Python string literal.
    let literal = serde_json::to_string(&json)?;
    Ok(format!("locals().update(PYSOCK_JSON_LOADS({literal}))"))
}
