//! Command resolution from raw query strings
//!
//! An ArchiveLink URL carries the whole protocol payload in its query
//! string: the command token first, then `name=value` pairs:
//!
//! ```text
//! ?get&contRep=K1&docId=4711&accessMode=r&authId=CN%3DSAP&expiration=20301231235959&secKey=...
//! ```
//!
//! Parsing is lenient. Pairs that do not split into exactly one non-empty
//! name and one non-empty value are dropped, and the last occurrence of a
//! name wins. Values stay percent-encoded until a caller asks for them
//! decoded.

use std::collections::HashMap;

use percent_encoding::percent_decode_str;
use tracing::debug;

use crate::error::{CoreError, Result};
use crate::operation::{AccessMode, HttpMethod, Operation};

/// Name of the parameter carrying the URL signature
pub const SIGNATURE_PARAM: &str = "secKey";

/// Charset assumed when the request does not name one
pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Split a query string into its well-formed `name=value` pairs
pub fn parse_parameters(query: &str) -> HashMap<String, String> {
    let mut parameters = HashMap::new();
    for (name, value) in pairs(query) {
        parameters.insert(name.to_string(), value.to_string());
    }
    parameters
}

/// Well-formed pairs in query order
fn pairs(query: &str) -> impl Iterator<Item = (&str, &str)> {
    query.split('&').filter_map(|segment| {
        let parts: Vec<&str> = segment.split('=').collect();
        match parts.as_slice() {
            [name, value] if !name.is_empty() && !value.is_empty() => Some((*name, *value)),
            _ => None,
        }
    })
}

/// Percent-decode a raw parameter value and interpret it in `charset`
///
/// `+` is left alone: signature values are base64 and keep their plus signs.
pub fn decode_value(raw: &str, charset: &str) -> Result<String> {
    let bytes: Vec<u8> = percent_decode_str(raw).collect();
    match normalize_charset(charset).as_str() {
        "utf-8" | "utf8" => String::from_utf8(bytes).map_err(|e| {
            CoreError::Encoding(format!("Parameter value is not valid UTF-8: {}", e))
        }),
        "iso-8859-1" | "iso8859-1" | "latin1" | "latin-1" => {
            Ok(bytes.iter().map(|&b| b as char).collect())
        }
        _ => Ok(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

fn normalize_charset(charset: &str) -> String {
    charset.trim().trim_matches('"').to_ascii_lowercase()
}

/// Extract the command token: the first segment without `=`
fn command_token(query: &str) -> Option<&str> {
    query
        .split('&')
        .find(|segment| !segment.is_empty() && !segment.contains('='))
}

/// A resolved protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    operation: Operation,
    method: HttpMethod,
    parameters: HashMap<String, String>,
    query: String,
    charset: String,
}

impl Command {
    /// Create a command, rejecting an HTTP method the operation does not accept
    pub fn new(
        operation: Operation,
        method: HttpMethod,
        parameters: HashMap<String, String>,
    ) -> Result<Self> {
        let expected = operation.expected_method();
        if method != expected {
            return Err(CoreError::protocol(format!(
                "HTTP method {} does not match the expected method {} for command '{}'",
                method, expected, operation
            )));
        }

        Ok(Self {
            operation,
            method,
            parameters,
            query: String::new(),
            charset: DEFAULT_CHARSET.to_string(),
        })
    }

    /// Attach the normalized raw query this command was parsed from
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Attach the request charset used by [`Command::decoded`]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn access_mode(&self) -> AccessMode {
        self.operation.access_mode()
    }

    pub fn parameters(&self) -> &HashMap<String, String> {
        &self.parameters
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Raw (still percent-encoded) parameter value
    pub fn param(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Percent-decoded parameter value in the request charset
    pub fn decoded(&self, name: &str) -> Result<Option<String>> {
        self.param(name)
            .map(|raw| decode_value(raw, &self.charset))
            .transpose()
    }

    /// Repository the command addresses
    pub fn repository(&self) -> Option<&str> {
        self.param("contRep")
    }

    /// Rebuild the query in original order without the named parameters
    pub fn canonical_query(&self, strip: &[&str]) -> String {
        self.query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .filter(|segment| {
                let name = segment.split('=').next().unwrap_or_default();
                !strip.contains(&name)
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// The message an ArchiveLink signed URL signs
    ///
    /// Decoded values of every parameter before `secKey`, concatenated in
    /// query order without separators.
    pub fn signed_message(&self) -> Result<Vec<u8>> {
        let mut message = String::new();
        for (name, value) in pairs(&self.query) {
            if name == SIGNATURE_PARAM {
                break;
            }
            message.push_str(&decode_value(value, &self.charset)?);
        }
        Ok(message.into_bytes())
    }

    /// Names of the well-formed parameters following `secKey`
    ///
    /// None of these are covered by the signature, and any of them would
    /// override a signed value of the same name.
    pub fn unsigned_parameters(&self) -> Vec<&str> {
        pairs(&self.query)
            .map(|(name, _)| name)
            .skip_while(|name| *name != SIGNATURE_PARAM)
            .skip(1)
            .collect()
    }
}

/// Resolve an HTTP method and raw query string into a [`Command`]
pub fn resolve(method: HttpMethod, query: &str, charset: &str) -> Result<Command> {
    let token = command_token(query)
        .ok_or_else(|| CoreError::protocol("unsupported command: no command in query string"))?;

    let operation = Operation::from_command(token)
        .ok_or_else(|| CoreError::protocol(format!("unsupported command '{}'", token)))?;

    let command = Command::new(operation, method, parse_parameters(query))?
        .with_query(query)
        .with_charset(charset);

    debug!(
        operation = %operation,
        method = %method,
        access_mode = %command.access_mode(),
        params = command.parameters().len(),
        "Resolved command"
    );

    Ok(command)
}
