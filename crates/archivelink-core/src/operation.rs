//! Protocol operations and their fixed attributes
//!
//! Every ArchiveLink command maps to exactly one [`Operation`]. The expected
//! HTTP method and the access mode are properties of the operation itself,
//! never of the request.

use serde::{Deserialize, Serialize};

/// HTTP methods the protocol endpoint accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(format!("Unsupported HTTP method: {}", s)),
        }
    }
}

/// Class of access an operation performs
///
/// Encoded on the wire as a single letter (`accessMode=r`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Create,
    Update,
    Delete,
    Admin,
    None,
}

impl AccessMode {
    /// Single-letter protocol code; `None` has no letter
    pub fn code(&self) -> Option<char> {
        match self {
            AccessMode::Read => Some('r'),
            AccessMode::Create => Some('c'),
            AccessMode::Update => Some('u'),
            AccessMode::Delete => Some('d'),
            AccessMode::Admin => Some('a'),
            AccessMode::None => None,
        }
    }

    /// Parse a protocol letter; anything unrecognized is `None`
    pub fn from_code(code: char) -> Self {
        match code.to_ascii_lowercase() {
            'r' => AccessMode::Read,
            'c' => AccessMode::Create,
            'u' => AccessMode::Update,
            'd' => AccessMode::Delete,
            'a' => AccessMode::Admin,
            _ => AccessMode::None,
        }
    }

    /// True for modes that change repository content
    pub fn is_write(&self) -> bool {
        matches!(self, AccessMode::Create | AccessMode::Update)
    }
}

impl std::fmt::Display for AccessMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code() {
            Some(c) => write!(f, "{}", c),
            None => write!(f, "none"),
        }
    }
}

/// The closed set of ArchiveLink commands this gateway understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    Info,
    Get,
    DocGet,
    Search,
    AttrSearch,
    Create,
    MCreate,
    Update,
    Append,
    Delete,
    PutCert,
    ServerInfo,
}

impl Operation {
    /// Every operation, in catalogue order
    pub const ALL: [Operation; 12] = [
        Operation::Info,
        Operation::Get,
        Operation::DocGet,
        Operation::Search,
        Operation::AttrSearch,
        Operation::Create,
        Operation::MCreate,
        Operation::Update,
        Operation::Append,
        Operation::Delete,
        Operation::PutCert,
        Operation::ServerInfo,
    ];

    /// Command token as it appears in the query string
    pub fn command(&self) -> &'static str {
        match self {
            Operation::Info => "info",
            Operation::Get => "get",
            Operation::DocGet => "docGet",
            Operation::Search => "search",
            Operation::AttrSearch => "attrSearch",
            Operation::Create => "create",
            Operation::MCreate => "mCreate",
            Operation::Update => "update",
            Operation::Append => "append",
            Operation::Delete => "delete",
            Operation::PutCert => "putCert",
            Operation::ServerInfo => "serverInfo",
        }
    }

    /// Look up an operation by command token (case-insensitive)
    pub fn from_command(token: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.command().eq_ignore_ascii_case(token))
    }

    pub fn expected_method(&self) -> HttpMethod {
        match self {
            Operation::Info
            | Operation::Get
            | Operation::DocGet
            | Operation::Search
            | Operation::AttrSearch
            | Operation::ServerInfo => HttpMethod::Get,
            Operation::MCreate => HttpMethod::Post,
            Operation::Create | Operation::Update | Operation::Append | Operation::PutCert => {
                HttpMethod::Put
            }
            Operation::Delete => HttpMethod::Delete,
        }
    }

    pub fn access_mode(&self) -> AccessMode {
        match self {
            Operation::Info
            | Operation::Get
            | Operation::DocGet
            | Operation::Search
            | Operation::AttrSearch => AccessMode::Read,
            Operation::Create | Operation::MCreate => AccessMode::Create,
            Operation::Update | Operation::Append => AccessMode::Update,
            Operation::Delete => AccessMode::Delete,
            Operation::PutCert => AccessMode::Admin,
            Operation::ServerInfo => AccessMode::None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.command())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lookup_is_case_insensitive() {
        assert_eq!(Operation::from_command("docGet"), Some(Operation::DocGet));
        assert_eq!(Operation::from_command("DOCGET"), Some(Operation::DocGet));
        assert_eq!(Operation::from_command("mcreate"), Some(Operation::MCreate));
        assert_eq!(Operation::from_command("launchRocket"), None);
    }

    #[test]
    fn test_every_command_round_trips() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_command(op.command()), Some(op));
        }
    }

    #[test]
    fn test_write_operations() {
        assert!(Operation::Create.access_mode().is_write());
        assert!(Operation::Append.access_mode().is_write());
        assert!(!Operation::Delete.access_mode().is_write());
        assert!(!Operation::Get.access_mode().is_write());
    }

    #[test]
    fn test_expected_methods() {
        assert_eq!(Operation::Get.expected_method(), HttpMethod::Get);
        assert_eq!(Operation::MCreate.expected_method(), HttpMethod::Post);
        assert_eq!(Operation::Create.expected_method(), HttpMethod::Put);
        assert_eq!(Operation::Delete.expected_method(), HttpMethod::Delete);
    }

    #[test]
    fn test_access_mode_codes() {
        assert_eq!(AccessMode::from_code('R'), AccessMode::Read);
        assert_eq!(AccessMode::from_code('x'), AccessMode::None);
        assert_eq!(AccessMode::None.code(), None);
        assert_eq!(AccessMode::Delete.to_string(), "d");
    }

    #[test]
    fn test_http_method_parse() {
        assert_eq!("put".parse::<HttpMethod>(), Ok(HttpMethod::Put));
        assert!("PATCH".parse::<HttpMethod>().is_err());
    }
}
