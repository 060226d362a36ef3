//! Request and response types for the dispatcher

use archivelink_core::{command::DEFAULT_CHARSET, Certificate};
use std::collections::HashMap;

/// Header carrying the error message of a failed command
pub const ERROR_DESCRIPTION_HEADER: &str = "X-ErrorDescription";

/// A raw HTTP request as the gateway hands it to the dispatcher
#[derive(Debug, Clone, Default)]
pub struct CommandRequest {
    /// HTTP method name as received
    pub method: String,

    /// Raw query string (may still carry a leading `?`)
    pub query: String,

    /// Charset from the request's `Content-Type`
    pub charset: String,

    /// Request headers, names lowercased
    pub headers: HashMap<String, String>,

    pub body: Vec<u8>,
}

impl CommandRequest {
    pub fn new(method: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            query: query.into(),
            charset: DEFAULT_CHARSET.to_string(),
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        let name = name.to_ascii_lowercase();
        if name == "content-type" {
            let value = value.into();
            self.charset = charset_from_content_type(Some(&value));
            self.headers.insert(name, value);
        } else {
            self.headers.insert(name, value.into());
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// Extract the `charset` attribute of a `Content-Type` value
///
/// Attribute names match case-insensitively; quotes are stripped. Falls back
/// to UTF-8.
pub fn charset_from_content_type(content_type: Option<&str>) -> String {
    content_type
        .into_iter()
        .flat_map(|value| value.split(';'))
        .filter_map(|attribute| attribute.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches('"').to_string())
        .filter(|charset| !charset.is_empty())
        .unwrap_or_else(|| DEFAULT_CHARSET.to_string())
}

/// What a handler sees besides the command itself
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Request headers, names lowercased
    pub headers: HashMap<String, String>,

    pub body: Vec<u8>,

    /// Certificate that verified the signed URL, if one was required
    pub signer: Option<Certificate>,
}

impl RequestContext {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// One component of a multipart document response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPart {
    pub component_id: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Response produced by a handler or by the dispatcher itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    status: u16,
    content_type: Option<String>,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl CommandResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            content_type: None,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Plain text body
    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status)
            .with_content_type("text/plain; charset=UTF-8")
            .with_body(body.into().into_bytes())
    }

    /// HTML body with status 200
    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200)
            .with_content_type("text/html; charset=UTF-8")
            .with_body(body.into().into_bytes())
    }

    /// Document stream, optionally offered as a download
    pub fn document(
        data: impl Into<Vec<u8>>,
        content_type: impl Into<String>,
        attachment: Option<&str>,
    ) -> Self {
        let response = Self::new(200)
            .with_content_type(content_type)
            .with_body(data);
        match attachment {
            Some(filename) => response.with_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", filename.replace('"', "")),
            ),
            None => response,
        }
    }

    /// Multipart document set with a generated boundary
    pub fn multipart(parts: &[DocumentPart]) -> Self {
        let boundary = format!("archivelink-{}", uuid::Uuid::new_v4().simple());

        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
            body.extend_from_slice(format!("Content-Type: {}\r\n", part.content_type).as_bytes());
            body.extend_from_slice(format!("X-compId: {}\r\n", part.component_id).as_bytes());
            body.extend_from_slice(
                format!("Content-Length: {}\r\n\r\n", part.data.len()).as_bytes(),
            );
            body.extend_from_slice(&part.data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

        Self::new(200)
            .with_content_type(format!("multipart/form-data; boundary={}", boundary))
            .with_body(body)
    }

    /// Error body: `ErrorCode` and `ErrorMessage` lines plus the description header
    ///
    /// Messages may echo request input. Control characters become spaces, and
    /// the header copy is further restricted to printable ASCII.
    pub fn error(status: u16, message: &str) -> Self {
        let single_line: String = message
            .chars()
            .map(|c| if c.is_control() { ' ' } else { c })
            .collect();
        let description: String = single_line
            .chars()
            .map(|c| if c.is_ascii() { c } else { '?' })
            .collect();
        Self::text(
            status,
            format!("ErrorCode: {}\nErrorMessage: {}\n", status, single_line),
        )
        .with_header(ERROR_DESCRIPTION_HEADER, description)
    }

    /// Temporary redirect
    pub fn redirect(location: impl Into<String>) -> Self {
        Self::new(307).with_header("Location", location)
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// First header with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }
}

/// Outcome of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    /// Send a 307 to this location
    Redirect(String),
    /// Send this response
    Reply(CommandResponse),
}

impl DispatchResult {
    /// Classify a handler response: a 307 with `Location` becomes a redirect
    pub fn from_response(response: CommandResponse) -> Self {
        if response.status() == 307 {
            if let Some(location) = response.header("Location") {
                return DispatchResult::Redirect(location.to_string());
            }
        }
        DispatchResult::Reply(response)
    }
}
