//! Message protocol spoken on the bus
//!
//! A request is an [`Envelope`]: string headers plus a JSON body. The
//! `action` header selects one of the closed set of [`Action`]s; the body
//! carries that action's fields. Replies are JSON bodies shaped by
//! [`Reply`], failures are a [`Failure`] with a stable numeric [`ErrorCode`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Value};

/// Header naming the requested operation
pub const ACTION_HEADER: &str = "action";

/// Body of the acknowledgement reply for write actions
pub const ACK: &str = "ok";

/// Operations understood by the database service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    AllPages,
    GetPage,
    CreatePage,
    SavePage,
    DeletePage,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::AllPages,
        Action::GetPage,
        Action::CreatePage,
        Action::SavePage,
        Action::DeletePage,
    ];

    /// Wire name used in the `action` header
    pub fn as_str(self) -> &'static str {
        match self {
            Action::AllPages => "all-pages",
            Action::GetPage => "get-page",
            Action::CreatePage => "create-page",
            Action::SavePage => "save-page",
            Action::DeletePage => "delete-page",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = Failure;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| Failure::bad_action(s))
    }
}

/// Failure codes carried on the wire.
///
/// Values are fixed explicitly; never renumber an existing variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ErrorCode {
    /// Request carried no `action` header
    NoActionSpecified = 0,
    /// `action` header named an unknown operation
    BadAction = 1,
    /// The store rejected or failed the statement
    DbError = 2,
    /// Body lacked a required field or had the wrong type
    InvalidPayload = 3,
}

impl ErrorCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ErrorCode::NoActionSpecified),
            1 => Some(ErrorCode::BadAction),
            2 => Some(ErrorCode::DbError),
            3 => Some(ErrorCode::InvalidPayload),
            _ => None,
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = i32::deserialize(deserializer)?;
        ErrorCode::from_code(code)
            .ok_or_else(|| de::Error::custom(format!("unknown error code {code}")))
    }
}

/// Failure reply: numeric code plus human-readable message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message} (code {})", .code.code())]
pub struct Failure {
    pub code: ErrorCode,
    pub message: String,
}

impl Failure {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn no_action() -> Self {
        Self::new(ErrorCode::NoActionSpecified, "No action header specified")
    }

    pub fn bad_action(action: &str) -> Self {
        Self::new(ErrorCode::BadAction, format!("Bad action: {action}"))
    }

    pub fn db_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DbError, message)
    }

    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidPayload, message)
    }
}

/// Request message: headers plus JSON body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Value,
}

impl Envelope {
    /// Envelope with the `action` header set and an empty object body
    pub fn with_action(action: impl Into<String>) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(ACTION_HEADER.to_string(), action.into());
        Self {
            headers,
            body: Value::Object(Default::default()),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }

    /// Header value; names compare ASCII case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .or_else(|| {
                self.headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }

    pub fn action(&self) -> Option<&str> {
        self.header(ACTION_HEADER)
    }
}

/// A validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    AllPages,
    GetPage { page: String },
    CreatePage { title: String, markdown: String },
    SavePage { id: i64, markdown: String },
    DeletePage { id: i64 },
}

#[derive(Deserialize)]
struct GetPagePayload {
    page: String,
}

#[derive(Deserialize)]
struct CreatePagePayload {
    title: String,
    markdown: String,
}

#[derive(Deserialize)]
struct SavePagePayload {
    #[serde(deserialize_with = "page_id")]
    id: i64,
    markdown: String,
}

#[derive(Deserialize)]
struct DeletePagePayload {
    #[serde(deserialize_with = "page_id")]
    id: i64,
}

/// Page ids arrive as integers or as decimal strings.
fn page_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("invalid page id '{text}'"))),
    }
}

fn payload<T: DeserializeOwned>(action: Action, body: &Value) -> Result<T, Failure> {
    T::deserialize(body).map_err(|e| Failure::invalid_payload(format!("{action}: {e}")))
}

impl Request {
    pub fn action(&self) -> Action {
        match self {
            Request::AllPages => Action::AllPages,
            Request::GetPage { .. } => Action::GetPage,
            Request::CreatePage { .. } => Action::CreatePage,
            Request::SavePage { .. } => Action::SavePage,
            Request::DeletePage { .. } => Action::DeletePage,
        }
    }

    /// Validate an incoming envelope.
    ///
    /// # Errors
    ///
    /// `NoActionSpecified` without an `action` header, `BadAction` for an
    /// unknown action, `InvalidPayload` when the body does not fit.
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, Failure> {
        let action: Action = envelope.action().ok_or_else(Failure::no_action)?.parse()?;
        let body = &envelope.body;

        let request = match action {
            Action::AllPages => Request::AllPages,
            Action::GetPage => {
                let p: GetPagePayload = payload(action, body)?;
                Request::GetPage { page: p.page }
            }
            Action::CreatePage => {
                let p: CreatePagePayload = payload(action, body)?;
                Request::CreatePage {
                    title: p.title,
                    markdown: p.markdown,
                }
            }
            Action::SavePage => {
                let p: SavePagePayload = payload(action, body)?;
                Request::SavePage {
                    id: p.id,
                    markdown: p.markdown,
                }
            }
            Action::DeletePage => {
                let p: DeletePagePayload = payload(action, body)?;
                Request::DeletePage { id: p.id }
            }
        };

        Ok(request)
    }

    /// Encode as an envelope for sending on the bus
    pub fn into_envelope(self) -> Envelope {
        let action = self.action();
        let body = match self {
            Request::AllPages => json!({}),
            Request::GetPage { page } => json!({ "page": page }),
            Request::CreatePage { title, markdown } => {
                json!({ "title": title, "markdown": markdown })
            }
            Request::SavePage { id, markdown } => json!({ "id": id, "markdown": markdown }),
            Request::DeletePage { id } => json!({ "id": id }),
        };
        Envelope::with_action(action.as_str()).with_body(body)
    }
}

/// Result of a title lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageLookup {
    Missing,
    Found { id: i64, raw_content: String },
}

/// Successful reply, shaped per action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Titles, sorted ascending
    Pages(Vec<String>),
    Page(PageLookup),
    /// Write acknowledged
    Ack,
}

impl Reply {
    /// JSON body sent back to the caller
    pub fn to_body(&self) -> Value {
        match self {
            Reply::Pages(pages) => json!({ "pages": pages }),
            Reply::Page(PageLookup::Missing) => json!({ "found": false }),
            Reply::Page(PageLookup::Found { id, raw_content }) => json!({
                "found": true,
                "id": id,
                "rawContent": raw_content,
            }),
            Reply::Ack => Value::String(ACK.to_string()),
        }
    }
}

impl Serialize for Reply {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_body().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(ErrorCode::NoActionSpecified.code(), 0);
        assert_eq!(ErrorCode::BadAction.code(), 1);
        assert_eq!(ErrorCode::DbError.code(), 2);
        assert_eq!(ErrorCode::InvalidPayload.code(), 3);
        assert_eq!(ErrorCode::from_code(2), Some(ErrorCode::DbError));
        assert_eq!(ErrorCode::from_code(9), None);
    }

    #[test]
    fn failure_serializes_numeric_code() {
        let failure = Failure::bad_action("rename-page");
        let value = serde_json::to_value(&failure).unwrap();

        assert_eq!(value, json!({ "code": 1, "message": "Bad action: rename-page" }));
        let back: Failure = serde_json::from_value(value).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn missing_action_header() {
        let envelope = Envelope::default();
        let err = Request::from_envelope(&envelope).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoActionSpecified);
    }

    #[test]
    fn action_header_name_is_case_insensitive() {
        let envelope: Envelope =
            serde_json::from_value(json!({ "headers": { "Action": "all-pages" } })).unwrap();

        assert_eq!(envelope.action(), Some("all-pages"));
        assert_eq!(Request::from_envelope(&envelope).unwrap(), Request::AllPages);
    }

    #[test]
    fn unknown_action_names_it() {
        let err = Request::from_envelope(&Envelope::with_action("purge")).unwrap_err();
        assert_eq!(err.code, ErrorCode::BadAction);
        assert!(err.message.contains("purge"));
    }

    #[test]
    fn all_pages_ignores_body() {
        let envelope = Envelope::with_action("all-pages").with_body(Value::Null);
        assert_eq!(Request::from_envelope(&envelope).unwrap(), Request::AllPages);
    }

    #[test]
    fn id_accepts_string_or_number() {
        let as_string = Envelope::with_action("delete-page").with_body(json!({ "id": "42" }));
        let as_number = Envelope::with_action("delete-page").with_body(json!({ "id": 42 }));

        assert_eq!(
            Request::from_envelope(&as_string).unwrap(),
            Request::DeletePage { id: 42 }
        );
        assert_eq!(
            Request::from_envelope(&as_number).unwrap(),
            Request::DeletePage { id: 42 }
        );
    }

    #[test]
    fn bad_payload_is_invalid_payload() {
        let missing = Envelope::with_action("create-page").with_body(json!({ "title": "T" }));
        let err = Request::from_envelope(&missing).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPayload);
        assert!(err.message.starts_with("create-page:"));

        let bad_id = Envelope::with_action("save-page")
            .with_body(json!({ "id": "seven", "markdown": "M" }));
        assert_eq!(
            Request::from_envelope(&bad_id).unwrap_err().code,
            ErrorCode::InvalidPayload
        );
    }

    #[test]
    fn request_envelope_round_trip() {
        let request = Request::SavePage {
            id: 3,
            markdown: "# Title".into(),
        };
        let envelope = request.clone().into_envelope();

        assert_eq!(envelope.action(), Some("save-page"));
        assert_eq!(Request::from_envelope(&envelope).unwrap(), request);
    }

    #[test]
    fn reply_bodies() {
        assert_eq!(Reply::Ack.to_body(), json!("ok"));
        assert_eq!(
            Reply::Page(PageLookup::Missing).to_body(),
            json!({ "found": false })
        );
        assert_eq!(
            Reply::Page(PageLookup::Found {
                id: 7,
                raw_content: "M".into()
            })
            .to_body(),
            json!({ "found": true, "id": 7, "rawContent": "M" })
        );
        assert_eq!(
            serde_json::to_value(Reply::Pages(vec!["A".into()])).unwrap(),
            json!({ "pages": ["A"] })
        );
    }
}
