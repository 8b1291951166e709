use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::{Result, SocialApiError};

/// Timestamp layout used by `created_at` on messages, e.g. `Wed Aug 27 13:08:45 +0000 2008`.
const CREATED_AT_FORMAT: &str = "%a %b %d %H:%M:%S %z %Y";

/// How a request addresses a user: by screen name or by numeric ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRef<'a> {
    ScreenName(&'a str),
    UserId(i64),
}

impl UserRef<'_> {
    pub(crate) fn query_param(&self) -> (&'static str, String) {
        match self {
            UserRef::ScreenName(name) => ("screen_name", (*name).to_string()),
            UserRef::UserId(id) => ("user_id", id.to_string()),
        }
    }
}

/// The fields of a user object the crawler relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct UserObject {
    pub id: i64,
    pub screen_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub protected: bool,
}

/// A user object together with the exact JSON it was parsed from.
#[derive(Debug, Clone)]
pub struct UserSnapshot {
    pub user: UserObject,
    pub raw: Vec<u8>,
}

/// The fields of a status (message) object the crawler relies on.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusObject {
    pub id: i64,
    #[serde(default, alias = "full_text")]
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub lang: Option<String>,
}

/// A status object, its parsed creation time, and the exact JSON it was parsed from.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub status: StatusObject,
    pub created_at: DateTime<Utc>,
    pub raw: Vec<u8>,
}

/// One page of a cursored ID listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdPage {
    #[serde(default)]
    pub ids: Vec<i64>,
    #[serde(default)]
    pub next_cursor: i64,
}

pub fn parse_created_at(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_str(value, CREATED_AT_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SocialApiError::Parse(format!("invalid created_at {value:?}: {e}")))
}

pub(crate) fn parse_user(body: &str) -> Result<UserSnapshot> {
    let user: UserObject = serde_json::from_str(body)?;
    Ok(UserSnapshot {
        user,
        raw: body.as_bytes().to_vec(),
    })
}

pub(crate) fn parse_users(body: &str) -> Result<Vec<UserSnapshot>> {
    let blobs: Vec<Box<RawValue>> = serde_json::from_str(body)?;
    blobs
        .iter()
        .map(|blob| {
            let raw = blob.get();
            if raw.is_empty() {
                return Err(SocialApiError::Parse("empty user object in lookup".into()));
            }
            parse_user(raw)
        })
        .collect()
}

pub(crate) fn parse_statuses(body: &str) -> Result<Vec<StatusSnapshot>> {
    let blobs: Vec<Box<RawValue>> = serde_json::from_str(body)?;
    blobs
        .iter()
        .map(|blob| {
            let raw = blob.get();
            let status: StatusObject = serde_json::from_str(raw)?;
            let created_at = parse_created_at(&status.created_at)?;
            Ok(StatusSnapshot {
                status,
                created_at,
                raw: raw.as_bytes().to_vec(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_created_at() {
        let t = parse_created_at("Wed Aug 27 13:08:45 +0000 2008").unwrap();
        assert_eq!(t.timestamp(), 1_219_842_525);
    }

    #[test]
    fn rejects_malformed_created_at() {
        assert!(matches!(
            parse_created_at("2008-08-27T13:08:45Z"),
            Err(SocialApiError::Parse(_))
        ));
    }

    #[test]
    fn lookup_keeps_each_raw_object() {
        let body = r#"[{"id":1,"screen_name":"a","protected":false,"extra":{"x":1}},{"id":2,"screen_name":"b","protected":true}]"#;
        let users = parse_users(body).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].user.id, 1);
        assert_eq!(
            users[0].raw,
            br#"{"id":1,"screen_name":"a","protected":false,"extra":{"x":1}}"#.to_vec()
        );
        assert!(users[1].user.protected);
    }

    #[test]
    fn timeline_parses_text_and_language() {
        let body = r#"[{"id":150,"full_text":"hello","created_at":"Wed Aug 27 13:08:45 +0000 2008","lang":"en"}]"#;
        let statuses = parse_statuses(body).unwrap();
        assert_eq!(statuses[0].status.id, 150);
        assert_eq!(statuses[0].status.text, "hello");
        assert_eq!(statuses[0].status.lang.as_deref(), Some("en"));
    }

    #[test]
    fn id_page_defaults_missing_fields() {
        let page: IdPage = serde_json::from_str("{}").unwrap();
        assert!(page.ids.is_empty());
        assert_eq!(page.next_cursor, 0);
    }
}
