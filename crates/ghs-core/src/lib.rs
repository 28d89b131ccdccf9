//! Core domain model for GHS: the profile record, its statically declared
//! field descriptors, and validation from raw forge payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

pub const CRATE_NAME: &str = "ghs-core";

/// Semantic column kinds the schema synthesizer maps to SQL types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Boolean,
    Timestamp,
    TextList,
    Url,
}

/// One persisted profile field: column name, semantic kind, nullability, and
/// the raw payload key when it differs from the column name.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub alias: Option<&'static str>,
}

/// Column order for the profile table. The synthetic `id` and `fetched_at`
/// columns are store-assigned and deliberately not listed here.
pub const PROFILE_FIELDS: &[FieldSpec] = &[
    FieldSpec { name: "login", kind: FieldKind::Text, required: true, alias: None },
    FieldSpec { name: "name", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "bio", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "location", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "company", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "blog", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "twitter", kind: FieldKind::Text, required: false, alias: Some("twitter_username") },
    FieldSpec { name: "email", kind: FieldKind::Text, required: false, alias: None },
    FieldSpec { name: "public_repos", kind: FieldKind::Integer, required: true, alias: None },
    FieldSpec { name: "followers", kind: FieldKind::Integer, required: true, alias: None },
    FieldSpec { name: "following", kind: FieldKind::Integer, required: true, alias: None },
    FieldSpec { name: "created_at", kind: FieldKind::Timestamp, required: true, alias: None },
    FieldSpec { name: "languages", kind: FieldKind::TextList, required: true, alias: None },
    FieldSpec { name: "hireable", kind: FieldKind::Boolean, required: false, alias: None },
    FieldSpec { name: "html_url", kind: FieldKind::Url, required: true, alias: None },
    FieldSpec { name: "repos_url", kind: FieldKind::Url, required: true, alias: None },
    FieldSpec { name: "organizations_url", kind: FieldKind::Url, required: true, alias: None },
];

/// A raw forge record failed to coerce into the profile model.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("field `{field}` has unexpected type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("field `{field}` is not a well-formed url")]
    BadUrl {
        field: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("field `{field}` is not a valid timestamp")]
    BadTimestamp {
        field: &'static str,
        #[source]
        source: chrono::ParseError,
    },
}

/// Minimal contributor record from a repository's contributor listing.
///
/// Ephemeral: only `login` is load-bearing downstream, and the record is
/// never persisted. Forge-specific URL fields are ignored on deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorIdentity {
    pub login: String,
    pub id: i64,
    pub contributions: i64,
}

/// The forge's `blog` value can be a URL, free text, or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlogLink {
    Url(Url),
    Raw(String),
    Absent,
}

impl BlogLink {
    /// Empty strings collapse to `Absent`; text that fails URL parsing is
    /// kept verbatim as `Raw`.
    pub fn from_raw(value: Option<&str>) -> Self {
        match value {
            None | Some("") => BlogLink::Absent,
            Some(text) => match Url::parse(text) {
                Ok(url) => BlogLink::Url(url),
                Err(_) => BlogLink::Raw(text.to_string()),
            },
        }
    }

    /// Plain-string rendition for storage; `Absent` persists as NULL.
    pub fn as_persisted(&self) -> Option<String> {
        match self {
            BlogLink::Url(url) => Some(url.to_string()),
            BlogLink::Raw(text) => Some(text.clone()),
            BlogLink::Absent => None,
        }
    }
}

/// The full persisted contributor profile, assembled from the forge's user
/// endpoint plus a language set derived from the user's repositories.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub login: String,
    pub name: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub company: Option<String>,
    pub blog: BlogLink,
    pub twitter: Option<String>,
    pub email: Option<String>,
    pub public_repos: i64,
    pub followers: i64,
    pub following: i64,
    pub created_at: DateTime<Utc>,
    pub languages: Vec<String>,
    pub hireable: Option<bool>,
    pub html_url: Url,
    pub repos_url: Url,
    pub organizations_url: Url,
}

impl Profile {
    /// Build and validate a profile from the raw user payload.
    ///
    /// Required fields must be present and coercible; optional fields absent
    /// or null default to `None`. Malformed URLs or timestamps reject the
    /// whole record.
    pub fn from_raw(raw: &JsonValue, languages: Vec<String>) -> Result<Self, ValidationError> {
        Ok(Self {
            login: required_str(raw, "login")?,
            name: optional_str(raw, "name")?,
            bio: optional_str(raw, "bio")?,
            location: optional_str(raw, "location")?,
            company: optional_str(raw, "company")?,
            blog: BlogLink::from_raw(optional_str(raw, "blog")?.as_deref()),
            twitter: optional_str(raw, "twitter")?,
            email: optional_str(raw, "email")?,
            public_repos: int_or_zero(raw, "public_repos")?,
            followers: int_or_zero(raw, "followers")?,
            following: int_or_zero(raw, "following")?,
            created_at: required_timestamp(raw, "created_at")?,
            languages,
            hireable: optional_bool(raw, "hireable")?,
            html_url: required_url(raw, "html_url")?,
            repos_url: required_url(raw, "repos_url")?,
            organizations_url: required_url(raw, "organizations_url")?,
        })
    }
}

/// Unique primary languages across a user's repository listing, skipping
/// repositories with a null language. First-seen order is kept, though the
/// order carries no meaning.
pub fn languages_from_repos(repos: &[JsonValue]) -> Vec<String> {
    let mut languages: Vec<String> = Vec::new();
    for repo in repos {
        if let Some(language) = repo["language"].as_str() {
            if !languages.iter().any(|known| known == language) {
                languages.push(language.to_string());
            }
        }
    }
    languages
}

/// Resolve the raw payload key for a column, honoring declared aliases.
fn raw_value<'a>(raw: &'a JsonValue, field: &'static str) -> &'a JsonValue {
    let key = PROFILE_FIELDS
        .iter()
        .find(|spec| spec.name == field)
        .and_then(|spec| spec.alias)
        .unwrap_or(field);
    &raw[key]
}

fn required_str(raw: &JsonValue, field: &'static str) -> Result<String, ValidationError> {
    match raw_value(raw, field) {
        JsonValue::Null => Err(ValidationError::MissingField(field)),
        JsonValue::String(text) => Ok(text.clone()),
        _ => Err(ValidationError::WrongType {
            field,
            expected: "string",
        }),
    }
}

fn optional_str(raw: &JsonValue, field: &'static str) -> Result<Option<String>, ValidationError> {
    match raw_value(raw, field) {
        JsonValue::Null => Ok(None),
        JsonValue::String(text) => Ok(Some(text.clone())),
        _ => Err(ValidationError::WrongType {
            field,
            expected: "string or null",
        }),
    }
}

/// Stats the forge omits default to 0 rather than failing validation.
fn int_or_zero(raw: &JsonValue, field: &'static str) -> Result<i64, ValidationError> {
    match raw_value(raw, field) {
        JsonValue::Null => Ok(0),
        JsonValue::Number(number) => number.as_i64().ok_or(ValidationError::WrongType {
            field,
            expected: "integer",
        }),
        _ => Err(ValidationError::WrongType {
            field,
            expected: "integer",
        }),
    }
}

fn optional_bool(raw: &JsonValue, field: &'static str) -> Result<Option<bool>, ValidationError> {
    match raw_value(raw, field) {
        JsonValue::Null => Ok(None),
        JsonValue::Bool(flag) => Ok(Some(*flag)),
        _ => Err(ValidationError::WrongType {
            field,
            expected: "boolean or null",
        }),
    }
}

fn required_url(raw: &JsonValue, field: &'static str) -> Result<Url, ValidationError> {
    let text = required_str(raw, field)?;
    Url::parse(&text).map_err(|source| ValidationError::BadUrl { field, source })
}

fn required_timestamp(raw: &JsonValue, field: &'static str) -> Result<DateTime<Utc>, ValidationError> {
    let text = required_str(raw, field)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| ValidationError::BadTimestamp { field, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_user() -> JsonValue {
        json!({
            "login": "octocat",
            "name": "The Octocat",
            "bio": null,
            "location": "San Francisco, CA",
            "company": "@github",
            "blog": "https://github.blog",
            "twitter_username": "github",
            "email": null,
            "public_repos": 8,
            "followers": 4000,
            "following": 9,
            "created_at": "2011-01-25T18:44:36Z",
            "hireable": null,
            "html_url": "https://github.com/octocat",
            "repos_url": "https://api.github.com/users/octocat/repos",
            "organizations_url": "https://api.github.com/users/octocat/orgs"
        })
    }

    #[test]
    fn valid_payload_builds_profile() {
        let profile = Profile::from_raw(&sample_user(), vec!["Ruby".into()]).expect("valid");
        assert_eq!(profile.login, "octocat");
        assert_eq!(profile.twitter.as_deref(), Some("github"));
        assert_eq!(profile.bio, None);
        assert_eq!(profile.hireable, None);
        assert_eq!(profile.followers, 4000);
        assert_eq!(profile.html_url.as_str(), "https://github.com/octocat");
    }

    #[test]
    fn missing_login_is_rejected() {
        let mut raw = sample_user();
        raw["login"] = JsonValue::Null;
        let err = Profile::from_raw(&raw, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::MissingField("login")));
    }

    #[test]
    fn malformed_url_rejects_whole_record() {
        let mut raw = sample_user();
        raw["html_url"] = json!("not a url");
        let err = Profile::from_raw(&raw, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::BadUrl { field: "html_url", .. }));
    }

    #[test]
    fn bad_timestamp_is_rejected() {
        let mut raw = sample_user();
        raw["created_at"] = json!("yesterday");
        let err = Profile::from_raw(&raw, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::BadTimestamp { field: "created_at", .. }));
    }

    #[test]
    fn wrong_type_names_the_field() {
        let mut raw = sample_user();
        raw["followers"] = json!("many");
        let err = Profile::from_raw(&raw, vec![]).unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { field: "followers", .. }));
    }

    #[test]
    fn omitted_stats_default_to_zero() {
        let mut raw = sample_user();
        raw.as_object_mut().unwrap().remove("public_repos");
        let profile = Profile::from_raw(&raw, vec![]).expect("valid");
        assert_eq!(profile.public_repos, 0);
    }

    #[test]
    fn twitter_reads_from_aliased_key() {
        let mut raw = sample_user();
        raw.as_object_mut().unwrap().remove("twitter_username");
        let profile = Profile::from_raw(&raw, vec![]).expect("valid");
        assert_eq!(profile.twitter, None);
    }

    #[test]
    fn empty_blog_normalizes_to_absent() {
        assert_eq!(BlogLink::from_raw(Some("")), BlogLink::Absent);
        assert_eq!(BlogLink::from_raw(None), BlogLink::Absent);
        assert_eq!(BlogLink::from_raw(Some("")).as_persisted(), None);
    }

    #[test]
    fn non_url_blog_kept_verbatim() {
        let blog = BlogLink::from_raw(Some("see my website"));
        assert_eq!(blog, BlogLink::Raw("see my website".into()));
        assert_eq!(blog.as_persisted().as_deref(), Some("see my website"));
    }

    #[test]
    fn url_blog_parses() {
        let blog = BlogLink::from_raw(Some("https://example.com/"));
        assert!(matches!(blog, BlogLink::Url(_)));
        assert_eq!(blog.as_persisted().as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn language_derivation_dedups_and_skips_nulls() {
        let repos = vec![
            json!({"language": "Go"}),
            json!({"language": null}),
            json!({"language": "Go"}),
            json!({"language": "Rust"}),
        ];
        let languages = languages_from_repos(&repos);
        assert_eq!(languages, vec!["Go".to_string(), "Rust".to_string()]);
    }

    #[test]
    fn contributor_identity_ignores_extra_fields() {
        let raw = json!({
            "login": "octocat",
            "id": 583231,
            "contributions": 42,
            "avatar_url": "https://avatars.githubusercontent.com/u/583231",
            "site_admin": false
        });
        let identity: ContributorIdentity = serde_json::from_value(raw).expect("deserializes");
        assert_eq!(identity.login, "octocat");
        assert_eq!(identity.contributions, 42);
    }
}
