use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_yaml::Value;

use super::{PathInfo, Track};
use crate::error::{CatalogError, Result};

/// Release in which a document reached each stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Milestones {
    #[serde(deserialize_with = "opt_string")]
    pub alpha: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub beta: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    pub stable: Option<String>,
}

/// A link from one document to another.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Relationship {
    #[serde(deserialize_with = "string_or_empty")]
    pub name: String,
    #[serde(deserialize_with = "string_or_empty")]
    pub number: String,
    #[serde(deserialize_with = "opt_string")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Relationships {
    #[serde(deserialize_with = "null_as_default")]
    pub extends: Vec<Relationship>,
    #[serde(deserialize_with = "null_as_default")]
    pub obsoletes: Vec<Relationship>,
    #[serde(deserialize_with = "null_as_default")]
    pub see_also: Vec<Relationship>,
}

impl Relationships {
    pub fn is_empty(&self) -> bool {
        self.extends.is_empty() && self.obsoletes.is_empty() && self.see_also.is_empty()
    }
}

/// One proposal: parsed metadata plus path-derived identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub track: Track,
    /// Sequence number; identity within a track, not necessarily unique.
    pub number: String,
    /// Owning group taken from the path (`sig-*`), if the layout has one.
    pub group: Option<String>,
    pub slug: Option<String>,
    pub path: String,
    pub web_url: String,
    pub title: String,
    pub status: Option<String>,
    pub stage: Option<String>,
    pub authors: Vec<String>,
    pub reviewers: Vec<String>,
    pub approvers: Vec<String>,
    pub prr_approvers: Vec<String>,
    pub editor: Option<String>,
    pub creation_date: Option<String>,
    pub last_updated: Option<String>,
    pub latest_milestone: Option<String>,
    pub milestone: Milestones,
    pub see_also: Vec<String>,
    pub replaces: Vec<String>,
    pub superseded_by: Vec<String>,
    pub participating_groups: Vec<String>,
    pub relationships: Relationships,
    pub references: Vec<String>,
    pub changelog: Vec<String>,
    /// Leading part of the narrative file, when it could be fetched.
    pub excerpt: Option<String>,
}

impl DocumentRecord {
    pub fn number_value(&self) -> Option<u64> {
        self.number.parse().ok()
    }

    /// Last-updated if present, else creation date.
    pub fn best_date(&self) -> Option<&str> {
        self.last_updated
            .as_deref()
            .or(self.creation_date.as_deref())
    }

    /// Display name, e.g. `KEP-2133`.
    pub fn handle(&self) -> String {
        format!("{}-{}", self.track.label(), self.number)
    }

    fn skeleton(track: Track, path: &str, info: &PathInfo) -> Self {
        Self {
            track,
            number: info.number.clone(),
            group: info.group.clone(),
            slug: info.slug.clone(),
            path: path.to_string(),
            web_url: track.web_url(path),
            title: String::new(),
            status: None,
            stage: None,
            authors: Vec::new(),
            reviewers: Vec::new(),
            approvers: Vec::new(),
            prr_approvers: Vec::new(),
            editor: None,
            creation_date: None,
            last_updated: None,
            latest_milestone: None,
            milestone: Milestones::default(),
            see_also: Vec::new(),
            replaces: Vec::new(),
            superseded_by: Vec::new(),
            participating_groups: Vec::new(),
            relationships: Relationships::default(),
            references: Vec::new(),
            changelog: Vec::new(),
            excerpt: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
struct EnhancementMetadata {
    #[serde(deserialize_with = "opt_string")]
    title: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    stage: Option<String>,
    #[serde(deserialize_with = "string_list")]
    authors: Vec<String>,
    #[serde(deserialize_with = "opt_string")]
    owning_sig: Option<String>,
    #[serde(deserialize_with = "string_list")]
    participating_sigs: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    reviewers: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    approvers: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    prr_approvers: Vec<String>,
    #[serde(deserialize_with = "opt_string")]
    editor: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    creation_date: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    last_updated: Option<String>,
    #[serde(deserialize_with = "string_list")]
    see_also: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    replaces: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    superseded_by: Vec<String>,
    #[serde(deserialize_with = "mapping_or_default")]
    milestone: Milestones,
    #[serde(deserialize_with = "opt_string")]
    latest_milestone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GatewayMetadata {
    #[serde(deserialize_with = "opt_string")]
    number: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    name: Option<String>,
    #[serde(deserialize_with = "opt_string")]
    status: Option<String>,
    #[serde(deserialize_with = "string_list")]
    authors: Vec<String>,
    #[serde(deserialize_with = "mapping_or_default")]
    relationships: Relationships,
    #[serde(deserialize_with = "string_list")]
    references: Vec<String>,
    #[serde(deserialize_with = "string_list")]
    changelog: Vec<String>,
}

/// Parse a metadata file into a record. Structurally invalid metadata is an
/// error, so the caller drops the document.
pub fn parse_metadata(track: Track, path: &str, info: &PathInfo, text: &str) -> Result<DocumentRecord> {
    let mut record = DocumentRecord::skeleton(track, path, info);
    match track {
        Track::Enhancements => {
            let meta: EnhancementMetadata = from_yaml(path, text)?;
            record.title = meta
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| format!("KEP-{}", info.number));
            // The path's sig is authoritative; metadata only fills a gap.
            record.group = record.group.or(meta.owning_sig);
            record.status = meta.status;
            record.stage = meta.stage;
            record.authors = meta.authors;
            record.reviewers = meta.reviewers;
            record.approvers = meta.approvers;
            record.prr_approvers = meta.prr_approvers;
            record.editor = meta.editor;
            record.creation_date = meta.creation_date;
            record.last_updated = meta.last_updated;
            record.latest_milestone = meta.latest_milestone;
            record.milestone = meta.milestone;
            record.see_also = meta.see_also;
            record.replaces = meta.replaces;
            record.superseded_by = meta.superseded_by;
            record.participating_groups = meta.participating_sigs;
        }
        Track::Gateway => {
            let meta: GatewayMetadata = from_yaml(path, text)?;
            let invalid = |reason: &str| CatalogError::InvalidMetadata {
                path: path.to_string(),
                reason: reason.to_string(),
            };
            if meta.number.is_none() {
                return Err(invalid("missing number"));
            }
            record.title = meta
                .name
                .filter(|n| !n.trim().is_empty())
                .ok_or_else(|| invalid("missing name"))?;
            record.status = meta.status;
            record.authors = meta.authors;
            record.relationships = meta.relationships;
            record.references = meta.references;
            record.changelog = meta.changelog;
        }
    }
    Ok(record)
}

fn from_yaml<T: Default + for<'de> Deserialize<'de>>(path: &str, text: &str) -> Result<T> {
    // An empty file is an empty mapping, not an error.
    if text.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(text).map_err(|source| CatalogError::Yaml {
        path: path.to_string(),
        source,
    })
}

/// Scalars of any YAML type as text. An unquoted `1.20` reads as the float
/// `1.2`; that loss happens in the YAML layer.
fn scalar_to_string(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Tagged(tagged) => scalar_to_string(tagged.value),
        _ => None,
    }
}

fn opt_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(scalar_to_string(Value::deserialize(deserializer)?))
}

fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(opt_string(deserializer)?.unwrap_or_default())
}

/// A sequence of scalars, a lone scalar, or nothing.
fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Sequence(items) => items.into_iter().filter_map(scalar_to_string).collect(),
        other => scalar_to_string(other).into_iter().collect(),
    })
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A mapping read as `T`; any other shape, or a mapping that does not fit,
/// is `T::default()`.
fn mapping_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Mapping(_) => serde_yaml::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}
