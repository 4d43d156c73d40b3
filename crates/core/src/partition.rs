use chrono::{DateTime, Local, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Group used when the caller does not provide a label, and for legacy bare-list records.
pub const DEFAULT_GROUP: &str = "General";

/// Resolves the group a discovery is filed under. Blank titles map to [`DEFAULT_GROUP`].
pub fn group_label(title: Option<&str>) -> &str {
    match title.map(str::trim) {
        Some(label) if !label.is_empty() => label,
        _ => DEFAULT_GROUP,
    }
}

#[derive(Debug, Error)]
pub enum PartitionError {
    #[error("failed to decode partition: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("partition must be a JSON array or object")]
    Shape,
    #[error("group '{0}' is not a list")]
    GroupShape(String),
    #[error("invalid partition key '{0}'")]
    InvalidKey(String),
}

/// Identifies one partition. Keys written by the service are ISO dates (`YYYY-MM-DD`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    pub fn for_date(date: NaiveDate) -> Self {
        Self(date.format("%Y-%m-%d").to_string())
    }

    /// Accepts any key found in a backend; rejects values that could escape a directory.
    pub fn new(raw: impl Into<String>) -> Result<Self, PartitionError> {
        let raw = raw.into();
        let unsafe_key = raw.is_empty()
            || raw.contains(['/', '\\', '\0'])
            || raw.starts_with('.');
        if unsafe_key {
            return Err(PartitionError::InvalidKey(raw));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decides which calendar day a discovery belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PartitionCalendar {
    /// The server's local zone.
    #[default]
    Local,
    Zone(Tz),
}

impl PartitionCalendar {
    pub fn from_zone(zone: Option<Tz>) -> Self {
        zone.map(Self::Zone).unwrap_or_default()
    }

    pub fn date_at(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => at.with_timezone(&Local).date_naive(),
            Self::Zone(tz) => at.with_timezone(tz).date_naive(),
        }
    }

    pub fn key_at(&self, at: DateTime<Utc>) -> PartitionKey {
        PartitionKey::for_date(self.date_at(at))
    }
}

/// Discoveries recorded for one day, grouped by label.
///
/// Groups keep the order they were first written in; lists keep insertion
/// order and never gain the same domain twice. Entries that are not strings
/// are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Partition {
    groups: Map<String, Value>,
}

impl Partition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a stored partition, upgrading the legacy bare-list shape to `{General: [...]}`.
    ///
    /// Only documents that are not JSON, or whose top level is neither an array
    /// nor an object, are rejected.
    pub fn from_json(raw: &str) -> Result<Self, PartitionError> {
        let groups = match serde_json::from_str::<Value>(raw)? {
            Value::Object(groups) => groups,
            legacy @ Value::Array(_) => {
                let mut groups = Map::new();
                groups.insert(DEFAULT_GROUP.to_string(), legacy);
                groups
            }
            _ => return Err(PartitionError::Shape),
        };
        Ok(Self { groups })
    }

    pub fn to_json_pretty(&self) -> Result<String, PartitionError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Files `domain` under the resolved group. Returns `false` if it was already there.
    ///
    /// Fails without touching the partition when the group holds something other than a list.
    pub fn insert(&mut self, title: Option<&str>, domain: &str) -> Result<bool, PartitionError> {
        let label = group_label(title);
        let entry = self
            .groups
            .entry(label)
            .or_insert_with(|| Value::Array(Vec::new()));
        let Value::Array(list) = entry else {
            return Err(PartitionError::GroupShape(label.to_string()));
        };
        if list.iter().any(|existing| existing.as_str() == Some(domain)) {
            return Ok(false);
        }
        list.push(Value::String(domain.to_string()));
        Ok(true)
    }

    /// String entries filed under `label`.
    pub fn group(&self, label: &str) -> Option<Vec<&str>> {
        let list = self.groups.get(label)?.as_array()?;
        Some(list.iter().filter_map(Value::as_str).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of list entries across all groups.
    pub fn len(&self) -> usize {
        self.groups
            .values()
            .filter_map(Value::as_array)
            .map(Vec::len)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn blank_titles_use_default_group() {
        assert_eq!(group_label(None), DEFAULT_GROUP);
        assert_eq!(group_label(Some("   ")), DEFAULT_GROUP);
        assert_eq!(group_label(Some(" Short names ")), "Short names");
    }

    #[test]
    fn insert_is_idempotent_per_group() {
        let mut partition = Partition::new();
        assert!(partition.insert(Some("picks"), "alpha").expect("insert"));
        assert!(!partition.insert(Some("picks"), "alpha").expect("insert"));
        assert!(partition.insert(None, "alpha").expect("insert"));

        assert_eq!(partition.group("picks"), Some(vec!["alpha"]));
        assert_eq!(partition.group(DEFAULT_GROUP).map(|list| list.len()), Some(1));
        assert_eq!(partition.len(), 2);
    }

    #[test]
    fn legacy_list_upgrades_to_default_group() {
        let partition = Partition::from_json(r#"["foo.com","bar.com"]"#).expect("legacy parses");
        let value = serde_json::to_value(&partition).expect("serialize");
        assert_eq!(value, json!({ "General": ["foo.com", "bar.com"] }));
    }

    #[test]
    fn legacy_list_keeps_entries_when_extended() {
        let mut partition = Partition::from_json(r#"["foo.com"]"#).expect("legacy parses");
        partition.insert(Some("new"), "baz").expect("insert");
        partition.insert(None, "foo.com").expect("insert");

        assert_eq!(partition.group(DEFAULT_GROUP), Some(vec!["foo.com"]));
        assert_eq!(partition.group("new"), Some(vec!["baz"]));
    }

    #[test]
    fn only_unparsable_documents_are_rejected() {
        assert!(Partition::from_json("{not json").is_err());
        assert!(Partition::from_json("5").is_err());
        assert!(Partition::from_json(r#""text""#).is_err());
        assert!(Partition::from_json(r#"{"General": 5}"#).is_ok());
    }

    #[test]
    fn off_shape_entries_survive_an_insert() {
        let mut partition =
            Partition::from_json(r#"{"General":["keep.com"],"Picks":["x.com",5],"Odd":7}"#)
                .expect("object parses");
        assert!(partition.insert(Some("Picks"), "y.com").expect("insert"));

        let value = serde_json::to_value(&partition).expect("serialize");
        assert_eq!(
            value,
            json!({ "General": ["keep.com"], "Picks": ["x.com", 5, "y.com"], "Odd": 7 })
        );
        assert_eq!(partition.group("Picks"), Some(vec!["x.com", "y.com"]));
    }

    #[test]
    fn insert_into_non_list_group_fails_without_change() {
        let mut partition = Partition::from_json(r#"{"Odd":7}"#).expect("object parses");
        let before = partition.clone();

        assert!(matches!(
            partition.insert(Some("Odd"), "x.com"),
            Err(PartitionError::GroupShape(label)) if label == "Odd"
        ));
        assert_eq!(partition, before);
    }

    #[test]
    fn legacy_list_keeps_non_string_entries() {
        let partition = Partition::from_json(r#"["foo.com", 3]"#).expect("legacy parses");
        let value = serde_json::to_value(&partition).expect("serialize");
        assert_eq!(value, json!({ "General": ["foo.com", 3] }));
        assert_eq!(partition.len(), 2);
    }

    #[test]
    fn labels_keep_first_written_order() {
        let mut partition =
            Partition::from_json(r#"{"zeta":["a"],"alpha":["b"]}"#).expect("object parses");
        partition.insert(Some("mid"), "c").expect("insert");

        let text = partition.to_json_pretty().expect("serialize");
        let zeta = text.find("zeta").expect("zeta");
        let alpha = text.find("alpha").expect("alpha");
        let mid = text.find("mid").expect("mid");
        assert!(zeta < alpha && alpha < mid);
    }

    #[test]
    fn pretty_output_round_trips() {
        let mut partition = Partition::new();
        partition.insert(Some("a"), "one").expect("insert");
        let text = partition.to_json_pretty().expect("serialize");
        assert!(text.contains("\n  \"a\""));
        assert_eq!(Partition::from_json(&text).expect("parse"), partition);
    }

    #[test]
    fn keys_reject_path_segments() {
        assert!(PartitionKey::new("2024-05-01").is_ok());
        assert!(PartitionKey::new("../etc").is_err());
        assert!(PartitionKey::new("a/b").is_err());
        assert!(PartitionKey::new("").is_err());
    }

    #[test]
    fn zone_calendar_shifts_day_boundary() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 20, 30, 0).unwrap();
        let utc = PartitionCalendar::Zone(chrono_tz::UTC);
        let dhaka = PartitionCalendar::Zone(chrono_tz::Asia::Dhaka);

        assert_eq!(utc.key_at(at).as_str(), "2024-03-01");
        assert_eq!(dhaka.key_at(at).as_str(), "2024-03-02");
    }
}
