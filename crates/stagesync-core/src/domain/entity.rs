//! Entity categories and entity timestamps
//!
//! Every snapshot entry belongs to one [`EntityCategory`], chosen from a
//! lookup table keyed by store name. The category decides how the entry is
//! reconciled: key by key inside a document, file by file inside a
//! collection directory, or as one whole file.

use serde_json::Value;

use super::errors::DomainError;
use super::newtypes::StoreId;

/// Archive entry holding every show, keyed by show id
pub const SHOWS_CONTENT_ENTRY: &str = "SHOWS_CONTENT.json";

/// Ledger store name for individual show files
pub const SHOWS_STORE: &str = "SHOWS_CONTENT";

/// Ledger store name for scripture files
pub const BIBLES_STORE: &str = "BIBLES";

/// Archive entry prefix for scripture files
pub const BIBLE_PREFIX: &str = "BIBLE_";

/// Extension of local show files
pub const SHOW_EXTENSION: &str = "show";

/// How a document store is merged key by key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// `{ key: value }`
    Flat,
    /// `{ type: { key: value } }`, reconciled per innermost key
    Nested,
}

/// Which directory a file collection lives in and how files are named
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamingScheme {
    /// `shows/<name or id>.show`, content `[id, show]`
    Shows,
    /// `scriptures/<name>`, archived as `BIBLE_<name>`
    Scriptures,
}

/// Reconciliation strategy of one snapshot entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityCategory {
    /// JSON document merged entity by entity
    Document(MergeStrategy),
    /// Directory of individually reconciled files
    FileCollection(NamingScheme),
    /// Whole file replaced when the cloud copy wins
    FullReplace,
    /// Never synchronized
    Ignored,
}

const STORE_TABLE: &[(&str, EntityCategory)] = &[
    ("OVERLAYS", EntityCategory::Document(MergeStrategy::Flat)),
    ("PROJECTS", EntityCategory::Document(MergeStrategy::Nested)),
    ("STAGE", EntityCategory::Document(MergeStrategy::Flat)),
    ("TEMPLATES", EntityCategory::Document(MergeStrategy::Flat)),
    ("SETTINGS", EntityCategory::FullReplace),
    ("SYNCED_SETTINGS", EntityCategory::FullReplace),
    ("THEMES", EntityCategory::FullReplace),
    ("EVENTS", EntityCategory::FullReplace),
    ("SHOWS", EntityCategory::FullReplace),
    ("MEDIA", EntityCategory::FullReplace),
    ("DRIVE_API_KEYS", EntityCategory::FullReplace),
    ("CACHE", EntityCategory::FullReplace),
    ("HISTORY", EntityCategory::FullReplace),
    ("USAGE", EntityCategory::FullReplace),
    ("ACCESS", EntityCategory::Ignored),
    ("ERROR_LOG", EntityCategory::Ignored),
    ("CACHE_SYNC", EntityCategory::Ignored),
];

/// Looks up the category of a document store
pub fn store_category(store: &str) -> Option<EntityCategory> {
    STORE_TABLE
        .iter()
        .find(|(name, _)| *name == store)
        .map(|(_, category)| *category)
}

/// Every document store that takes part in sync, in table order
pub fn synced_document_stores() -> impl Iterator<Item = (&'static str, EntityCategory)> {
    STORE_TABLE
        .iter()
        .filter(|(_, category)| *category != EntityCategory::Ignored)
        .copied()
}

/// Classifies a snapshot entry by name
///
/// # Returns
/// The ledger store and category, or `None` for entries with no local
/// counterpart (unknown stores, the ledger itself)
pub fn classify_entry(entry_name: &str) -> Option<(StoreId, EntityCategory)> {
    if entry_name == SHOWS_CONTENT_ENTRY {
        return Some((
            StoreId::new(SHOWS_STORE.to_string()).ok()?,
            EntityCategory::FileCollection(NamingScheme::Shows),
        ));
    }

    if entry_name.len() > BIBLE_PREFIX.len() && entry_name.starts_with(BIBLE_PREFIX) {
        return Some((
            StoreId::new(BIBLES_STORE.to_string()).ok()?,
            EntityCategory::FileCollection(NamingScheme::Scriptures),
        ));
    }

    let store = entry_name.strip_suffix(".json")?;
    let category = store_category(store)?;
    Some((StoreId::new(store.to_string()).ok()?, category))
}

/// Local file name of a show: `<name or id>.show`
///
/// Path separators in the show name are replaced so the file always lands
/// directly inside the shows directory.
///
/// # Errors
/// Returns error if neither the name nor the id yields a usable file name
pub fn show_file_name(id: &str, show: &Value) -> Result<String, DomainError> {
    let base = show
        .get("name")
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .unwrap_or(id);

    let base: String = base
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();

    if base.is_empty() || base == "." || base == ".." {
        return Err(DomainError::InvalidKey(format!("Show {id:?} has no usable name")));
    }

    Ok(format!("{base}.{SHOW_EXTENSION}"))
}

// ============================================================================
// Timestamps
// ============================================================================

fn as_millis(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f as i64))
        .filter(|ms| *ms != 0)
}

/// Returns true if the value counts as present (not null, false, 0 or "")
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Modification time of an entity in epoch milliseconds
///
/// Resolved from `timestamps.modified`, then `timestamps.created`, then a
/// flat `modified` field. Zero when none is set.
pub fn modified_time(value: &Value) -> i64 {
    if !is_present(value) {
        return 0;
    }

    let timestamps = value.get("timestamps");
    timestamps
        .and_then(|t| t.get("modified"))
        .and_then(as_millis)
        .or_else(|| timestamps.and_then(|t| t.get("created")).and_then(as_millis))
        .or_else(|| value.get("modified").and_then(as_millis))
        .unwrap_or(0)
}

/// Writes a flat `modified` field on an unstamped entity
///
/// # Returns
/// The stamped time
pub fn stamp_modified(value: &mut Value, now_ms: i64) -> i64 {
    if let Value::Object(map) = value {
        map.insert("modified".to_string(), Value::from(now_ms));
    }
    now_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_modified_time_priority() {
        let show = json!({"timestamps": {"modified": 30, "created": 10}, "modified": 5});
        assert_eq!(modified_time(&show), 30);

        let created_only = json!({"timestamps": {"created": 10}, "modified": 5});
        assert_eq!(modified_time(&created_only), 10);

        let flat = json!({"modified": 5});
        assert_eq!(modified_time(&flat), 5);

        assert_eq!(modified_time(&json!({"name": "x"})), 0);
        assert_eq!(modified_time(&Value::Null), 0);
    }

    #[test]
    fn test_modified_time_zero_falls_through() {
        let value = json!({"timestamps": {"modified": 0, "created": 7}});
        assert_eq!(modified_time(&value), 7);
    }

    #[test]
    fn test_modified_time_float() {
        assert_eq!(modified_time(&json!({"modified": 1700000000000.0})), 1_700_000_000_000);
    }

    #[test]
    fn test_is_present() {
        assert!(!is_present(&Value::Null));
        assert!(!is_present(&json!(false)));
        assert!(!is_present(&json!(0)));
        assert!(!is_present(&json!("")));
        assert!(is_present(&json!({})));
        assert!(is_present(&json!("x")));
    }

    #[test]
    fn test_stamp_modified() {
        let mut value = json!({"name": "a"});
        let stamped = stamp_modified(&mut value, 99);
        assert_eq!(stamped, 99);
        assert_eq!(modified_time(&value), 99);
    }

    #[test]
    fn test_classify_entries() {
        let (store, category) = classify_entry("PROJECTS.json").unwrap();
        assert_eq!(store.as_str(), "PROJECTS");
        assert_eq!(category, EntityCategory::Document(MergeStrategy::Nested));

        let (store, category) = classify_entry("BIBLE_kjv.fsb").unwrap();
        assert_eq!(store.as_str(), BIBLES_STORE);
        assert_eq!(category, EntityCategory::FileCollection(NamingScheme::Scriptures));

        let (_, category) = classify_entry(SHOWS_CONTENT_ENTRY).unwrap();
        assert_eq!(category, EntityCategory::FileCollection(NamingScheme::Shows));

        assert_eq!(
            classify_entry("SETTINGS.json").map(|(_, c)| c),
            Some(EntityCategory::FullReplace)
        );
        assert_eq!(
            classify_entry("ACCESS.json").map(|(_, c)| c),
            Some(EntityCategory::Ignored)
        );
        assert!(classify_entry("UNKNOWN.json").is_none());
        assert!(classify_entry("changes.json").is_none());
    }

    #[test]
    fn test_synced_stores_exclude_ignored() {
        assert!(synced_document_stores().all(|(name, _)| name != "ACCESS"));
        assert!(synced_document_stores().any(|(name, _)| name == "PROJECTS"));
    }

    #[test]
    fn test_show_file_name() {
        assert_eq!(show_file_name("id1", &json!({"name": "Sunday"})).unwrap(), "Sunday.show");
        assert_eq!(show_file_name("id1", &json!({"name": ""})).unwrap(), "id1.show");
        assert_eq!(show_file_name("id1", &json!({})).unwrap(), "id1.show");
        assert_eq!(show_file_name("id1", &json!({"name": "a/b"})).unwrap(), "a_b.show");
        assert!(show_file_name("", &json!({})).is_err());
    }
}
