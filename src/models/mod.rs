//! Domain models for the event import pipeline.
//!
//! This module contains the core data structures staged and published by the
//! importer:
//!
//! - [`Item`] - One staged entity record, keyed by type + id + language
//! - [`ItemType`] - The seven tracked entity types
//! - [`GroupType`] - Derived flavor of a published group document
//! - [`VenueCategoryLayout`] - Normalized venue category layout
//! - [`Image`], [`Link`], [`CustomField`] - Shared entity sub-structures

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// =============================================================================
// Entity types
// =============================================================================

/// Type of a staged entity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    Performer,
    Session,
    Venue,
    Day,
    Group,
    Language,
    VenueCategory,
}

impl ItemType {
    /// All tracked types, in publish order.
    pub const ALL: [ItemType; 7] = [
        ItemType::Language,
        ItemType::Day,
        ItemType::VenueCategory,
        ItemType::Venue,
        ItemType::Performer,
        ItemType::Session,
        ItemType::Group,
    ];

    /// Wire name, also the staging key prefix (`performer:{id}:{lang}`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Performer => "performer",
            ItemType::Session => "session",
            ItemType::Venue => "venue",
            ItemType::Day => "day",
            ItemType::Group => "group",
            ItemType::Language => "language",
            ItemType::VenueCategory => "venueCategory",
        }
    }

    /// Target collection name under `/languages/{lang}/`.
    pub fn collection(&self) -> &'static str {
        match self {
            ItemType::Performer => "performers",
            ItemType::Session => "sessions",
            ItemType::Venue => "venues",
            ItemType::Day => "days",
            ItemType::Group => "groups",
            ItemType::Language => "languages",
            ItemType::VenueCategory => "venueCategories",
        }
    }

    /// Parse a wire name back into a type.
    pub fn from_str_name(name: &str) -> Option<Self> {
        match name {
            "performer" => Some(ItemType::Performer),
            "session" => Some(ItemType::Session),
            "venue" => Some(ItemType::Venue),
            "day" => Some(ItemType::Day),
            "group" => Some(ItemType::Group),
            "language" => Some(ItemType::Language),
            "venueCategory" => Some(ItemType::VenueCategory),
            _ => None,
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Staged item
// =============================================================================

/// One staged entity record.
///
/// `data` is the type-specific partial payload; it always carries the entity
/// `id`. At most one item is staged per (type, id, language) and re-adding
/// overwrites the previous value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    /// ISO 639-1 code, e.g. `en`.
    pub language: String,
    pub data: Value,
}

impl Item {
    pub fn new(item_type: ItemType, id: impl Into<String>, language: impl Into<String>, data: Value) -> Self {
        Self {
            id: id.into(),
            item_type,
            language: language.into(),
            data,
        }
    }

    /// Placeholder item carrying only the id, used when staged data is
    /// missing but the id still has to be marked invalid.
    pub fn placeholder(item_type: ItemType, id: &str, language: &str) -> Self {
        Self::new(item_type, id, language, serde_json::json!({ "id": id }))
    }

    /// Payload as a JSON object, if it is one.
    pub fn data_map(&self) -> Option<&Map<String, Value>> {
        self.data.as_object()
    }

    /// String field of the payload.
    pub fn data_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// String-array field of the payload (non-string entries are skipped).
    pub fn data_str_vec(&self, key: &str) -> Vec<String> {
        self.data
            .get(key)
            .and_then(Value::as_array)
            .map(|xs| {
                xs.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default()
    }
}

// =============================================================================
// Group documents
// =============================================================================

/// Derived flavor of a published group document.
///
/// A staged group splits into one document per referenced entity kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupType {
    Session,
    Performer,
}

impl GroupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupType::Session => "SESSION",
            GroupType::Performer => "PERFORMER",
        }
    }
}

// =============================================================================
// Venue categories
// =============================================================================

/// Layout hint of a venue category. Unknown input normalizes to `Compact`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VenueCategoryLayout {
    Large,
    #[default]
    Compact,
}

impl VenueCategoryLayout {
    /// Normalize an arbitrary staged value.
    pub fn from_value(value: Option<&Value>) -> Self {
        match value.and_then(Value::as_str) {
            Some("LARGE") => VenueCategoryLayout::Large,
            _ => VenueCategoryLayout::Compact,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VenueCategoryLayout::Large => "LARGE",
            VenueCategoryLayout::Compact => "COMPACT",
        }
    }
}

// =============================================================================
// Shared sub-structures
// =============================================================================

/// An image attached to a performer, session, venue or group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Image {
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// External link attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    #[serde(rename = "type")]
    pub link_type: String,
    pub uri: String,
}

/// Free-form name/value pair attached to an entity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CustomField {
    pub name: String,
    pub value: String,
}

// =============================================================================
// Language names
// =============================================================================

/// Native name of a language given its ISO 639-1 code.
///
/// Covers the codes seen across imported events; unknown codes fall back to
/// the code itself at the call site.
pub fn native_language_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "ar" => "العربية",
        "bg" => "Български",
        "cs" => "Čeština",
        "da" => "Dansk",
        "de" => "Deutsch",
        "el" => "Ελληνικά",
        "en" => "English",
        "es" => "Español",
        "et" => "Eesti",
        "fi" => "Suomi",
        "fr" => "Français",
        "he" => "עברית",
        "hr" => "Hrvatski",
        "hu" => "Magyar",
        "it" => "Italiano",
        "ja" => "日本語",
        "ko" => "한국어",
        "lt" => "Lietuvių",
        "lv" => "Latviešu",
        "nl" => "Nederlands",
        "no" => "Norsk",
        "pl" => "Polski",
        "pt" => "Português",
        "ro" => "Română",
        "ru" => "Русский",
        "sk" => "Slovenčina",
        "sl" => "Slovenščina",
        "sr" => "Српски",
        "sv" => "Svenska",
        "tr" => "Türkçe",
        "uk" => "Українська",
        "zh" => "中文",
        _ => return None,
    };
    Some(name)
}

// =============================================================================
// Tests
// =============================================================================
