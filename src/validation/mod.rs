//! Schema validation for constructed documents.
//!
//! Each entity type has a JSON Schema (draft 7) embedded at compile time from
//! `schemas/`. Validation failures never abort a run: they become ledger
//! entries and mark the entity invalid so it is excluded from publishing.

use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{ImportError, ImportErrorKind};
use crate::models::{Item, ItemType};

static EMBEDDED_SCHEMAS: Lazy<HashMap<ItemType, Value>> = Lazy::new(|| {
    let parse = |raw: &str| -> Value { serde_json::from_str(raw).expect("invalid embedded schema") };
    HashMap::from([
        (ItemType::Performer, parse(include_str!("../../schemas/performer.json"))),
        (ItemType::Session, parse(include_str!("../../schemas/session.json"))),
        (ItemType::Venue, parse(include_str!("../../schemas/venue.json"))),
        (ItemType::Day, parse(include_str!("../../schemas/day.json"))),
        (ItemType::Group, parse(include_str!("../../schemas/group.json"))),
        (ItemType::Language, parse(include_str!("../../schemas/language.json"))),
        (ItemType::VenueCategory, parse(include_str!("../../schemas/venue-category.json"))),
    ])
});

/// Compiled schema registry keyed by entity type.
pub struct Validator {
    schemas: HashMap<ItemType, jsonschema::Validator>,
}

impl Validator {
    /// Registry with the embedded schema per entity type.
    pub fn new() -> Self {
        Self::from_schemas(EMBEDDED_SCHEMAS.iter().map(|(t, s)| (*t, s.clone())))
            .expect("invalid embedded schema")
    }

    /// Registry from explicit schema documents. Types missing from the map
    /// fail validation with `no-validation-schema`.
    pub fn from_schemas(
        schemas: impl IntoIterator<Item = (ItemType, Value)>,
    ) -> Result<Self, String> {
        let mut compiled = HashMap::new();
        for (item_type, schema) in schemas {
            let validator = jsonschema::draft7::new(&schema)
                .map_err(|e| format!("schema for {item_type}: {e}"))?;
            compiled.insert(item_type, validator);
        }
        Ok(Self { schemas: compiled })
    }

    /// Check a constructed item's payload against the schema for its type.
    pub fn validate(&self, item: &Item) -> Result<(), ImportError> {
        let Some(validator) = self.schemas.get(&item.item_type) else {
            return Err(ImportError::new(ImportErrorKind::NoValidationSchema).with_item(item.clone()));
        };
        let violations: Vec<String> = validator
            .iter_errors(&item.data)
            .map(|e| e.to_string())
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ImportError::new(ImportErrorKind::InvalidItemData)
                .with_item(item.clone())
                .with_violations(violations))
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorDetail;
    use serde_json::json;

    #[test]
    fn test_all_types_have_embedded_schemas() {
        let validator = Validator::new();
        for item_type in ItemType::ALL {
            let item = Item::new(item_type, "x1", "en", json!({ "id": "x1" }));
            // Placeholder payloads satisfy every schema's required set.
            assert!(validator.validate(&item).is_ok(), "schema missing or too strict for {item_type}");
        }
    }

    #[test]
    fn test_valid_venue() {
        let validator = Validator::new();
        let item = Item::new(
            ItemType::Venue,
            "v1",
            "en",
            json!({
                "id": "v1",
                "name": "Main Hall",
                "order": 0,
                "categories": [{ "id": "c1", "name": "Stages", "color": "#fff", "iconUnicode": "", "layout": "COMPACT" }],
                "customFields": [],
                "links": []
            }),
        );
        assert!(validator.validate(&item).is_ok());
    }

    #[test]
    fn test_invalid_item_data_carries_violations() {
        let validator = Validator::new();
        let item = Item::new(ItemType::Venue, "v1", "en", json!({ "id": "v1", "name": 42 }));
        let err = validator.validate(&item).unwrap_err();
        assert_eq!(err.kind, ImportErrorKind::InvalidItemData);
        assert_eq!(err.item.as_ref().map(|i| i.id.as_str()), Some("v1"));
        match err.detail {
            ErrorDetail::Violations(v) => assert!(!v.is_empty()),
            other => panic!("expected violations, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_schema_reports_no_validation_schema() {
        let validator = Validator::from_schemas([(
            ItemType::Venue,
            json!({ "type": "object" }),
        )])
        .unwrap();
        let item = Item::new(ItemType::Day, "d1", "en", json!({ "id": "d1" }));
        let err = validator.validate(&item).unwrap_err();
        assert_eq!(err.kind, ImportErrorKind::NoValidationSchema);
    }

    #[test]
    fn test_session_requires_string_ids() {
        let validator = Validator::new();
        let item = Item::new(
            ItemType::Session,
            "s1",
            "en",
            json!({ "id": "s1", "performerIds": [1, 2] }),
        );
        assert!(validator.validate(&item).is_err());
    }
}
