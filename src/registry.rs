//! Metadata registry - per-type persistence facts
//!
//! Table names, key fields, and insert policies are declared once per record
//! type at startup and validated against the declared field list. Derivation
//! conventions (table name from the type name, `<table>_id` primary key,
//! reference fields as foreign keys) run once at registration time; nothing
//! is re-derived per call.

use std::collections::HashMap;

use crate::record::{FieldKind, RecordType};
use crate::{Error, Result};

/// Insert policy: which insert/update/skip rules apply to a record type.
///
/// A policy is a set of rules. Alternate-key rules are evaluated before
/// primary-key rules, since alternate keys carry natural identity and primary
/// keys may be pre-populated speculatively by the caller. `IF_NO_PK` is the
/// terminal fallback for records without a caller-assigned identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertPolicy(u8);

impl InsertPolicy {
    /// If the primary key exists, update non-key columns; otherwise insert.
    pub const IF_NEW_PK_ELSE_UPDATE: InsertPolicy = InsertPolicy(1);
    /// If the alternate key exists, update non-key, non-alternate-key
    /// columns; otherwise insert with a store-assigned primary key.
    pub const IF_NEW_ALT_KEY_ELSE_UPDATE: InsertPolicy = InsertPolicy(2);
    /// If the primary key exists, do nothing and return the existing key.
    pub const IF_NEW_PK_ELSE_IGNORE: InsertPolicy = InsertPolicy(4);
    /// If the alternate key exists, do nothing and return the existing key.
    pub const IF_NEW_ALT_KEY_ELSE_IGNORE: InsertPolicy = InsertPolicy(8);
    /// Always insert when no primary key is set.
    pub const IF_NO_PK: InsertPolicy = InsertPolicy(16);

    /// Combine two policies into one rule set
    pub const fn or(self, other: InsertPolicy) -> InsertPolicy {
        InsertPolicy(self.0 | other.0)
    }

    /// Whether every rule in `other` is part of this policy
    pub const fn contains(self, other: InsertPolicy) -> bool {
        self.0 & other.0 == other.0
    }

    /// Default policy when a type declares none
    pub const fn default_policy() -> InsertPolicy {
        Self::IF_NEW_PK_ELSE_UPDATE
            .or(Self::IF_NEW_ALT_KEY_ELSE_UPDATE)
            .or(Self::IF_NO_PK)
    }
}

impl Default for InsertPolicy {
    fn default() -> Self {
        Self::default_policy()
    }
}

/// Explicit overrides supplied at registration; `None` means "derive"
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    pub table_name: Option<String>,
    pub primary_key: Option<&'static str>,
    pub foreign_keys: Option<Vec<&'static str>>,
    pub alternate_key: Option<Vec<&'static str>>,
    pub policy: Option<InsertPolicy>,
}

impl RegisterOptions {
    pub fn table_name(mut self, name: impl Into<String>) -> Self {
        self.table_name = Some(name.into());
        self
    }

    pub fn primary_key(mut self, field: &'static str) -> Self {
        self.primary_key = Some(field);
        self
    }

    pub fn foreign_keys(mut self, fields: Vec<&'static str>) -> Self {
        self.foreign_keys = Some(fields);
        self
    }

    pub fn alternate_key(mut self, fields: Vec<&'static str>) -> Self {
        self.alternate_key = Some(fields);
        self
    }

    pub fn policy(mut self, policy: InsertPolicy) -> Self {
        self.policy = Some(policy);
        self
    }
}

/// Resolved, validated metadata for one record type
#[derive(Debug, Clone)]
pub struct TypeMeta {
    pub record_type: RecordType,
    pub table_name: String,
    /// Field name of the row's own identity column, if the type has one
    pub primary_key: Option<&'static str>,
    /// Field names persisted as `<field>_id` columns
    pub foreign_keys: Vec<&'static str>,
    /// Natural-identity field set; empty means no alternate-key deduplication
    pub alternate_key: Vec<&'static str>,
    pub policy: InsertPolicy,
}

impl TypeMeta {
    /// The column a field persists to (`<field>_id` for references)
    pub fn column_for(&self, field: &str) -> String {
        if self.foreign_keys.contains(&field) {
            format!("{field}_id")
        } else {
            field.to_string()
        }
    }

    /// The referenced type name for a foreign-key field
    pub fn referenced_type(&self, field: &str) -> Option<&'static str> {
        match self.record_type.field_def(field).map(|f| &f.kind) {
            Some(FieldKind::Reference(name)) => Some(name),
            _ => None,
        }
    }
}

/// Registry of record-type metadata, built at startup and passed by
/// reference to the engine. Registration is the only mutation.
#[derive(Debug, Default)]
pub struct Registry {
    types: HashMap<&'static str, TypeMeta>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a record type, deriving any metadata not overridden.
    ///
    /// Fails with a configuration error when a declared key name is not a
    /// field of the type, or when the type is already registered. These are
    /// programmer errors surfaced at process start.
    pub fn register(&mut self, record_type: RecordType, options: RegisterOptions) -> Result<()> {
        let name = record_type.name;
        if self.types.contains_key(name) {
            return Err(Error::Config(format!("record type {name} registered twice")));
        }

        let table_name = options
            .table_name
            .unwrap_or_else(|| derive_table_name(name));

        let primary_key = match options.primary_key {
            Some(field) => {
                if !record_type.has_field(field) {
                    return Err(Error::Config(format!(
                        "type {name} has no field named {field:?} (declared as primary key)"
                    )));
                }
                Some(field)
            }
            None => derive_primary_key(&record_type, &table_name),
        };

        let foreign_keys = match options.foreign_keys {
            Some(fields) => {
                for field in &fields {
                    if !record_type.has_field(field) {
                        return Err(Error::Config(format!(
                            "type {name} has no field named {field:?} (declared as foreign key)"
                        )));
                    }
                }
                fields
            }
            None => record_type
                .fields
                .iter()
                .filter(|f| f.kind.is_reference())
                .map(|f| f.name)
                .collect(),
        };

        let alternate_key = options.alternate_key.unwrap_or_default();
        for field in &alternate_key {
            if !record_type.has_field(field) {
                return Err(Error::Config(format!(
                    "type {name} has no field named {field:?} (declared in alternate key)"
                )));
            }
        }

        let policy = options.policy.unwrap_or_default();

        self.types.insert(
            name,
            TypeMeta {
                record_type,
                table_name,
                primary_key,
                foreign_keys,
                alternate_key,
                policy,
            },
        );
        Ok(())
    }

    /// Look up registered metadata by type name
    pub fn meta(&self, type_name: &str) -> Result<&TypeMeta> {
        self.types
            .get(type_name)
            .ok_or_else(|| Error::Unregistered(type_name.to_string()))
    }

    pub fn is_registered(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Iterate over all registered type metadata (unspecified order)
    pub fn types(&self) -> impl Iterator<Item = &TypeMeta> {
        self.types.values()
    }
}

/// Split a type name on capitalization boundaries and join with underscores:
/// `MathGenealogyAssociatedLink` -> `math_genealogy_associated_link`
fn derive_table_name(type_name: &str) -> String {
    let mut out = String::with_capacity(type_name.len() + 4);
    for (i, c) in type_name.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Default primary key is `<table_name>_id` when the type declares it
fn derive_primary_key(record_type: &RecordType, table_name: &str) -> Option<&'static str> {
    let candidate = format!("{table_name}_id");
    record_type
        .fields
        .iter()
        .find(|f| f.name == candidate)
        .map(|f| f.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldKind;

    fn country_type() -> RecordType {
        RecordType::new("Country")
            .field("country_id", FieldKind::Integer)
            .field("country_name", FieldKind::Text)
    }

    fn university_type() -> RecordType {
        RecordType::new("University")
            .field("university_id", FieldKind::Integer)
            .field("university_name", FieldKind::Text)
            .field("country", FieldKind::Reference("Country"))
    }

    #[test]
    fn test_table_name_derivation() {
        assert_eq!(derive_table_name("Country"), "country");
        assert_eq!(derive_table_name("WebSource"), "web_source");
        assert_eq!(
            derive_table_name("MathGenealogyAssociatedLink"),
            "math_genealogy_associated_link"
        );
    }

    #[test]
    fn test_default_derivation() {
        let mut registry = Registry::new();
        registry
            .register(university_type(), RegisterOptions::default())
            .unwrap();

        let meta = registry.meta("University").unwrap();
        assert_eq!(meta.table_name, "university");
        assert_eq!(meta.primary_key, Some("university_id"));
        assert_eq!(meta.foreign_keys, vec!["country"]);
        assert!(meta.alternate_key.is_empty());
        assert_eq!(meta.policy, InsertPolicy::default_policy());
        assert_eq!(meta.column_for("country"), "country_id");
        assert_eq!(meta.column_for("university_name"), "university_name");
        assert_eq!(meta.referenced_type("country"), Some("Country"));
    }

    #[test]
    fn test_no_primary_key_when_field_absent() {
        let ty = RecordType::new("AdvisorRelationship")
            .field("advisor", FieldKind::Reference("Mathematician"))
            .field("advisee", FieldKind::Reference("Mathematician"));
        let mut registry = Registry::new();
        registry.register(ty, RegisterOptions::default()).unwrap();

        let meta = registry.meta("AdvisorRelationship").unwrap();
        assert_eq!(meta.table_name, "advisor_relationship");
        assert_eq!(meta.primary_key, None);
    }

    #[test]
    fn test_explicit_primary_key_override() {
        let ty = RecordType::new("MathematicsSubjectClassification")
            .field("subject_code", FieldKind::Integer)
            .field("subject_name", FieldKind::Text);
        let mut registry = Registry::new();
        registry
            .register(ty, RegisterOptions::default().primary_key("subject_code"))
            .unwrap();

        let meta = registry.meta("MathematicsSubjectClassification").unwrap();
        assert_eq!(meta.primary_key, Some("subject_code"));
    }

    #[test]
    fn test_bad_key_names_fail_registration() {
        let mut registry = Registry::new();
        let err = registry
            .register(country_type(), RegisterOptions::default().primary_key("nope"))
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = registry
            .register(
                country_type(),
                RegisterOptions::default().alternate_key(vec!["country_name", "missing"]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_double_registration_fails() {
        let mut registry = Registry::new();
        registry
            .register(country_type(), RegisterOptions::default())
            .unwrap();
        let err = registry
            .register(country_type(), RegisterOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unregistered_lookup() {
        let registry = Registry::new();
        assert!(matches!(
            registry.meta("Nope").unwrap_err(),
            Error::Unregistered(_)
        ));
    }

    #[test]
    fn test_policy_set_operations() {
        let policy = InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE.or(InsertPolicy::IF_NO_PK);
        assert!(policy.contains(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE));
        assert!(policy.contains(InsertPolicy::IF_NO_PK));
        assert!(!policy.contains(InsertPolicy::IF_NEW_PK_ELSE_UPDATE));
    }
}
