//! Genealogy record types and their registrations
//!
//! Mirrors the relational schema in [`crate::db::schema`]: one record type
//! per table, with alternate keys and insert policies chosen so repeated
//! ingests of the same pages converge instead of duplicating rows.

use chrono::NaiveDateTime;

use crate::record::{FieldKind, Record, RecordType, Value};
use crate::registry::{InsertPolicy, RegisterOptions, Registry};
use crate::Result;

/// Build the registry for the genealogy schema.
///
/// Countries, universities, subjects, web sources, and advisor edges are
/// deduplicated by natural (alternate) keys. Mathematicians are keyed by the
/// site's own page id, so a second scrape of a known id is a no-op.
/// Dissertations carry no caller-assigned identity and always insert fresh.
pub fn genealogy_registry() -> Result<Registry> {
    let mut registry = Registry::new();

    registry.register(
        RecordType::new("Country")
            .field("country_id", FieldKind::Integer)
            .field("country_name", FieldKind::Text),
        RegisterOptions::default()
            .alternate_key(vec!["country_name"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("University")
            .field("university_id", FieldKind::Integer)
            .field("university_name", FieldKind::Text)
            .field("country", FieldKind::Reference("Country")),
        RegisterOptions::default()
            .alternate_key(vec!["university_name", "country"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("MathematicsSubjectClassification")
            .field("subject_code", FieldKind::Integer)
            .field("subject_name", FieldKind::Text),
        RegisterOptions::default()
            .primary_key("subject_code")
            .alternate_key(vec!["subject_name"])
            .policy(InsertPolicy::IF_NEW_PK_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("Dissertation")
            .field("dissertation_id", FieldKind::Integer)
            .field("dissertation_title", FieldKind::Text)
            .field("dissertation_year", FieldKind::Integer)
            .field("subject", FieldKind::Reference("MathematicsSubjectClassification"))
            .field("university", FieldKind::Reference("University")),
        RegisterOptions::default().policy(InsertPolicy::IF_NO_PK),
    )?;

    registry.register(
        RecordType::new("Mathematician")
            .field("mathematician_id", FieldKind::Integer)
            .field("mathematician_name", FieldKind::Text)
            .field("birth_date", FieldKind::Date)
            .field("death_date", FieldKind::Date)
            .field("dissertation", FieldKind::Reference("Dissertation")),
        RegisterOptions::default().policy(InsertPolicy::IF_NEW_PK_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("AdvisorRelationship")
            .field("advisor", FieldKind::Reference("Mathematician"))
            .field("advisee", FieldKind::Reference("Mathematician"))
            .field("university", FieldKind::Reference("University")),
        RegisterOptions::default()
            .alternate_key(vec!["advisor", "advisee"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("WebSource")
            .field("web_source_id", FieldKind::Integer)
            .field("base_url", FieldKind::Text),
        RegisterOptions::default()
            .alternate_key(vec!["base_url"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_IGNORE),
    )?;

    registry.register(
        RecordType::new("Webpage")
            .field("webpage_id", FieldKind::Integer)
            .field("web_source", FieldKind::Reference("WebSource"))
            .field("path", FieldKind::Text)
            .field("query", FieldKind::Text)
            .field("timestamp", FieldKind::Timestamp),
        RegisterOptions::default()
            .alternate_key(vec!["web_source", "path", "query"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_UPDATE),
    )?;

    registry.register(
        RecordType::new("MathGenealogyAssociatedLink")
            .field("mathematician", FieldKind::Reference("Mathematician"))
            .field("webpage", FieldKind::Reference("Webpage"))
            .field("href_text", FieldKind::Text),
        RegisterOptions::default()
            .alternate_key(vec!["mathematician", "webpage", "href_text"])
            .policy(InsertPolicy::IF_NEW_ALT_KEY_ELSE_UPDATE),
    )?;

    Ok(registry)
}

// ========== Record constructors ==========

pub fn country(name: &str) -> Record {
    Record::new("Country")
        .with("country_id", Value::Null)
        .with("country_name", name)
}

pub fn university(name: &str, country: Option<Record>) -> Record {
    Record::new("University")
        .with("university_id", Value::Null)
        .with("university_name", name)
        .with("country", country)
}

pub fn subject(code: i64, name: &str) -> Record {
    Record::new("MathematicsSubjectClassification")
        .with("subject_code", code)
        .with("subject_name", name)
}

pub fn dissertation(
    title: Option<&str>,
    year: Option<i64>,
    subject: Option<Record>,
    university: Option<Record>,
) -> Record {
    Record::new("Dissertation")
        .with("dissertation_id", Value::Null)
        .with("dissertation_title", title.map(Value::from))
        .with("dissertation_year", year)
        .with("subject", subject)
        .with("university", university)
}

pub fn mathematician(id: i64, name: Option<&str>, dissertation: Option<Record>) -> Record {
    Record::new("Mathematician")
        .with("mathematician_id", id)
        .with("mathematician_name", name.map(Value::from))
        .with("birth_date", Value::Null)
        .with("death_date", Value::Null)
        .with("dissertation", dissertation)
}

/// Advisor edge between two already-persisted mathematicians, referenced by
/// their page ids
pub fn advisor_relationship(advisor: i64, advisee: i64, university: Option<Record>) -> Record {
    Record::new("AdvisorRelationship")
        .with("advisor", advisor)
        .with("advisee", advisee)
        .with("university", university)
}

pub fn web_source(base_url: &str) -> Record {
    Record::new("WebSource")
        .with("web_source_id", Value::Null)
        .with("base_url", base_url)
}

pub fn webpage(base_url: &str, path: &str, query: &str, timestamp: Option<NaiveDateTime>) -> Record {
    Record::new("Webpage")
        .with("webpage_id", Value::Null)
        .with("web_source", web_source(base_url))
        .with("path", path)
        .with("query", query)
        .with("timestamp", timestamp.map(Value::from))
}

pub fn associated_link(mathematician_id: i64, webpage: Record, href_text: &str) -> Record {
    Record::new("MathGenealogyAssociatedLink")
        .with("mathematician", mathematician_id)
        .with("webpage", webpage)
        .with("href_text", href_text)
}
