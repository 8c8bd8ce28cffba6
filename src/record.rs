//! Typed records - the unit of persistence
//!
//! A [`RecordType`] describes the fixed shape of one relational row: an
//! ordered list of named fields, each either a scalar or a reference to
//! another record type. A [`Record`] is a concrete value matching that shape.
//! Reference fields hold nested records at the API boundary, never raw
//! foreign-key integers; the engine converts in both directions.

use chrono::{NaiveDate, NaiveDateTime};

/// Declared kind of a single record field.
///
/// `Reference` names another registered record type; it is persisted as a
/// `<field>_id` integer column pointing at that type's row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Real,
    Text,
    Date,
    Timestamp,
    Reference(&'static str),
}

impl FieldKind {
    /// Whether this field persists as a foreign-key column
    pub fn is_reference(&self) -> bool {
        matches!(self, FieldKind::Reference(_))
    }
}

/// One declared field of a record type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// The fixed shape of one record type.
///
/// Built once at startup and handed to the [`Registry`](crate::Registry);
/// the registry derives table and key names from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordType {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
}

impl RecordType {
    /// Start a descriptor with no fields
    pub fn new(name: &'static str) -> Self {
        Self { name, fields: Vec::new() }
    }

    /// Append a declared field
    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        self.fields.push(FieldDef { name, kind });
        self
    }

    /// Look up a declared field by name
    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field_def(name).is_some()
    }
}

/// A concrete field value.
///
/// `Null` in a primary-key position means "not yet persisted, identity
/// unknown". `Record` carries a nested record standing in for a foreign key.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Record(Box<Record>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The integer inside, if this is an integer value
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self {
        Value::Date(d)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(Box::new(r))
    }
}

impl<V: Into<Value>> From<Option<V>> for Value {
    fn from(v: Option<V>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A record instance: a type name plus one value per field.
///
/// Records are constructed transiently by the scraping layer and handed to
/// [`Db::persist`](crate::Db::persist); they have no database life of their
/// own until persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    type_name: &'static str,
    values: Vec<(&'static str, Value)>,
}

impl Record {
    /// Start an empty record of the named type
    pub fn new(type_name: &'static str) -> Self {
        Self { type_name, values: Vec::new() }
    }

    /// Set a field value (builder style)
    pub fn with(mut self, field: &'static str, value: impl Into<Value>) -> Self {
        self.values.push((field, value.into()));
        self
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Get a field value; unset fields read as `Null`
    pub fn get(&self, field: &str) -> &Value {
        self.values
            .iter()
            .find(|(n, _)| *n == field)
            .map(|(_, v)| v)
            .unwrap_or(&Value::Null)
    }

    /// Iterate over (field, value) pairs in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(n, v)| (*n, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let country = Record::new("Country")
            .with("country_id", Value::Null)
            .with("country_name", "France");

        assert_eq!(country.type_name(), "Country");
        assert!(country.get("country_id").is_null());
        assert_eq!(country.get("country_name").as_text(), Some("France"));
        assert!(country.get("no_such_field").is_null());
    }

    #[test]
    fn test_nested_record_value() {
        let country = Record::new("Country")
            .with("country_id", Value::Null)
            .with("country_name", "Germany");
        let university = Record::new("University")
            .with("university_id", Value::Null)
            .with("university_name", "Universität Göttingen")
            .with("country", country);

        let nested = university.get("country").as_record().unwrap();
        assert_eq!(nested.get("country_name").as_text(), Some("Germany"));
    }

    #[test]
    fn test_option_into_value() {
        let set: Value = Some(7i64).into();
        let unset: Value = Option::<i64>::None.into();
        assert_eq!(set.as_integer(), Some(7));
        assert!(unset.is_null());
    }

    #[test]
    fn test_type_field_lookup() {
        let ty = RecordType::new("Country")
            .field("country_id", FieldKind::Integer)
            .field("country_name", FieldKind::Text);
        assert!(ty.has_field("country_name"));
        assert!(!ty.has_field("capital"));
        assert_eq!(ty.field_def("country_id").unwrap().kind, FieldKind::Integer);
    }
}
