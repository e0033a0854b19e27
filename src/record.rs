// src/record.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single input record: an unordered bag of named, multi-valued string
/// fields. Records carry no intrinsic key beyond the values of the fields the
/// configuration designates as identity properties, and equality is not
/// structural.
///
/// Empty strings are semantically absent and are filtered out at ingest, so
/// the comparison kernels never see them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: HashMap<String, Vec<String>>,
}

impl Record {
    pub fn new() -> Self {
        Record::default()
    }

    /// Builds a record from `(field, value)` pairs. Convenient for adapters
    /// that read one value per column.
    pub fn from_values<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = Record::new();
        for (field, value) in pairs {
            record.add_value(field, value);
        }
        record
    }

    /// Appends a value to a field. Empty values are dropped.
    pub fn add_value(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        self.fields
            .entry(field.to_string())
            .or_default()
            .push(value.to_string());
    }

    /// All values of a field, or an empty slice if the field is absent.
    pub fn values(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The first value of a field, if any.
    pub fn value(&self, field: &str) -> Option<&str> {
        self.values(field).first().map(String::as_str)
    }

    /// Names of the fields present on this record, in no particular order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_values_are_dropped_at_ingest() {
        let mut record = Record::new();
        record.add_value("name", "acme");
        record.add_value("name", "");
        record.add_value("email", "");

        assert_eq!(record.values("name"), ["acme"]);
        assert!(record.values("email").is_empty());
        assert_eq!(record.fields().count(), 1);
    }

    #[test]
    fn absent_field_yields_empty_slice() {
        let record = Record::new();
        assert!(record.values("anything").is_empty());
        assert_eq!(record.value("anything"), None);
    }

    #[test]
    fn from_values_collects_multi_valued_fields() {
        let record = Record::from_values([("phone", "555-1234"), ("phone", "555-9876")]);
        assert_eq!(record.values("phone").len(), 2);
    }
}
