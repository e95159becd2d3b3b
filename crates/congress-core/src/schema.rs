//! Destination table declarations and their Arrow equivalents.

use std::collections::HashMap;

use arrow::datatypes::{DataType, Field, Schema};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::config::{ConfigError, select_endpoints};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    String,
    Int,
    /// Nested object or array stored as a JSON document.
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub table: String,
    pub primary_key: Vec<String>,
    #[serde(serialize_with = "columns_as_map")]
    pub columns: Vec<(String, ColumnType)>,
}

fn columns_as_map<S: Serializer>(
    columns: &[(String, ColumnType)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(columns.len()))?;
    for (name, ty) in columns {
        map.serialize_entry(name, ty)?;
    }
    map.end()
}

impl TableDescriptor {
    fn new(table: &str, primary_key: &[&str], columns: &[(&str, ColumnType)]) -> Self {
        Self {
            table: table.to_string(),
            primary_key: primary_key.iter().map(|s| s.to_string()).collect(),
            columns: columns
                .iter()
                .map(|(name, ty)| (name.to_string(), *ty))
                .collect(),
        }
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    /// Arrow schema for this table.
    ///
    /// JSON columns are carried as `Utf8` with a `logical_type=JSON` tag.
    /// Primary-key columns are non-nullable.
    pub fn to_arrow_schema(&self) -> Schema {
        let fields: Vec<Field> = self
            .columns
            .iter()
            .map(|(name, ty)| {
                let nullable = !self.primary_key.contains(name);
                match ty {
                    ColumnType::String => Field::new(name, DataType::Utf8, nullable),
                    ColumnType::Int => Field::new(name, DataType::Int64, nullable),
                    ColumnType::Json => Field::new(name, DataType::Utf8, nullable).with_metadata(
                        HashMap::from([("logical_type".to_string(), "JSON".to_string())]),
                    ),
                }
            })
            .collect();
        Schema::new(fields)
    }
}

/// Table declaration for a destination table name.
pub fn table(name: &str) -> Option<TableDescriptor> {
    use ColumnType::{Int, Json, String as Text};

    let descriptor = match name {
        "bill" => TableDescriptor::new(
            "bill",
            &["congress", "type", "number"],
            &[
                ("congress", Int),
                ("latestAction", Json),
                ("number", Text),
                ("originChamber", Text),
                ("originChamberCode", Text),
                ("title", Text),
                ("type", Text),
                ("updateDate", Text),
                ("updateDateIncludingText", Text),
                ("url", Text),
            ],
        ),
        "congress" => TableDescriptor::new(
            "congress",
            &["name"],
            &[
                ("name", Text),
                ("number", Int),
                ("startYear", Text),
                ("endYear", Text),
                ("sessions", Json),
                ("url", Text),
            ],
        ),
        "member" => TableDescriptor::new(
            "member",
            &["bioguideId"],
            &[
                ("bioguideId", Text),
                ("congress", Int),
                ("depiction", Json),
                ("detail", Json),
                ("district", Text),
                ("name", Text),
                ("partyName", Text),
                ("state", Text),
                ("terms", Json),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "committee" => TableDescriptor::new(
            "committee",
            &["systemCode"],
            &[
                ("chamber", Text),
                ("committeeTypeCode", Text),
                ("congress", Int),
                ("name", Text),
                ("parent", Json),
                ("subcommittees", Json),
                ("systemCode", Text),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "amendment" => TableDescriptor::new(
            "amendment",
            &["congress", "type", "number"],
            &[
                ("congress", Int),
                ("description", Text),
                ("latestAction", Json),
                ("number", Text),
                ("purpose", Text),
                ("type", Text),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "hearing" => TableDescriptor::new(
            "hearing",
            &["congress", "chamber", "jacketNumber"],
            &[
                ("chamber", Text),
                ("congress", Int),
                ("jacketNumber", Int),
                ("number", Int),
                ("part", Int),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "house_communication" | "senate_communication" => TableDescriptor::new(
            name,
            &["url"],
            &[
                ("chamber", Text),
                ("communicationType", Json),
                ("congressNumber", Int),
                ("number", Text),
                ("reportNature", Text),
                ("submittedDate", Text),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "nomination" => TableDescriptor::new(
            "nomination",
            &["citation"],
            &[
                ("citation", Text),
                ("congress", Int),
                ("description", Text),
                ("latestAction", Json),
                ("nominationType", Json),
                ("number", Int),
                ("organization", Text),
                ("partNumber", Text),
                ("receivedDate", Text),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        "treaty" => TableDescriptor::new(
            "treaty",
            &["url"],
            &[
                ("congressConsidered", Int),
                ("congressReceived", Int),
                ("number", Int),
                ("parts", Json),
                ("suffix", Text),
                ("topic", Text),
                ("transmittedDate", Text),
                ("updateDate", Text),
                ("url", Text),
            ],
        ),
        _ => return None,
    };
    Some(descriptor)
}

/// Tables for the endpoints selected by `configuration`, in sync order.
///
/// Only the optional `endpoints` key is read, so this works before
/// credentials are filled in.
pub fn schema(configuration: &serde_json::Value) -> Result<Vec<TableDescriptor>, ConfigError> {
    let selection = configuration.get("endpoints").and_then(|v| v.as_str());
    let endpoints = select_endpoints(selection)?;
    Ok(endpoints
        .iter()
        .filter_map(|endpoint| table(&endpoint.table))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::catalog;
    use serde_json::json;

    #[test]
    fn every_endpoint_has_a_table() {
        for endpoint in catalog() {
            assert!(
                table(&endpoint.table).is_some(),
                "missing table for {}",
                endpoint.name
            );
        }
    }

    #[test]
    fn primary_keys_are_declared_columns() {
        for endpoint in catalog() {
            let t = table(&endpoint.table).unwrap();
            for key in &t.primary_key {
                assert!(t.column_type(key).is_some(), "{}.{key}", t.table);
            }
        }
    }

    #[test]
    fn injected_session_field_is_declared() {
        for endpoint in catalog().into_iter().filter(|e| e.inject_session) {
            let t = table(&endpoint.table).unwrap();
            assert_eq!(t.column_type("congress"), Some(ColumnType::Int));
        }
    }

    #[test]
    fn serializes_like_host_descriptor() {
        let t = table("congress").unwrap();
        let value = serde_json::to_value(&t).unwrap();
        assert_eq!(value["table"], "congress");
        assert_eq!(value["primary_key"], json!(["name"]));
        assert_eq!(value["columns"]["sessions"], "JSON");
        assert_eq!(value["columns"]["number"], "INT");
    }

    #[test]
    fn schema_follows_endpoint_selection() {
        let tables = schema(&json!({"endpoints": "member, bill"})).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(names, ["bill", "member"]);

        let all = schema(&json!({})).unwrap();
        assert_eq!(all.len(), 10);
    }

    #[test]
    fn schema_rejects_unknown_endpoint() {
        assert!(schema(&json!({"endpoints": "bill,laws"})).is_err());
    }

    #[test]
    fn arrow_schema_has_expected_fields() {
        let arrow = table("bill").unwrap().to_arrow_schema();
        assert_eq!(arrow.fields().len(), 10);

        let congress = arrow.field_with_name("congress").unwrap();
        assert_eq!(congress.data_type(), &DataType::Int64);
        assert!(!congress.is_nullable());

        let action = arrow.field_with_name("latestAction").unwrap();
        assert_eq!(action.data_type(), &DataType::Utf8);
        assert!(action.is_nullable());
        assert_eq!(
            action.metadata().get("logical_type").map(String::as_str),
            Some("JSON")
        );
    }
}
