use kube::core::{ListMeta, ObjectMeta, TypeMeta};
use serde::{Deserialize, Serialize};

use crate::crds::{Secret, SecretList};

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub type_: String,
    pub format: String,
    pub description: String,
    pub priority: i32,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TableRow {
    pub cells: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(flatten)]
    pub types: TypeMeta,
    pub metadata: ListMeta,
    pub column_definitions: Vec<TableColumnDefinition>,
    pub rows: Vec<TableRow>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
pub enum IncludeObject {
    None,
    #[default]
    Metadata,
    Object,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TableOptions {
    #[serde(default)]
    pub include_object: IncludeObject,
}

/// What is being rendered.
#[derive(Clone, Copy, Debug)]
pub enum TableObject<'a> {
    Secret(&'a Secret),
    List(&'a SecretList),
}

pub trait TableConvertor: Send + Sync {
    fn convert_to_table(&self, object: TableObject<'_>, options: &TableOptions) -> Table;
}

/// Name and creation timestamp columns for the given resource.
#[derive(Clone, Debug)]
pub struct DefaultTableConvertor {
    qualified_resource: String,
}

impl DefaultTableConvertor {
    pub fn new(qualified_resource: impl Into<String>) -> Self {
        Self {
            qualified_resource: qualified_resource.into(),
        }
    }

    fn columns(&self) -> Vec<TableColumnDefinition> {
        vec![
            TableColumnDefinition {
                name: "Name".to_owned(),
                type_: "string".to_owned(),
                format: "name".to_owned(),
                description: format!("Name of the {}", self.qualified_resource),
                priority: 0,
            },
            TableColumnDefinition {
                name: "Created At".to_owned(),
                type_: "date".to_owned(),
                format: String::new(),
                description: "CreationTimestamp is a timestamp representing the server time when this object was created.".to_owned(),
                priority: 0,
            },
        ]
    }

    fn row(secret: &Secret, options: &TableOptions) -> TableRow {
        let meta = &secret.metadata;
        let created = meta
            .creation_timestamp
            .as_ref()
            .and_then(|t| serde_json::to_value(t).ok())
            .unwrap_or_else(|| serde_json::Value::String("<unknown>".to_owned()));

        TableRow {
            cells: vec![
                serde_json::Value::String(meta.name.clone().unwrap_or_default()),
                created,
            ],
            object: match options.include_object {
                IncludeObject::None => None,
                IncludeObject::Metadata => Some(partial_object_metadata(meta)),
                IncludeObject::Object => serde_json::to_value(secret).ok(),
            },
        }
    }
}

fn partial_object_metadata(meta: &ObjectMeta) -> serde_json::Value {
    serde_json::json!({
        "kind": "PartialObjectMetadata",
        "apiVersion": "meta.k8s.io/v1",
        "metadata": meta,
    })
}

impl TableConvertor for DefaultTableConvertor {
    fn convert_to_table(&self, object: TableObject<'_>, options: &TableOptions) -> Table {
        let (metadata, rows) = match object {
            TableObject::Secret(secret) => (
                ListMeta {
                    resource_version: secret.metadata.resource_version.clone(),
                    ..ListMeta::default()
                },
                vec![Self::row(secret, options)],
            ),
            TableObject::List(list) => (
                list.metadata.clone(),
                list.items.iter().map(|s| Self::row(s, options)).collect(),
            ),
        };

        Table {
            types: TypeMeta {
                api_version: "meta.k8s.io/v1".to_owned(),
                kind: "Table".to_owned(),
            },
            metadata,
            column_definitions: self.columns(),
            rows,
        }
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    fn secret(name: &str) -> Secret {
        Secret::new(ObjectMeta {
            name: Some(name.to_owned()),
            resource_version: Some("7".to_owned()),
            creation_timestamp: Some(Time(Default::default())),
            ..ObjectMeta::default()
        })
    }

    #[test]
    fn single_object_renders_one_row() {
        let convertor = DefaultTableConvertor::new("secrets.reader.homerow.ca");
        let s = secret("p1");
        let table = convertor.convert_to_table(TableObject::Secret(&s), &TableOptions::default());

        assert_eq!(table.types.kind, "Table");
        assert_eq!(table.column_definitions.len(), 2);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells[0], "p1");
        assert!(table.rows[0].cells[1].is_string());
        assert_eq!(table.metadata.resource_version.as_deref(), Some("7"));
        assert_eq!(
            table.rows[0].object.as_ref().unwrap()["kind"],
            "PartialObjectMetadata"
        );
    }

    #[test]
    fn list_keeps_order_and_continue_token() {
        let convertor = DefaultTableConvertor::new("secrets.reader.homerow.ca");
        let list = SecretList::new(
            ListMeta {
                continue_: Some("next".to_owned()),
                ..ListMeta::default()
            },
            vec![secret("p1"), secret("p3")],
        );
        let options = TableOptions {
            include_object: IncludeObject::None,
        };
        let table = convertor.convert_to_table(TableObject::List(&list), &options);

        let names: Vec<_> = table.rows.iter().map(|r| r.cells[0].clone()).collect();
        assert_eq!(names, vec!["p1", "p3"]);
        assert_eq!(table.metadata.continue_.as_deref(), Some("next"));
        assert!(table.rows.iter().all(|r| r.object.is_none()));
    }

    #[test]
    fn missing_timestamp_is_unknown() {
        let convertor = DefaultTableConvertor::new("secrets.reader.homerow.ca");
        let s = Secret::new(ObjectMeta {
            name: Some("p1".to_owned()),
            ..ObjectMeta::default()
        });
        let table = convertor.convert_to_table(TableObject::Secret(&s), &TableOptions::default());

        assert_eq!(table.rows[0].cells[1], "<unknown>");
    }
}
