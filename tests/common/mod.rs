//! Shared fixtures for the integration suite: a small CRM-flavored
//! resource registry and row builders.

#![allow(dead_code)]

use recordcache::core::{
    Constraint, FieldSpec, FieldType, Record, Resource, ResourceRegistry, Value,
};
use std::sync::Arc;

pub fn activity_registry() -> Arc<ResourceRegistry> {
    Arc::new(
        ResourceRegistry::new().register(
            Resource::new("activities")
                .field(FieldSpec::new("subject", FieldType::Text).required())
                .field(FieldSpec::new("status", FieldType::Text).default_value("pending"))
                .field(FieldSpec::new("priority", FieldType::Integer))
                .searchable(&["subject"]),
        ),
    )
}

pub fn crm_registry() -> Arc<ResourceRegistry> {
    Arc::new(
        ResourceRegistry::new()
            .register(
                Resource::new("activities")
                    .field(FieldSpec::new("subject", FieldType::Text).required())
                    .field(FieldSpec::new("status", FieldType::Text).default_value("pending"))
                    .field(FieldSpec::new("priority", FieldType::Integer))
                    .searchable(&["subject"]),
            )
            .register(
                Resource::new("products")
                    .field(FieldSpec::new("name", FieldType::Text).required())
                    .field(
                        FieldSpec::new("unit_price", FieldType::Float)
                            .constraint(Constraint::MinNumber(0.0)),
                    )
                    .searchable(&["name"]),
            )
            .register(
                Resource::new("custom_fields")
                    .field(FieldSpec::new("display_name", FieldType::Text).required())
                    .field(FieldSpec::new("field_name", FieldType::Text))
                    .derive_slug("display_name", "field_name"),
            ),
    )
}

pub fn activity_row(id: &str, subject: &str, status: &str) -> Record {
    Record::from_pairs([
        ("id", Value::from(id)),
        ("subject", Value::from(subject)),
        ("status", Value::from(status)),
    ])
    .unwrap()
}

pub fn product_row(id: &str, name: &str, unit_price: f64) -> Record {
    Record::from_pairs([
        ("id", Value::from(id)),
        ("name", Value::from(name)),
        ("unit_price", Value::from(unit_price)),
    ])
    .unwrap()
}
