mod error;
mod record;
mod resource;
mod value;

pub use error::{DataError, Result};
pub use record::{DraftRecord, FieldMap, ID_FIELD, Record, fields_to_json};
pub use resource::{Constraint, DeriveRule, FieldSpec, Resource, ResourceRegistry, slugify};
pub use value::{FieldType, Value};
