//! Declarative publication schemas and metadata validation.
//!
//! Every collection declares a [`PublicationSchema`]: which artifacts its
//! publications must or may carry, and the shape of their metadata. This
//! crate provides:
//! - [`PublicationSchema`], [`MetadataSchema`], [`FieldSpec`]: the schema model
//! - [`ValidationError`]: a structured failure naming collection, publication and field
//! - [`dates`]: date/datetime parsing, including relative expressions

pub mod dates;
mod schema;
mod validate;

pub use dates::{DATE_FORMAT, DATETIME_FORMAT, DateError, parse_date, parse_datetime};
pub use schema::{FieldSpec, FieldType, Metadata, MetadataSchema, PublicationSchema};
pub use validate::{ValidationError, ValidationReason};
