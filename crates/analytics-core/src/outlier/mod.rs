//! Outlier detection requests: parsing, validation and SQL generation.
//!
//! A loose [`OutlierDetectionQuery`] is resolved against a [`MetadataCatalog`] by
//! [`OutlierQueryParser`], validated by [`OutlierRequestValidator`], and rendered to SQL
//! by [`OutlierSqlGenerator`].

mod catalog;
mod order;
mod parser;
mod request;
mod sql;
mod validator;

pub use catalog::{
    DataElement, DataSet, InMemoryCatalog, MetadataCatalog, OrganisationUnit, ValueType,
};
pub use order::{Algorithm, Order, SortOrder};
pub use parser::OutlierQueryParser;
pub use request::{
    OutlierDetectionQuery, OutlierDetectionRequest, OutlierDetectionRequestBuilder,
    DEFAULT_MAX_RESULTS, DEFAULT_THRESHOLD,
};
pub use sql::OutlierSqlGenerator;
pub use validator::{OutlierRequestValidator, ValidationContext, MAX_RESULTS_CEILING};
