use super::catalog::{DataElement, OrganisationUnit};
use super::order::{Algorithm, Order, SortOrder};
use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_THRESHOLD: f64 = 3.0;
pub const DEFAULT_MAX_RESULTS: u32 = 500;

/// Outlier query as received from a caller. Identifiers and dates are unvalidated
/// strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct OutlierDetectionQuery {
    /// Data set UIDs. Their numeric data elements are included.
    pub ds: Vec<String>,
    /// Data element UIDs.
    pub dx: Vec<String>,
    /// Organisation unit UIDs.
    pub ou: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
    /// Start of the data window used to compute statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_end_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_order: Option<String>,
}

/// Resolved outlier request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OutlierDetectionRequest {
    pub data_elements: Vec<DataElement>,
    pub org_units: Vec<OrganisationUnit>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub data_start_date: Option<NaiveDate>,
    pub data_end_date: Option<NaiveDate>,
    pub algorithm: Algorithm,
    pub threshold: f64,
    pub order_by: Order,
    pub max_results: i64,
    pub sort_order: SortOrder,
}

impl OutlierDetectionRequest {
    pub fn builder() -> OutlierDetectionRequestBuilder {
        OutlierDetectionRequestBuilder::default()
    }

    pub fn data_element_uids(&self) -> Vec<&str> {
        self.data_elements.iter().map(|de| de.uid.as_str()).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutlierDetectionRequestBuilder {
    data_elements: Vec<DataElement>,
    org_units: Vec<OrganisationUnit>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    data_start_date: Option<NaiveDate>,
    data_end_date: Option<NaiveDate>,
    algorithm: Option<Algorithm>,
    threshold: Option<f64>,
    order_by: Option<Order>,
    max_results: Option<i64>,
    sort_order: Option<SortOrder>,
}

impl OutlierDetectionRequestBuilder {
    pub fn data_elements(mut self, data_elements: Vec<DataElement>) -> Self {
        self.data_elements = data_elements;
        self
    }

    pub fn org_units(mut self, org_units: Vec<OrganisationUnit>) -> Self {
        self.org_units = org_units;
        self
    }

    pub fn start_date(mut self, date: Option<NaiveDate>) -> Self {
        self.start_date = date;
        self
    }

    pub fn end_date(mut self, date: Option<NaiveDate>) -> Self {
        self.end_date = date;
        self
    }

    pub fn data_start_date(mut self, date: Option<NaiveDate>) -> Self {
        self.data_start_date = date;
        self
    }

    pub fn data_end_date(mut self, date: Option<NaiveDate>) -> Self {
        self.data_end_date = date;
        self
    }

    pub fn algorithm(mut self, algorithm: Option<Algorithm>) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn threshold(mut self, threshold: Option<f64>) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn order_by(mut self, order: Option<Order>) -> Self {
        self.order_by = order;
        self
    }

    pub fn max_results(mut self, max_results: Option<i64>) -> Self {
        self.max_results = max_results;
        self
    }

    pub fn sort_order(mut self, sort_order: Option<SortOrder>) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Unset options take their defaults. Validation is a separate step.
    pub fn build(self) -> OutlierDetectionRequest {
        OutlierDetectionRequest {
            data_elements: self.data_elements,
            org_units: self.org_units,
            start_date: self.start_date,
            end_date: self.end_date,
            data_start_date: self.data_start_date,
            data_end_date: self.data_end_date,
            algorithm: self.algorithm.unwrap_or_default(),
            threshold: self.threshold.unwrap_or(DEFAULT_THRESHOLD),
            order_by: self.order_by.unwrap_or_default(),
            max_results: self.max_results.unwrap_or(i64::from(DEFAULT_MAX_RESULTS)),
            sort_order: self.sort_order.unwrap_or_default(),
        }
    }
}
