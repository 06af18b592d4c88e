use super::order::Algorithm;
use super::request::OutlierDetectionRequest;
use crate::error::{ErrorCode, IllegalQueryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Hard ceiling on `max_results`.
pub const MAX_RESULTS_CEILING: i64 = 10_000;

/// Caller of the validation. Analytics queries run on the analytics tables and
/// cannot use min-max bounds; data validation can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ValidationContext {
    #[default]
    Analytics,
    Validation,
}

pub struct OutlierRequestValidator;

impl OutlierRequestValidator {
    /// Returns the first violated rule.
    pub fn validate(
        request: &OutlierDetectionRequest,
        context: ValidationContext,
    ) -> Result<(), IllegalQueryError> {
        if request.data_elements.is_empty() {
            return Err(IllegalQueryError::new(
                ErrorCode::E7180,
                "At least one data element must be specified",
            ));
        }
        if request.org_units.is_empty() {
            return Err(IllegalQueryError::new(
                ErrorCode::E7181,
                "At least one organisation unit must be specified",
            ));
        }
        match (request.start_date, request.end_date) {
            (Some(start), Some(end)) if start > end => {
                return Err(IllegalQueryError::new(
                    ErrorCode::E7182,
                    format!("Start date {start} is after end date {end}"),
                ))
            }
            (Some(_), Some(_)) => {}
            _ => {
                return Err(IllegalQueryError::new(
                    ErrorCode::E7182,
                    "Start date and end date must be specified",
                ))
            }
        }
        if request.threshold.is_nan() || request.threshold <= 0.0 {
            return Err(IllegalQueryError::new(
                ErrorCode::E7183,
                format!("Threshold must be a positive number: {}", request.threshold),
            ));
        }
        if request.max_results <= 0 {
            return Err(IllegalQueryError::new(
                ErrorCode::E7184,
                format!("Max results must be a positive number: {}", request.max_results),
            ));
        }
        if request.max_results > MAX_RESULTS_CEILING {
            return Err(IllegalQueryError::new(
                ErrorCode::E7185,
                format!(
                    "Max results exceeds the allowed max limit: {}",
                    MAX_RESULTS_CEILING
                ),
            ));
        }
        if let (Some(start), Some(end)) = (request.data_start_date, request.data_end_date) {
            if start > end {
                return Err(IllegalQueryError::new(
                    ErrorCode::E7186,
                    format!("Data start date {start} is after data end date {end}"),
                ));
            }
        }
        if context == ValidationContext::Analytics && request.algorithm == Algorithm::MinMax {
            return Err(IllegalQueryError::new(
                ErrorCode::E7188,
                format!("Algorithm {} is not supported for analytics", request.algorithm),
            ));
        }
        if !request.algorithm.supports_order(request.order_by) {
            return Err(IllegalQueryError::new(
                ErrorCode::E7187,
                format!(
                    "Order '{}' is not applicable to algorithm {}",
                    request.order_by.header_name(),
                    request.algorithm
                ),
            ));
        }
        Ok(())
    }
}
