use super::catalog::MetadataCatalog;
use super::order::{Algorithm, Order, SortOrder};
use super::request::{OutlierDetectionQuery, OutlierDetectionRequest};
use super::validator::{OutlierRequestValidator, ValidationContext};
use crate::error::{ErrorCode, IllegalQueryError};
use crate::types::Uid;
use chrono::NaiveDate;
use tracing::debug;

/// Turns loose outlier queries into validated requests.
///
/// Every identifier is resolved through the catalog, so objects the caller may not
/// read never reach the request.
pub struct OutlierQueryParser<'a> {
    catalog: &'a dyn MetadataCatalog,
    context: ValidationContext,
}

impl<'a> OutlierQueryParser<'a> {
    pub fn new(catalog: &'a dyn MetadataCatalog) -> Self {
        Self {
            catalog,
            context: ValidationContext::Analytics,
        }
    }

    pub fn with_context(mut self, context: ValidationContext) -> Self {
        self.context = context;
        self
    }

    pub fn get_from_query(
        &self,
        query: &OutlierDetectionQuery,
    ) -> Result<OutlierDetectionRequest, IllegalQueryError> {
        let data_set_uids = parse_uids(&query.ds)?;
        let data_element_uids = parse_uids(&query.dx)?;
        let org_unit_uids = parse_uids(&query.ou)?;

        let mut uids: Vec<Uid> = Vec::new();
        for data_set in self.catalog.data_sets_by_uid(&data_set_uids) {
            let numeric = self
                .catalog
                .data_elements_by_uid(&data_set.data_elements)
                .into_iter()
                .filter(|de| de.value_type.is_numeric())
                .map(|de| de.uid);
            for uid in numeric {
                if !uids.contains(&uid) {
                    uids.push(uid);
                }
            }
        }
        for uid in data_element_uids {
            if !uids.contains(&uid) {
                uids.push(uid);
            }
        }

        let data_elements = self.catalog.data_elements_by_uid(&uids);
        let org_units = self.catalog.org_units_by_uid(&org_unit_uids);
        debug!(
            data_elements = data_elements.len(),
            org_units = org_units.len(),
            "Resolved outlier query metadata"
        );

        let request = OutlierDetectionRequest::builder()
            .data_elements(data_elements)
            .org_units(org_units)
            .start_date(parse_date(query.start_date.as_deref())?)
            .end_date(parse_date(query.end_date.as_deref())?)
            .data_start_date(parse_date(query.data_start_date.as_deref())?)
            .data_end_date(parse_date(query.data_end_date.as_deref())?)
            .algorithm(query.algorithm.as_deref().map(Algorithm::parse).transpose()?)
            .threshold(query.threshold)
            .order_by(query.order_by.as_deref().map(Order::parse).transpose()?)
            .max_results(query.max_results)
            .sort_order(query.sort_order.as_deref().map(SortOrder::parse).transpose()?)
            .build();

        OutlierRequestValidator::validate(&request, self.context)?;
        Ok(request)
    }
}

fn parse_uids(values: &[String]) -> Result<Vec<Uid>, IllegalQueryError> {
    values.iter().map(|value| Uid::parse(value.trim())).collect()
}

fn parse_date(value: Option<&str>) -> Result<Option<NaiveDate>, IllegalQueryError> {
    value
        .map(|value| {
            NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
                IllegalQueryError::new(ErrorCode::E7190, format!("Invalid date: '{value}'"))
            })
        })
        .transpose()
}
