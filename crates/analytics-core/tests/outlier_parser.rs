use dhis_analytics_core::error::ErrorCode;
use dhis_analytics_core::outlier::{
    Algorithm, InMemoryCatalog, Order, OutlierDetectionQuery, OutlierQueryParser,
    OutlierSqlGenerator, SortOrder, ValidationContext,
};
use dhis_analytics_core::sql::PostgreSqlBuilder;
use dhis_analytics_core::test_utils::fixtures_dir;
use rstest::rstest;

fn catalog() -> InMemoryCatalog {
    let path = fixtures_dir().join("outlier").join("catalog.json");
    let json = std::fs::read_to_string(&path).unwrap();
    serde_json::from_str(&json).unwrap()
}

fn query() -> OutlierDetectionQuery {
    serde_json::from_value(serde_json::json!({
        "ds": ["BfMAe6Itzgt"],
        "dx": ["hfdmMSPBgLG", "s46m5MS0hxu"],
        "ou": ["ImspTQPwCqd", "O6uvpzGd5pu"],
        "startDate": "2022-07-26",
        "endDate": "2022-10-26"
    }))
    .unwrap()
}

#[rstest]
#[case(Order::ZScore, "zscore", "z_score")]
#[case(Order::ModifiedZscore, "modifiedzscore", "z_score")]
#[case(Order::Value, "value", "value")]
#[case(Order::Median, "median", "middle_value")]
#[case(Order::Mean, "mean", "middle_value")]
#[case(Order::StdDev, "stddev", "std_dev")]
#[case(Order::MedianAbsDev, "medianabsdeviation", "median_abs_deviation")]
#[case(Order::MeanAbsDev, "absdev", "middle_value_abs_dev")]
#[case(Order::LowerBound, "lowerbound", "lower_bound")]
#[case(Order::UpperBound, "upperbound", "upper_bound")]
fn order_header_and_column(#[case] order: Order, #[case] header: &str, #[case] column: &str) {
    assert_eq!(order.header_name(), header);
    assert_eq!(order.column_name(), column);
    assert_eq!(Order::parse(header).unwrap(), order);
}

#[test]
fn defaults_apply_when_options_are_absent() {
    let catalog = catalog();
    let request = OutlierQueryParser::new(&catalog).get_from_query(&query()).unwrap();

    assert_eq!(request.algorithm, Algorithm::ZScore);
    assert_eq!(request.threshold, 3.0);
    assert_eq!(request.order_by, Order::MeanAbsDev);
    assert_eq!(request.max_results, 500);
    assert_eq!(request.sort_order, SortOrder::Desc);
}

#[test]
fn restricted_and_non_numeric_elements_are_dropped() {
    let catalog = catalog();
    let request = OutlierQueryParser::new(&catalog).get_from_query(&query()).unwrap();

    assert_eq!(
        request.data_element_uids(),
        vec!["fbfJHSPpUQD", "cYeuwXTCPkU", "hfdmMSPBgLG"]
    );
    let org_units: Vec<&str> = request.org_units.iter().map(|ou| ou.uid.as_str()).collect();
    assert_eq!(org_units, vec!["ImspTQPwCqd", "O6uvpzGd5pu"]);
}

#[rstest]
#[case::no_elements(serde_json::json!({"dx": [], "ds": []}), ErrorCode::E7180)]
#[case::no_org_units(serde_json::json!({"ou": []}), ErrorCode::E7181)]
#[case::missing_end(serde_json::json!({"endDate": null}), ErrorCode::E7182)]
#[case::start_after_end(serde_json::json!({"startDate": "2022-11-01"}), ErrorCode::E7182)]
#[case::zero_threshold(serde_json::json!({"threshold": 0.0}), ErrorCode::E7183)]
#[case::zero_results(serde_json::json!({"maxResults": 0}), ErrorCode::E7184)]
#[case::too_many_results(serde_json::json!({"maxResults": 10001}), ErrorCode::E7185)]
#[case::data_window_reversed(
    serde_json::json!({"dataStartDate": "2022-02-01", "dataEndDate": "2022-01-01"}),
    ErrorCode::E7186
)]
#[case::order_not_applicable(serde_json::json!({"orderBy": "MEDIAN"}), ErrorCode::E7187)]
#[case::min_max_in_analytics(serde_json::json!({"algorithm": "MIN_MAX"}), ErrorCode::E7188)]
#[case::malformed_uid(serde_json::json!({"dx": ["not-a-uid"]}), ErrorCode::E7189)]
#[case::malformed_date(serde_json::json!({"startDate": "yesterday"}), ErrorCode::E7190)]
#[case::unknown_sort(serde_json::json!({"sortOrder": "sideways"}), ErrorCode::E7191)]
fn invalid_queries_are_rejected(#[case] overrides: serde_json::Value, #[case] code: ErrorCode) {
    let mut value = serde_json::to_value(query()).unwrap();
    for (key, v) in overrides.as_object().unwrap() {
        value[key] = v.clone();
    }
    let q: OutlierDetectionQuery = serde_json::from_value(value).unwrap();

    let catalog = catalog();
    let err = OutlierQueryParser::new(&catalog).get_from_query(&q).unwrap_err();
    assert_eq!(err.code, code, "{err}");
}

#[test]
fn parsed_request_renders_sql() {
    let catalog = catalog();
    let mut q = query();
    q.algorithm = Some("modified_z_score".to_string());
    q.order_by = Some("MODIFIED_ZSCORE".to_string());
    q.max_results = Some(25);
    q.sort_order = Some("ASC".to_string());
    let request = OutlierQueryParser::new(&catalog).get_from_query(&q).unwrap();

    let builder = PostgreSqlBuilder::new();
    let sql = OutlierSqlGenerator::new(&builder).generate(&request);
    assert!(sql.contains("ax.\"dx\" in ('fbfJHSPpUQD', 'cYeuwXTCPkU', 'hfdmMSPBgLG')"));
    assert!(sql.contains("0.6745 * abs(ax.\"value\" - s.middle_value)"));
    assert!(sql.ends_with("order by t.\"z_score\" asc nulls last limit 25"));
}

#[test]
fn min_max_is_accepted_for_data_validation() {
    let catalog = catalog();
    let mut q = query();
    q.algorithm = Some("MIN_MAX".to_string());
    q.order_by = Some("value".to_string());

    let request = OutlierQueryParser::new(&catalog)
        .with_context(ValidationContext::Validation)
        .get_from_query(&q)
        .unwrap();
    assert_eq!(request.algorithm, Algorithm::MinMax);
    assert_eq!(request.order_by, Order::Value);
}
