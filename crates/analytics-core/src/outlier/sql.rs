//! SQL for outlier detection over the aggregate analytics table.

use super::order::Algorithm;
use super::request::OutlierDetectionRequest;
use crate::sql::{CompareOp, SqlBuilder, SqlExpr};

const KEY_COLUMNS: [&str; 4] = ["dx", "co", "ao", "ou"];

/// Consistency constant relating the median absolute deviation to the standard
/// deviation of a normal distribution.
const MAD_CONSTANT: f64 = 0.6745;

pub struct OutlierSqlGenerator<'a> {
    builder: &'a dyn SqlBuilder,
    table: String,
    min_max_table: String,
}

impl<'a> OutlierSqlGenerator<'a> {
    pub fn new(builder: &'a dyn SqlBuilder) -> Self {
        Self {
            builder,
            table: "analytics".to_string(),
            min_max_table: "analytics_minmax".to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn with_min_max_table(mut self, table: impl Into<String>) -> Self {
        self.min_max_table = table.into();
        self
    }

    /// Query returning at most `max_results` outliers ordered by the requested column.
    pub fn generate(&self, request: &OutlierDetectionRequest) -> String {
        let body = match request.algorithm {
            Algorithm::ZScore => self.z_score(request),
            Algorithm::ModifiedZScore => self.modified_z_score(request),
            Algorithm::MinMax => self.min_max(request),
        };
        format!(
            "{body} order by t.{} {} nulls last limit {}",
            self.builder.quote(request.order_by.column_name()),
            request.sort_order.as_sql(),
            request.max_results
        )
    }

    fn z_score(&self, request: &OutlierDetectionRequest) -> String {
        let threshold = request.threshold;
        let table = self.builder.quote(&self.table);
        format!(
            "with stats as (select {keys}, avg(ax.\"value\") as middle_value, \
             stddev_pop(ax.\"value\") as std_dev from {table} as ax where {data_window} \
             group by {keys}) \
             select * from (select {columns}, s.middle_value, s.std_dev, \
             abs(ax.\"value\" - s.middle_value) as middle_value_abs_dev, \
             abs(ax.\"value\" - s.middle_value) / s.std_dev as z_score, \
             s.middle_value - s.std_dev * {threshold} as lower_bound, \
             s.middle_value + s.std_dev * {threshold} as upper_bound \
             from {table} as ax inner join stats as s on {join_stats} \
             where {window} and s.std_dev != 0) as t \
             where t.z_score >= {threshold}",
            keys = self.keys("ax"),
            columns = self.columns(),
            data_window = self.data_window(request),
            join_stats = self.join_on("s"),
            window = self.window(request),
        )
    }

    fn modified_z_score(&self, request: &OutlierDetectionRequest) -> String {
        let threshold = request.threshold;
        let table = self.builder.quote(&self.table);
        format!(
            "with stats as (select {keys}, percentile_cont(0.5) within group \
             (order by ax.\"value\") as middle_value from {table} as ax where {data_window} \
             group by {keys}), \
             deviation as (select {stats_keys}, percentile_cont(0.5) within group \
             (order by abs(ax.\"value\" - s.middle_value)) as median_abs_deviation \
             from {table} as ax inner join stats as s on {join_stats} where {data_window} \
             group by {stats_keys}) \
             select * from (select {columns}, s.middle_value, d.median_abs_deviation, \
             abs(ax.\"value\" - s.middle_value) as middle_value_abs_dev, \
             {MAD_CONSTANT} * abs(ax.\"value\" - s.middle_value) / d.median_abs_deviation as z_score, \
             s.middle_value - d.median_abs_deviation * {threshold} / {MAD_CONSTANT} as lower_bound, \
             s.middle_value + d.median_abs_deviation * {threshold} / {MAD_CONSTANT} as upper_bound \
             from {table} as ax inner join stats as s on {join_stats} \
             inner join deviation as d on {join_deviation} \
             where {window} and d.median_abs_deviation != 0) as t \
             where t.z_score >= {threshold}",
            keys = self.keys("ax"),
            stats_keys = self.keys("s"),
            columns = self.columns(),
            data_window = self.data_window(request),
            join_stats = self.join_on("s"),
            join_deviation = self.join_on("d"),
            window = self.window(request),
        )
    }

    fn min_max(&self, request: &OutlierDetectionRequest) -> String {
        let join = ["dx", "co", "ou"]
            .iter()
            .map(|c| {
                format!(
                    "{} = {}",
                    self.builder.quote_alias("ax", c),
                    self.builder.quote_alias("mm", c)
                )
            })
            .collect::<Vec<_>>()
            .join(" and ");
        format!(
            "select * from (select {columns}, mm.\"minimumvalue\" as lower_bound, \
             mm.\"maximumvalue\" as upper_bound, \
             case when ax.\"value\" < mm.\"minimumvalue\" then mm.\"minimumvalue\" - ax.\"value\" \
             else ax.\"value\" - mm.\"maximumvalue\" end as middle_value_abs_dev \
             from {table} as ax inner join {min_max} as mm on {join} \
             where {window} and (ax.\"value\" < mm.\"minimumvalue\" \
             or ax.\"value\" > mm.\"maximumvalue\")) as t",
            columns = self.columns(),
            table = self.builder.quote(&self.table),
            min_max = self.builder.quote(&self.min_max_table),
            window = self.window(request),
        )
    }

    fn keys(&self, alias: &str) -> String {
        KEY_COLUMNS
            .iter()
            .map(|c| self.builder.quote_alias(alias, c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn columns(&self) -> String {
        ["dx", "pe", "ou", "co", "ao", "value"]
            .iter()
            .map(|c| self.builder.quote_alias("ax", c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn join_on(&self, alias: &str) -> String {
        KEY_COLUMNS
            .iter()
            .map(|c| {
                format!(
                    "{} = {}",
                    self.builder.quote_alias("ax", c),
                    self.builder.quote_alias(alias, c)
                )
            })
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Data elements and org unit subtrees.
    fn scope(&self, request: &OutlierDetectionRequest) -> SqlExpr {
        let data_elements = SqlExpr::qualified("ax", "dx").in_list(
            request
                .data_elements
                .iter()
                .map(|de| SqlExpr::text(de.uid.as_str()))
                .collect(),
        );
        let org_units = request
            .org_units
            .iter()
            .map(|ou| {
                SqlExpr::qualified("ax", "path")
                    .compare(CompareOp::Like, SqlExpr::text(format!("{}%", ou.path)))
            })
            .fold(None, |acc: Option<SqlExpr>, e| {
                Some(match acc {
                    Some(acc) => acc.or(e),
                    None => e,
                })
            })
            .unwrap_or_else(|| SqlExpr::boolean(false));
        data_elements.and(org_units)
    }

    /// Rows used to compute statistics.
    fn data_window(&self, request: &OutlierDetectionRequest) -> String {
        let mut condition = self.scope(request);
        if let Some(start) = request.data_start_date {
            condition = condition.and(
                SqlExpr::qualified("ax", "pestartdate")
                    .gt_eq(SqlExpr::text(start.format("%Y-%m-%d").to_string())),
            );
        }
        if let Some(end) = request.data_end_date {
            condition = condition.and(
                SqlExpr::qualified("ax", "peenddate")
                    .lt_eq(SqlExpr::text(end.format("%Y-%m-%d").to_string())),
            );
        }
        condition.render(self.builder)
    }

    /// Rows checked for outliers.
    fn window(&self, request: &OutlierDetectionRequest) -> String {
        let mut condition = self.scope(request);
        if let Some(start) = request.start_date {
            condition = condition.and(
                SqlExpr::qualified("ax", "pestartdate")
                    .gt_eq(SqlExpr::text(start.format("%Y-%m-%d").to_string())),
            );
        }
        if let Some(end) = request.end_date {
            condition = condition.and(
                SqlExpr::qualified("ax", "peenddate")
                    .lt_eq(SqlExpr::text(end.format("%Y-%m-%d").to_string())),
            );
        }
        condition.render(self.builder)
    }
}
