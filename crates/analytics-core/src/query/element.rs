//! Filterable dimensions of event and enrollment analytics queries.
//!
//! Each element renders a select column and a where predicate over the outer relation
//! of the query. Attribute values, stage data values, enrollment dates and relationship
//! counts are rendered as correlated subqueries in the shape the CTE decomposer
//! extracts, so an element never has to know whether its query will be optimized.

use crate::sql::{CompareOp, Literal, SelectBuilder, SortDirection, SqlExpr};
use crate::types::Uid;
use chrono::NaiveDate;

pub const ATTRIBUTE_VALUE_TABLE: &str = "analytics_rs_trackedentityattributevalue";
pub const RELATIONSHIP_TABLE: &str = "analytics_rs_relationship";

pub fn event_table(program: &Uid) -> String {
    format!("analytics_event_{}", program.as_str().to_lowercase())
}

pub fn enrollment_table(program: &Uid) -> String {
    format!("analytics_enrollment_{}", program.as_str().to_lowercase())
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClauseElement {
    /// Value of a tracked entity attribute.
    TrackedEntityAttributeValue {
        attribute: Uid,
        op: CompareOp,
        value: Literal,
    },
    /// Date of an enrollment in a program. As a predicate: an enrollment in the
    /// program exists with a matching date.
    EnrollmentDate {
        program: Uid,
        op: CompareOp,
        date: NaiveDate,
    },
    /// Latest value of a data element in a program stage.
    EventDataValue {
        program: Uid,
        program_stage: Uid,
        data_element: Uid,
        op: CompareOp,
        value: Literal,
    },
    /// Number of relationships, optionally of one relationship type.
    RelationshipCount {
        relationship_type: Option<Uid>,
        op: CompareOp,
        count: i64,
    },
    /// Organisation unit at a hierarchy level.
    OrgUnitLevel { level: u32, org_units: Vec<Uid> },
}

impl ClauseElement {
    /// Column name of the element in the result set.
    pub fn column_name(&self) -> String {
        match self {
            Self::TrackedEntityAttributeValue { attribute, .. } => attribute.to_string(),
            Self::EnrollmentDate { program, .. } => format!("{program}.enrollmentdate"),
            Self::EventDataValue {
                program_stage,
                data_element,
                ..
            } => format!("{program_stage}.{data_element}"),
            Self::RelationshipCount {
                relationship_type: Some(uid),
                ..
            } => format!("relationship_count.{uid}"),
            Self::RelationshipCount { .. } => "relationship_count".to_string(),
            Self::OrgUnitLevel { level, .. } => format!("uidlevel{level}"),
        }
    }

    /// Value expression of the element, correlated with `outer`.
    pub fn select_expr(&self, outer: &str) -> SqlExpr {
        match self {
            Self::TrackedEntityAttributeValue { attribute, .. } => {
                SqlExpr::subquery(attribute_value(attribute, outer))
            }
            Self::EnrollmentDate { program, .. } => SqlExpr::subquery(
                SelectBuilder::new()
                    .column(SqlExpr::function(
                        "max",
                        vec![SqlExpr::column("enrollmentdate")],
                    ))
                    .from_table(enrollment_table(program))
                    .where_and(correlate(&enrollment_table(program), "trackedentity", outer)),
            ),
            Self::EventDataValue {
                program,
                program_stage,
                data_element,
                ..
            } => SqlExpr::subquery(latest_data_value(program, program_stage, data_element, outer)),
            Self::RelationshipCount {
                relationship_type, ..
            } => SqlExpr::subquery(relationship_count(relationship_type.as_ref(), outer)),
            Self::OrgUnitLevel { level, .. } => {
                SqlExpr::qualified(outer, format!("uidlevel{level}"))
            }
        }
    }

    /// Predicate restricting rows of `outer` to those matching the element.
    pub fn where_predicate(&self, outer: &str) -> SqlExpr {
        match self {
            Self::TrackedEntityAttributeValue { op, value, .. }
            | Self::EventDataValue { op, value, .. } => self
                .select_expr(outer)
                .compare(*op, SqlExpr::Literal(value.clone())),
            Self::EnrollmentDate { program, op, date } => {
                let table = enrollment_table(program);
                SqlExpr::exists(
                    SelectBuilder::new()
                        .column(SqlExpr::integer(1))
                        .from_table(table.clone())
                        .where_and(correlate(&table, "trackedentity", outer))
                        .where_and(
                            SqlExpr::column("enrollmentdate")
                                .compare(*op, SqlExpr::text(date.format("%Y-%m-%d").to_string())),
                        ),
                )
            }
            Self::RelationshipCount { op, count, .. } => self
                .select_expr(outer)
                .compare(*op, SqlExpr::integer(*count)),
            Self::OrgUnitLevel { org_units, .. } => {
                if org_units.is_empty() {
                    SqlExpr::boolean(false)
                } else {
                    self.select_expr(outer).in_list(
                        org_units
                            .iter()
                            .map(|uid| SqlExpr::text(uid.as_str()))
                            .collect(),
                    )
                }
            }
        }
    }
}

fn correlate(inner: &str, column: &str, outer: &str) -> SqlExpr {
    let (inner_column, outer_column) = match column {
        "trackedentityid" => ("trackedentityid", "trackedentity"),
        other => (other, other),
    };
    SqlExpr::qualified(inner, inner_column).eq(SqlExpr::qualified(outer, outer_column))
}

fn attribute_value(attribute: &Uid, outer: &str) -> SelectBuilder {
    SelectBuilder::new()
        .column(SqlExpr::column("value"))
        .from(ATTRIBUTE_VALUE_TABLE, "teav")
        .where_and(correlate("teav", "trackedentity", outer))
        .where_and(
            SqlExpr::qualified("teav", "trackedentityattribute").eq(SqlExpr::text(attribute.as_str())),
        )
}

fn latest_data_value(
    program: &Uid,
    program_stage: &Uid,
    data_element: &Uid,
    outer: &str,
) -> SelectBuilder {
    let table = event_table(program);
    SelectBuilder::new()
        .column(SqlExpr::column(data_element.as_str()))
        .from_table(table.clone())
        .where_and(correlate(&table, "enrollment", outer))
        .where_and(SqlExpr::column(data_element.as_str()).is_not_null())
        .where_and(SqlExpr::column("ps").eq(SqlExpr::text(program_stage.as_str())))
        .order_by(SqlExpr::column("occurreddate"), SortDirection::Desc)
        .limit(1)
}

fn relationship_count(relationship_type: Option<&Uid>, outer: &str) -> SelectBuilder {
    let select = SelectBuilder::new().from(RELATIONSHIP_TABLE, "rl");
    match relationship_type {
        Some(uid) => select
            .column(SqlExpr::column("relationship_count"))
            .where_and(correlate("rl", "trackedentityid", outer))
            .where_and(SqlExpr::qualified("rl", "relationshiptypeuid").eq(SqlExpr::text(uid.as_str()))),
        None => select
            .column(SqlExpr::function(
                "sum",
                vec![SqlExpr::column("relationship_count")],
            ))
            .where_and(correlate("rl", "trackedentityid", outer)),
    }
}
