//! Recognition of correlated subqueries that can be computed once per entity.
//!
//! Each recognised subquery is turned into an [`Extraction`]: the pattern kind, the
//! source table, the correlation keys and the remaining filter predicates. The
//! extraction knows how to render its CTE body and the expression that replaces the
//! subquery.
//!
//! Filters are kept as written. The CTE body reads the source table under the
//! subquery's own alias, so qualified filters resolve unchanged; qualifiers are only
//! stripped to compare extractions.

use super::visit::{visit_expr, visit_expr_mut};
use crate::types::Uid;
use sqlparser::ast::{
    BinaryOperator, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, GroupByExpr, Ident,
    Query, Select, SelectItem, SetExpr, TableFactor, Value,
};

const EVENT_TABLE_PREFIX: &str = "analytics_event_";
const ENROLLMENT_TABLE_PREFIX: &str = "analytics_enrollment_";
const RELATIONSHIP_TABLE: &str = "analytics_rs_relationship";
const ATTRIBUTE_VALUE_TABLE: &str = "analytics_rs_trackedentityattributevalue";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PatternKind {
    LastScheduled,
    LastCreated,
    LastValue(Uid),
    DataElementCount(Uid),
    RelationshipCountAgg,
    RelationshipCount(Uid),
    AttributeValue(Uid),
    EnrollmentExists,
}

impl PatternKind {
    /// Base CTE name and join alias. Enrollment existence is numbered by the caller.
    pub(crate) fn base_names(&self) -> (String, String) {
        match self {
            Self::LastScheduled => ("last_sched".into(), "ls".into()),
            Self::LastCreated => ("last_created".into(), "lc".into()),
            Self::LastValue(uid) => (
                format!("last_value_{}", uid.as_str().to_lowercase()),
                format!("lv_{uid}"),
            ),
            Self::DataElementCount(uid) => (
                format!("de_count_{}", uid.as_str().to_lowercase()),
                format!("dec_{uid}"),
            ),
            Self::RelationshipCountAgg => ("relationship_count_agg".into(), "rlc".into()),
            Self::RelationshipCount(uid) => (
                format!("relationship_count_{}", uid.as_str().to_lowercase()),
                format!("rlc_{uid}"),
            ),
            Self::AttributeValue(uid) => (
                format!("teav_{}", uid.as_str().to_lowercase()),
                format!("teav_{uid}"),
            ),
            Self::EnrollmentExists => ("enrollment_exists".into(), "ee".into()),
        }
    }

    fn tag(&self) -> String {
        match self {
            Self::LastScheduled => "last_sched".into(),
            Self::LastCreated => "last_created".into(),
            Self::LastValue(uid) => format!("last_value:{uid}"),
            Self::DataElementCount(uid) => format!("de_count:{uid}"),
            Self::RelationshipCountAgg => "relationship_count_agg".into(),
            Self::RelationshipCount(uid) => format!("relationship_count:{uid}"),
            Self::AttributeValue(uid) => format!("teav:{uid}"),
            Self::EnrollmentExists => "enrollment_exists".into(),
        }
    }
}

/// The outer select a subquery is correlated with.
#[derive(Debug, Clone)]
pub(crate) struct OuterScope {
    /// Alias of the outer relation, or its table name when unaliased.
    pub alias: String,
}

impl OuterScope {
    pub(crate) fn of(select: &Select) -> Option<Self> {
        let relation = &select.from.first()?.relation;
        let alias = match relation {
            TableFactor::Table { name, alias, .. } => alias
                .as_ref()
                .map(|a| a.name.value.clone())
                .unwrap_or_else(|| name.to_string()),
            TableFactor::Derived {
                alias: Some(alias), ..
            } => alias.name.value.clone(),
            _ => return None,
        };
        Some(Self { alias })
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Extraction {
    pub kind: PatternKind,
    pub source_table: String,
    /// Alias of the source table inside the subquery.
    pub inner_alias: Option<Ident>,
    pub inner_key: String,
    pub outer_key: String,
    pub filters: Vec<Expr>,
}

impl Extraction {
    /// Normalized identity: equal signatures yield one shared CTE.
    pub(crate) fn signature(&self) -> String {
        let qualifiers = qualifiers(&self.source_table, self.inner_alias.as_ref());
        let filters = normalized(&self.filters, &qualifiers)
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(
            "{}|{}|{}|{}|{}",
            self.kind.tag(),
            self.source_table,
            self.inner_key,
            self.outer_key,
            filters
        )
    }

    fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            String::new()
        } else {
            format!(
                " where {}",
                self.filters
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" and ")
            )
        }
    }

    /// Columns of the CTE, which a bare reference in the outer select could now mean.
    pub(crate) fn columns(&self) -> Vec<String> {
        let mut columns = vec![self.inner_key.clone()];
        let value = self.value_column().trim_matches('"').to_string();
        if !columns.contains(&value) {
            columns.push(value);
        }
        columns
    }

    fn from_item(&self) -> String {
        match &self.inner_alias {
            Some(alias) => format!("{} as {alias}", self.source_table),
            None => self.source_table.clone(),
        }
    }

    fn value_column(&self) -> String {
        match &self.kind {
            PatternKind::LastScheduled => "scheduleddate".into(),
            PatternKind::LastCreated => "created".into(),
            PatternKind::LastValue(uid) => format!("\"{uid}\""),
            PatternKind::DataElementCount(_) => "de_count".into(),
            PatternKind::RelationshipCountAgg | PatternKind::RelationshipCount(_) => {
                "relationship_count".into()
            }
            PatternKind::AttributeValue(_) => "value".into(),
            PatternKind::EnrollmentExists => self.inner_key.clone(),
        }
    }

    /// Body of the CTE, one row per key.
    pub(crate) fn cte_sql(&self) -> String {
        let key = &self.inner_key;
        let table = &self.from_item();
        let filters = self.where_clause();
        match &self.kind {
            PatternKind::LastScheduled | PatternKind::LastCreated | PatternKind::LastValue(_) => {
                let column = self.value_column();
                format!(
                    "select {key}, {column} from (select {key}, {column}, row_number() over \
                     (partition by {key} order by occurreddate desc) as rn from {table}{filters}) t \
                     where rn = 1"
                )
            }
            PatternKind::DataElementCount(uid) => format!(
                "select {key}, count(\"{uid}\") as de_count from {table}{filters} group by {key}"
            ),
            PatternKind::RelationshipCountAgg => format!(
                "select {key}, sum(relationship_count) as relationship_count from {table}{filters} \
                 group by {key}"
            ),
            PatternKind::RelationshipCount(_) => {
                format!("select {key}, relationship_count from {table}{filters}")
            }
            PatternKind::AttributeValue(_) => format!("select {key}, value from {table}{filters}"),
            PatternKind::EnrollmentExists => format!("select distinct {key} from {table}{filters}"),
        }
    }

    /// Expression replacing the subquery, given the CTE join alias.
    pub(crate) fn replacement_sql(&self, alias: &str) -> String {
        let column = self.value_column();
        match self.kind {
            PatternKind::DataElementCount(_) => format!("coalesce({alias}.{column}, 0)"),
            PatternKind::EnrollmentExists => format!("{alias}.{column} is not null"),
            _ => format!("{alias}.{column}"),
        }
    }
}

/// Classifies a scalar subquery.
pub(crate) fn classify_scalar(query: &Query, scope: &OuterScope) -> Option<Extraction> {
    let parts = SubqueryParts::of(query, scope)?;
    let table = parts.table.to_lowercase();
    let projection = single_projection(parts.select)?;

    if table.starts_with(EVENT_TABLE_PREFIX) {
        if parts.inner_key != "enrollment" || parts.outer_key != "enrollment" {
            return None;
        }
        let kind = if latest_event_ordering(query) {
            match projection {
                Expr::Identifier(ident) if ident.quote_style.is_none() => {
                    match ident.value.to_lowercase().as_str() {
                        "scheduleddate" => PatternKind::LastScheduled,
                        "created" => PatternKind::LastCreated,
                        _ => return None,
                    }
                }
                Expr::Identifier(ident) => PatternKind::LastValue(quoted_uid(ident)?),
                _ => return None,
            }
        } else if query.order_by.is_none() && query.limit_clause.is_none() {
            match single_function_arg(projection, "count")? {
                Expr::Identifier(ident) => PatternKind::DataElementCount(quoted_uid(ident)?),
                _ => return None,
            }
        } else {
            return None;
        };
        return Some(parts.into_extraction(kind));
    }

    if query.order_by.is_some() || query.limit_clause.is_some() {
        return None;
    }

    if table == RELATIONSHIP_TABLE {
        if parts.inner_key != "trackedentityid" || parts.outer_key != "trackedentity" {
            return None;
        }
        let kind = match projection {
            Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("relationship_count") => {
                PatternKind::RelationshipCount(filter_uid(
                    &parts.normalized_filters(),
                    "relationshiptypeuid",
                )?)
            }
            other => match single_function_arg(other, "sum")? {
                Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("relationship_count") => {
                    PatternKind::RelationshipCountAgg
                }
                _ => return None,
            },
        };
        return Some(parts.into_extraction(kind));
    }

    if table == ATTRIBUTE_VALUE_TABLE {
        if parts.inner_key != "trackedentity" || parts.outer_key != "trackedentity" {
            return None;
        }
        match projection {
            Expr::Identifier(ident) if ident.value.eq_ignore_ascii_case("value") => {}
            _ => return None,
        }
        let uid = filter_uid(&parts.normalized_filters(), "trackedentityattribute")?;
        return Some(parts.into_extraction(PatternKind::AttributeValue(uid)));
    }

    None
}

/// Classifies the subquery of a non-negated `exists`.
pub(crate) fn classify_exists(query: &Query, scope: &OuterScope) -> Option<Extraction> {
    if query.order_by.is_some() || query.limit_clause.is_some() {
        return None;
    }
    let parts = SubqueryParts::of(query, scope)?;
    if !parts.table.to_lowercase().starts_with(ENROLLMENT_TABLE_PREFIX)
        || parts.inner_key != "trackedentity"
        || parts.outer_key != "trackedentity"
    {
        return None;
    }
    Some(parts.into_extraction(PatternKind::EnrollmentExists))
}

struct SubqueryParts<'a> {
    select: &'a Select,
    table: String,
    alias: Option<Ident>,
    qualifiers: Vec<String>,
    inner_key: String,
    outer_key: String,
    filters: Vec<Expr>,
}

impl<'a> SubqueryParts<'a> {
    fn of(query: &'a Query, scope: &OuterScope) -> Option<Self> {
        if query.with.is_some() {
            return None;
        }
        let SetExpr::Select(select) = query.body.as_ref() else {
            return None;
        };
        let select: &Select = select;
        if select.from.len() != 1 || !select.from[0].joins.is_empty() || select.having.is_some() {
            return None;
        }
        match &select.group_by {
            GroupByExpr::Expressions(exprs, _) if exprs.is_empty() => {}
            _ => return None,
        }

        let TableFactor::Table { name, alias, .. } = &select.from[0].relation else {
            return None;
        };
        let table = name.to_string();
        let alias = alias.as_ref().map(|a| a.name.clone());
        let qualifiers = qualifiers(&table, alias.as_ref());

        let mut conjuncts = Vec::new();
        split_conjuncts(select.selection.as_ref()?, &mut conjuncts);

        let mut correlation = None;
        let mut filters = Vec::new();
        for conjunct in conjuncts {
            if let Some(keys) = correlation_keys(&conjunct, scope, &qualifiers) {
                if correlation.replace(keys).is_some() {
                    return None;
                }
                continue;
            }
            if references_qualifier(&conjunct, &scope.alias) {
                return None;
            }
            filters.push(conjunct);
        }
        let (inner_key, outer_key) = correlation?;

        Some(Self {
            select,
            table,
            alias,
            qualifiers,
            inner_key,
            outer_key,
            filters,
        })
    }

    fn normalized_filters(&self) -> Vec<Expr> {
        normalized(&self.filters, &self.qualifiers)
    }

    fn into_extraction(self, kind: PatternKind) -> Extraction {
        Extraction {
            kind,
            source_table: self.table,
            inner_alias: self.alias,
            inner_key: self.inner_key,
            outer_key: self.outer_key,
            filters: self.filters,
        }
    }
}

fn split_conjuncts(expr: &Expr, out: &mut Vec<Expr>) {
    match expr {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            split_conjuncts(left, out);
            split_conjuncts(right, out);
        }
        Expr::Nested(inner)
            if matches!(
                inner.as_ref(),
                Expr::BinaryOp {
                    op: BinaryOperator::And,
                    ..
                }
            ) =>
        {
            split_conjuncts(inner, out)
        }
        other => out.push(other.clone()),
    }
}

/// `(inner_key, outer_key)` when the predicate equates an inner column with a column
/// of the outer relation.
fn correlation_keys(
    expr: &Expr,
    scope: &OuterScope,
    qualifiers: &[String],
) -> Option<(String, String)> {
    let Expr::BinaryOp {
        left,
        op: BinaryOperator::Eq,
        right,
    } = expr
    else {
        return None;
    };
    for (a, b) in [(left, right), (right, left)] {
        if let (Some(outer), Some(inner)) = (outer_column(a, scope), inner_column(b, qualifiers)) {
            return Some((inner, outer));
        }
    }
    None
}

fn outer_column(expr: &Expr, scope: &OuterScope) -> Option<String> {
    match expr {
        Expr::CompoundIdentifier(parts) if is_qualified_by(parts, &scope.alias) => {
            parts.last().map(|column| column.value.clone())
        }
        _ => None,
    }
}

fn inner_column(expr: &Expr, qualifiers: &[String]) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.clone()),
        Expr::CompoundIdentifier(parts) if qualifiers.iter().any(|q| is_qualified_by(parts, q)) => {
            parts.last().map(|column| column.value.clone())
        }
        _ => None,
    }
}

/// Names a column of the source table may be qualified with.
fn qualifiers(table: &str, alias: Option<&Ident>) -> Vec<String> {
    let mut qualifiers = vec![table.replace('"', "")];
    if let Some(alias) = alias {
        qualifiers.push(alias.value.clone());
    }
    qualifiers
}

/// `parts` is a column reference whose qualifier is exactly `qualifier`.
fn is_qualified_by(parts: &[Ident], qualifier: &str) -> bool {
    let Some((_, prefix)) = parts.split_last() else {
        return false;
    };
    !prefix.is_empty()
        && prefix
            .iter()
            .map(|part| part.value.as_str())
            .collect::<Vec<_>>()
            .join(".")
            .eq_ignore_ascii_case(qualifier)
}

/// Any column reference below `expr`, nested subqueries included, qualified by `qualifier`.
fn references_qualifier(expr: &Expr, qualifier: &str) -> bool {
    let mut found = false;
    visit_expr(expr, &mut |e| {
        if let Expr::CompoundIdentifier(parts) = e {
            found |= is_qualified_by(parts, qualifier);
        }
    });
    found
}

/// Filters with `q.column` rewritten to `column` for the source table's qualifiers.
fn normalized(filters: &[Expr], qualifiers: &[String]) -> Vec<Expr> {
    filters
        .iter()
        .cloned()
        .map(|mut filter| {
            visit_expr_mut(&mut filter, &mut |e| {
                if let Expr::CompoundIdentifier(parts) = e {
                    if qualifiers.iter().any(|q| is_qualified_by(parts, q)) {
                        if let Some(column) = parts.pop() {
                            *e = Expr::Identifier(column);
                        }
                    }
                }
            });
            filter
        })
        .collect()
}

fn single_projection(select: &Select) -> Option<&Expr> {
    match select.projection.as_slice() {
        [SelectItem::UnnamedExpr(expr)] | [SelectItem::ExprWithAlias { expr, .. }] => Some(expr),
        _ => None,
    }
}

fn single_function_arg<'a>(expr: &'a Expr, name: &str) -> Option<&'a Expr> {
    let Expr::Function(func) = expr else {
        return None;
    };
    if !func.name.to_string().eq_ignore_ascii_case(name) {
        return None;
    }
    let FunctionArguments::List(list) = &func.args else {
        return None;
    };
    match list.args.as_slice() {
        [FunctionArg::Unnamed(FunctionArgExpr::Expr(arg))] if list.duplicate_treatment.is_none() => {
            Some(arg)
        }
        _ => None,
    }
}

/// `order by occurreddate desc [nulls last] limit 1`
fn latest_event_ordering(query: &Query) -> bool {
    let order_by = query
        .order_by
        .as_ref()
        .map(|o| o.to_string().to_lowercase().replace('"', ""))
        .unwrap_or_default();
    let order_by = order_by.trim();
    let order_by = order_by.strip_suffix(" nulls last").unwrap_or(order_by);
    let limit = query
        .limit_clause
        .as_ref()
        .map(|l| l.to_string().trim().to_lowercase())
        .unwrap_or_default();
    order_by == "order by occurreddate desc" && limit == "limit 1"
}

/// A double-quoted identifier holding a well-formed UID.
fn quoted_uid(ident: &Ident) -> Option<Uid> {
    if ident.quote_style != Some('"') {
        return None;
    }
    Uid::parse(&ident.value).ok()
}

/// UID compared for equality with `column` in one of the filters.
fn filter_uid(filters: &[Expr], column: &str) -> Option<Uid> {
    filters.iter().find_map(|filter| {
        let Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } = filter
        else {
            return None;
        };
        match (left.as_ref(), right.as_ref()) {
            (Expr::Identifier(ident), Expr::Value(value))
                if ident.value.eq_ignore_ascii_case(column) =>
            {
                match &value.value {
                    Value::SingleQuotedString(uid) => Uid::parse(uid).ok(),
                    _ => None,
                }
            }
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use crate::types::Dialect;

    fn first_subquery(expr: &Expr) -> Option<Query> {
        match expr {
            Expr::Subquery(query) => Some(query.as_ref().clone()),
            Expr::BinaryOp { left, right, .. } => {
                first_subquery(left).or_else(|| first_subquery(right))
            }
            Expr::IsNull(inner) | Expr::IsNotNull(inner) | Expr::Nested(inner) => {
                first_subquery(inner)
            }
            _ => None,
        }
    }

    fn where_subquery(sql: &str) -> (Query, Select) {
        let query = parse_query(sql, Dialect::Postgres).unwrap();
        let SetExpr::Select(select) = query.body.as_ref() else {
            panic!("expected select");
        };
        let select = select.as_ref().clone();
        let inner = first_subquery(select.selection.as_ref().unwrap()).unwrap();
        (inner, select)
    }

    #[test]
    fn test_last_scheduled() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select scheduleddate from analytics_event_ur1edk5oe2n \
              where analytics_event_ur1edk5oe2n.enrollment = subax.enrollment \
              and scheduleddate is not null order by occurreddate desc limit 1) is not null",
        );
        let scope = OuterScope::of(&outer).unwrap();
        assert_eq!(scope.alias, "subax");
        let extraction = classify_scalar(&inner, &scope).unwrap();
        assert_eq!(extraction.kind, PatternKind::LastScheduled);
        assert_eq!(
            extraction.cte_sql(),
            "select enrollment, scheduleddate from (select enrollment, scheduleddate, \
             row_number() over (partition by enrollment order by occurreddate desc) as rn \
             from analytics_event_ur1edk5oe2n where scheduleddate IS NOT NULL) t where rn = 1"
        );
        assert_eq!(extraction.replacement_sql("ls"), "ls.scheduleddate");
    }

    #[test]
    fn test_last_value_keeps_program_stage_filter() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_iphinat79uw as subax where \
             (select \"H6uSAMO5WLD\" from analytics_event_IpHINAT79UW \
              where analytics_event_IpHINAT79UW.enrollment = subax.enrollment \
              and \"H6uSAMO5WLD\" is not null and ps = 'A03MvHHogjR' \
              order by occurreddate desc limit 1) = 'RDT'",
        );
        let extraction = classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).unwrap();
        assert_eq!(
            extraction.kind,
            PatternKind::LastValue(Uid::parse("H6uSAMO5WLD").unwrap())
        );
        assert_eq!(extraction.filters.len(), 2);
        assert_eq!(extraction.filters[1].to_string(), "ps = 'A03MvHHogjR'");
        assert_eq!(
            extraction.kind.base_names(),
            ("last_value_h6usamo5wld".to_string(), "lv_H6uSAMO5WLD".to_string())
        );
    }

    #[test]
    fn test_data_element_count() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select count(\"fCXKBdc27Bt\") from analytics_event_ur1Edk5Oe2n \
              where analytics_event_ur1Edk5Oe2n.enrollment = subax.enrollment \
              and \"fCXKBdc27Bt\" = 1) > 0",
        );
        let extraction = classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).unwrap();
        assert!(matches!(extraction.kind, PatternKind::DataElementCount(_)));
        assert_eq!(
            extraction.cte_sql(),
            "select enrollment, count(\"fCXKBdc27Bt\") as de_count from analytics_event_ur1Edk5Oe2n \
             where \"fCXKBdc27Bt\" = 1 group by enrollment"
        );
        assert_eq!(
            extraction.replacement_sql("dec_fCXKBdc27Bt"),
            "coalesce(dec_fCXKBdc27Bt.de_count, 0)"
        );
    }

    #[test]
    fn test_aggregated_relationship_count_with_alias() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select sum(relationship_count) from analytics_rs_relationship arr \
              where arr.trackedentityid = subax.trackedentity) > 10",
        );
        let extraction = classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).unwrap();
        assert_eq!(extraction.kind, PatternKind::RelationshipCountAgg);
        assert_eq!(extraction.inner_key, "trackedentityid");
        assert_eq!(extraction.outer_key, "trackedentity");
    }

    #[test]
    fn test_relationship_count_with_malformed_type_uid_stays_inline() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select relationship_count from analytics_rs_relationship arr \
              where arr.trackedentityid = subax.trackedentity \
              and relationshiptypeuid = 'dk34dj3') > 10",
        );
        assert!(classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).is_none());
    }

    #[test]
    fn test_attribute_value() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select value from analytics_rs_trackedentityattributevalue teav \
              where teav.trackedentity = subax.trackedentity \
              and teav.trackedentityattribute = 'w75KJ2mc4zz') = 'MALE'",
        );
        let extraction = classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).unwrap();
        assert_eq!(
            extraction.cte_sql(),
            "select trackedentity, value from analytics_rs_trackedentityattributevalue as teav \
             where teav.trackedentityattribute = 'w75KJ2mc4zz'"
        );
        assert_eq!(extraction.columns(), ["trackedentity", "value"]);
    }

    #[test]
    fn test_qualified_filter_inside_case_reads_aliased_table() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select value from analytics_rs_trackedentityattributevalue teav \
              where teav.trackedentity = subax.trackedentity \
              and teav.trackedentityattribute = 'w75KJ2mc4zz' \
              and case when teav.value = 'X' then 1 else 0 end = 1) = 'X'",
        );
        let extraction = classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).unwrap();
        assert_eq!(
            extraction.cte_sql(),
            "select trackedentity, value from analytics_rs_trackedentityattributevalue as teav \
             where teav.trackedentityattribute = 'w75KJ2mc4zz' \
             and CASE WHEN teav.value = 'X' THEN 1 ELSE 0 END = 1"
        );
        assert!(extraction
            .signature()
            .ends_with("CASE WHEN value = 'X' THEN 1 ELSE 0 END = 1"));
    }

    #[test]
    fn test_outer_alias_is_matched_on_identifiers_only() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as ax where \
             (select value from analytics_rs_trackedentityattributevalue tax \
              where tax.trackedentity = ax.trackedentity \
              and tax.trackedentityattribute = 'w75KJ2mc4zz' \
              and tax.value <> 'ax.unknown') = 'X'",
        );
        let scope = OuterScope::of(&outer).unwrap();
        let extraction = classify_scalar(&inner, &scope).unwrap();
        assert_eq!(extraction.inner_alias.unwrap().value, "tax");
        assert_eq!(extraction.filters.len(), 2);
    }

    #[test]
    fn test_nested_reference_to_outer_alias_stays_inline() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select value from analytics_rs_trackedentityattributevalue teav \
              where teav.trackedentity = subax.trackedentity \
              and teav.trackedentityattribute = 'w75KJ2mc4zz' \
              and coalesce(teav.value, subax.ou) <> '') = 'X'",
        );
        assert!(classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).is_none());
    }

    #[test]
    fn test_uncorrelated_subquery_is_not_extracted() {
        let (inner, outer) = where_subquery(
            "select enrollment from analytics_enrollment_ur1edk5oe2n as subax where \
             (select max(created) from analytics_event_ur1edk5oe2n) is not null",
        );
        assert!(classify_scalar(&inner, &OuterScope::of(&outer).unwrap()).is_none());
    }

    #[test]
    fn test_signature_ignores_inner_alias() {
        let a = where_subquery(
            "select enrollment from analytics_enrollment_x as subax where \
             (select value from analytics_rs_trackedentityattributevalue t1 \
              where t1.trackedentity = subax.trackedentity and t1.trackedentityattribute = 'w75KJ2mc4zz') = 'A'",
        );
        let b = where_subquery(
            "select enrollment from analytics_enrollment_x as subax where \
             (SELECT value FROM analytics_rs_trackedentityattributevalue t2 \
              WHERE t2.trackedentity = subax.trackedentity AND   trackedentityattribute = 'w75KJ2mc4zz') = 'A'",
        );
        let scope = OuterScope::of(&a.1).unwrap();
        assert_eq!(
            classify_scalar(&a.0, &scope).unwrap().signature(),
            classify_scalar(&b.0, &scope).unwrap().signature()
        );
    }
}
