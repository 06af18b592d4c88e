use crate::error::{ErrorCode, IllegalQueryError};
use crate::sql::{ClickHouseSqlBuilder, PostgreSqlBuilder, SqlBuilder, SqliteSqlBuilder};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// SQL dialect for parsing and rendering.
///
/// The dialect selects both the `sqlparser` dialect used to read statements and the
/// [`SqlBuilder`] used to render DDL and literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Generic,
    Postgres,
    Clickhouse,
    Sqlite,
}

impl Dialect {
    pub fn to_sqlparser_dialect(&self) -> Box<dyn sqlparser::dialect::Dialect> {
        use sqlparser::dialect::{
            ClickHouseDialect, GenericDialect, PostgreSqlDialect, SQLiteDialect,
        };
        match self {
            Self::Generic => Box::new(GenericDialect {}),
            Self::Postgres => Box::new(PostgreSqlDialect {}),
            Self::Clickhouse => Box::new(ClickHouseDialect {}),
            Self::Sqlite => Box::new(SQLiteDialect {}),
        }
    }

    /// Builder rendering SQL for this dialect. Generic renders as Postgres.
    pub fn sql_builder(&self) -> Box<dyn SqlBuilder> {
        match self {
            Self::Generic | Self::Postgres => Box::new(PostgreSqlBuilder::new()),
            Self::Clickhouse => Box::new(ClickHouseSqlBuilder::new()),
            Self::Sqlite => Box::new(SqliteSqlBuilder::new()),
        }
    }
}

/// An 11-character alphanumeric metadata identifier, starting with a letter.
///
/// UIDs are concatenated into generated SQL as quoted identifiers, so every value of
/// this type has passed format validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Uid(String);

impl Uid {
    pub const LENGTH: usize = 11;

    pub fn parse(value: &str) -> Result<Self, IllegalQueryError> {
        if Self::is_valid(value) {
            Ok(Self(value.to_string()))
        } else {
            Err(IllegalQueryError::new(
                ErrorCode::E7189,
                format!("Invalid UID: '{value}'"),
            ))
        }
    }

    pub fn is_valid(value: &str) -> bool {
        static UID_REGEX: OnceLock<Regex> = OnceLock::new();
        let re = UID_REGEX
            .get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9]{10}$").expect("Invalid regex pattern"));
        re.is_match(value)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Uid {
    type Error = IllegalQueryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Uid> for String {
    fn from(uid: Uid) -> Self {
        uid.0
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
