use crate::error::{ErrorCode, IllegalQueryError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Statistical method used to flag outliers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Algorithm {
    #[default]
    ZScore,
    ModifiedZScore,
    MinMax,
}

impl Algorithm {
    pub const ALL: [Algorithm; 3] = [Self::ZScore, Self::ModifiedZScore, Self::MinMax];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ZScore => "Z_SCORE",
            Self::ModifiedZScore => "MODIFIED_Z_SCORE",
            Self::MinMax => "MIN_MAX",
        }
    }

    /// Case-insensitive; underscores are optional.
    pub fn parse(name: &str) -> Result<Self, IllegalQueryError> {
        let wanted = normalize(name);
        Self::ALL
            .into_iter()
            .find(|a| normalize(a.as_str()) == wanted)
            .ok_or_else(|| {
                IllegalQueryError::new(ErrorCode::E7191, format!("Unknown algorithm: '{name}'"))
            })
    }

    /// Orders that are meaningful for results of this algorithm.
    pub fn supports_order(&self, order: Order) -> bool {
        use Order::*;
        match self {
            Self::ZScore => matches!(
                order,
                ZScore | Value | Mean | StdDev | MeanAbsDev | LowerBound | UpperBound
            ),
            Self::ModifiedZScore => matches!(
                order,
                ModifiedZscore | Value | Median | MedianAbsDev | MeanAbsDev | LowerBound | UpperBound
            ),
            Self::MinMax => matches!(order, Value | MeanAbsDev | LowerBound | UpperBound),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sort key of outlier results. Each variant has a fixed response header and result
/// column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Order {
    ZScore,
    ModifiedZscore,
    Value,
    Median,
    Mean,
    StdDev,
    MedianAbsDev,
    #[default]
    MeanAbsDev,
    LowerBound,
    UpperBound,
}

impl Order {
    pub const ALL: [Order; 10] = [
        Self::ZScore,
        Self::ModifiedZscore,
        Self::Value,
        Self::Median,
        Self::Mean,
        Self::StdDev,
        Self::MedianAbsDev,
        Self::MeanAbsDev,
        Self::LowerBound,
        Self::UpperBound,
    ];

    pub fn header_name(&self) -> &'static str {
        match self {
            Self::ZScore => "zscore",
            Self::ModifiedZscore => "modifiedzscore",
            Self::Value => "value",
            Self::Median => "median",
            Self::Mean => "mean",
            Self::StdDev => "stddev",
            Self::MedianAbsDev => "medianabsdeviation",
            Self::MeanAbsDev => "absdev",
            Self::LowerBound => "lowerbound",
            Self::UpperBound => "upperbound",
        }
    }

    pub fn column_name(&self) -> &'static str {
        match self {
            Self::ZScore | Self::ModifiedZscore => "z_score",
            Self::Value => "value",
            Self::Median | Self::Mean => "middle_value",
            Self::StdDev => "std_dev",
            Self::MedianAbsDev => "median_abs_deviation",
            Self::MeanAbsDev => "middle_value_abs_dev",
            Self::LowerBound => "lower_bound",
            Self::UpperBound => "upper_bound",
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::ZScore => "Z_SCORE",
            Self::ModifiedZscore => "MODIFIED_ZSCORE",
            Self::Value => "VALUE",
            Self::Median => "MEDIAN",
            Self::Mean => "MEAN",
            Self::StdDev => "STD_DEV",
            Self::MedianAbsDev => "MEDIAN_ABS_DEV",
            Self::MeanAbsDev => "MEAN_ABS_DEV",
            Self::LowerBound => "LOWER_BOUND",
            Self::UpperBound => "UPPER_BOUND",
        }
    }

    /// Accepts the header name or the variant name, case-insensitive.
    pub fn parse(name: &str) -> Result<Self, IllegalQueryError> {
        let wanted = normalize(name);
        Self::ALL
            .into_iter()
            .find(|o| normalize(o.header_name()) == wanted || normalize(o.variant_name()) == wanted)
            .ok_or_else(|| {
                IllegalQueryError::new(ErrorCode::E7191, format!("Unknown order: '{name}'"))
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(name: &str) -> Result<Self, IllegalQueryError> {
        match name.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(IllegalQueryError::new(
                ErrorCode::E7191,
                format!("Unknown sort order: '{name}'"),
            )),
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
