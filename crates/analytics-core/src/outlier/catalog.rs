//! Metadata lookups needed to resolve outlier queries.

use crate::types::Uid;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValueType {
    Integer,
    IntegerPositive,
    IntegerNegative,
    IntegerZeroOrPositive,
    Number,
    Percentage,
    UnitInterval,
    Text,
    LongText,
    Boolean,
    TrueOnly,
    Date,
}

impl ValueType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer
                | Self::IntegerPositive
                | Self::IntegerNegative
                | Self::IntegerZeroOrPositive
                | Self::Number
                | Self::Percentage
                | Self::UnitInterval
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataElement {
    #[schemars(with = "String")]
    pub uid: Uid,
    pub name: String,
    pub value_type: ValueType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    #[schemars(with = "String")]
    pub uid: Uid,
    pub name: String,
    #[serde(default)]
    #[schemars(with = "Vec<String>")]
    pub data_elements: Vec<Uid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrganisationUnit {
    #[schemars(with = "String")]
    pub uid: Uid,
    pub name: String,
    /// Hierarchy path, e.g. `/ImspTQPwCqd/O6uvpzGd5pu`.
    pub path: String,
}

impl OrganisationUnit {
    pub fn level(&self) -> usize {
        self.path.split('/').filter(|part| !part.is_empty()).count()
    }
}

/// Lookup of metadata objects by UID. Implementations return only the objects the
/// caller may read; unknown or inaccessible UIDs are silently left out.
pub trait MetadataCatalog: Send + Sync {
    fn data_sets_by_uid(&self, uids: &[Uid]) -> Vec<DataSet>;
    fn data_elements_by_uid(&self, uids: &[Uid]) -> Vec<DataElement>;
    fn org_units_by_uid(&self, uids: &[Uid]) -> Vec<OrganisationUnit>;
}

/// Catalog held in memory, typically loaded from a JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InMemoryCatalog {
    #[serde(default)]
    pub data_sets: Vec<DataSet>,
    #[serde(default)]
    pub data_elements: Vec<DataElement>,
    #[serde(default)]
    pub organisation_units: Vec<OrganisationUnit>,
    /// UIDs the current user may not read.
    #[serde(default)]
    #[schemars(with = "Vec<String>")]
    pub restricted: HashSet<Uid>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_set(mut self, data_set: DataSet) -> Self {
        self.data_sets.push(data_set);
        self
    }

    pub fn with_data_element(mut self, data_element: DataElement) -> Self {
        self.data_elements.push(data_element);
        self
    }

    pub fn with_org_unit(mut self, org_unit: OrganisationUnit) -> Self {
        self.organisation_units.push(org_unit);
        self
    }

    pub fn with_restricted(mut self, uid: Uid) -> Self {
        self.restricted.insert(uid);
        self
    }

    /// Objects matching `uids` in request order, each at most once.
    fn lookup<T: Clone>(&self, items: &[T], uids: &[Uid], uid_of: impl Fn(&T) -> &Uid) -> Vec<T> {
        let by_uid: BTreeMap<&Uid, &T> = items.iter().map(|item| (uid_of(item), item)).collect();
        let mut seen = HashSet::new();
        uids.iter()
            .filter(|uid| !self.restricted.contains(*uid) && seen.insert(*uid))
            .filter_map(|uid| by_uid.get(uid).map(|item| (*item).clone()))
            .collect()
    }
}

impl MetadataCatalog for InMemoryCatalog {
    fn data_sets_by_uid(&self, uids: &[Uid]) -> Vec<DataSet> {
        self.lookup(&self.data_sets, uids, |ds| &ds.uid)
    }

    fn data_elements_by_uid(&self, uids: &[Uid]) -> Vec<DataElement> {
        self.lookup(&self.data_elements, uids, |de| &de.uid)
    }

    fn org_units_by_uid(&self, uids: &[Uid]) -> Vec<OrganisationUnit> {
        self.lookup(&self.organisation_units, uids, |ou| &ou.uid)
    }
}
