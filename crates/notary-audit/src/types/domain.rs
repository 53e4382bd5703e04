use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

pub const MIN_DOMAIN_NAME_LEN: usize = 2;
pub const MAX_DOMAIN_NAME_LEN: usize = 50;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub enum DataTLD {
    Analytics,
    Automotive,
    Bikes,
    Business,
    Cars,
    Communication,
    Entertainment,
    Finance,
    Flights,
    Health,
    Hotels,
    Jobs,
    News,
    RealEstate,
    Restaurants,
    Shopping,
    Sports,
    Transportation,
    Travel,
    Weather,
}

/// A namespaced name leased by an account, e.g. `superstore.Shopping`.
#[derive(
    Clone,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct DataDomain {
    pub domain_name: String,
    pub top_level_domain: DataTLD,
}

impl DataDomain {
    pub fn new(domain_name: &str, top_level_domain: DataTLD) -> Self {
        Self {
            domain_name: domain_name.to_string(),
            top_level_domain,
        }
    }

    /// Names are 2 to 50 lowercase alphanumerics, with `-` allowed between them.
    pub fn is_valid_name(&self) -> bool {
        let name = self.domain_name.as_bytes();
        if name.len() < MIN_DOMAIN_NAME_LEN || name.len() > MAX_DOMAIN_NAME_LEN {
            return false;
        }
        if name.first() == Some(&b'-') || name.last() == Some(&b'-') {
            return false;
        }
        name.iter()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == b'-')
    }
}
