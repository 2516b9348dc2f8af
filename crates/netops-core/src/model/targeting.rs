//! Targeting: tagged-variant description of which IPs an action runs
//! against (spec §3 "Targeting").

use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Targeting {
    StaticList {
        ips: Vec<String>,
    },
    NetworkRange {
        cidr: String,
        #[serde(default)]
        exclude: Vec<String>,
    },
    IpRange {
        start: IpAddr,
        end: IpAddr,
    },
    DatabaseQuery {
        query: DatabaseQueryRef,
    },
    GroupReference {
        group_id: String,
    },
    PreviousResult {
        field: String,
    },
    InventoryPrefix {
        prefix_id: String,
    },
    InventoryIpRange {
        range_id: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DatabaseQueryRef {
    Named(String),
    LiteralSql(String),
}
