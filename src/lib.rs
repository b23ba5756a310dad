//! Scan Desk - QR attendance and gift redemption for live events.
//!
//! Volunteers at one or more desks scan participants' QR codes. Each scan is
//! decoded, checked against the participant registry, and applied as a single
//! compare-and-set, so a participant is marked present (or handed a gift) at
//! most once no matter how many desks scan them at the same moment. Every
//! attempt lands in an append-only audit log, and committed changes fan out to
//! connected desks and dashboards.

pub mod audit;
pub mod codec;
pub mod config;
pub mod desk;
pub mod notify;
pub mod persistence;
pub mod registry;
pub mod scan;
pub mod server;
pub mod stats;
pub mod types;

#[cfg(test)]
pub mod test_utils;
