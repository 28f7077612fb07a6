//! Resolver service account.
//!
//! The resolver drops privileges to a dedicated account with no login shell.
//! UID and GID come from the macOS reserved service range; creation goes
//! through `dscl` and requires interactive sudo confirmation.

use std::collections::BTreeSet;

use crate::cmd;
use crate::error::{BootstrapError, Result};
use crate::step::{Step, StepStatus};

/// Account and group name, underscore-prefixed per macOS convention.
pub const ACCOUNT: &str = "_devdns";

/// Reserved range scanned for a free UID/GID slot.
const ID_RANGE: (u32, u32) = (301, 499);

/// Parses `dscl . -list /Users UniqueID` style output into the set of
/// numeric ids. Lines are `name<whitespace>id`; unparseable lines are
/// skipped.
fn parse_ids(listing: &str) -> BTreeSet<u32> {
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .filter_map(|id| id.parse().ok())
        .collect()
}

/// Finds the lowest id in [`ID_RANGE`] free in both sets.
fn free_id(uids: &BTreeSet<u32>, gids: &BTreeSet<u32>) -> Option<u32> {
    (ID_RANGE.0..=ID_RANGE.1).find(|id| !uids.contains(id) && !gids.contains(id))
}

/// Returns `true` if the service account exists in the local directory.
#[must_use]
pub fn exists() -> bool {
    cmd::succeeds("dscl", &[".", "-read", &format!("/Users/{ACCOUNT}")])
}

/// Creates the group and user with a freshly-allocated id.
///
/// # Errors
///
/// Returns [`BootstrapError::IdRangeExhausted`] if no slot in [301, 499] is
/// free, or propagates `dscl` failures.
pub fn create() -> Result<()> {
    let uids = parse_ids(&cmd::run("dscl", &[".", "-list", "/Users", "UniqueID"])?);
    let gids = parse_ids(&cmd::run(
        "dscl",
        &[".", "-list", "/Groups", "PrimaryGroupID"],
    )?);

    let id = free_id(&uids, &gids).ok_or(BootstrapError::IdRangeExhausted {
        low: ID_RANGE.0,
        high: ID_RANGE.1,
    })?;
    let id_str = id.to_string();
    let group_path = format!("/Groups/{ACCOUNT}");
    let user_path = format!("/Users/{ACCOUNT}");

    tracing::info!(account = ACCOUNT, id, "Creating service account");

    cmd::run_elevated("dscl", &[".", "-create", &group_path])?;
    cmd::run_elevated("dscl", &[".", "-create", &group_path, "PrimaryGroupID", &id_str])?;

    cmd::run_elevated("dscl", &[".", "-create", &user_path])?;
    cmd::run_elevated("dscl", &[".", "-create", &user_path, "UniqueID", &id_str])?;
    cmd::run_elevated("dscl", &[".", "-create", &user_path, "PrimaryGroupID", &id_str])?;
    cmd::run_elevated("dscl", &[".", "-create", &user_path, "UserShell", "/usr/bin/false"])?;
    cmd::run_elevated("dscl", &[".", "-create", &user_path, "NFSHomeDirectory", "/var/empty"])?;

    Ok(())
}

/// Ensures the `_devdns` service account exists.
pub struct ServiceAccountStep;

impl Step for ServiceAccountStep {
    fn name(&self) -> &str {
        "service-account"
    }

    fn check(&self) -> Result<StepStatus> {
        if exists() {
            Ok(StepStatus::Satisfied)
        } else {
            Ok(StepStatus::Needed(format!(
                "create {ACCOUNT} user and group in [{}, {}]",
                ID_RANGE.0, ID_RANGE.1
            )))
        }
    }

    fn apply(&self) -> Result<()> {
        create()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ids_reads_name_id_pairs() {
        let listing = "_www  70\n_mdnsresponder 65\nnobody -2\nroot 0\n";
        let ids = parse_ids(listing);
        assert!(ids.contains(&70));
        assert!(ids.contains(&65));
        assert!(ids.contains(&0));
        // "-2" does not parse as u32 and is skipped.
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn parse_ids_skips_malformed_lines() {
        let ids = parse_ids("loneword\n\n_x 301\n");
        assert_eq!(ids, BTreeSet::from([301]));
    }

    #[test]
    fn free_id_picks_lowest_unused_in_both_sets() {
        let uids = BTreeSet::from([301, 302]);
        let gids = BTreeSet::from([301, 303]);
        assert_eq!(free_id(&uids, &gids), Some(304));
    }

    #[test]
    fn free_id_exhausted_range_is_none() {
        let all: BTreeSet<u32> = (301..=499).collect();
        assert_eq!(free_id(&all, &BTreeSet::new()), None);
    }

    #[test]
    fn free_id_ignores_ids_outside_range() {
        let uids = BTreeSet::from([70, 500]);
        assert_eq!(free_id(&uids, &BTreeSet::new()), Some(301));
    }
}
