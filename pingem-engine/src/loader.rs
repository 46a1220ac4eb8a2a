//! Loading the profile table from its CSV source.
//!
//! Configuration problems never abort the simulator: malformed rows are
//! skipped with a diagnostic, and an unreadable source degrades to an empty
//! table so every destination falls under absent-profile semantics.

use std::{io::Read, net::Ipv4Addr, path::Path};

use serde::Deserialize;
use tracing::{info, warn};

use crate::profile::{NetworkProfile, ProfileTable};

/// One row of the profile source.
///
/// `loss_rate` is a later addition to the format; tables that predate it
/// mark unreachable hosts with a negative median instead.
#[derive(Debug, Deserialize)]
struct ProfileRow {
    ip: String,
    median_ms: f64,
    jitter_ms: f64,
    #[serde(default)]
    loss_rate: Option<f64>,
}

/// Reads profile rows from a CSV source (header: `ip,median_ms,jitter_ms`
/// with an optional `loss_rate` column).
pub fn read_profiles<R: Read>(source: R) -> ProfileTable {
    let mut table = ProfileTable::default();
    let mut reader = csv::Reader::from_reader(source);

    for (index, row) in reader.deserialize::<ProfileRow>().enumerate() {
        // The header occupies line 1, so the first record is line 2.
        let line = index + 2;
        match row {
            Ok(row) => match row.ip.parse::<Ipv4Addr>() {
                Ok(ip) => {
                    table.insert(ip, NetworkProfile::new(row.median_ms, row.jitter_ms, row.loss_rate));
                }
                Err(_) => warn!(line, ip = %row.ip, "skipping profile row with unparseable address"),
            },
            Err(err) => warn!(line, %err, "skipping malformed profile row"),
        }
    }

    table
}

/// Loads the profile table from a CSV file.
pub fn load_profiles(path: &Path) -> ProfileTable {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(err) => {
            warn!(
                path = %path.display(),
                %err,
                "profile table unreadable, starting with an empty table"
            );
            return ProfileTable::default();
        }
    };

    let table = read_profiles(file);
    info!(profiles = table.len(), path = %path.display(), "profile table loaded");
    table
}
