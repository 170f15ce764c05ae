//! Metadata fingerprints used to detect changed files without fetching their content.
//!
//! The digest covers the identity fields reported by the tree walk (name, URI, modification
//! time, version, access groups). File bytes are never hashed, so an edit that leaves all of
//! those fields untouched goes unnoticed until the next metadata bump.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use time::format_description::well_known::Rfc3339;

use super::types::FileDescriptor;

/// Canonical, field-ordered view of the fingerprinted metadata.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintInput<'a> {
    name: &'a str,
    uri: &'a str,
    last_modified: String,
    version: &'a str,
    group_ids: &'a BTreeSet<String>,
}

/// Compute the hex SHA-256 fingerprint of a descriptor's identity fields.
pub fn fingerprint(descriptor: &FileDescriptor) -> String {
    let last_modified = descriptor
        .last_modified
        .format(&Rfc3339)
        .unwrap_or_else(|_| descriptor.last_modified.unix_timestamp_nanos().to_string());
    let input = FingerprintInput {
        name: &descriptor.name,
        uri: &descriptor.uri,
        last_modified,
        version: &descriptor.version,
        group_ids: &descriptor.group_ids,
    };
    // Serializing plain strings and a string set cannot fail.
    let canonical = serde_json::to_vec(&input).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(&canonical);
    hex::encode(hasher.finalize())
}
