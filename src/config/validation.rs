//! Manifest validation.
//!
//! # Responsibilities
//! - Build the identifier → upstream index
//! - Reject duplicate upstream identifiers
//!
//! # Design Decisions
//! - No network or route-pattern checks here; those run at compile time
//! - First occurrence wins in the index, but any duplicate fails the load

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::config::schema::Upstream;
use crate::error::ManifestError;

/// Index upstreams by identifier, failing on the first duplicate.
pub(crate) fn index_upstreams(upstreams: &[Upstream]) -> Result<HashMap<String, usize>, ManifestError> {
    let mut index = HashMap::with_capacity(upstreams.len());
    for (position, upstream) in upstreams.iter().enumerate() {
        match index.entry(upstream.identifier.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(position);
            }
            Entry::Occupied(_) => {
                return Err(ManifestError::DuplicateUpstreamIdentifier(
                    upstream.identifier.clone(),
                ));
            }
        }
    }
    Ok(index)
}
