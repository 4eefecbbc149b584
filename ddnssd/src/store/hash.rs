use sha2::{Sha256, Digest};
use shared::types::StoredRecord;

/// SHA-256 over the identities of a record set.
///
/// Rows are sorted by (name, type, content) so backend order doesn't matter.
/// TTL, row ids and change dates are left out: they don't change what the
/// zone answers with.
pub fn compute_digest(records: &[StoredRecord]) -> String {
    let mut indices: Vec<usize> = (0..records.len()).collect();
    indices.sort_by(|&a, &b| {
        let (ra, rb) = (&records[a], &records[b]);
        (&ra.name, ra.rtype, &ra.content).cmp(&(&rb.name, rb.rtype, &rb.content))
    });

    let mut hasher = Sha256::new();
    for &i in &indices {
        let r = &records[i];
        hasher.update(r.name.as_bytes());
        hasher.update([0u8]);
        hasher.update(r.rtype.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(r.content.as_bytes());
        hasher.update([b'\n']);
    }

    hex::encode(hasher.finalize())
}
