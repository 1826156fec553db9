//! Copy decisions between storage backends.

use tracing::info;

use super::{DecisionBackend, StoreError};

/// Replace the destination's snapshot with the source's. Returns the number
/// of decisions copied.
pub fn copy_decisions(from: &DecisionBackend, to: &DecisionBackend) -> Result<usize, StoreError> {
    let records = from.load()?;
    to.save(&records)?;
    info!(
        "Copied {} decisions from {} to {}",
        records.len(),
        from.location().display(),
        to.location().display()
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Decision, DecisionRecord, PhotoId};
    use tempfile::tempdir;

    #[test]
    fn test_copy_json_to_sqlite_and_back() {
        let dir = tempdir().unwrap();
        let json = DecisionBackend::json(&dir.path().join("decisions.json"));
        let sqlite = DecisionBackend::sqlite(&dir.path().join("decisions.db")).unwrap();

        json.save(&[
            DecisionRecord {
                photo_id: PhotoId::from("a"),
                decision: Decision::Archived,
                decided_at: None,
            },
            DecisionRecord {
                photo_id: PhotoId::from("b"),
                decision: Decision::Trashed,
                decided_at: None,
            },
        ])
        .unwrap();

        assert_eq!(copy_decisions(&json, &sqlite).unwrap(), 2);
        assert_eq!(sqlite.load().unwrap().len(), 2);

        let back = DecisionBackend::json(&dir.path().join("copy.json"));
        assert_eq!(copy_decisions(&sqlite, &back).unwrap(), 2);
        let mut loaded = back.load().unwrap();
        loaded.sort_by(|x, y| x.photo_id.cmp(&y.photo_id));
        assert_eq!(loaded[1].decision, Decision::Trashed);
    }
}
