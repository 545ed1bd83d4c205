use std::collections::HashSet;

use crate::record::TrimIdentity;

/// Identities already admitted to the dataset. First occurrence wins.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: HashSet<TrimIdentity>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time an identity is offered, `false` afterwards.
    pub fn admit(&mut self, identity: &TrimIdentity) -> bool {
        if self.seen.contains(identity) {
            return false;
        }
        self.seen.insert(identity.clone())
    }

    pub fn contains(&self, identity: &TrimIdentity) -> bool {
        self.seen.contains(identity)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_admission_is_rejected() {
        let mut index = DedupIndex::new();
        let id = TrimIdentity::new("kia", "rio", "LX", Some(2024));
        assert!(index.admit(&id));
        assert!(!index.admit(&id));
        assert!(!index.admit(&id.clone()));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn year_is_part_of_the_key() {
        let mut index = DedupIndex::new();
        assert!(index.admit(&TrimIdentity::new("kia", "rio", "LX", Some(2024))));
        assert!(index.admit(&TrimIdentity::new("kia", "rio", "LX", Some(2023))));
        assert!(index.admit(&TrimIdentity::new("kia", "rio", "LX", None)));
        assert_eq!(index.len(), 3);
        assert!(index.contains(&TrimIdentity::new("kia", "rio", "LX", None)));
    }
}
