//! Address-space identifiers.
//!
//! An [`Asid`] is a small bag of address-space keys. On Intel PT the two keys
//! are CR3 and the VMCS base pointer; we keep the same shape without tying
//! the core to any particular tracing backend.

/// An address-space identifier: a set of optional keys.
///
/// Two ASIDs [`matches`](Asid::matches) when, for every key that both sides
/// specify, the values agree. A side that leaves a key unset acts as a
/// wildcard for that key. The all-`None` ASID therefore matches everything,
/// which is what callers get from [`Asid::any`] and from
/// [`Asid::from_user`]`(None)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Asid {
    pub cr3: Option<u64>,
    pub vmcs: Option<u64>,
}

impl Asid {
    /// The wildcard ASID: matches any other ASID.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new(cr3: Option<u64>, vmcs: Option<u64>) -> Self {
        Self { cr3, vmcs }
    }

    /// Canonicalise a user-supplied, possibly absent, ASID.
    ///
    /// The image resolves a caller's ASID to this canonical form exactly
    /// once, at the entry point of each public operation; everything
    /// downstream compares canonical ASIDs with [`matches`](Asid::matches).
    pub fn from_user(user: Option<&Asid>) -> Self {
        user.copied().unwrap_or_default()
    }

    /// True if every key specified by both `self` and `other` agrees.
    pub fn matches(&self, other: &Asid) -> bool {
        if let (Some(a), Some(b)) = (self.cr3, other.cr3) {
            if a != b {
                return false;
            }
        }
        if let (Some(a), Some(b)) = (self.vmcs, other.vmcs) {
            if a != b {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_matches_everything() {
        let wild = Asid::any();
        let specific = Asid::new(Some(1), Some(2));
        assert!(wild.matches(&specific));
        assert!(specific.matches(&wild));
    }

    #[test]
    fn partial_keys_are_wildcards_for_the_unset_side() {
        let cr3_only = Asid::new(Some(1), None);
        let vmcs_only = Asid::new(None, Some(2));
        assert!(cr3_only.matches(&vmcs_only));
    }

    #[test]
    fn mismatched_key_rejects() {
        let a = Asid::new(Some(1), None);
        let b = Asid::new(Some(2), None);
        assert!(!a.matches(&b));
    }

    #[test]
    fn from_user_defaults_to_wildcard() {
        assert_eq!(Asid::from_user(None), Asid::any());
    }
}
