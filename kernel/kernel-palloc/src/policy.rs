use kernel_pfndb::MemoryTags;

/// How a region's tag bitmask is evaluated against a requested mask.
///
/// Policies are passed by other kernel components together with literal
/// tag masks, so the discriminant values are ABI and must not change.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[repr(u32)]
pub enum MatchPolicy {
    /// Region tags equal the mask exactly.
    Exact = 0,
    /// Every masked bit is present in the region tags.
    SetAll = 1,
    /// At least one masked bit is present.
    SetAny = 2,
    /// No masked bit is present.
    UnsetAll = 3,
    /// At least one masked bit is absent.
    UnsetAny = 4,
    /// Matches unconditionally; the mask is ignored.
    Ignore = 5,
}

impl MatchPolicy {
    /// Evaluates the policy for a region carrying `tags` against `mask`.
    #[must_use]
    pub const fn matches(self, tags: MemoryTags, mask: MemoryTags) -> bool {
        match self {
            Self::Exact => tags.bits() == mask.bits(),
            Self::SetAll => tags.contains_all(mask),
            Self::SetAny => tags.intersects(mask),
            Self::UnsetAll => !tags.intersects(mask),
            Self::UnsetAny => !tags.contains_all(mask),
            Self::Ignore => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NM: MemoryTags = MemoryTags::NORMAL;
    const DM: MemoryTags = MemoryTags::DIRECT_MAPPED;
    const DA: MemoryTags = MemoryTags::DIRECT_ACCESS;

    #[test]
    fn discriminants_are_stable() {
        assert_eq!(MatchPolicy::Exact as u32, 0);
        assert_eq!(MatchPolicy::SetAll as u32, 1);
        assert_eq!(MatchPolicy::SetAny as u32, 2);
        assert_eq!(MatchPolicy::UnsetAll as u32, 3);
        assert_eq!(MatchPolicy::UnsetAny as u32, 4);
        assert_eq!(MatchPolicy::Ignore as u32, 5);
    }

    #[test]
    fn exact_requires_identical_masks() {
        let tags = NM | DM;
        assert!(MatchPolicy::Exact.matches(tags, NM | DM));
        assert!(!MatchPolicy::Exact.matches(tags, NM));
        assert!(!MatchPolicy::Exact.matches(tags, NM | DM | DA));
    }

    #[test]
    fn set_all_and_set_any() {
        let tags = NM | DM;
        assert!(MatchPolicy::SetAll.matches(tags, NM));
        assert!(MatchPolicy::SetAll.matches(tags, NM | DM));
        assert!(!MatchPolicy::SetAll.matches(tags, NM | DA));
        assert!(MatchPolicy::SetAny.matches(tags, DM | DA));
        assert!(!MatchPolicy::SetAny.matches(tags, DA));
    }

    #[test]
    fn unset_all_and_unset_any() {
        let tags = NM | DM;
        assert!(MatchPolicy::UnsetAll.matches(tags, DA));
        assert!(!MatchPolicy::UnsetAll.matches(tags, DM | DA));
        assert!(MatchPolicy::UnsetAny.matches(tags, DM | DA));
        assert!(!MatchPolicy::UnsetAny.matches(tags, DM));
    }

    #[test]
    fn ignore_always_matches() {
        assert!(MatchPolicy::Ignore.matches(MemoryTags::NONE, NM | DM | DA));
        assert!(MatchPolicy::Ignore.matches(NM, MemoryTags::NONE));
    }
}
