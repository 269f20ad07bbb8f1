use drm_core::{DEFAULT_PRIORITY, ProtectionScheme};

/**
    Outcome of a successful scheme negotiation.
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    /// Index into the candidate list handed to [`SchemeSelector::select`].
    pub index: usize,
    pub scheme: ProtectionScheme,
}

/**
    Picks one protection scheme out of the system IDs advertised by content.
*/
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemeSelector {
    priority: Vec<ProtectionScheme>,
}

impl SchemeSelector {
    /**
        Create a selector with the given preference order, most preferred
        first. Unrecognized schemes and duplicates in `priority` are ignored.
    */
    pub fn new(priority: impl IntoIterator<Item = ProtectionScheme>) -> Self {
        let mut ordered = Vec::new();
        for scheme in priority {
            if scheme.is_recognized() && !ordered.contains(&scheme) {
                ordered.push(scheme);
            }
        }
        Self { priority: ordered }
    }

    pub fn priority(&self) -> &[ProtectionScheme] {
        &self.priority
    }

    /**
        Rank of a scheme in the preference order, lower is better.
        `None` for schemes this selector never picks.
    */
    pub fn rank(&self, scheme: ProtectionScheme) -> Option<usize> {
        self.priority.iter().position(|s| *s == scheme)
    }

    /**
        Choose the highest-priority candidate that `supported` accepts.

        Among several candidates of the same scheme the first one wins.
        Returns `None` when no candidate is both recognized and supported.
    */
    pub fn select<F>(&self, candidates: &[[u8; 16]], supported: F) -> Option<Selection>
    where
        F: Fn(ProtectionScheme) -> bool,
    {
        let mut best: Option<(usize, Selection)> = None;

        for (index, raw) in candidates.iter().enumerate() {
            let scheme = ProtectionScheme::from_system_id(*raw);
            let Some(rank) = self.rank(scheme) else {
                continue;
            };
            if best.is_some_and(|(best_rank, _)| best_rank <= rank) {
                continue;
            }
            if !supported(scheme) {
                continue;
            }
            best = Some((rank, Selection { index, scheme }));
        }

        best.map(|(_, selection)| selection)
    }
}

impl Default for SchemeSelector {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY)
    }
}
