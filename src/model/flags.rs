//! Interned message flags.
//!
//! Flags arrive as strings, repeat endlessly across messages, and get
//! compared constantly. They are interned into a session-wide table and
//! carried per-message as a sorted, deduplicated set of handles; equality
//! of two flags is equality of two integers.

use std::collections::HashMap;

/// Handle into the [`FlagStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlagId(u32);

/// A message's flags: sorted by case-folded flag text, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FlagSet(Vec<FlagId>);

impl FlagSet {
    pub fn ids(&self) -> &[FlagId] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: FlagId) -> bool {
        self.0.binary_search(&id).is_ok()
    }
}

const SYSTEM_FLAGS: &[&str] = &[
    "\\Answered",
    "\\Deleted",
    "\\Draft",
    "\\Flagged",
    "\\Recent",
    "\\Seen",
    "\\*",
];

/// The intern table.
#[derive(Debug, Default)]
pub struct FlagStore {
    names: Vec<String>,
    /// Case-folded name to id.
    index: HashMap<String, FlagId>,
}

impl FlagStore {
    pub fn new() -> Self {
        let mut store = Self::default();
        for flag in SYSTEM_FLAGS {
            store.intern(flag);
        }
        store
    }

    /// Intern one flag. System flags are canonicalized to their RFC 3501
    /// spelling; the first seen spelling wins for keywords.
    pub fn intern(&mut self, raw: &str) -> FlagId {
        let folded = raw.to_ascii_lowercase();
        if let Some(&id) = self.index.get(&folded) {
            return id;
        }

        let canonical = SYSTEM_FLAGS
            .iter()
            .find(|known| known.eq_ignore_ascii_case(raw))
            .map_or_else(|| raw.to_string(), |known| (*known).to_string());

        let id = FlagId(u32::try_from(self.names.len()).expect("fewer than 2^32 flags"));
        self.names.push(canonical);
        self.index.insert(folded, id);
        id
    }

    /// Resolve a handle back to its flag text.
    pub fn name(&self, id: FlagId) -> &str {
        &self.names[id.0 as usize]
    }

    /// Look up without interning.
    pub fn lookup(&self, raw: &str) -> Option<FlagId> {
        self.index.get(&raw.to_ascii_lowercase()).copied()
    }

    /// Normalize a wire flag list into a [`FlagSet`]: case-normalized,
    /// deduplicated, handle-ordered. Idempotent.
    pub fn normalize(&mut self, raw: &[String]) -> FlagSet {
        let mut ids: Vec<FlagId> = raw.iter().map(|flag| self.intern(flag)).collect();
        ids.sort_unstable();
        ids.dedup();
        FlagSet(ids)
    }

    /// Render a set back into strings, sorted case-insensitively — the
    /// form the cache stores.
    pub fn render(&self, set: &FlagSet) -> Vec<String> {
        let mut names: Vec<String> = set.0.iter().map(|&id| self.name(id).to_string()).collect();
        names.sort_by(|a, b| a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()));
        names
    }
}
