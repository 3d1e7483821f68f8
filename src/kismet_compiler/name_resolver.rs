// Qualified-name resolution against the object table
//
// Candidates are probed from most to least qualified. The first candidate matched by
// exactly one import or export wins; a candidate matched by several entries stops the
// search with an ambiguity error instead of falling back to a shorter name.

use crate::kismet_compiler::error::CompilerError;
use crate::kismet_compiler::package::{ObjectTable, PackageIndex};

/// Reserved token that resolves to an explicit null reference
pub const NULL_REFERENCE: &str = "<null>";

/// Build the probe list for a declaration path `[package, class, function, name]`:
/// every dotted suffix, plus `class.name` for members nested under a function.
pub fn qualified_candidates(parts: &[String]) -> Vec<String> {
    let mut candidates: Vec<String> = (0..parts.len()).map(|i| parts[i..].join(".")).collect();
    if parts.len() >= 4 {
        let class_and_name = format!("{}.{}", parts[parts.len() - 3], parts[parts.len() - 1]);
        let insert_at = candidates.len() - 1;
        if !candidates.contains(&class_and_name) {
            candidates.insert(insert_at, class_and_name);
        }
    }
    candidates
}

fn name_matches(full_name: &str, candidate: &str) -> bool {
    full_name == candidate
        || (full_name.len() > candidate.len()
            && full_name.ends_with(candidate)
            && full_name.as_bytes()[full_name.len() - candidate.len() - 1] == b'.')
}

pub struct NameResolver<'t> {
    table: &'t dyn ObjectTable,
}

impl<'t> NameResolver<'t> {
    pub fn new(table: &'t dyn ObjectTable) -> Self {
        NameResolver { table }
    }

    fn all_entries(&self) -> Vec<(PackageIndex, String)> {
        let imports = (0..self.table.imports().len()).map(PackageIndex::from_import);
        let exports = (0..self.table.exports().len()).map(PackageIndex::from_export);
        imports
            .chain(exports)
            .map(|index| (index, self.table.full_name(index)))
            .collect()
    }

    /// Entries whose full dotted name matches one candidate
    pub fn matches(&self, candidate: &str) -> Vec<PackageIndex> {
        self.all_entries()
            .into_iter()
            .filter(|(_, full)| name_matches(full, candidate))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn resolve(&self, candidates: &[String]) -> Result<PackageIndex, CompilerError> {
        self.resolve_where(candidates, |_| true)
    }

    /// Like `resolve`, restricted to entries accepted by `accept`
    pub fn resolve_where<F>(&self, candidates: &[String], accept: F) -> Result<PackageIndex, CompilerError>
    where
        F: Fn(PackageIndex) -> bool,
    {
        if candidates.iter().any(|c| c == NULL_REFERENCE) {
            return Ok(PackageIndex::NULL);
        }

        let entries = self.all_entries();
        for candidate in candidates {
            let found: Vec<&(PackageIndex, String)> = entries
                .iter()
                .filter(|(index, full)| name_matches(full, candidate) && accept(*index))
                .collect();
            match found.len() {
                0 => continue,
                1 => {
                    log::debug!(
                        "NAME_RESOLVER: '{}' -> {} ({})",
                        candidate,
                        found[0].0,
                        found[0].1
                    );
                    return Ok(found[0].0);
                }
                _ => {
                    return Err(CompilerError::AmbiguousName {
                        candidate: candidate.clone(),
                        matches: found.iter().map(|(_, full)| full.clone()).collect(),
                    });
                }
            }
        }

        Err(CompilerError::NameNotFound {
            candidates: candidates.to_vec(),
        })
    }

    /// Resolve, mapping "not found" to `None` while still failing on ambiguity
    pub fn try_resolve(&self, candidates: &[String]) -> Result<Option<PackageIndex>, CompilerError> {
        match self.resolve(candidates) {
            Ok(index) => Ok(Some(index)),
            Err(CompilerError::NameNotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[path = "name_resolver_tests.rs"]
mod tests;
