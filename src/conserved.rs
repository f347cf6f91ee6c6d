use std::collections::BTreeMap;

use crate::error::{Result, SchemeError};
use crate::symbolic::{Expr, Symbol};

/// Location of every conserved moment, keyed by its symbol.
///
/// Built once from the equilibria and never changed afterwards. The derived
/// per-scheme partitions list conserved and non-conserved slots in ascending
/// order; together they cover every slot of the scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConservedMomentIndex {
    positions: BTreeMap<Symbol, (usize, usize)>,
    conserved: Vec<Vec<usize>>,
    non_conserved: Vec<Vec<usize>>,
}

impl ConservedMomentIndex {
    /// Locate each declared conserved moment in its scheme's equilibrium.
    ///
    /// A name must be an entry of the equilibrium vector verbatim. Unmatched
    /// and repeated declarations are configuration errors.
    pub fn resolve(equilibria: &[Vec<Expr>], declared: &[Vec<Symbol>]) -> Result<Self> {
        let mut positions = BTreeMap::new();
        for (k, (eq, names)) in equilibria.iter().zip(declared).enumerate() {
            for name in names {
                let target = Expr::symbol(name.clone());
                let slot = eq.iter().position(|e| *e == target).ok_or_else(|| {
                    SchemeError::scheme_config(
                        k,
                        "conserved_moments",
                        format!("`{name}` is not an entry of the equilibrium"),
                    )
                })?;
                if positions.insert(name.clone(), (k, slot)).is_some() {
                    return Err(SchemeError::scheme_config(
                        k,
                        "conserved_moments",
                        format!("`{name}` is declared more than once"),
                    ));
                }
            }
        }

        let mut conserved: Vec<Vec<usize>> = vec![Vec::new(); equilibria.len()];
        for &(k, slot) in positions.values() {
            conserved[k].push(slot);
        }
        let non_conserved = equilibria
            .iter()
            .zip(conserved.iter_mut())
            .map(|(eq, cons)| {
                cons.sort_unstable();
                (0..eq.len()).filter(|j| !cons.contains(j)).collect()
            })
            .collect();

        Ok(ConservedMomentIndex {
            positions,
            conserved,
            non_conserved,
        })
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, name: &Symbol) -> Option<(usize, usize)> {
        self.positions.get(name).copied()
    }

    pub fn conserved(&self, scheme: usize) -> &[usize] {
        &self.conserved[scheme]
    }

    pub fn non_conserved(&self, scheme: usize) -> &[usize] {
        &self.non_conserved[scheme]
    }

    pub fn is_conserved(&self, scheme: usize, slot: usize) -> bool {
        self.conserved[scheme].binary_search(&slot).is_ok()
    }

    /// Conserved moments in global order (scheme-major, slot-minor).
    pub fn ordered(&self) -> Vec<(Symbol, (usize, usize))> {
        let mut entries: Vec<_> = self.positions.iter().map(|(s, &p)| (s.clone(), p)).collect();
        entries.sort_by_key(|&(_, p)| p);
        entries
    }

    /// Global moment ordering: every conserved slot, then every other slot.
    pub fn global_order(&self) -> Vec<(usize, usize)> {
        let conserved = self
            .conserved
            .iter()
            .enumerate()
            .flat_map(|(k, slots)| slots.iter().map(move |&j| (k, j)));
        let others = self
            .non_conserved
            .iter()
            .enumerate()
            .flat_map(|(k, slots)| slots.iter().map(move |&j| (k, j)));
        conserved.chain(others).collect()
    }

    /// Conserved name to its `m[i][j]` symbol.
    pub fn to_moment_symbols(&self) -> BTreeMap<Symbol, Symbol> {
        self.positions
            .iter()
            .map(|(name, &(k, j))| (name.clone(), Symbol::moment(k, j)))
            .collect()
    }

    /// `m[i][j]` symbol back to the conserved name.
    pub fn from_moment_symbols(&self) -> BTreeMap<Symbol, Symbol> {
        self.positions
            .iter()
            .map(|(name, &(k, j))| (Symbol::moment(k, j), name.clone()))
            .collect()
    }
}
