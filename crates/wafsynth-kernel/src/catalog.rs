//! Shared flag catalog.
//!
//! One ordered table of flag definitions consumed by every fragment. A
//! fragment selects the flags it needs by name and gets the catalog's own
//! expressions, so a flag means the same thing wherever it is derived.

use crate::engine::ConditionEngine;
use crate::error::{Result, SynthError};
use crate::expr::Expr;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub expr: Expr,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FlagCatalog {
    entries: Vec<CatalogEntry>,
}

impl FlagCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry. Later entries may reference earlier ones only.
    pub fn define(mut self, name: &str, expr: Expr, description: &str) -> Self {
        self.entries.push(CatalogEntry {
            name: name.to_string(),
            expr,
            description: description.to_string(),
        });
        self
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Select `names` for `fragment`, in catalog order.
    ///
    /// A selected entry that references a catalog flag defined at or after
    /// its own position is cyclic. Names missing from the catalog are
    /// undeclared.
    pub fn select(&self, fragment: &str, names: &[&str]) -> Result<Vec<CatalogEntry>> {
        let mut positions = Vec::with_capacity(names.len());
        for name in names {
            let pos = self
                .position(name)
                .ok_or_else(|| SynthError::UndeclaredReference {
                    fragment: fragment.to_string(),
                    referrer: "flag catalog".to_string(),
                    name: name.to_string(),
                })?;
            if positions.contains(&pos) {
                return Err(SynthError::DuplicateDeclaration {
                    fragment: fragment.to_string(),
                    name: name.to_string(),
                });
            }
            positions.push(pos);
        }
        positions.sort_unstable();

        let mut selected = Vec::with_capacity(positions.len());
        for pos in positions {
            let entry = &self.entries[pos];
            for referenced in entry.expr.flags() {
                if let Some(ref_pos) = self.position(&referenced)
                    && ref_pos >= pos
                {
                    return Err(SynthError::CyclicDependency {
                        fragment: fragment.to_string(),
                        flag: entry.name.clone(),
                        via: referenced,
                    });
                }
            }
            selected.push(entry.clone());
        }
        Ok(selected)
    }

    /// Declare the selected flags on `engine`.
    pub fn declare_into(&self, engine: &mut ConditionEngine, names: &[&str]) -> Result<()> {
        for entry in self.select(engine.fragment(), names)? {
            engine.declare_flag(&entry.name, entry.expr)?;
        }
        Ok(())
    }

    /// Check every entry in order, as if the whole catalog were selected.
    pub fn validate(&self) -> Result<()> {
        let names: Vec<&str> = self.entries.iter().map(|e| e.name.as_str()).collect();
        self.select("catalog", &names).map(|_| ())
    }
}
