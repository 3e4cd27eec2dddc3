//! Per-process module ranges
//!
//! Finds which loaded image an address belongs to, the same question the
//! debugger's module-base lookup answers.
//!
//! A recorded session carries no module loads, so the binary reads them from
//! a side file (`--modules`), one JSON object per line:
//!
//! ```text
//! {"pid":1200,"module":"ntdll.dll","start":140711718551552,"end":140711719600128}
//! ```

use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use super::{ResolvedSymbol, SymbolResolver};
use crate::domain::{Pid, ReplayError};
use crate::replay::read_json_lines;

/// Memory range of a loaded image in a process's address space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRange {
    pub start: u64,
    pub end: u64,
}

impl MemoryRange {
    /// Check if an address falls within this memory range
    #[must_use]
    pub fn contains(&self, addr: u64) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// One line of a module map file
#[derive(Debug, Deserialize)]
struct ModuleRecord {
    pid: u32,
    module: String,
    start: u64,
    end: u64,
}

#[derive(Debug, Clone)]
struct LoadedModule {
    name: String,
    range: MemoryRange,
}

/// Module load ranges keyed by process
#[derive(Debug, Default)]
pub struct ModuleMap {
    modules: HashMap<Pid, Vec<LoadedModule>>,
}

impl ModuleMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from JSON-lines module records
    ///
    /// # Errors
    /// Returns [`ReplayError::Parse`] for a malformed line, or
    /// [`ReplayError::Io`] if reading fails
    pub fn read_records<R: BufRead>(reader: R) -> Result<Self, ReplayError> {
        let mut map = Self::new();
        for record in read_json_lines::<ModuleRecord, _>(reader)? {
            map.insert(
                Pid(record.pid),
                record.module,
                MemoryRange { start: record.start, end: record.end },
            );
        }
        Ok(map)
    }

    /// Load a module map file
    ///
    /// # Errors
    /// See [`ModuleMap::read_records`]
    pub fn read_file(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let file = File::open(path)?;
        Self::read_records(BufReader::new(file))
    }

    /// Number of processes with at least one module
    #[must_use]
    pub fn process_count(&self) -> usize {
        self.modules.len()
    }

    /// Record that `name` is mapped at `range` in `pid`
    pub fn insert(&mut self, pid: Pid, name: impl Into<String>, range: MemoryRange) {
        let modules = self.modules.entry(pid).or_default();
        modules.push(LoadedModule { name: name.into(), range });
        modules.sort_by_key(|m| m.range.start);
    }

    /// Name of the module containing `address` in `pid`
    #[must_use]
    pub fn module_for(&self, pid: Pid, address: u64) -> Option<&str> {
        let modules = self.modules.get(&pid)?;
        // Last module starting at or below the address
        let idx = modules.partition_point(|m| m.range.start <= address);
        let candidate = modules.get(idx.checked_sub(1)?)?;
        candidate.range.contains(address).then_some(candidate.name.as_str())
    }
}

impl SymbolResolver for ModuleMap {
    fn resolve(&self, pid: Pid, address: u64) -> Option<ResolvedSymbol> {
        let module = self.module_for(pid, address)?;
        Some(ResolvedSymbol { module: Some(module.to_string()), symbol: None, displacement: 0 })
    }
}
