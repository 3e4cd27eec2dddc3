//! # Lazy Symbol Resolution
//!
//! The capture engine stores only raw instruction pointers. Turning them into
//! `module!symbol+offset` is left to whoever consumes drained events, and is
//! done on demand through the [`SymbolResolver`] trait.
//!
//! ## Address Translation Flow
//!
//! ```text
//! 1. Stack walk attached to an event
//!    Raw addresses: [0x7FFA12345678, 0x7FFA12340010, ...]
//!
//! 2. Consumer asks for a CallStack
//!    CallStack::build(&event, &resolver)
//!
//! 3. Resolver maps each address
//!    0x7FFA12345678 → ntdll.dll  NtAlpcSendWaitReceivePort+0x14
//!    0x7FFA12340010 → (unresolved, address only)
//! ```
//!
//! ## Resolvers
//!
//! - [`RawAddresses`]: resolves nothing, frames show addresses only
//! - [`ModuleMap`]: resolves the owning module from per-process load ranges

pub mod call_stack;
pub mod module_map;

pub use call_stack::{CallStack, StackFrame};
pub use module_map::{MemoryRange, ModuleMap};

use crate::domain::Pid;

/// What a resolver knows about one address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSymbol {
    pub module: Option<String>,
    pub symbol: Option<String>,
    /// Displacement from the start of `symbol`
    pub displacement: u64,
}

/// Maps raw instruction pointers to module and symbol names
pub trait SymbolResolver {
    /// Resolve `address` in the address space of `pid`
    ///
    /// Returns `None` when nothing is known about the address.
    fn resolve(&self, pid: Pid, address: u64) -> Option<ResolvedSymbol>;
}

/// Resolver that never resolves anything
#[derive(Debug, Default, Clone, Copy)]
pub struct RawAddresses;

impl SymbolResolver for RawAddresses {
    fn resolve(&self, _pid: Pid, _address: u64) -> Option<ResolvedSymbol> {
        None
    }
}
