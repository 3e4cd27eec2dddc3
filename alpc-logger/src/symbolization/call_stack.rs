use std::fmt;

use super::SymbolResolver;
use crate::trace_data::Event;

/// One resolved (or unresolved) stack frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub module_name: Option<String>,
    pub symbol_name: Option<String>,
    pub offset: u64,
    pub address: u64,
}

impl StackFrame {
    /// Frame that only knows its address
    #[must_use]
    pub fn unresolved(address: u64) -> Self {
        Self { module_name: None, symbol_name: None, offset: 0, address }
    }
}

/// Formats as `[module ]0xADDR[ symbol[+0xOFF]]`
impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module_name {
            write!(f, "{module} ")?;
        }
        write!(f, "0x{:X}", self.address)?;
        let Some(symbol) = &self.symbol_name else {
            return Ok(());
        };
        write!(f, " {symbol}")?;
        if self.offset != 0 {
            write!(f, "+0x{:X}", self.offset)?;
        }
        Ok(())
    }
}

/// Symbolized call stack of one event, innermost frame first
#[derive(Debug, Clone)]
pub struct CallStack {
    pub frames: Vec<StackFrame>,
}

impl CallStack {
    /// Resolve the stack attached to `event`
    ///
    /// Returns `None` if the event never received a stack.
    #[must_use]
    pub fn build(event: &Event, resolver: &dyn SymbolResolver) -> Option<Self> {
        let stack = event.stack()?;
        let frames = stack
            .iter()
            .map(|&address| match resolver.resolve(event.process_id, address) {
                Some(resolved) => StackFrame {
                    module_name: resolved.module,
                    symbol_name: resolved.symbol,
                    offset: resolved.displacement,
                    address,
                },
                None => StackFrame::unresolved(address),
            })
            .collect();
        Some(Self { frames })
    }
}
