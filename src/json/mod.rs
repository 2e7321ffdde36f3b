//! Purpose: Internal JSON decoding boundary shared by the multiplexer and config loading.
//! Exports: `parse` module with decode helpers and failure categories.
//! Role: Single seam so reply parsing never happens ad hoc at callsites.
//! Invariants: Runtime reply decoding goes through this module.
//! Invariants: Helper APIs stay small and deterministic (no hidden global state).

pub(crate) mod parse;
