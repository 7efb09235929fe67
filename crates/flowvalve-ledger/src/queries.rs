//! Ledger query functions organized by table.

pub mod allocations;
pub mod checkpoints;
pub mod flows;
pub mod pipes;
pub mod settlements;
pub mod totals;
