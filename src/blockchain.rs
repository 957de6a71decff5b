//! Ledger data model: blocks, accounts and the genesis state.

pub mod chain;
pub mod genesis;
pub mod state;

pub use chain::*;
pub use genesis::Genesis;
pub use state::*;
