//! Monochain - a single-validator account ledger
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Ledger
//! - [`blockchain`] - Blocks, accounts and the genesis state
//! - [`transaction`] - Transfers, their wire format and batch verification
//! - [`mempool`] - Staging pool for submitted transfers
//! - [`producer`] - Scheduled block production on the validator
//!
//! ## Cryptography & Keys
//! - [`crypto`] - Addresses and recoverable secp256k1 signatures
//! - [`hdwallet`] - BIP-39/BIP-32 key derivation
//! - [`economics`] - Coin units and genesis grants
//!
//! ## Storage
//! - [`persistence`] - Atomic SQLite key-value store
//!
//! ## Networking
//! - [`network`] - JSON-RPC envelope and HTTP client
//! - [`api`] - JSON-RPC server
//! - [`sync`] - Block replication for client nodes
//!
//! ## Runtime & Utilities
//! - [`node`] - Data directory lock and role startup
//! - [`config`] - Configuration management
//! - [`cli`] - Command line interface
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Ledger
// ============================================================================
pub mod blockchain;
pub mod mempool;
pub mod producer;
pub mod transaction;

// ============================================================================
// Cryptography & Keys
// ============================================================================
pub mod crypto;
pub mod economics;
pub mod hdwallet;

// ============================================================================
// Storage
// ============================================================================
pub mod persistence;

// ============================================================================
// Networking
// ============================================================================
pub mod api;
pub mod network;
pub mod sync;

// ============================================================================
// Runtime & Utilities
// ============================================================================
pub mod cli;
pub mod config;
pub mod error;
pub mod node;
