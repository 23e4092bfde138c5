//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 2       | Universal        | CLI usage error (bad args, bad override) |
//! | 60-69   | run / validate   | Reconciliation config and runtime codes  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// Usage error - bad arguments, unparseable `--as-of`.
/// Clap's own parse failures also exit 2.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Reconciliation (60-69)
// =============================================================================

/// Config file failed to parse or validate, or names no input file.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// Runtime failure: unreadable input, missing column, unparseable amount
/// or timestamp on a keyed row, duplicate key under `reject`, write error.
pub const EXIT_RECON_RUNTIME: u8 = 61;

/// Run completed but left `unexplained_needs_investigation` records and
/// `--fail-on-unexplained` was given.
pub const EXIT_RECON_UNEXPLAINED: u8 = 62;
