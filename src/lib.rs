// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Converge
//!
//! A declarative, idempotent resource reconciliation engine.
//!
//! ## Overview
//!
//! Converge turns "make it so" resource management into a repeatable
//! pipeline, allowing you to:
//!
//! - Describe a resource's parameters and desired state in a YAML module
//!   definition
//! - Converge a target system onto that state with exactly the mutations
//!   required, and none when it already matches
//! - Preview every change in check mode before committing to it
//! - Get a single structured result document out of every invocation
//!
//! ## Architecture
//!
//! The system is built around **desired state reconciliation**, staged as
//! a pipeline that runs once per invocation:
//!
//! 1. **Normalize**: Validate and coerce the caller's parameters against
//!    the declared schema
//! 2. **Fetch**: Observe the resource's current state on the target
//! 3. **Reconcile**: Decide the single action (no-op, create, update,
//!    delete) as a pure function of desired and current state
//! 4. **Execute**: Carry the action out, or project it in check mode
//! 5. **Report**: Emit the result document with the `changed` verdict
//!
//! ## Modules
//!
//! - [`schema`]: Module definitions, parsing, and parameter normalization
//! - [`model`]: Desired state, current state, deltas, and identities
//! - [`fetch`]: Current-state lookup with exact-match disambiguation
//! - [`reconcile`]: Action decision and execution
//! - [`target`]: Target system backends (HTTP REST, in-memory)
//! - [`report`]: Invocation result documents
//! - [`pipeline`]: The per-invocation orchestration
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! module: dns_record
//! target:
//!   kind: http
//!   base_url: https://api.example.net/v1/records
//! params:
//!   - name: name
//!     type: str
//!     required: true
//!     identity: true
//!     mutability: create_only
//!   - name: ttl
//!     type: int
//!     default: 3600
//! values:
//!   state: present
//!   name: www
//!   ttl: 300
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod error;
pub mod fetch;
pub mod model;
pub mod pipeline;
pub mod reconcile;
pub mod report;
pub mod schema;
pub mod target;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use error::{ConvergeError, Result};
pub use fetch::StateFetcher;
pub use model::{CurrentState, Delta, DesiredState, FetchOutcome, ParamValue, Presence};
pub use pipeline::Pipeline;
pub use reconcile::{reconcile, Action, ActionKind, Applied, Executor};
pub use report::{FailureReport, Report, Reporter, ResultDocument};
pub use schema::{DefinitionParser, ModuleDefinition, Normalizer, Schema};
pub use target::{HttpTarget, MemoryTarget, TargetSystem};
