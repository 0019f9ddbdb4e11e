//! Core modules: the closed subsystems an autonomous code-health run is
//! built from.
//!
//! # Module overview
//!
//! - **`error`**: canonical error type for all ACE operations
//! - **`time`**: ISO-8601 timestamps and ULID event ids
//! - **`store`**: `.ace/` path resolution
//! - **`globs`**: gitignore-style path matching
//! - **`atomic`**: durable file writes, hashing, deterministic JSON
//! - **`model`**: `Finding`, `Edit`, `EditPlan`, `Receipt`
//! - **`plugin_api`**: `Detector`/`Codemod`/`LanguageParser` traits and registry
//! - **`repomap`**: deterministic symbol/import index
//! - **`cache`**: content-addressed finding memoizer
//! - **`policy`**: `policy.toml` schema and scoring weights
//! - **`guard`**: six-layer edit verification
//! - **`journal`**: append-only intent/success/revert log and crash recovery
//! - **`learner`**: per-rule outcome stats, decay, skiplist, threshold tuning
//! - **`planner`**: R* scoring, decision thresholds, priority ordering
//! - **`kernel`**: parallel detector orchestration with deterministic merge
//! - **`pack`**: grouping findings into cohesive multi-edit plans
//! - **`repair`**: binary-search edit isolation on Guard failure
//! - **`baseline`**: finding identity tracking across runs
//! - **`suppressions`**: in-source and policy-driven suppression rules
//! - **`engine`**: the run orchestrator wiring every subsystem together

pub mod atomic;
pub mod baseline;
pub mod cache;
pub mod engine;
pub mod error;
pub mod globs;
pub mod guard;
pub mod journal;
pub mod kernel;
pub mod learner;
pub mod model;
pub mod pack;
pub mod planner;
pub mod plugin_api;
pub mod policy;
pub mod repair;
pub mod repomap;
pub mod store;
pub mod suppressions;
pub mod time;
