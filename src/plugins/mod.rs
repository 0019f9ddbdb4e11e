//! Open, registry-based extension points (spec.md §6). Everything here
//! implements the traits fixed by `core::plugin_api` — the core never
//! matches on concrete plug-in types.

pub mod builtin;
