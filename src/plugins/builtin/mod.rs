//! One bundled language parser plus a pair of reference detector/codemod
//! rules (SPEC_FULL.md §C.2–C.3), exercising every Guard layer end to end
//! without pulling in a real compiler front-end — which spec.md treats as
//! a replaceable plug-in, not core surface.

pub mod codemods;
pub mod detectors;
pub mod lines;

use crate::core::plugin_api::Registry;

/// Registers the bundled detectors and codemods. Callers that want a
/// different rule set build their own `Registry` instead of calling this.
pub fn default_registry() -> Registry {
    let mut registry = Registry::new();
    registry.register_detector(
        "net.unsafe-http-timeout",
        Box::new(detectors::UnsafeHttpTimeoutDetector),
    );
    registry.register_detector("err.broad-except", Box::new(detectors::BroadExceptDetector));
    registry.register_codemod(Box::new(codemods::HttpTimeoutCodemod));
    registry.register_codemod(Box::new(codemods::BroadExceptCodemod));
    registry
}
