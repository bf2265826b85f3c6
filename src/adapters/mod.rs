//! Peripheral adapters that sit outside the core breaker/circuit/stats
//! path. None of these are wired into `Breaker`/`Circuit` by default —
//! each exists so a caller coming from a different calling convention can
//! reach the core without the core needing to know about that convention.

pub mod callback;
