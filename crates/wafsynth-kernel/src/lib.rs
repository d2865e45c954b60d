//! # wafsynth Kernel
//!
//! Resolves human-facing configuration choices into named activation flags
//! and uses those flags, consistently, across independently synthesized
//! template fragments.
//!
//! The kernel is **deployment-agnostic**: it does not prescribe which inputs
//! or flags exist. It only prescribes how they are declared, evaluated,
//! carried across fragment boundaries and checked for drift.
//!
//! ## Architecture
//!
//! ```text
//! ConfigInput / ValueDomain   ← primitive inputs with bounded domains
//!     │
//! Expr + FlagCatalog          ← one ordered table of boolean formulas
//!     │
//! ConditionEngine             ← per-fragment forward walk → Resolution
//!     │
//! gate::include / Choice      ← unit inclusion, value selection, ABSENT
//!     │
//! FragmentBoundary            ← scalar forwarding + exhaustive drift check
//!     │
//! ThrottleChain               ← linear dependency chain for rate limits
//!     │
//! synthesize → Synthesis      ← static artifact set, all-or-nothing
//! ```

pub mod bridge;
pub mod catalog;
pub mod choice;
pub mod engine;
pub mod error;
pub mod expr;
pub mod gate;
pub mod input;
pub mod schedule;
pub mod synth;

pub use bridge::{DriftReport, FragmentBoundary, check_boundary, forward};
pub use catalog::{CatalogEntry, FlagCatalog};
pub use choice::{Choice, RenderContext, Scalar};
pub use engine::{ConditionEngine, Flag, Resolution};
pub use error::{Result, SynthError};
pub use expr::Expr;
pub use gate::include;
pub use input::{ConfigInput, InputValues, ValueDomain};
pub use schedule::{OpState, ScheduleError, ThrottleChain, ThrottleRun};
pub use synth::{
    AssertionRule, FragmentArtifact, FragmentSpec, OutputSpec, StackSpec, Synthesis,
    UnitArtifact, UnitSpec, synthesize,
};
