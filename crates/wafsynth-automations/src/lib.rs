//! # wafsynth Automations
//!
//! The WAF security-automation deployment, expressed against the kernel.
//!
//! ```text
//! root               every user input, 32 flags, rules, parsers, buckets
//!  ├─ webacl          the web ACL, its rules, twelve IP sets and their timers
//!  └─ firehose-athena WAF log delivery, Glue catalog, Athena work groups
//!                     (only under CreateFirehoseAthenaStack)
//! ```
//!
//! All three fragments draw their inputs from [`inputs`] and their flags from
//! [`flags::catalog`], so a flag shared across a boundary has one formula.

pub mod constants;
pub mod firehose_athena;
pub mod flags;
pub mod inputs;
pub mod root;
pub mod webacl;

use tracing::debug;
use wafsynth_kernel::{FlagCatalog, Result, StackSpec};

/// The deployment built from the shipped flag catalog.
pub fn security_automations() -> Result<StackSpec> {
    stack_with(&flags::catalog())
}

/// The deployment built from `catalog`. Tests pass an edited catalog here to
/// exercise the drift checker.
pub fn stack_with(catalog: &FlagCatalog) -> Result<StackSpec> {
    catalog.validate()?;
    let fragments = vec![
        root::fragment(catalog)?,
        webacl::fragment(catalog)?,
        firehose_athena::fragment(catalog)?,
    ];
    debug!(
        stack = constants::STACK_NAME,
        fragments = fragments.len(),
        "stack assembled"
    );
    Ok(StackSpec {
        name: constants::STACK_NAME.to_string(),
        root: constants::ROOT.to_string(),
        fragments,
    })
}
