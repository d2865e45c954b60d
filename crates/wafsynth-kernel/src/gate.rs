//! Resource Inclusion Gate.
//!
//! A gated unit is either emitted in full or entirely absent. There is no
//! "present but disabled" state; anything that points at an absent unit is
//! rejected later as a dangling reference.

use crate::engine::Resolution;
use crate::error::Result;
use crate::expr::Expr;
use tracing::debug;

/// `include(unit, condition) -> bool`.
pub fn include(unit: &str, condition: &Expr, res: &Resolution) -> Result<bool> {
    let included = condition.eval(res)?;
    if included {
        debug!(fragment = %res.fragment, unit, "unit included");
    } else {
        debug!(fragment = %res.fragment, unit, %condition, "unit excluded");
    }
    Ok(included)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{and, flag, not};
    use std::collections::BTreeMap;

    #[test]
    fn nested_conditions_gate_units() {
        let res = Resolution {
            fragment: "root".into(),
            inputs: BTreeMap::new(),
            flags: BTreeMap::from([
                ("Active".to_string(), true),
                ("A".to_string(), false),
                ("B".to_string(), false),
                ("C".to_string(), true),
            ]),
        };
        let arm = and([flag("Active"), not(flag("A")), not(flag("B"))]);
        assert!(include("Arm", &arm, &res).unwrap());
        let blocked = and([arm, not(flag("C"))]);
        assert!(!include("Blocked", &blocked, &res).unwrap());
        assert!(include("Always", &Expr::True, &res).unwrap());
    }
}
