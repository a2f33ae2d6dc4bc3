//! Operand constraints for IR operations
//!
//! Each operand of an IR operation carries a descriptor of what may
//! satisfy it: a register drawn from some set, and/or a constant from a
//! restricted range. The descriptor is a flat bitmap of admissible
//! kinds plus a register mask, built from single-letter codes in the
//! operation tables.

use bitflags::bitflags;
use thiserror::Error;

use super::regs::{RegSet, CALL_IARG_REGS, TMP2};

bitflags! {
    /// Admissible operand kinds
    pub struct ConstraintKind: u32 {
        /// A register from the descriptor's register set
        const REG = 0x001;
        /// Any constant
        const CONST = 0x002;
        /// The constant zero (substitutable by the zero register)
        const CONST_ZERO = 0x100;
        /// A constant that fits a signed 12-bit immediate
        const CONST_S12 = 0x200;
        /// A constant whose negation fits a signed 12-bit immediate,
        /// for subtract-via-add selection
        const CONST_N12 = 0x400;
    }
}

/// Constraint on one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgConstraint {
    pub kinds: ConstraintKind,
    pub regs: RegSet,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("unknown constraint letter '{0}'")]
    UnknownLetter(char),
}

/// Parse one constraint letter from an operation table.
///
/// With `softmmu` enabled the 'L' code additionally reserves the
/// registers the TLB-lookup helper clobbers (TMP2 and the first five
/// call argument registers); without it 'L' is identical to 'r'.
pub fn parse_constraint(letter: char, softmmu: bool) -> Result<ArgConstraint, ConstraintError> {
    let mut kinds = ConstraintKind::empty();
    let mut regs = RegSet::EMPTY;
    match letter {
        'r' => {
            kinds |= ConstraintKind::REG;
            regs = RegSet::ALL;
        }
        'L' => {
            // qemu_ld/qemu_st operand
            kinds |= ConstraintKind::REG;
            regs = RegSet::ALL;
            if softmmu {
                regs.remove(TMP2);
                for reg in &CALL_IARG_REGS[..5] {
                    regs.remove(*reg);
                }
            }
        }
        'I' => kinds |= ConstraintKind::CONST_S12,
        'N' => kinds |= ConstraintKind::CONST_N12,
        'Z' => kinds |= ConstraintKind::CONST_ZERO,
        other => return Err(ConstraintError::UnknownLetter(other)),
    }
    Ok(ArgConstraint { kinds, regs })
}

/// Test whether a constant satisfies the constraint
pub fn const_match(val: i64, constraint: &ArgConstraint) -> bool {
    let kinds = constraint.kinds;
    if kinds.contains(ConstraintKind::CONST) {
        return true;
    }
    if kinds.contains(ConstraintKind::CONST_ZERO) && val == 0 {
        return true;
    }
    if kinds.contains(ConstraintKind::CONST_S12) && (-2048..=2047).contains(&val) {
        return true;
    }
    if kinds.contains(ConstraintKind::CONST_N12) && (-2047..=2048).contains(&val) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::codegen::regs::Reg;

    #[test]
    fn check_register_constraint() {
        let ct = parse_constraint('r', true).unwrap();
        assert_eq!(ct.kinds, ConstraintKind::REG);
        assert_eq!(ct.regs, RegSet::ALL);
    }

    #[test]
    fn check_softmmu_reserves_tlb_registers() {
        let ct = parse_constraint('L', true).unwrap();
        assert_eq!(ct.kinds, ConstraintKind::REG);
        assert!(!ct.regs.contains(TMP2));
        for reg in [Reg::A0, Reg::A1, Reg::A2, Reg::A3, Reg::A4] {
            assert!(!ct.regs.contains(reg), "{reg} should be reserved");
        }
        assert!(ct.regs.contains(Reg::A5));
        assert!(ct.regs.contains(Reg::S1));
    }

    #[test]
    fn check_l_collapses_to_r_without_softmmu() {
        let ct = parse_constraint('L', false).unwrap();
        assert_eq!(ct, parse_constraint('r', false).unwrap());
    }

    #[test]
    fn check_unknown_letter_is_an_error() {
        assert_eq!(
            parse_constraint('q', true),
            Err(ConstraintError::UnknownLetter('q'))
        );
    }

    #[test]
    fn check_s12_and_n12_bounds_are_asymmetric() {
        let s12 = parse_constraint('I', true).unwrap();
        let n12 = parse_constraint('N', true).unwrap();

        assert!(const_match(2047, &s12));
        assert!(const_match(-2048, &s12));
        assert!(!const_match(2048, &s12));
        assert!(!const_match(-2049, &s12));

        assert!(const_match(2048, &n12));
        assert!(const_match(-2047, &n12));
        assert!(!const_match(2049, &n12));
        assert!(!const_match(-2048, &n12));
    }

    #[test]
    fn check_zero_constraint() {
        let z = parse_constraint('Z', true).unwrap();
        assert!(const_match(0, &z));
        assert!(!const_match(1, &z));
        assert!(!const_match(-1, &z));
    }

    #[test]
    fn check_any_const_kind_matches_everything() {
        let ct = ArgConstraint {
            kinds: ConstraintKind::CONST,
            regs: RegSet::EMPTY,
        };
        assert!(const_match(i64::MIN, &ct));
        assert!(const_match(i64::MAX, &ct));
    }

    #[test]
    fn check_register_only_rejects_constants() {
        let ct = parse_constraint('r', true).unwrap();
        assert!(!const_match(0, &ct));
    }
}
