//! RISC-V instruction and immediate encoders (excludes 16-bit RVC)
//!
//! One builder per instruction format. The opcode argument already
//! carries funct3/funct7 (see [`super::opcodes`]), so each builder only
//! ORs register numbers and scattered immediate bits into fixed
//! positions. The immediate scatter functions work in unsigned 32-bit
//! arithmetic throughout; the shifts select bit ranges without any
//! sign extension getting in the way.

use super::opcodes::Opcode;
use super::regs::Reg;

/// imm[11:0] placed in the I-type immediate field
pub fn encode_imm12(imm: u32) -> u32 {
    (imm & 0xfff) << 20
}

/// imm[11:0] split across the S-type imm[11:5] and imm[4:0] fields
pub fn encode_simm12(imm: u32) -> u32 {
    ((imm << 20) >> 25) << 25 | ((imm << 27) >> 27) << 7
}

/// 12-bit branch offset scattered into the SB-type fields:
/// imm[12] at bit 31, imm[10:5] at 25, imm[4:1] at 8, imm[11] at 7
pub fn encode_sbimm12(imm: u32) -> u32 {
    ((imm << 19) >> 31) << 31
        | ((imm << 21) >> 26) << 25
        | ((imm << 27) >> 28) << 8
        | ((imm << 20) >> 31) << 7
}

/// imm[31:12] placed in the U-type field
pub fn encode_uimm20(imm: u32) -> u32 {
    (imm >> 12) << 12
}

/// 20-bit jump offset scattered into the UJ-type field:
/// imm[20] at bit 31, imm[10:1] at 21, imm[11] at 20, imm[19:12] at 12
pub fn encode_ujimm20(imm: u32) -> u32 {
    ((imm << 11) >> 31) << 31
        | ((imm << 21) >> 22) << 21
        | ((imm << 20) >> 31) << 20
        | ((imm << 12) >> 24) << 12
}

/// Type-R
pub fn encode_r(opc: Opcode, rd: Reg, rs1: Reg, rs2: Reg) -> u32 {
    opc.raw() | rd.index() << 7 | rs1.index() << 15 | rs2.index() << 20
}

/// Type-I
pub fn encode_i(opc: Opcode, rd: Reg, rs1: Reg, imm: u32) -> u32 {
    opc.raw() | rd.index() << 7 | rs1.index() << 15 | encode_imm12(imm)
}

/// Type-S
pub fn encode_s(opc: Opcode, rs1: Reg, rs2: Reg, imm: u32) -> u32 {
    opc.raw() | rs1.index() << 15 | rs2.index() << 20 | encode_simm12(imm)
}

/// Type-SB
pub fn encode_sb(opc: Opcode, rs1: Reg, rs2: Reg, imm: u32) -> u32 {
    opc.raw() | rs1.index() << 15 | rs2.index() << 20 | encode_sbimm12(imm)
}

/// Type-U
pub fn encode_u(opc: Opcode, rd: Reg, imm: u32) -> u32 {
    opc.raw() | rd.index() << 7 | encode_uimm20(imm)
}

/// Type-UJ
pub fn encode_uj(opc: Opcode, rd: Reg, imm: u32) -> u32 {
    opc.raw() | rd.index() << 7 | encode_ujimm20(imm)
}

#[cfg(test)]
mod tests {

    use super::*;
    use crate::utils::field;

    fn bit(value: u32, n: u32) -> u32 {
        field(value, n, n)
    }

    #[test]
    fn check_sbimm12_bit_scatter() {
        for offset in [-4096i32, -2048, -2, 0, 2, 64, 2046, 4094] {
            let imm = offset as u32;
            let enc = encode_sbimm12(imm);
            assert_eq!(bit(enc, 31), bit(imm, 12));
            assert_eq!(field(enc, 30, 25), field(imm, 10, 5));
            assert_eq!(field(enc, 11, 8), field(imm, 4, 1));
            assert_eq!(bit(enc, 7), bit(imm, 11));
            // Nothing may leak into the opcode or register fields
            assert_eq!(enc & !0xfe00_0f80, 0);
        }
    }

    #[test]
    fn check_ujimm20_bit_scatter() {
        for offset in [-1048576i32, -2, 0, 2, 0x7fe, 0xff000, 1048574] {
            let imm = offset as u32;
            let enc = encode_ujimm20(imm);
            assert_eq!(bit(enc, 31), bit(imm, 20));
            assert_eq!(field(enc, 30, 21), field(imm, 10, 1));
            assert_eq!(bit(enc, 20), bit(imm, 11));
            assert_eq!(field(enc, 19, 12), field(imm, 19, 12));
            assert_eq!(enc & 0xfff, 0);
        }
    }

    #[test]
    fn check_simm12_split() {
        for offset in [-2048i32, -1, 0, 1, 42, 2047] {
            let imm = offset as u32;
            let enc = encode_simm12(imm);
            assert_eq!(field(enc, 31, 25), field(imm, 11, 5));
            assert_eq!(field(enc, 11, 7), field(imm, 4, 0));
            assert_eq!(enc & !0xfe00_0f80, 0);
        }
    }

    #[test]
    fn check_register_field_positions() {
        let word = encode_r(Opcode::Add, Reg::Ra, Reg::Sp, Reg::Gp);
        assert_eq!(field(word, 11, 7), 1);
        assert_eq!(field(word, 19, 15), 2);
        assert_eq!(field(word, 24, 20), 3);
        assert_eq!(word & 0x7f, 0x33);
    }

    #[test]
    fn check_known_words() {
        // nop == addi zero, zero, 0
        assert_eq!(encode_i(Opcode::Addi, Reg::Zero, Reg::Zero, 0), 0x0000_0013);
        // addi ra, zero, 1
        assert_eq!(encode_i(Opcode::Addi, Reg::Ra, Reg::Zero, 1), 0x0010_0093);
        // add ra, sp, gp
        assert_eq!(encode_r(Opcode::Add, Reg::Ra, Reg::Sp, Reg::Gp), 0x0031_00b3);
        // lui a0, 0x12345 (imm is the value, not the field)
        assert_eq!(encode_u(Opcode::Lui, Reg::A0, 0x1234_5000), 0x1234_5537);
    }

    #[test]
    fn check_imm12_truncates_to_field() {
        assert_eq!(encode_imm12(-1i32 as u32), 0xfff0_0000);
        assert_eq!(encode_imm12(0x1800), 0x8000_0000);
    }
}
