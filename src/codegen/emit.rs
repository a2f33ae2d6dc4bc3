//! Typed emit helpers over a [`CodeBuffer`]
//!
//! [`CodeGen`] is what the IR dispatcher drives: one method per shape
//! of work it needs done. The raw `opc_*` methods emit a single word in
//! the named format; the higher-level helpers expand to the shortest
//! correct sequence (constant materialization, loads and stores with
//! offsets beyond the 12-bit field, zero and sign extensions, calls).

use crate::utils::sextract64;

use super::buffer::{CodeBuffer, Label, RelocKind, SealedCode};
use super::encode::{encode_i, encode_r, encode_s, encode_sb, encode_u, encode_uj};
use super::opcodes::Opcode;
use super::regs::{Reg, TMP0, TMP2};
use super::{ValueType, Xlen};

/// Code generator for one translation block
#[derive(Debug)]
pub struct CodeGen {
    xlen: Xlen,
    buf: CodeBuffer,
}

impl CodeGen {
    /// Start a block whose first instruction will live at `base`
    pub fn new(xlen: Xlen, base: u64) -> Self {
        Self {
            xlen,
            buf: CodeBuffer::new(base),
        }
    }

    pub fn buffer(&self) -> &CodeBuffer {
        &self.buf
    }

    pub fn new_label(&mut self) -> Label {
        self.buf.new_label()
    }

    pub fn bind(&mut self, label: Label) {
        self.buf.bind(label)
    }

    pub fn seal(self) -> SealedCode {
        self.buf.seal()
    }

    fn reg_bits(&self) -> u32 {
        self.xlen.reg_bits()
    }

    fn ptr_type(&self) -> ValueType {
        match self.xlen {
            Xlen::Xlen32 => ValueType::I32,
            Xlen::Xlen64 => ValueType::I64,
        }
    }

    pub fn opc_reg(&mut self, opc: Opcode, rd: Reg, rs1: Reg, rs2: Reg) {
        self.buf.push(encode_r(opc, rd, rs1, rs2));
    }

    pub fn opc_imm(&mut self, opc: Opcode, rd: Reg, rs1: Reg, imm: i64) {
        self.buf.push(encode_i(opc, rd, rs1, imm as u32));
    }

    pub fn opc_store(&mut self, opc: Opcode, addr: Reg, data: Reg, imm: i64) {
        self.buf.push(encode_s(opc, addr, data, imm as u32));
    }

    pub fn opc_branch(&mut self, opc: Opcode, rs1: Reg, rs2: Reg, imm: i64) {
        self.buf.push(encode_sb(opc, rs1, rs2, imm as u32));
    }

    pub fn opc_upper(&mut self, opc: Opcode, rd: Reg, imm: i64) {
        self.buf.push(encode_u(opc, rd, imm as u32));
    }

    pub fn opc_jump(&mut self, opc: Opcode, rd: Reg, imm: i64) {
        self.buf.push(encode_uj(opc, rd, imm as u32));
    }

    /// Materialize `val` into `rd` with the shortest sequence: a single
    /// ADDI when the value fits 12 bits, ADDI+SLLI for powers of two,
    /// a recursive hi/lo split for wide 64-bit values, a relocated
    /// AUIPC+ADDI pair when the value is pc-relative reachable, and
    /// LUI+ADDI(W) otherwise.
    pub fn movi(&mut self, ty: ValueType, rd: Reg, val: i64) {
        let mut val = val;
        if self.xlen == Xlen::Xlen32 || ty == ValueType::I32 {
            val = val as i32 as i64;
        }

        let lo = sextract64(val, 0, 12);
        if val == lo {
            self.opc_imm(Opcode::Addi, rd, Reg::Zero, lo);
            return;
        }

        if val & val.wrapping_sub(1) == 0 {
            self.opc_imm(Opcode::Addi, rd, Reg::Zero, 1);
            self.opc_imm(Opcode::Slli, rd, rd, val.trailing_zeros() as i64);
            return;
        }

        if self.xlen == Xlen::Xlen64 && val != val as i32 as i64 {
            // Split off the low 12 bits, then shift the remainder down
            // until its low bit is set. Extracting the trailing zeros of
            // the upper part guarantees the recursion strictly reduces
            // the number of significant bits.
            let tmp = val.wrapping_sub(lo);
            let shift = 12 + (tmp >> 12).trailing_zeros();
            let hi = tmp >> shift;
            self.movi(ValueType::I64, rd, hi);
            self.opc_imm(Opcode::Slli, rd, rd, shift as i64);
            if lo != 0 {
                self.opc_imm(Opcode::Addi, rd, rd, lo);
            }
            return;
        }

        if self.xlen == Xlen::Xlen64 {
            let offset = (val as u64).wrapping_sub(self.buf.pc()) as i64;
            if offset == offset as i32 as i64 {
                let at = self.buf.cursor();
                self.opc_upper(Opcode::Auipc, rd, 0);
                self.opc_imm(Opcode::Addi, rd, rd, 0);
                self.buf.reloc_call(at, val as u64);
                return;
            }
        }

        let hi = val.wrapping_sub(lo);
        self.opc_upper(Opcode::Lui, rd, hi);
        if lo != 0 {
            let add = match self.xlen {
                Xlen::Xlen32 => Opcode::Addi,
                Xlen::Xlen64 => Opcode::Addiw,
            };
            self.opc_imm(add, rd, rd, lo);
        }
    }

    /// Load or store `data` at `addr + offset`, splitting offsets that
    /// do not fit the signed 12-bit field through the TMP2 scratch
    /// register (which the allocator never hands out)
    pub fn ldst(&mut self, opc: Opcode, data: Reg, addr: Reg, offset: i64) {
        let imm12 = sextract64(offset, 0, 12);
        let mut addr = addr;
        if offset != imm12 {
            self.movi(self.ptr_type(), TMP2, offset.wrapping_sub(imm12));
            if addr != Reg::Zero {
                self.opc_reg(Opcode::Add, TMP2, TMP2, addr);
            }
            addr = TMP2;
        }
        if opc.is_store() {
            self.opc_store(opc, addr, data, imm12);
        } else if opc.is_load() {
            self.opc_imm(opc, data, addr, imm12);
        } else {
            panic!("ldst needs a load or store opcode, got {opc:?}");
        }
    }

    /// Register move; emits nothing when source and destination match
    pub fn mov(&mut self, rd: Reg, rs: Reg) {
        if rd != rs {
            self.opc_imm(Opcode::Addi, rd, rs, 0);
        }
    }

    pub fn ext8u(&mut self, rd: Reg, rs: Reg) {
        self.opc_imm(Opcode::Andi, rd, rs, 0xff);
    }

    pub fn ext16u(&mut self, rd: Reg, rs: Reg) {
        let shift = (self.reg_bits() - 16) as i64;
        self.opc_imm(Opcode::Slli, rd, rs, shift);
        self.opc_imm(Opcode::Srli, rd, rd, shift);
    }

    pub fn ext32u(&mut self, rd: Reg, rs: Reg) {
        match self.xlen {
            Xlen::Xlen32 => self.mov(rd, rs),
            Xlen::Xlen64 => {
                self.opc_imm(Opcode::Slli, rd, rs, 32);
                self.opc_imm(Opcode::Srli, rd, rd, 32);
            }
        }
    }

    pub fn ext8s(&mut self, rd: Reg, rs: Reg) {
        let shift = (self.reg_bits() - 8) as i64;
        self.opc_imm(Opcode::Slli, rd, rs, shift);
        self.opc_imm(Opcode::Srai, rd, rd, shift);
    }

    pub fn ext16s(&mut self, rd: Reg, rs: Reg) {
        let shift = (self.reg_bits() - 16) as i64;
        self.opc_imm(Opcode::Slli, rd, rs, shift);
        self.opc_imm(Opcode::Srai, rd, rd, shift);
    }

    pub fn ext32s(&mut self, rd: Reg, rs: Reg) {
        match self.xlen {
            Xlen::Xlen32 => self.mov(rd, rs),
            Xlen::Xlen64 => self.opc_imm(Opcode::Addiw, rd, rs, 0),
        }
    }

    /// Conditional branch to `label`
    pub fn brcond(&mut self, opc: Opcode, rs1: Reg, rs2: Reg, label: Label) {
        assert!(opc.is_branch(), "brcond needs a branch opcode, got {opc:?}");
        let at = self.buf.cursor();
        self.opc_branch(opc, rs1, rs2, 0);
        self.buf.reloc(at, RelocKind::Branch, label);
    }

    /// Unconditional jump to `label`
    pub fn jump(&mut self, label: Label) {
        let at = self.buf.cursor();
        self.opc_jump(Opcode::Jal, Reg::Zero, 0);
        self.buf.reloc(at, RelocKind::Jal, label);
    }

    /// Call the helper at absolute address `target`: one JAL when it is
    /// in direct range, otherwise an AUIPC+JALR pair through TMP0
    pub fn call(&mut self, target: u64) {
        let offset = target.wrapping_sub(self.buf.pc()) as i64;
        if offset == sextract64(offset, 1, 20) << 1 {
            self.opc_jump(Opcode::Jal, Reg::Ra, offset);
        } else {
            let at = self.buf.cursor();
            self.opc_upper(Opcode::Auipc, TMP0, 0);
            self.opc_imm(Opcode::Jalr, Reg::Ra, TMP0, 0);
            self.buf.reloc_call(at, target);
        }
    }

    /// Emit a retargetable direct-jump site, initially jumping to
    /// itself so that it is safe until the first retarget, and return
    /// its word index for [`SealedCode::set_jmp_target`]
    pub fn emit_jmp_site(&mut self) -> usize {
        let at = self.buf.cursor();
        let here = self.buf.pc();
        self.opc_upper(Opcode::Auipc, TMP0, 0);
        self.opc_imm(Opcode::Jalr, Reg::Zero, TMP0, 0);
        self.buf.reloc_call(at, here);
        at
    }
}
