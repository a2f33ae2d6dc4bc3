//! RISC-V host code generation
//!
//! This is the back end of the binary translator: it turns IR
//! operations into native RISC-V machine code. The submodules cover
//! instruction-word encoding, operand constraints, the emit buffer
//! with its labels and relocations, the higher-level emit helpers
//! (constant materialization, wide-offset loads and stores, moves and
//! extensions), and the DWARF frame description handed to host
//! unwinders.
//!
//! Everything here is single-threaded: one [`buffer::CodeBuffer`] is
//! owned by the translating thread for the duration of one translation
//! block. The only cross-thread concern is retargeting a direct jump in
//! sealed code, for which see [`buffer::SealedCode::set_jmp_target`].

pub mod buffer;
pub mod constraint;
pub mod decode;
pub mod emit;
pub mod encode;
pub mod frame;
pub mod opcodes;
pub mod regs;

/// The register and address-space width of the host
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Xlen {
    Xlen32,
    #[default]
    Xlen64,
}

impl Xlen {
    pub fn reg_bits(self) -> u32 {
        match self {
            Xlen::Xlen32 => 32,
            Xlen::Xlen64 => 64,
        }
    }
}

/// Width class of an IR value
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ValueType {
    I32,
    I64,
}
