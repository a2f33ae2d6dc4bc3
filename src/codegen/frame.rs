//! DWARF frame description of generated code
//!
//! Host profilers unwind through translated blocks with a static
//! CIE/FDE pair: every block shares the same prologue, which puts the
//! CFA at sp + frame size and saves the callee-saved registers and ra
//! in fixed slots at negative offsets from the CFA. Only the code
//! range differs per buffer, so the image is assembled on registration.

use super::regs::Reg;
use super::Xlen;

/// Host machine identifier reported alongside the frame image
pub const ELF_HOST_MACHINE: u16 = elf::abi::EM_RISCV;

/// Bytes reserved at the bottom of the frame for outgoing call
/// arguments
const STATIC_CALL_ARGS_SIZE: u32 = 128;

const DW_CFA_DEF_CFA: u8 = 0x0c;
/// The register number rides in the low six bits
const DW_CFA_OFFSET: u8 = 0x80;

/// Callee-saved registers in their fixed save slots. The factor is the
/// slot offset from the CFA in data-alignment units: factor f puts the
/// register at -f * reg_bytes (s1 at -96, ra at -8 on a 64-bit host).
const REG_OFFSETS: [(Reg, u32); 12] = [
    (Reg::S1, 12),
    (Reg::S2, 11),
    (Reg::S3, 10),
    (Reg::S4, 9),
    (Reg::S5, 8),
    (Reg::S6, 7),
    (Reg::S7, 6),
    (Reg::S8, 5),
    (Reg::S9, 4),
    (Reg::S10, 3),
    (Reg::S11, 2),
    (Reg::Ra, 1),
];

/// Stack frame size the prologue establishes: the outgoing-argument
/// area plus one save slot per callee-saved register, 16-byte aligned
pub fn frame_size(xlen: Xlen) -> u32 {
    let reg_bytes = xlen.reg_bits() / 8;
    let size = STATIC_CALL_ARGS_SIZE + REG_OFFSETS.len() as u32 * reg_bytes;
    (size + 15) & !15
}

fn push_uleb128(bytes: &mut Vec<u8>, mut value: u32) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        bytes.push(byte);
        if value == 0 {
            break;
        }
    }
}

fn push_addr(bytes: &mut Vec<u8>, xlen: Xlen, value: u64) {
    match xlen {
        Xlen::Xlen32 => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
        Xlen::Xlen64 => bytes.extend_from_slice(&value.to_le_bytes()),
    }
}

/// Pad with DW_CFA_nop so the entry length is a word multiple
fn pad_entry(bytes: &mut Vec<u8>, len_at: usize) {
    while (bytes.len() - len_at) % 4 != 0 {
        bytes.push(0);
    }
    let len = (bytes.len() - len_at - 4) as u32;
    bytes[len_at..len_at + 4].copy_from_slice(&len.to_le_bytes());
}

/// Assemble the .debug_frame image describing `buf_len` bytes of
/// generated code starting at `buf_start`
pub fn debug_frame(xlen: Xlen, buf_start: u64, buf_len: u64) -> Vec<u8> {
    let reg_bytes = (xlen.reg_bits() / 8) as u8;
    let mut bytes = Vec::new();

    // CIE: id -1, version 1, empty augmentation, code alignment 1,
    // data alignment -reg_bytes (sleb128), return column ra
    let cie_len_at = bytes.len();
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
    bytes.push(1);
    bytes.push(0);
    bytes.push(1);
    bytes.push(reg_bytes.wrapping_neg() & 0x7f);
    bytes.push(Reg::Ra.index() as u8);
    pad_entry(&mut bytes, cie_len_at);

    // FDE: the code range, then the frame rules
    let fde_len_at = bytes.len();
    bytes.extend_from_slice(&[0; 4]);
    bytes.extend_from_slice(&(cie_len_at as u32).to_le_bytes());
    push_addr(&mut bytes, xlen, buf_start);
    push_addr(&mut bytes, xlen, buf_len);
    bytes.push(DW_CFA_DEF_CFA);
    push_uleb128(&mut bytes, Reg::Sp.index());
    push_uleb128(&mut bytes, frame_size(xlen));
    for (reg, factor) in REG_OFFSETS {
        bytes.push(DW_CFA_OFFSET | reg.index() as u8);
        push_uleb128(&mut bytes, factor);
    }
    pad_entry(&mut bytes, fde_len_at);

    bytes
}

/// Frame image handed to the in-process JIT registration interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JitFrame {
    pub machine: u16,
    pub image: Vec<u8>,
}

/// Describe a freshly allocated code buffer to host unwinders
pub fn register_jit(xlen: Xlen, buf_start: u64, buf_len: u64) -> JitFrame {
    JitFrame {
        machine: ELF_HOST_MACHINE,
        image: debug_frame(xlen, buf_start, buf_len),
    }
}
