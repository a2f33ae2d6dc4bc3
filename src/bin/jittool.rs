use clap::{Parser, Subcommand};
use clap_num::maybe_hex;
use itertools::Itertools;

use riscvjit::codegen::decode::decode;
use riscvjit::codegen::emit::CodeGen;
use riscvjit::codegen::regs::Reg;
use riscvjit::codegen::{ValueType, Xlen};

/// Inspection tool for the RISC-V code generator
///
/// Shows the exact instruction words the generator emits for a piece
/// of work, alongside their disassembly. Useful when eyeballing a
/// materialization sequence or a word dumped from a code buffer.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the materialization sequence for a constant
    Movi {
        /// Constant to materialize (prefix with 0x for hexadecimal)
        #[arg(value_parser = maybe_hex::<u64>)]
        value: u64,

        /// Generate for a 32-bit host
        #[arg(long)]
        rv32: bool,

        /// Address the sequence is emitted at, which decides whether a
        /// pc-relative pair can reach the value
        #[arg(long, default_value_t = 0, value_parser = maybe_hex::<u64>)]
        base: u64,
    },
    /// Disassemble instruction words
    Disasm {
        /// 32-bit words (prefix with 0x for hexadecimal)
        #[arg(value_parser = maybe_hex::<u32>, required = true)]
        words: Vec<u32>,
    },
}

fn print_words(base: u64, words: &[u32]) {
    for (n, word) in words.iter().enumerate() {
        let text = match decode(*word) {
            Ok(instr) => instr.to_string(),
            Err(error) => format!("({error})"),
        };
        println!("{:8x}:  {:08x}  {}", base + 4 * n as u64, word, text);
    }
}

fn main() {
    let args = Args::parse();
    match args.command {
        Command::Movi { value, rv32, base } => {
            let (xlen, ty) = if rv32 {
                (Xlen::Xlen32, ValueType::I32)
            } else {
                (Xlen::Xlen64, ValueType::I64)
            };
            let mut gen = CodeGen::new(xlen, base);
            gen.movi(ty, Reg::A0, value as i64);
            let code = gen.seal();
            print_words(base, code.words());
            println!(
                "{} words: {}",
                code.words().len(),
                code.words().iter().map(|word| format!("{word:08x}")).join(" ")
            );
        }
        Command::Disasm { words } => print_words(0, &words),
    }
}
