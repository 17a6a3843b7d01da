//! Decoded instruction representation
//!
//! An [`Instruction`] is built fresh by the decoder on every fetch and thrown
//! away after execution; its memory operands capture the register state at
//! decode time.

use super::flags::Condition;
use super::operand::Operand;
use super::registers::{SegReg, Width};
use std::fmt;

/// REP-family prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepPrefix {
    /// F3: REP / REPE / REPZ
    Rep,
    /// F2: REPNE / REPNZ
    Repne,
}

/// Two-operand arithmetic/logic group, in opcode order (bits 5-3)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AluOp {
    Add = 0,
    Or = 1,
    Adc = 2,
    Sbb = 3,
    And = 4,
    Sub = 5,
    Xor = 6,
    Cmp = 7,
}

impl AluOp {
    pub fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => AluOp::Add,
            1 => AluOp::Or,
            2 => AluOp::Adc,
            3 => AluOp::Sbb,
            4 => AluOp::And,
            5 => AluOp::Sub,
            6 => AluOp::Xor,
            _ => AluOp::Cmp,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AluOp::Add => "add",
            AluOp::Or => "or",
            AluOp::Adc => "adc",
            AluOp::Sbb => "sbb",
            AluOp::And => "and",
            AluOp::Sub => "sub",
            AluOp::Xor => "xor",
            AluOp::Cmp => "cmp",
        }
    }
}

/// Shift/rotate group (0xC0/0xC1/0xD0-0xD3 `reg` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShiftOp {
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,
}

impl ShiftOp {
    /// `reg` field 6 is an undocumented alias of SHL
    pub fn from_index(index: u8) -> Self {
        match index & 0x07 {
            0 => ShiftOp::Rol,
            1 => ShiftOp::Ror,
            2 => ShiftOp::Rcl,
            3 => ShiftOp::Rcr,
            4 | 6 => ShiftOp::Shl,
            5 => ShiftOp::Shr,
            _ => ShiftOp::Sar,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShiftOp::Rol => "rol",
            ShiftOp::Ror => "ror",
            ShiftOp::Rcl => "rcl",
            ShiftOp::Rcr => "rcr",
            ShiftOp::Shl => "shl",
            ShiftOp::Shr => "shr",
            ShiftOp::Sar => "sar",
        }
    }
}

/// Opcode tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    // Arithmetic and logic
    Alu(AluOp),
    Inc,
    Dec,
    Neg,
    Not,
    Mul,
    Imul,
    Div,
    Idiv,
    /// Three-operand IMUL (80186)
    Imul3,
    Test,
    Shift(ShiftOp),

    // Data movement
    Xchg,
    Mov,
    Lea,
    Lds,
    Les,
    Push,
    Pop,
    Pusha,
    Popa,
    Pushf,
    Popf,
    Lahf,
    Sahf,
    Cbw,
    Cwd,
    Xlat,
    Salc,

    // Decimal adjust
    Daa,
    Das,
    Aaa,
    Aas,
    Aam,
    Aad,

    // Control transfer
    Jcc(Condition),
    Jmp,
    JmpFar,
    Call,
    CallFar,
    Ret,
    RetFar,
    Loop,
    Loope,
    Loopne,
    Jcxz,
    Int,
    Int3,
    Into,
    Iret,
    Enter,
    Leave,
    Bound,

    // I/O
    In,
    Out,

    // String
    Movs(Width),
    Cmps(Width),
    Stos(Width),
    Lods(Width),
    Scas(Width),
    Ins(Width),
    Outs(Width),

    // Flag and processor control
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,
    Hlt,
    Wait,
    Nop,
    /// Coprocessor escape (D8-DF), low three opcode bits
    Esc(u8),

    // Undecodable bytes
    Db,
    Dw,
}

impl Op {
    /// True for string opcodes a REP prefix turns into a loop
    pub fn is_string(&self) -> bool {
        matches!(
            self,
            Op::Movs(_)
                | Op::Cmps(_)
                | Op::Stos(_)
                | Op::Lods(_)
                | Op::Scas(_)
                | Op::Ins(_)
                | Op::Outs(_)
        )
    }

    /// CMPS and SCAS, where REPE/REPNE test ZF
    pub fn is_compare_string(&self) -> bool {
        matches!(self, Op::Cmps(_) | Op::Scas(_))
    }
}

/// A decoded instruction and the number of bytes it occupies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub op: Op,
    pub operands: Vec<Operand>,
    pub rep: Option<RepPrefix>,
    pub lock: bool,
    pub segment_override: Option<SegReg>,
    /// Encoded length in bytes, prefixes included
    pub length: u16,
}

impl Instruction {
    pub fn new(op: Op, operands: Vec<Operand>, length: u16) -> Self {
        Self {
            op,
            operands,
            rep: None,
            lock: false,
            segment_override: None,
            length,
        }
    }

    /// Operand `index`, if the decoder supplied one
    #[inline]
    pub fn operand(&self, index: usize) -> Option<&Operand> {
        self.operands.get(index)
    }

    /// Assembler mnemonic without prefixes or operands
    pub fn mnemonic(&self) -> String {
        let suffix = |w: Width| match w {
            Width::Byte => 'b',
            Width::Word => 'w',
        };
        let fixed = match self.op {
            Op::Alu(alu) => alu.name(),
            Op::Shift(shift) => shift.name(),
            Op::Jcc(cond) => return format!("j{}", cond),
            Op::Movs(w) => return format!("movs{}", suffix(w)),
            Op::Cmps(w) => return format!("cmps{}", suffix(w)),
            Op::Stos(w) => return format!("stos{}", suffix(w)),
            Op::Lods(w) => return format!("lods{}", suffix(w)),
            Op::Scas(w) => return format!("scas{}", suffix(w)),
            Op::Ins(w) => return format!("ins{}", suffix(w)),
            Op::Outs(w) => return format!("outs{}", suffix(w)),
            Op::Inc => "inc",
            Op::Dec => "dec",
            Op::Neg => "neg",
            Op::Not => "not",
            Op::Mul => "mul",
            Op::Imul | Op::Imul3 => "imul",
            Op::Div => "div",
            Op::Idiv => "idiv",
            Op::Test => "test",
            Op::Xchg => "xchg",
            Op::Mov => "mov",
            Op::Lea => "lea",
            Op::Lds => "lds",
            Op::Les => "les",
            Op::Push => "push",
            Op::Pop => "pop",
            Op::Pusha => "pusha",
            Op::Popa => "popa",
            Op::Pushf => "pushf",
            Op::Popf => "popf",
            Op::Lahf => "lahf",
            Op::Sahf => "sahf",
            Op::Cbw => "cbw",
            Op::Cwd => "cwd",
            Op::Xlat => "xlat",
            Op::Salc => "salc",
            Op::Daa => "daa",
            Op::Das => "das",
            Op::Aaa => "aaa",
            Op::Aas => "aas",
            Op::Aam => "aam",
            Op::Aad => "aad",
            Op::Jmp => "jmp",
            Op::JmpFar => "jmp far",
            Op::Call => "call",
            Op::CallFar => "call far",
            Op::Ret => "ret",
            Op::RetFar => "retf",
            Op::Loop => "loop",
            Op::Loope => "loope",
            Op::Loopne => "loopne",
            Op::Jcxz => "jcxz",
            Op::Int => "int",
            Op::Int3 => "int3",
            Op::Into => "into",
            Op::Iret => "iret",
            Op::Enter => "enter",
            Op::Leave => "leave",
            Op::Bound => "bound",
            Op::In => "in",
            Op::Out => "out",
            Op::Clc => "clc",
            Op::Stc => "stc",
            Op::Cmc => "cmc",
            Op::Cld => "cld",
            Op::Std => "std",
            Op::Cli => "cli",
            Op::Sti => "sti",
            Op::Hlt => "hlt",
            Op::Wait => "wait",
            Op::Nop => "nop",
            Op::Esc(_) => "esc",
            Op::Db => "db",
            Op::Dw => "dw",
        };
        fixed.to_string()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.lock {
            f.write_str("lock ")?;
        }
        if let Some(rep) = self.rep {
            let prefix = match (rep, self.op.is_compare_string()) {
                (RepPrefix::Rep, true) => "repe ",
                (RepPrefix::Rep, false) => "rep ",
                (RepPrefix::Repne, _) => "repne ",
            };
            f.write_str(prefix)?;
        }
        // Overrides on memory operands are shown inside the operand
        if let Some(seg) = self.segment_override {
            if !self.operands.iter().any(Operand::is_memory) {
                write!(f, "{} ", seg)?;
            }
        }
        f.write_str(&self.mnemonic())?;
        if let Op::Esc(index) = self.op {
            write!(f, " {}", index)?;
            if !self.operands.is_empty() {
                f.write_str(",")?;
            }
        }
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{}{}", sep, operand)?;
        }
        Ok(())
    }
}
