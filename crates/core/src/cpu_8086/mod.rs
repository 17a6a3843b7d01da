//! Intel 8086 CPU core implementation
//!
//! A generic real-mode 8086/80186 core that any system can drive by
//! implementing the [`Memory8086`] trait. Each fetch decodes a fresh
//! [`Instruction`] at CS:IP, advances IP by its length and executes it.
//!
//! - `memory`: address space trait, segment:offset helpers, flat test memory
//! - `registers`: general/segment registers with 8-bit aliasing
//! - `flags`: FLAGS word and the shared flag-update routines
//! - `operand`: ModR/M effective-address resolution
//! - `decoder`: prefix handling and the 16-way nibble dispatch
//! - `executor`: per-opcode semantics
//! - `string_ops`: MOVS/CMPS/STOS/LODS/SCAS/INS/OUTS and REP loops
//! - `interrupts`: vector table and host service handlers

pub mod decoder;
pub mod executor;
pub mod flags;
pub mod instruction;
pub mod interrupts;
pub mod memory;
pub mod operand;
pub mod registers;
pub mod string_ops;

#[cfg(test)]
mod tests;

pub use decoder::DecodeError;
pub use flags::{
    Condition, Flags, FLAG_AF, FLAG_CF, FLAG_DF, FLAG_IF, FLAG_OF, FLAG_PF, FLAG_SF, FLAG_TF,
    FLAG_VM, FLAG_ZF,
};
pub use instruction::{AluOp, Instruction, Op, RepPrefix, ShiftOp};
pub use interrupts::{InterruptController, InterruptHandler};
pub use memory::{
    physical_address, ArrayMemory, Direction, Memory8086, ADDRESS_MASK, MEMORY_SIZE,
};
pub use operand::{MemoryRef, ModRm, Operand};
pub use registers::{Reg16, Reg8, RegisterFile, SegReg, Width};

use crate::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CPU model/variant selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CpuModel {
    /// Intel 8086 (1978) - Original 16-bit x86 processor
    #[default]
    Intel8086,
    /// Intel 8088 (1979) - 8-bit external bus variant of 8086
    Intel8088,
    /// Intel 80186 (1982) - Enhanced 8086 with additional instructions
    Intel80186,
    /// Intel 80188 (1982) - 8-bit external bus variant of 80186
    Intel80188,
}

impl CpuModel {
    /// Returns true if this CPU model supports 80186+ instructions
    pub fn supports_80186_instructions(&self) -> bool {
        matches!(self, CpuModel::Intel80186 | CpuModel::Intel80188)
    }

    /// Returns the name of the CPU model as a string
    pub fn name(&self) -> &'static str {
        match self {
            CpuModel::Intel8086 => "Intel 8086",
            CpuModel::Intel8088 => "Intel 8088",
            CpuModel::Intel80186 => "Intel 80186",
            CpuModel::Intel80188 => "Intel 80188",
        }
    }

    /// Parse a model from a user-facing string ("8086", "80186", ...)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().trim_start_matches("intel").trim() {
            "8086" => Some(CpuModel::Intel8086),
            "8088" => Some(CpuModel::Intel8088),
            "80186" | "186" => Some(CpuModel::Intel80186),
            "80188" | "188" => Some(CpuModel::Intel80188),
            _ => None,
        }
    }
}

/// Execution-level failures surfaced to the caller.
///
/// Decode problems never show up here (they become DB/DW) and hardware
/// faults become interrupts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CpuError {
    #[error("{mnemonic}: operand {operand} is not supported")]
    UnsupportedOperand { mnemonic: String, operand: String },
    #[error("{mnemonic}: missing operand {index}")]
    MissingOperand { mnemonic: String, index: usize },
    #[error("cannot write to {operand}")]
    ReadOnlyOperand { operand: String },
    #[error("INT 0x{vector:02X} handler failed: {message}")]
    Handler { vector: u8, message: String },
}

/// Why a bounded run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// HLT executed (or a host service halted the machine)
    Halted,
    /// The step budget ran out first
    StepLimit,
}

/// Outcome of [`Cpu8086::run`] / [`Cpu8086::execute`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Instructions executed during this run
    pub steps: u64,
    pub reason: StopReason,
}

/// Entry state for [`Cpu8086::execute`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub code_segment: u16,
    pub instruction_pointer: u16,
    pub data_segment: u16,
    /// Defaults to `data_segment`
    pub stack_segment: Option<u16>,
    /// Defaults to `data_segment`
    pub extra_segment: Option<u16>,
    /// Left untouched when `None`
    pub stack_pointer: Option<u16>,
    /// Initial general-register values
    pub args: Vec<(Reg16, u16)>,
    /// Step budget; `None` runs until HLT
    pub max_steps: Option<u64>,
}

impl ExecutionContext {
    pub fn new(code_segment: u16, instruction_pointer: u16, data_segment: u16) -> Self {
        Self {
            code_segment,
            instruction_pointer,
            data_segment,
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, segment: u16, pointer: u16) -> Self {
        self.stack_segment = Some(segment);
        self.stack_pointer = Some(pointer);
        self
    }

    pub fn with_arg(mut self, reg: Reg16, value: u16) -> Self {
        self.args.push((reg, value));
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

/// Intel 8086 CPU state and execution engine
#[derive(Debug)]
pub struct Cpu8086<M: Memory8086> {
    pub regs: RegisterFile,
    pub flags: Flags,
    /// Memory bus (RAM, ROM, I/O ports)
    pub memory: M,
    /// Host-side interrupt services
    pub interrupts: InterruptController<M>,
    /// Instructions executed since construction
    pub steps: u64,
    /// Set by HLT; cleared by reset or an interrupt
    pub halted: bool,
    model: CpuModel,
}

impl<M: Memory8086> Cpu8086<M> {
    /// Create an 8086 around `memory`
    pub fn new(memory: M) -> Self {
        Self::with_model(memory, CpuModel::Intel8086)
    }

    pub fn with_model(memory: M, model: CpuModel) -> Self {
        let mut cpu = Self {
            regs: RegisterFile::new(),
            flags: Flags::new(),
            memory,
            interrupts: InterruptController::new(),
            steps: 0,
            halted: false,
            model,
        };
        cpu.reset();
        cpu
    }

    pub fn model(&self) -> CpuModel {
        self.model
    }

    pub fn set_model(&mut self, model: CpuModel) {
        self.model = model;
    }

    /// Power-on state: registers cleared, CS:IP = FFFF:0000, and every
    /// interrupt vector pointed at the default IRET stub. Host handlers stay
    /// registered.
    pub fn reset(&mut self) {
        self.regs.clear();
        self.regs.set_seg(SegReg::CS, 0xFFFF);
        self.flags = Flags::new();
        self.halted = false;
        interrupts::install_default_vectors(&mut self.memory);
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Push a word onto SS:SP
    #[inline]
    pub fn push(&mut self, val: u16) {
        let sp = self.regs.get16(Reg16::SP).wrapping_sub(2);
        self.regs.set16(Reg16::SP, sp);
        self.memory.set_word(self.regs.seg(SegReg::SS), sp, val);
    }

    /// Pop a word from SS:SP
    #[inline]
    pub fn pop(&mut self) -> u16 {
        let sp = self.regs.get16(Reg16::SP);
        let val = self.memory.get_word(self.regs.seg(SegReg::SS), sp);
        self.regs.set16(Reg16::SP, sp.wrapping_add(2));
        val
    }

    /// Decode the instruction at CS:IP without executing it.
    ///
    /// Returns the instruction and the number of bytes it occupies.
    pub fn decode_next(&self) -> (Instruction, u16) {
        let instr = decoder::decode(&self.memory, &self.regs, self.model);
        let length = instr.length;
        (instr, length)
    }

    /// Disassemble `count` instructions starting at CS:IP.
    ///
    /// Each entry is (physical address, raw bytes, instruction).
    pub fn disassemble(&self, count: usize) -> Vec<(u32, Vec<u8>, Instruction)> {
        let cs = self.regs.seg(SegReg::CS);
        let mut ip = self.regs.ip;
        let mut listing = Vec::with_capacity(count);
        for _ in 0..count {
            let instr = decoder::decode_at(&self.memory, &self.regs, self.model, cs, ip);
            let bytes = self.memory.get_bytes(cs, ip, instr.length as usize);
            let length = instr.length;
            listing.push((physical_address(cs, ip), bytes, instr));
            ip = ip.wrapping_add(length);
        }
        listing
    }

    /// Fetch, decode and execute one instruction. Does nothing while halted.
    pub fn step(&mut self) -> Result<(), CpuError> {
        if self.halted {
            return Ok(());
        }

        let instr = decoder::decode(&self.memory, &self.regs, self.model);
        log(LogCategory::CPU, LogLevel::Trace, || {
            format!(
                "{:04X}:{:04X} {:<28} AX={:04X} BX={:04X} CX={:04X} DX={:04X} SP={:04X} [{}]",
                self.regs.seg(SegReg::CS),
                self.regs.ip,
                instr.to_string(),
                self.regs.get16(Reg16::AX),
                self.regs.get16(Reg16::BX),
                self.regs.get16(Reg16::CX),
                self.regs.get16(Reg16::DX),
                self.regs.get16(Reg16::SP),
                self.flags
            )
        });

        self.regs.ip = self.regs.ip.wrapping_add(instr.length);
        self.steps += 1;
        instr.execute(self)
    }

    /// Step until HLT or until `max_steps` instructions have run
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<RunSummary, CpuError> {
        let start = self.steps;
        loop {
            let steps = self.steps - start;
            if self.halted {
                return Ok(RunSummary {
                    steps,
                    reason: StopReason::Halted,
                });
            }
            if max_steps.is_some_and(|max| steps >= max) {
                return Ok(RunSummary {
                    steps,
                    reason: StopReason::StepLimit,
                });
            }
            self.step()?;
        }
    }

    /// Load the segment registers, IP and any initial register values from
    /// `context`, then run the fetch-execute loop until HLT, the step budget
    /// or an execution error.
    pub fn execute(&mut self, context: &ExecutionContext) -> Result<RunSummary, CpuError> {
        self.regs.set_seg(SegReg::CS, context.code_segment);
        self.regs.set_seg(SegReg::DS, context.data_segment);
        self.regs
            .set_seg(SegReg::SS, context.stack_segment.unwrap_or(context.data_segment));
        self.regs
            .set_seg(SegReg::ES, context.extra_segment.unwrap_or(context.data_segment));
        self.regs.ip = context.instruction_pointer;
        if let Some(sp) = context.stack_pointer {
            self.regs.set16(Reg16::SP, sp);
        }
        for &(reg, value) in &context.args {
            self.regs.set16(reg, value);
        }
        self.halted = false;

        log(LogCategory::CPU, LogLevel::Info, || {
            format!(
                "execute from {:04X}:{:04X} (DS={:04X})",
                context.code_segment, context.instruction_pointer, context.data_segment
            )
        });
        self.run(context.max_steps)
    }
}

impl<M: Memory8086> crate::Cpu for Cpu8086<M> {
    type Error = CpuError;

    fn reset(&mut self) {
        Cpu8086::reset(self);
    }

    fn step(&mut self) -> Result<(), CpuError> {
        Cpu8086::step(self)
    }

    fn is_halted(&self) -> bool {
        self.halted
    }
}
