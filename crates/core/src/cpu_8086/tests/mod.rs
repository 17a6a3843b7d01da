//! Instruction-level tests for the 8086 core
//!
//! Programs are loaded at 1000:0100 with every segment register pointing
//! at 0x1000 and SP = 0xFFFE, the way a .COM image starts.

use crate::cpu_8086::{ArrayMemory, Cpu8086, CpuModel, Memory8086, Reg16, SegReg};

mod tests_8bit;
mod tests_flags;
mod tests_interrupts;

pub(super) const CODE_SEG: u16 = 0x1000;
pub(super) const CODE_OFF: u16 = 0x0100;

/// 8086 with `code` at 1000:0100
pub(super) fn cpu_with(code: &[u8]) -> Cpu8086<ArrayMemory> {
    cpu_with_model(code, CpuModel::Intel8086)
}

/// 80186 with `code` at 1000:0100
pub(super) fn cpu186_with(code: &[u8]) -> Cpu8086<ArrayMemory> {
    cpu_with_model(code, CpuModel::Intel80186)
}

fn cpu_with_model(code: &[u8], model: CpuModel) -> Cpu8086<ArrayMemory> {
    let mut cpu = Cpu8086::with_model(ArrayMemory::new(), model);
    cpu.memory.set_bytes(CODE_SEG, CODE_OFF, code);
    for seg in [SegReg::CS, SegReg::DS, SegReg::ES, SegReg::SS] {
        cpu.regs.set_seg(seg, CODE_SEG);
    }
    cpu.regs.ip = CODE_OFF;
    cpu.regs.set16(Reg16::SP, 0xFFFE);
    cpu
}

/// Execute `count` instructions
pub(super) fn step_n(cpu: &mut Cpu8086<ArrayMemory>, count: usize) {
    for _ in 0..count {
        cpu.step().unwrap();
    }
}

/// Run until HLT, failing the test if the program never stops
pub(super) fn run_to_halt(cpu: &mut Cpu8086<ArrayMemory>) -> u64 {
    let summary = cpu.run(Some(100_000)).unwrap();
    assert!(cpu.is_halted(), "program did not halt");
    summary.steps
}
