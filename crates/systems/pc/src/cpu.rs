//! PC CPU wrapper
//!
//! Wraps the core 8086 with the PC boot state and the host-side BIOS and
//! DOS services.

use crate::bus::PcBus;
use crate::{bios, dos};
use emu86_core::cpu_8086::{
    Cpu8086, CpuError, CpuModel, ExecutionContext, Reg16, RunSummary, SegReg,
};

/// PC CPU wrapper
#[derive(Debug)]
pub struct PcCpu {
    cpu: Cpu8086<PcBus>,
}

impl PcCpu {
    /// Create a new PC CPU with the given bus and install the services
    pub fn new(bus: PcBus, model: CpuModel) -> Self {
        let mut pc = Self {
            cpu: Cpu8086::with_model(bus, model),
        };
        pc.boot_state();
        pc
    }

    /// Power-cycle: clear memory and devices, then reinstall the services
    pub fn reset(&mut self) {
        self.cpu.memory.reset();
        self.cpu.reset();
        self.cpu.steps = 0;
        self.boot_state();
    }

    fn boot_state(&mut self) {
        // IBM PC/XT boots at FFFF:0000 with the stack at the top of segment 0
        self.cpu.regs.set_seg(SegReg::CS, 0xFFFF);
        self.cpu.regs.ip = 0x0000;
        self.cpu.regs.set_seg(SegReg::SS, 0x0000);
        self.cpu.regs.set16(Reg16::SP, 0xFFFE);
        bios::install(&mut self.cpu);
        dos::install(&mut self.cpu);
    }

    /// Execute one instruction
    pub fn step(&mut self) -> Result<(), CpuError> {
        self.cpu.step()
    }

    /// Step until HLT or the step budget runs out
    pub fn run(&mut self, max_steps: Option<u64>) -> Result<RunSummary, CpuError> {
        self.cpu.run(max_steps)
    }

    pub fn execute(&mut self, context: &ExecutionContext) -> Result<RunSummary, CpuError> {
        self.cpu.execute(context)
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// The wrapped CPU
    pub fn cpu(&self) -> &Cpu8086<PcBus> {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Cpu8086<PcBus> {
        &mut self.cpu
    }

    /// Get a reference to the bus
    pub fn bus(&self) -> &PcBus {
        &self.cpu.memory
    }

    /// Get a mutable reference to the bus
    pub fn bus_mut(&mut self) -> &mut PcBus {
        &mut self.cpu.memory
    }

    /// Get CPU register state for debugging/save states
    pub fn get_registers(&self) -> CpuRegisters {
        let regs = &self.cpu.regs;
        CpuRegisters {
            ax: regs.get16(Reg16::AX),
            bx: regs.get16(Reg16::BX),
            cx: regs.get16(Reg16::CX),
            dx: regs.get16(Reg16::DX),
            si: regs.get16(Reg16::SI),
            di: regs.get16(Reg16::DI),
            bp: regs.get16(Reg16::BP),
            sp: regs.get16(Reg16::SP),
            cs: regs.seg(SegReg::CS),
            ds: regs.seg(SegReg::DS),
            es: regs.seg(SegReg::ES),
            ss: regs.seg(SegReg::SS),
            ip: regs.ip,
            flags: self.cpu.flags.word(),
        }
    }

    /// Set CPU register state (for loading save states)
    pub fn set_registers(&mut self, state: &CpuRegisters) {
        let regs = &mut self.cpu.regs;
        regs.set16(Reg16::AX, state.ax);
        regs.set16(Reg16::BX, state.bx);
        regs.set16(Reg16::CX, state.cx);
        regs.set16(Reg16::DX, state.dx);
        regs.set16(Reg16::SI, state.si);
        regs.set16(Reg16::DI, state.di);
        regs.set16(Reg16::BP, state.bp);
        regs.set16(Reg16::SP, state.sp);
        regs.set_seg(SegReg::CS, state.cs);
        regs.set_seg(SegReg::DS, state.ds);
        regs.set_seg(SegReg::ES, state.es);
        regs.set_seg(SegReg::SS, state.ss);
        regs.ip = state.ip;
        self.cpu.flags.set_word(state.flags);
    }

    /// Instructions executed since the last reset
    pub fn steps(&self) -> u64 {
        self.cpu.steps
    }
}

/// CPU register state for save/load
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CpuRegisters {
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub si: u16,
    pub di: u16,
    pub bp: u16,
    pub sp: u16,
    pub cs: u16,
    pub ds: u16,
    pub es: u16,
    pub ss: u16,
    pub ip: u16,
    pub flags: u16,
}
