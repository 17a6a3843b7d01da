//! IBM PC/XT system implementation
//!
//! Runs DOS `.COM` programs on the 8086 core with host-side BIOS and DOS
//! services standing in for the ROM and the operating system.

#![allow(clippy::upper_case_acronyms)]

mod bios;
mod bus;
mod cpu;
mod dos;
mod keyboard;
mod video;

use emu86_core::{
    cpu_8086::{
        physical_address, CpuError, CpuModel, ExecutionContext, Instruction, Memory8086,
        RunSummary,
    },
    logging::{log, LogCategory, LogLevel},
    MountPointInfo, System,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use bios::{BIOS_SEGMENT, STEPS_PER_TICK, TICKS_PER_DAY};
pub use bus::{PcBus, TEXT_PAGE_BASE};
pub use cpu::{CpuRegisters, PcCpu};
pub use dos::{DOS_SEGMENT, MAX_COMMAND_TAIL, PSP_SIZE};
pub use emu86_core::cpu_8086::CpuModel as PcCpuModel;
pub use keyboard::*;
pub use video::{TextScreen, TEXT_COLUMNS, TEXT_ROWS};

/// Offset of the first instruction of a `.COM` image within its segment
pub const COM_ENTRY: u16 = 0x0100;
/// Largest `.COM` image: a segment minus the PSP
pub const MAX_COM_SIZE: usize = 0x1_0000 - PSP_SIZE as usize;
const SAVE_STATE_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum PcError {
    #[error("No executable loaded")]
    NoExecutable,
    #[error("Invalid executable: {0} bytes does not fit in a .COM segment")]
    InvalidExecutable(usize),
    #[error("Invalid mount point: {0}")]
    InvalidMountPoint(String),
    #[error(transparent)]
    Cpu(#[from] CpuError),
}

/// Machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcConfig {
    pub cpu_model: CpuModel,
    /// Conventional memory reported by INT 12h
    pub memory_kb: u16,
    /// Segment a `.COM` image (and its PSP) is loaded at
    pub load_segment: u16,
    /// Mirror teletype output to stdout
    pub echo_console: bool,
    /// Step budget for [`PcSystem::run_until_halt`]; `None` runs until HLT
    pub max_steps: Option<u64>,
}

impl Default for PcConfig {
    fn default() -> Self {
        Self {
            cpu_model: CpuModel::Intel8086,
            memory_kb: 640,
            load_segment: 0x0700,
            echo_console: false,
            max_steps: None,
        }
    }
}

/// PC system state
#[derive(Debug)]
pub struct PcSystem {
    cpu: PcCpu,
    config: PcConfig,
    /// Mounted `.COM` image and its command tail
    program: Option<(Vec<u8>, String)>,
}

impl Default for PcSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl PcSystem {
    /// Create a new PC system with default CPU (8086)
    pub fn new() -> Self {
        Self::with_config(PcConfig::default())
    }

    /// Create a new PC system with a specific CPU model
    pub fn with_cpu_model(model: CpuModel) -> Self {
        Self::with_config(PcConfig {
            cpu_model: model,
            ..PcConfig::default()
        })
    }

    /// Create a PC from `config`; memory is clamped to 64..=640 KB
    pub fn with_config(mut config: PcConfig) -> Self {
        config.memory_kb = config.memory_kb.clamp(64, 640);
        let bus = PcBus::new(config.memory_kb, config.echo_console);
        Self {
            cpu: PcCpu::new(bus, config.cpu_model),
            config,
            program: None,
        }
    }

    pub fn config(&self) -> &PcConfig {
        &self.config
    }

    /// Get the current CPU model
    pub fn cpu_model(&self) -> CpuModel {
        self.cpu.cpu().model()
    }

    /// Set the CPU model (takes effect on the next instruction)
    pub fn set_cpu_model(&mut self, model: CpuModel) {
        self.config.cpu_model = model;
        self.cpu.cpu_mut().set_model(model);
    }

    /// Load a `.COM` image with its PSP at the configured load segment.
    ///
    /// All segment registers point at the PSP, IP is 0x100 and SP is 0xFFFE
    /// with a zero word on the stack, so a near RET jumps to the INT 20h at
    /// PSP:0000.
    pub fn load_com(&mut self, image: &[u8], command_tail: &str) -> Result<(), PcError> {
        if image.is_empty() {
            return Err(PcError::NoExecutable);
        }
        if image.len() > MAX_COM_SIZE {
            return Err(PcError::InvalidExecutable(image.len()));
        }

        let segment = self.config.load_segment;
        // Paragraph just past conventional memory
        let memory_top = self.cpu.bus().memory_kb().saturating_mul(64);
        {
            let bus = self.cpu.bus_mut();
            dos::build_psp(bus, segment, memory_top, command_tail);
            bus.set_bytes(segment, COM_ENTRY, image);
            bus.set_word(segment, 0xFFFE, 0x0000);
        }

        let mut regs = self.cpu.get_registers();
        regs.cs = segment;
        regs.ds = segment;
        regs.es = segment;
        regs.ss = segment;
        regs.ip = COM_ENTRY;
        regs.sp = 0xFFFE;
        regs.ax = 0x0000;
        regs.bx = 0x0000;
        regs.cx = 0x00FF;
        regs.dx = segment;
        regs.si = COM_ENTRY;
        regs.di = 0xFFFE;
        regs.bp = 0x0000;
        // Interrupts enabled
        regs.flags = 0x0202;
        self.cpu.set_registers(&regs);
        self.cpu.cpu_mut().halted = false;

        log(LogCategory::Bios, LogLevel::Info, || {
            format!(
                "loaded {} byte .COM image at {:04X}:{:04X} (physical 0x{:05X})",
                image.len(),
                segment,
                COM_ENTRY,
                physical_address(segment, COM_ENTRY)
            )
        });
        self.program = Some((image.to_vec(), command_tail.to_string()));
        Ok(())
    }

    /// Run from `context` until HLT, program termination or the step budget
    pub fn execute(&mut self, context: &ExecutionContext) -> Result<RunSummary, PcError> {
        Ok(self.cpu.execute(context)?)
    }

    /// Run the loaded program from its current state
    pub fn run_until_halt(&mut self, max_steps: Option<u64>) -> Result<RunSummary, PcError> {
        if self.program.is_none() {
            return Err(PcError::NoExecutable);
        }
        let summary = self.cpu.run(max_steps.or(self.config.max_steps))?;
        log(LogCategory::Bios, LogLevel::Debug, || {
            format!("run stopped: {:?} after {} steps", summary.reason, summary.steps)
        });
        Ok(summary)
    }

    /// Execute one instruction
    pub fn step(&mut self) -> Result<(), PcError> {
        Ok(self.cpu.step()?)
    }

    pub fn is_halted(&self) -> bool {
        self.cpu.is_halted()
    }

    /// Return code passed to INT 21h/4Ch (0 for INT 20h), once terminated
    pub fn exit_code(&self) -> Option<u8> {
        self.cpu.bus().exit_code()
    }

    /// Everything the program wrote through the console services
    pub fn console_output(&self) -> String {
        self.cpu.bus().console_output()
    }

    /// Visible characters of the text screen
    pub fn screen_text(&self) -> String {
        self.cpu.bus().screen_text()
    }

    /// Queue pasted keyboard input; returns how many keys were queued
    pub fn type_text(&mut self, text: &str) -> usize {
        self.cpu.bus_mut().keyboard.type_text(text)
    }

    /// Handle keyboard input
    pub fn key_press(&mut self, scancode: u8) -> bool {
        self.cpu.bus_mut().keyboard.key_press(scancode)
    }

    /// Disassemble `count` instructions at CS:IP
    pub fn disassemble(&self, count: usize) -> Vec<(u32, Vec<u8>, Instruction)> {
        self.cpu.cpu().disassemble(count)
    }

    pub fn cpu(&self) -> &PcCpu {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut PcCpu {
        &mut self.cpu
    }

    pub fn bus(&self) -> &PcBus {
        self.cpu.bus()
    }

    pub fn bus_mut(&mut self) -> &mut PcBus {
        self.cpu.bus_mut()
    }

    /// Get debug information
    pub fn debug_info(&self) -> DebugInfo {
        let regs = self.cpu.get_registers();
        DebugInfo {
            cs: regs.cs,
            ip: regs.ip,
            ax: regs.ax,
            bx: regs.bx,
            cx: regs.cx,
            dx: regs.dx,
            sp: regs.sp,
            bp: regs.bp,
            si: regs.si,
            di: regs.di,
            flags: regs.flags,
            steps: self.cpu.steps(),
            halted: self.cpu.is_halted(),
            exit_code: self.exit_code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugInfo {
    pub cs: u16,
    pub ip: u16,
    pub ax: u16,
    pub bx: u16,
    pub cx: u16,
    pub dx: u16,
    pub sp: u16,
    pub bp: u16,
    pub si: u16,
    pub di: u16,
    pub flags: u16,
    pub steps: u64,
    pub halted: bool,
    pub exit_code: Option<u8>,
}

impl std::fmt::Display for DebugInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "AX={:04X} BX={:04X} CX={:04X} DX={:04X} SP={:04X} BP={:04X} SI={:04X} DI={:04X} \
             CS:IP={:04X}:{:04X} FLAGS={:04X} steps={}",
            self.ax,
            self.bx,
            self.cx,
            self.dx,
            self.sp,
            self.bp,
            self.si,
            self.di,
            self.cs,
            self.ip,
            self.flags,
            self.steps
        )
    }
}

impl System for PcSystem {
    type Error = PcError;

    /// Power-cycle the machine and reload the mounted program, if any
    fn reset(&mut self) {
        self.cpu.reset();
        if let Some((image, tail)) = self.program.take() {
            if let Err(err) = self.load_com(&image, &tail) {
                log(LogCategory::Bios, LogLevel::Error, || {
                    format!("reload after reset failed: {}", err)
                });
            }
        }
    }

    fn save_state(&self) -> Value {
        let regs = self.cpu.get_registers();
        serde_json::json!({
            "version": SAVE_STATE_VERSION,
            "system": "pc",
            "cpu_model": self.cpu_model(),
            "registers": regs,
            "steps": self.cpu.steps(),
            "halted": self.cpu.is_halted(),
        })
    }

    fn load_state(&mut self, state: &Value) -> Result<(), serde_json::Error> {
        if let Some(regs) = state.get("registers") {
            let regs: CpuRegisters = serde_json::from_value(regs.clone())?;
            self.cpu.set_registers(&regs);
        }
        if let Some(model) = state.get("cpu_model") {
            let model: CpuModel = serde_json::from_value(model.clone())?;
            self.set_cpu_model(model);
        }
        if let Some(steps) = state.get("steps").and_then(|v| v.as_u64()) {
            self.cpu.cpu_mut().steps = steps;
        }
        if let Some(halted) = state.get("halted").and_then(|v| v.as_bool()) {
            self.cpu.cpu_mut().halted = halted;
        }
        Ok(())
    }

    fn supports_save_states(&self) -> bool {
        true
    }

    fn mount_points(&self) -> Vec<MountPointInfo> {
        vec![MountPointInfo {
            id: "Program".to_string(),
            name: "DOS Program (.COM)".to_string(),
            extensions: vec!["com".to_string()],
            required: true,
        }]
    }

    fn mount(&mut self, mount_point_id: &str, data: &[u8]) -> Result<(), Self::Error> {
        match mount_point_id {
            "Program" => self.load_com(data, ""),
            _ => Err(PcError::InvalidMountPoint(mount_point_id.to_string())),
        }
    }

    fn unmount(&mut self, mount_point_id: &str) -> Result<(), Self::Error> {
        match mount_point_id {
            "Program" => {
                self.program = None;
                self.cpu.reset();
                Ok(())
            }
            _ => Err(PcError::InvalidMountPoint(mount_point_id.to_string())),
        }
    }

    fn is_mounted(&self, mount_point_id: &str) -> bool {
        match mount_point_id {
            "Program" => self.program.is_some(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use emu86_core::cpu_8086::{Reg16, SegReg, StopReason};

    /// MOV AH,4C ; MOV AL,07 ; INT 21
    const EXIT_7: [u8; 6] = [0xB4, 0x4C, 0xB0, 0x07, 0xCD, 0x21];

    #[test]
    fn test_system_creation() {
        let sys = PcSystem::new();
        assert_eq!(sys.cpu_model(), CpuModel::Intel8086);
        assert_eq!(sys.config().memory_kb, 640);
        assert!(!sys.is_mounted("Program"));
    }

    #[test]
    fn test_load_com_sets_entry_state() {
        let mut sys = PcSystem::new();
        sys.load_com(&EXIT_7, "").unwrap();
        let regs = sys.cpu().get_registers();
        assert_eq!((regs.cs, regs.ds, regs.es, regs.ss), (0x0700, 0x0700, 0x0700, 0x0700));
        assert_eq!(regs.ip, 0x0100);
        assert_eq!(regs.sp, 0xFFFE);
        assert_eq!(sys.bus().get_word(0x0700, 0xFFFE), 0);
        assert_eq!(sys.bus().get_bytes(0x0700, 0x0100, 6), EXIT_7.to_vec());
        assert_eq!(sys.bus().get_word(0x0700, 0x0002), 0xA000);
    }

    #[test]
    fn test_load_com_rejects_bad_images() {
        let mut sys = PcSystem::new();
        assert!(matches!(sys.load_com(&[], ""), Err(PcError::NoExecutable)));
        let big = vec![0x90; MAX_COM_SIZE + 1];
        assert!(matches!(
            sys.load_com(&big, ""),
            Err(PcError::InvalidExecutable(len)) if len == MAX_COM_SIZE + 1
        ));
        assert!(sys.load_com(&vec![0x90; MAX_COM_SIZE], "").is_ok());
    }

    #[test]
    fn test_run_until_halt_requires_program() {
        let mut sys = PcSystem::new();
        assert!(matches!(sys.run_until_halt(Some(10)), Err(PcError::NoExecutable)));
    }

    #[test]
    fn test_exit_code() {
        let mut sys = PcSystem::new();
        sys.mount("Program", &EXIT_7).unwrap();
        let summary = sys.run_until_halt(Some(100)).unwrap();
        assert_eq!(summary.reason, StopReason::Halted);
        assert_eq!(summary.steps, 3);
        assert_eq!(sys.exit_code(), Some(7));
    }

    #[test]
    fn test_system_reset_reloads_program() {
        let mut sys = PcSystem::new();
        sys.mount("Program", &EXIT_7).unwrap();
        sys.run_until_halt(Some(100)).unwrap();
        sys.reset();
        assert!(!sys.is_halted());
        assert_eq!(sys.exit_code(), None);
        assert_eq!(sys.cpu().get_registers().ip, 0x0100);
        sys.run_until_halt(Some(100)).unwrap();
        assert_eq!(sys.exit_code(), Some(7));
    }

    #[test]
    fn test_save_load_state() {
        let mut sys = PcSystem::new();
        sys.mount("Program", &EXIT_7).unwrap();
        sys.step().unwrap();
        let state = sys.save_state();
        assert_eq!(state["system"], "pc");
        assert_eq!(state["version"], 1);
        assert_eq!(state["steps"], 1);
        assert_eq!(state["registers"]["ax"], 0x4C00);

        let mut other = PcSystem::new();
        other.load_state(&state).unwrap();
        assert_eq!(other.cpu().get_registers(), sys.cpu().get_registers());
        assert_eq!(other.cpu().steps(), 1);
        assert!(other.supports_save_states());
    }

    #[test]
    fn test_mount_points() {
        let mut sys = PcSystem::new();
        let points = sys.mount_points();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].id, "Program");
        assert_eq!(points[0].extensions, vec!["com".to_string()]);

        assert!(matches!(
            sys.mount("FloppyA", &[0]),
            Err(PcError::InvalidMountPoint(id)) if id == "FloppyA"
        ));
        sys.mount("Program", &EXIT_7).unwrap();
        assert!(sys.is_mounted("Program"));
        sys.unmount("Program").unwrap();
        assert!(!sys.is_mounted("Program"));
        assert_eq!(sys.cpu().get_registers().cs, 0xFFFF);
    }

    #[test]
    fn test_execute_with_context() {
        let mut sys = PcSystem::new();
        // MOV AX, BX ; ADD AX, CX ; HLT at 2000:0000
        sys.bus_mut()
            .set_bytes(0x2000, 0x0000, &[0x89, 0xD8, 0x01, 0xC8, 0xF4]);
        let context = ExecutionContext::new(0x2000, 0x0000, 0x3000)
            .with_stack(0x3000, 0x1000)
            .with_arg(Reg16::BX, 40)
            .with_arg(Reg16::CX, 2)
            .with_max_steps(100);
        let summary = sys.execute(&context).unwrap();
        assert_eq!(summary.reason, StopReason::Halted);
        assert_eq!(sys.cpu().cpu().regs.get16(Reg16::AX), 42);
        assert_eq!(sys.cpu().cpu().regs.seg(SegReg::SS), 0x3000);
    }

    #[test]
    fn test_cpu_model_selection() {
        let mut sys = PcSystem::with_cpu_model(CpuModel::Intel80186);
        assert_eq!(sys.cpu_model(), CpuModel::Intel80186);
        // PUSHA decodes only on the 80186
        sys.load_com(&[0x60], "").unwrap();
        assert_eq!(sys.disassemble(1)[0].2.to_string(), "pusha");
        sys.set_cpu_model(CpuModel::Intel8086);
        assert_eq!(sys.disassemble(1)[0].2.to_string(), "db 0x60");
    }

    #[test]
    fn test_cpu_model_preserved_in_save_state() {
        let sys = PcSystem::with_cpu_model(CpuModel::Intel80188);
        let state = sys.save_state();
        let mut other = PcSystem::new();
        other.load_state(&state).unwrap();
        assert_eq!(other.cpu_model(), CpuModel::Intel80188);
    }

    #[test]
    fn test_debug_info() {
        let mut sys = PcSystem::new();
        sys.load_com(&EXIT_7, "").unwrap();
        let info = sys.debug_info();
        assert_eq!(info.cs, 0x0700);
        assert_eq!(info.ip, 0x0100);
        assert!(!info.halted);
        assert!(info.to_string().contains("CS:IP=0700:0100"));
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: PcConfig = serde_json::from_str(r#"{"memory_kb": 256}"#).unwrap();
        assert_eq!(config.memory_kb, 256);
        assert_eq!(config.load_segment, 0x0700);
        assert_eq!(config.cpu_model, CpuModel::Intel8086);
    }
}
