//! Interrupt vector table and host-side service handlers
//!
//! The vector table itself lives in guest memory at 0000:0000 and may be
//! rewritten by guest code at any time. Host handlers registered here take
//! priority over whatever the table says for their vector.

use super::flags::{FLAG_IF, FLAG_TF};
use super::memory::Memory8086;
use super::registers::{Reg16, SegReg};
use super::{Cpu8086, CpuError};
use crate::logging::{log, LogCategory, LogLevel};
use std::fmt;

/// Divide error (DIV/IDIV by zero or quotient overflow, AAM 0)
pub const VECTOR_DIVIDE_ERROR: u8 = 0x00;
/// Single-byte breakpoint (INT3)
pub const VECTOR_BREAKPOINT: u8 = 0x03;
/// INTO with OF set
pub const VECTOR_OVERFLOW: u8 = 0x04;
/// BOUND range exceeded
pub const VECTOR_BOUND: u8 = 0x05;
/// Invalid opcode (executing a DB/DW pseudo-instruction)
pub const VECTOR_INVALID_OPCODE: u8 = 0x06;

/// Segment of the default IRET stub
pub const DEFAULT_HANDLER_SEGMENT: u16 = 0xF000;
/// Offset of the default IRET stub (the IBM PC BIOS dummy handler address)
pub const DEFAULT_HANDLER_OFFSET: u16 = 0xFF53;

const IRET_OPCODE: u8 = 0xCF;

/// A host-side interrupt service routine.
///
/// Runs after the CPU has pushed FLAGS, CS and IP. On success the controller
/// performs the return: CS:IP and the control flags come back from the
/// stack, while CF, PF, AF, ZF, SF and OF keep whatever the handler set.
pub trait InterruptHandler<M: Memory8086> {
    fn handle(&mut self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError>;
}

impl<M, F> InterruptHandler<M> for F
where
    M: Memory8086,
    F: FnMut(&mut Cpu8086<M>) -> Result<(), CpuError>,
{
    fn handle(&mut self, cpu: &mut Cpu8086<M>) -> Result<(), CpuError> {
        self(cpu)
    }
}

/// Registered host handlers, one optional slot per vector
pub struct InterruptController<M: Memory8086> {
    handlers: Vec<Option<Box<dyn InterruptHandler<M>>>>,
}

impl<M: Memory8086> fmt::Debug for InterruptController<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<String> = self
            .handlers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.is_some())
            .map(|(v, _)| format!("0x{:02X}", v))
            .collect();
        f.debug_struct("InterruptController")
            .field("registered", &registered)
            .finish()
    }
}

impl<M: Memory8086> Default for InterruptController<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: Memory8086> InterruptController<M> {
    pub fn new() -> Self {
        Self {
            handlers: (0..256).map(|_| None).collect(),
        }
    }

    /// Install a host handler for `vector` and point the vector table entry
    /// at `segment:offset`, where an IRET byte is planted so guest code that
    /// far-calls the old vector still returns cleanly.
    pub fn register<H>(&mut self, memory: &mut M, vector: u8, segment: u16, offset: u16, handler: H)
    where
        H: InterruptHandler<M> + 'static,
    {
        write_vector(memory, vector, segment, offset);
        memory.set_byte(segment, offset, IRET_OPCODE);
        self.handlers[vector as usize] = Some(Box::new(handler));
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "registered host handler for INT 0x{:02X} at {:04X}:{:04X}",
                vector, segment, offset
            )
        });
    }

    /// Remove the host handler for `vector`; the vector table is left alone
    pub fn unregister(&mut self, vector: u8) -> bool {
        self.handlers[vector as usize].take().is_some()
    }

    pub fn is_registered(&self, vector: u8) -> bool {
        self.handlers[vector as usize].is_some()
    }

    /// Remove every host handler
    pub fn clear(&mut self) {
        self.handlers.iter_mut().for_each(|h| *h = None);
    }

    fn take(&mut self, vector: u8) -> Option<Box<dyn InterruptHandler<M>>> {
        self.handlers[vector as usize].take()
    }

    /// Put a handler back unless it was replaced while running
    fn restore(&mut self, vector: u8, handler: Box<dyn InterruptHandler<M>>) {
        let slot = &mut self.handlers[vector as usize];
        if slot.is_none() {
            *slot = Some(handler);
        }
    }
}

/// Write a (segment, offset) pair into the vector table
pub fn write_vector<M: Memory8086 + ?Sized>(memory: &mut M, vector: u8, segment: u16, offset: u16) {
    let entry = (vector as u16) * 4;
    memory.set_word(0x0000, entry, offset);
    memory.set_word(0x0000, entry.wrapping_add(2), segment);
}

/// Read a vector table entry as (segment, offset)
pub fn read_vector<M: Memory8086 + ?Sized>(memory: &M, vector: u8) -> (u16, u16) {
    let entry = (vector as u16) * 4;
    let offset = memory.get_word(0x0000, entry);
    let segment = memory.get_word(0x0000, entry.wrapping_add(2));
    (segment, offset)
}

/// Plant the default IRET stub and point all 256 vectors at it
pub fn install_default_vectors<M: Memory8086 + ?Sized>(memory: &mut M) {
    memory.set_byte(DEFAULT_HANDLER_SEGMENT, DEFAULT_HANDLER_OFFSET, IRET_OPCODE);
    for vector in 0..=255u8 {
        write_vector(memory, vector, DEFAULT_HANDLER_SEGMENT, DEFAULT_HANDLER_OFFSET);
    }
}

impl<M: Memory8086> Cpu8086<M> {
    /// Register a host service for `vector`
    pub fn register_interrupt<H>(&mut self, vector: u8, segment: u16, offset: u16, handler: H)
    where
        H: InterruptHandler<M> + 'static,
    {
        self.interrupts
            .register(&mut self.memory, vector, segment, offset, handler);
    }

    /// Dispatch interrupt `vector` with the current CS:IP as return address.
    ///
    /// Pushes FLAGS, clears TF and IF, pushes CS and IP, then runs the host
    /// handler if one is registered or jumps through the vector table. A
    /// failing host handler leaves registers and flags as they were before
    /// the interrupt.
    pub fn interrupt(&mut self, vector: u8) -> Result<(), CpuError> {
        let saved_sp = self.regs.get16(Reg16::SP);
        let saved_flags = self.flags;
        let saved_cs = self.regs.seg(SegReg::CS);
        let saved_ip = self.regs.ip;
        let saved_halted = self.halted;

        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!(
                "INT 0x{:02X} from {:04X}:{:04X} AX={:04X}",
                vector,
                saved_cs,
                saved_ip,
                self.regs.get16(Reg16::AX)
            )
        });

        self.halted = false;
        self.push(self.flags.word());
        self.flags.set(FLAG_TF, false);
        self.flags.set(FLAG_IF, false);
        self.push(saved_cs);
        self.push(saved_ip);

        let Some(mut handler) = self.interrupts.take(vector) else {
            let (segment, offset) = read_vector(&self.memory, vector);
            self.regs.set_seg(SegReg::CS, segment);
            self.regs.ip = offset;
            return Ok(());
        };

        let result = handler.handle(self);
        self.interrupts.restore(vector, handler);

        match result {
            Ok(()) => {
                self.host_return();
                Ok(())
            }
            Err(err) => {
                self.regs.set16(Reg16::SP, saved_sp);
                self.flags = saved_flags;
                self.regs.set_seg(SegReg::CS, saved_cs);
                self.regs.ip = saved_ip;
                self.halted = saved_halted;
                log(LogCategory::Interrupts, LogLevel::Warn, || {
                    format!("INT 0x{:02X} host handler failed: {}", vector, err)
                });
                Err(match err {
                    CpuError::Handler { .. } => err,
                    other => CpuError::Handler {
                        vector,
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    /// IRET on behalf of a host handler, keeping its status flags
    fn host_return(&mut self) {
        let status = self.flags.bits();
        self.regs.ip = self.pop();
        let cs = self.pop();
        self.regs.set_seg(SegReg::CS, cs);
        let word = self.pop();
        self.flags.set_word(word);
        self.flags.merge_status(status);
    }
}
