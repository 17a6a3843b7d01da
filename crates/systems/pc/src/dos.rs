//! DOS services and program segment prefix
//!
//! INT 20h and the character, vector, date/time and termination functions
//! of INT 21h run as host handlers. Console output goes through the BIOS
//! teletype so it shows up both on the text page and in the transcript.

use crate::bios::{self, ticks_to_time};
use crate::bus::PcBus;
use emu86_core::cpu_8086::interrupts::{read_vector, write_vector};
use emu86_core::cpu_8086::{
    Cpu8086, CpuError, Memory8086, Reg16, Reg8, SegReg, FLAG_CF, FLAG_ZF,
};
use emu86_core::logging::{log, LogCategory, LogLevel};

/// Segment holding the DOS service entry points
pub const DOS_SEGMENT: u16 = 0x0060;
const INT20_OFFSET: u16 = 0x0000;
const INT21_OFFSET: u16 = 0x0004;

/// Bytes in a program segment prefix
pub const PSP_SIZE: u16 = 0x0100;
/// Longest command tail the PSP holds (excluding the CR)
pub const MAX_COMMAND_TAIL: usize = 126;

/// Marker returned for reads from an exhausted keyboard queue (Ctrl-Z)
const EOF_CHAR: u8 = 0x1A;
/// Terminator of INT 21h/09h strings
const STRING_TERMINATOR: u8 = b'$';

/// MS-DOS 5.0
const DOS_VERSION: u16 = 0x0005;

// DOS error codes
const ERROR_INVALID_FUNCTION: u16 = 0x0001;

/// Register INT 20h and INT 21h
pub fn install(cpu: &mut Cpu8086<PcBus>) {
    cpu.register_interrupt(0x20, DOS_SEGMENT, INT20_OFFSET, terminate_service);
    cpu.register_interrupt(0x21, DOS_SEGMENT, INT21_OFFSET, dos_service);
    log(LogCategory::Bios, LogLevel::Info, || {
        "DOS services installed".to_string()
    });
}

/// Build a program segment prefix at `psp_segment`.
///
/// `memory_top` is the first paragraph past the program's allocation;
/// `tail` is the command line after the program name, cut to 126 bytes.
pub fn build_psp(bus: &mut PcBus, psp_segment: u16, memory_top: u16, tail: &str) {
    bus.fill(psp_segment, 0, PSP_SIZE as usize, 0);
    // INT 20h at PSP:0000 so a near RET to offset 0 terminates
    bus.set_bytes(psp_segment, 0x0000, &[0xCD, 0x20]);
    bus.set_word(psp_segment, 0x0002, memory_top);
    // Saved terminate, Ctrl-Break and critical-error vectors
    for (slot, vector) in [(0x0A, 0x22u8), (0x0E, 0x23), (0x12, 0x24)] {
        let (segment, offset) = read_vector(&*bus, vector);
        bus.set_word(psp_segment, slot, offset);
        bus.set_word(psp_segment, slot + 2, segment);
    }
    // Parent PSP: none
    bus.set_word(psp_segment, 0x0016, psp_segment);
    // Far-call entry to the DOS dispatcher: INT 21h ; RETF
    bus.set_bytes(psp_segment, 0x0050, &[0xCD, 0x21, 0xCB]);
    // Unopened FCBs
    bus.fill(psp_segment, 0x005D, 11, b' ');
    bus.fill(psp_segment, 0x006D, 11, b' ');

    let tail = &tail.as_bytes()[..tail.len().min(MAX_COMMAND_TAIL)];
    bus.set_byte(psp_segment, 0x0080, tail.len() as u8);
    bus.set_bytes(psp_segment, 0x0081, tail);
    bus.set_byte(psp_segment, 0x0081 + tail.len() as u16, b'\r');
    bus.psp_segment = psp_segment;
}

/// Stop the machine with `code` as the program's return code
fn terminate(cpu: &mut Cpu8086<PcBus>, code: u8) {
    log(LogCategory::Bios, LogLevel::Info, || {
        format!("program terminated with code {} after {} steps", code, cpu.steps)
    });
    cpu.memory.set_exit_code(code);
    cpu.halted = true;
}

/// INT 20h: terminate program
fn terminate_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    terminate(cpu, 0);
    Ok(())
}

/// Next key from the keyboard queue as ASCII, Ctrl-Z when it is empty
fn read_char(cpu: &mut Cpu8086<PcBus>) -> u8 {
    match cpu.memory.keyboard.read_key() {
        Some(key) => key as u8,
        None => {
            log(LogCategory::Bios, LogLevel::Debug, || {
                "INT 21h: character read with empty keyboard buffer".to_string()
            });
            EOF_CHAR
        }
    }
}

/// INT 21h: DOS function dispatcher
fn dos_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let ah = cpu.regs.get8(Reg8::AH);
    let al = cpu.regs.get8(Reg8::AL);
    let dl = cpu.regs.get8(Reg8::DL);

    log(LogCategory::Bios, LogLevel::Trace, || {
        format!("INT 21h AH={:02X} AL={:02X} DX={:04X}", ah, al, cpu.regs.get16(Reg16::DX))
    });

    // CF reports failure; every handled function succeeds
    cpu.flags.set(FLAG_CF, false);

    match ah {
        0x00 => terminate(cpu, 0),
        // Read character with echo
        0x01 => {
            let ch = read_char(cpu);
            if ch != EOF_CHAR {
                cpu.memory.teletype(ch);
            }
            cpu.regs.set8(Reg8::AL, ch);
        }
        0x02 => {
            cpu.memory.teletype(dl);
            cpu.regs.set8(Reg8::AL, dl);
        }
        // Direct console I/O: DL=FF reads without waiting
        0x06 => {
            if dl == 0xFF {
                match cpu.memory.keyboard.read_key() {
                    Some(key) => {
                        cpu.regs.set8(Reg8::AL, key as u8);
                        cpu.flags.set(FLAG_ZF, false);
                    }
                    None => {
                        cpu.regs.set8(Reg8::AL, 0);
                        cpu.flags.set(FLAG_ZF, true);
                    }
                }
            } else {
                cpu.memory.teletype(dl);
                cpu.regs.set8(Reg8::AL, dl);
            }
        }
        // Read character without echo
        0x07 | 0x08 => {
            let ch = read_char(cpu);
            cpu.regs.set8(Reg8::AL, ch);
        }
        0x09 => {
            let ds = cpu.regs.seg(SegReg::DS);
            let mut offset = cpu.regs.get16(Reg16::DX);
            // Bounded by the segment so a missing '$' cannot loop forever
            for _ in 0..=u16::MAX {
                let ch = cpu.memory.get_byte(ds, offset);
                if ch == STRING_TERMINATOR {
                    break;
                }
                cpu.memory.teletype(ch);
                offset = offset.wrapping_add(1);
            }
            cpu.regs.set8(Reg8::AL, STRING_TERMINATOR);
        }
        // Input status: AL=FF when a key is waiting
        0x0B => {
            let ready = cpu.memory.keyboard.has_key();
            cpu.regs.set8(Reg8::AL, if ready { 0xFF } else { 0x00 });
        }
        0x19 => cpu.regs.set8(Reg8::AL, 2), // current drive C:
        0x25 => {
            let ds = cpu.regs.seg(SegReg::DS);
            let dx = cpu.regs.get16(Reg16::DX);
            write_vector(&mut cpu.memory, al, ds, dx);
            if cpu.interrupts.is_registered(al) {
                log(LogCategory::Bios, LogLevel::Debug, || {
                    format!("INT 21h/25h: vector 0x{:02X} keeps its host service", al)
                });
            }
        }
        0x2A => {
            // Tuesday 1980-01-01
            cpu.regs.set16(Reg16::CX, 1980);
            cpu.regs.set8(Reg8::DH, 1);
            cpu.regs.set8(Reg8::DL, 1);
            cpu.regs.set8(Reg8::AL, 2);
        }
        0x2C => {
            let (hours, minutes, seconds, hundredths) = ticks_to_time(bios::current_ticks(cpu));
            cpu.regs.set8(Reg8::CH, hours);
            cpu.regs.set8(Reg8::CL, minutes);
            cpu.regs.set8(Reg8::DH, seconds);
            cpu.regs.set8(Reg8::DL, hundredths);
        }
        0x30 => {
            cpu.regs.set16(Reg16::AX, DOS_VERSION);
            cpu.regs.set16(Reg16::BX, 0xFF00);
            cpu.regs.set16(Reg16::CX, 0x0000);
        }
        0x35 => {
            let (segment, offset) = read_vector(&cpu.memory, al);
            cpu.regs.set_seg(SegReg::ES, segment);
            cpu.regs.set16(Reg16::BX, offset);
        }
        0x4C => terminate(cpu, al),
        // Return code of the last child: none ran
        0x4D => cpu.regs.set16(Reg16::AX, 0x0000),
        0x51 | 0x62 => {
            let psp = cpu.memory.psp_segment;
            cpu.regs.set16(Reg16::BX, psp);
        }
        _ => {
            bios::unimplemented(cpu, 0x21, ah);
            cpu.regs.set16(Reg16::AX, ERROR_INVALID_FUNCTION);
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_psp_layout() {
        let mut bus = PcBus::new(640, false);
        build_psp(&mut bus, 0x0700, 0xA000, " /v file.txt");
        assert_eq!(bus.get_bytes(0x0700, 0x0000, 2), vec![0xCD, 0x20]);
        assert_eq!(bus.get_word(0x0700, 0x0002), 0xA000);
        assert_eq!(bus.get_bytes(0x0700, 0x0050, 3), vec![0xCD, 0x21, 0xCB]);
        assert_eq!(bus.get_byte(0x0700, 0x0080), 12);
        assert_eq!(bus.get_bytes(0x0700, 0x0081, 12), b" /v file.txt".to_vec());
        assert_eq!(bus.get_byte(0x0700, 0x008D), b'\r');
        assert_eq!(bus.psp_segment, 0x0700);
    }

    #[test]
    fn test_psp_command_tail_is_truncated() {
        let mut bus = PcBus::new(640, false);
        let long = "x".repeat(200);
        build_psp(&mut bus, 0x0700, 0xA000, &long);
        assert_eq!(bus.get_byte(0x0700, 0x0080) as usize, MAX_COMMAND_TAIL);
        assert_eq!(bus.get_byte(0x0700, 0x00FF), b'\r');
    }
}
