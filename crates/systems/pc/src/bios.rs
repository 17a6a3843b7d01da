//! BIOS services for PC emulation
//!
//! INT 10h (video), 11h (equipment), 12h (memory size), 16h (keyboard) and
//! 1Ah (time of day) run as host handlers. Their vector table entries point
//! at the IBM PC ROM entry points so programs that inspect the table see
//! familiar addresses.

use crate::bus::PcBus;
use crate::video::{scroll_down, scroll_up, TEXT_COLUMNS, TEXT_PAGE_SIZE, TEXT_ROWS};
use emu86_core::cpu_8086::{
    Cpu8086, CpuError, Memory8086, Reg16, Reg8, SegReg, FLAG_CF, FLAG_ZF,
};
use emu86_core::logging::{log, LogCategory, LogLevel};

pub const BIOS_SEGMENT: u16 = 0xF000;
/// BIOS data area
pub const BDA_SEGMENT: u16 = 0x0040;

// IBM PC/XT ROM entry points
const INT10_OFFSET: u16 = 0xF065;
const INT11_OFFSET: u16 = 0xF84D;
const INT12_OFFSET: u16 = 0xF841;
const INT16_OFFSET: u16 = 0xE82E;
const INT1A_OFFSET: u16 = 0xFE6E;

// BIOS data area offsets
const BDA_EQUIPMENT: u16 = 0x10;
const BDA_MEMORY_KB: u16 = 0x13;
const BDA_VIDEO_MODE: u16 = 0x49;
const BDA_COLUMNS: u16 = 0x4A;
const BDA_PAGE_SIZE: u16 = 0x4C;
const BDA_CURSOR: u16 = 0x50;
const BDA_TICKS: u16 = 0x6C;
const BDA_MIDNIGHT: u16 = 0x70;
const BDA_ROWS: u16 = 0x84;

/// 80x25 colour display, no floppy drives
const EQUIPMENT_WORD: u16 = 0x0020;
/// Cursor start/end scan lines reported by INT 10h/03h
const CURSOR_SHAPE: u16 = 0x0607;

/// Timer ticks per day (18.2 Hz)
pub const TICKS_PER_DAY: u32 = 0x0018_00B0;
/// Instructions per 55 ms timer tick at 4.77 MHz
pub const STEPS_PER_TICK: u64 = 21_845;

/// Time-of-day counter driven by the instruction count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickClock {
    base_ticks: u32,
    base_steps: u64,
    midnight: bool,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks since midnight after `steps` instructions
    pub fn ticks(&mut self, steps: u64) -> u32 {
        let elapsed = steps.saturating_sub(self.base_steps) / STEPS_PER_TICK;
        let total = self.base_ticks as u64 + elapsed;
        if total >= TICKS_PER_DAY as u64 {
            self.midnight = true;
            self.base_ticks = (total % TICKS_PER_DAY as u64) as u32;
            self.base_steps = steps;
            return self.base_ticks;
        }
        total as u32
    }

    pub fn set_ticks(&mut self, ticks: u32, steps: u64) {
        self.base_ticks = ticks % TICKS_PER_DAY;
        self.base_steps = steps;
        self.midnight = false;
    }

    /// Read and clear the rolled-over-midnight flag
    pub fn take_midnight(&mut self) -> bool {
        std::mem::take(&mut self.midnight)
    }
}

/// Wall-clock time for a tick count as (hours, minutes, seconds, hundredths)
pub fn ticks_to_time(ticks: u32) -> (u8, u8, u8, u8) {
    // 1193180 Hz PIT input divided by 65536
    let centis = ticks as u64 * 6_553_600 / 1_193_180;
    let seconds = centis / 100;
    (
        (seconds / 3600 % 24) as u8,
        (seconds / 60 % 60) as u8,
        (seconds % 60) as u8,
        (centis % 100) as u8,
    )
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

/// Fill in the BIOS data area and register the BIOS services
pub fn install(cpu: &mut Cpu8086<PcBus>) {
    let memory_kb = cpu.memory.memory_kb();
    let bus = &mut cpu.memory;
    bus.set_word(BDA_SEGMENT, BDA_EQUIPMENT, EQUIPMENT_WORD);
    bus.set_word(BDA_SEGMENT, BDA_MEMORY_KB, memory_kb);
    bus.set_word(BDA_SEGMENT, BDA_COLUMNS, TEXT_COLUMNS as u16);
    bus.set_word(BDA_SEGMENT, BDA_PAGE_SIZE, TEXT_PAGE_SIZE as u16);
    bus.set_byte(BDA_SEGMENT, BDA_ROWS, TEXT_ROWS as u8 - 1);
    sync_video_data(bus);
    // BIOS date and PC/XT model byte
    bus.set_bytes(BIOS_SEGMENT, 0xFFF5, b"01/10/86");
    bus.set_byte(BIOS_SEGMENT, 0xFFFE, 0xFE);

    cpu.register_interrupt(0x10, BIOS_SEGMENT, INT10_OFFSET, video_service);
    cpu.register_interrupt(0x11, BIOS_SEGMENT, INT11_OFFSET, equipment_service);
    cpu.register_interrupt(0x12, BIOS_SEGMENT, INT12_OFFSET, memory_size_service);
    cpu.register_interrupt(0x16, BIOS_SEGMENT, INT16_OFFSET, keyboard_service);
    cpu.register_interrupt(0x1A, BIOS_SEGMENT, INT1A_OFFSET, time_service);
    log(LogCategory::Bios, LogLevel::Info, || {
        format!("BIOS services installed ({} KB conventional memory)", memory_kb)
    });
}

/// Report an unimplemented service function and fail it with CF set
pub(crate) fn unimplemented(cpu: &mut Cpu8086<PcBus>, vector: u8, function: u8) {
    log(LogCategory::Stubs, LogLevel::Warn, || {
        format!(
            "INT 0x{:02X} function 0x{:02X} not implemented (AX={:04X})",
            vector,
            function,
            cpu.regs.get16(Reg16::AX)
        )
    });
    cpu.flags.set(FLAG_CF, true);
}

/// Mirror the screen state into the BIOS data area
fn sync_video_data(bus: &mut PcBus) {
    let screen = bus.screen;
    bus.set_byte(BDA_SEGMENT, BDA_VIDEO_MODE, screen.mode);
    bus.set_byte(BDA_SEGMENT, BDA_CURSOR, screen.col);
    bus.set_byte(BDA_SEGMENT, BDA_CURSOR + 1, screen.row);
}

/// INT 10h: video services
fn video_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let ah = cpu.regs.get8(Reg8::AH);
    let al = cpu.regs.get8(Reg8::AL);
    let bh = cpu.regs.get8(Reg8::BH);
    let bl = cpu.regs.get8(Reg8::BL);
    let cx = cpu.regs.get16(Reg16::CX);
    let (ch, cl) = (cpu.regs.get8(Reg8::CH), cpu.regs.get8(Reg8::CL));
    let (dh, dl) = (cpu.regs.get8(Reg8::DH), cpu.regs.get8(Reg8::DL));

    log(LogCategory::Bios, LogLevel::Trace, || {
        format!("INT 10h AH={:02X} AL={:02X}", ah, al)
    });

    let bus = &mut cpu.memory;
    match ah {
        0x00 => {
            // Bit 7 keeps the screen contents
            let mode = al & 0x7F;
            if al & 0x80 == 0 {
                bus.with_screen(|screen, vram| screen.set_mode(vram, mode));
            } else {
                bus.screen.mode = mode;
            }
        }
        0x01 => {}
        0x02 => bus.screen.set_cursor(dh, dl),
        0x03 => {
            let screen = bus.screen;
            cpu.regs.set16(Reg16::CX, CURSOR_SHAPE);
            cpu.regs.set8(Reg8::DH, screen.row);
            cpu.regs.set8(Reg8::DL, screen.col);
        }
        0x05 => {
            if al != 0 {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("INT 10h: display page {} not supported", al)
                });
            }
        }
        0x06 => bus.with_screen(|_, vram| scroll_up(vram, al, (ch, cl), (dh, dl), bh)),
        0x07 => bus.with_screen(|_, vram| scroll_down(vram, al, (ch, cl), (dh, dl), bh)),
        0x08 => {
            let screen = bus.screen;
            let cell = (screen.row as usize * TEXT_COLUMNS + screen.col as usize) * 2;
            let page = bus.text_page();
            let (character, attribute) = (page[cell], page[cell + 1]);
            cpu.regs.set8(Reg8::AL, character);
            cpu.regs.set8(Reg8::AH, attribute);
        }
        0x09 => bus.with_screen(|screen, vram| screen.put_char(vram, al, Some(bl), cx)),
        0x0A => bus.with_screen(|screen, vram| screen.put_char(vram, al, None, cx)),
        0x0E => bus.teletype(al),
        0x0F => {
            let mode = bus.screen.mode;
            cpu.regs.set8(Reg8::AL, mode);
            cpu.regs.set8(Reg8::AH, TEXT_COLUMNS as u8);
            cpu.regs.set8(Reg8::BH, 0);
        }
        0x13 => {
            // Write string from ES:BP; AL bit 0 moves the cursor, bit 1
            // means the string alternates characters and attributes
            let es = cpu.regs.seg(SegReg::ES);
            let bp = cpu.regs.get16(Reg16::BP);
            let with_attributes = al & 0x02 != 0;
            let stride = if with_attributes { 2 } else { 1 };
            let bytes = bus.get_bytes(es, bp, cx as usize * stride);
            let saved = bus.screen;
            bus.screen.set_cursor(dh, dl);
            for chunk in bytes.chunks(stride) {
                let attribute = if with_attributes { chunk[1] } else { bl };
                bus.with_screen(|screen, vram| {
                    screen.put_char(vram, chunk[0], Some(attribute), 1);
                    screen.advance(vram);
                });
            }
            if al & 0x01 == 0 {
                bus.screen.set_cursor(saved.row, saved.col);
            }
        }
        _ => {
            unimplemented(cpu, 0x10, ah);
            return Ok(());
        }
    }
    sync_video_data(&mut cpu.memory);
    Ok(())
}

/// INT 11h: equipment list
fn equipment_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let equipment = cpu.memory.get_word(BDA_SEGMENT, BDA_EQUIPMENT);
    cpu.regs.set16(Reg16::AX, equipment);
    Ok(())
}

/// INT 12h: conventional memory size in KB
fn memory_size_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let memory_kb = cpu.memory.get_word(BDA_SEGMENT, BDA_MEMORY_KB);
    cpu.regs.set16(Reg16::AX, memory_kb);
    Ok(())
}

/// INT 16h: keyboard services
fn keyboard_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let ah = cpu.regs.get8(Reg8::AH);
    match ah {
        // Read key; an empty queue yields AX=0 instead of blocking
        0x00 | 0x10 => {
            let key = cpu.memory.keyboard.read_key().unwrap_or_else(|| {
                log(LogCategory::Bios, LogLevel::Debug, || {
                    "INT 16h: read with empty keyboard buffer".to_string()
                });
                0
            });
            cpu.regs.set16(Reg16::AX, key);
        }
        // Key available: ZF clear and AX = key, else ZF set
        0x01 | 0x11 => match cpu.memory.keyboard.peek_key() {
            Some(key) => {
                cpu.regs.set16(Reg16::AX, key);
                cpu.flags.set(FLAG_ZF, false);
            }
            None => cpu.flags.set(FLAG_ZF, true),
        },
        // Shift flags: no modifiers held
        0x02 | 0x12 => cpu.regs.set8(Reg8::AL, 0),
        _ => unimplemented(cpu, 0x16, ah),
    }
    Ok(())
}

/// INT 1Ah: time of day and real-time clock
fn time_service(cpu: &mut Cpu8086<PcBus>) -> Result<(), CpuError> {
    let ah = cpu.regs.get8(Reg8::AH);
    let steps = cpu.steps;
    match ah {
        0x00 => {
            let ticks = current_ticks(cpu);
            let midnight = cpu.memory.clock.take_midnight();
            cpu.memory.set_byte(BDA_SEGMENT, BDA_MIDNIGHT, 0);
            cpu.regs.set16(Reg16::CX, (ticks >> 16) as u16);
            cpu.regs.set16(Reg16::DX, ticks as u16);
            cpu.regs.set8(Reg8::AL, u8::from(midnight));
        }
        0x01 => {
            let ticks =
                ((cpu.regs.get16(Reg16::CX) as u32) << 16) | cpu.regs.get16(Reg16::DX) as u32;
            cpu.memory.clock.set_ticks(ticks, steps);
            current_ticks(cpu);
        }
        0x02 => {
            let (hours, minutes, seconds, _) = ticks_to_time(current_ticks(cpu));
            cpu.regs.set8(Reg8::CH, to_bcd(hours));
            cpu.regs.set8(Reg8::CL, to_bcd(minutes));
            cpu.regs.set8(Reg8::DH, to_bcd(seconds));
            cpu.regs.set8(Reg8::DL, 0);
            cpu.flags.set(FLAG_CF, false);
        }
        0x04 => {
            // 1980-01-01
            cpu.regs.set16(Reg16::CX, 0x1980);
            cpu.regs.set16(Reg16::DX, 0x0101);
            cpu.flags.set(FLAG_CF, false);
        }
        _ => unimplemented(cpu, 0x1A, ah),
    }
    Ok(())
}

/// Advance the clock to the current step count and publish it in the BDA
pub(crate) fn current_ticks(cpu: &mut Cpu8086<PcBus>) -> u32 {
    let ticks = cpu.memory.clock.ticks(cpu.steps);
    cpu.memory.set_word(BDA_SEGMENT, BDA_TICKS, ticks as u16);
    cpu.memory.set_word(BDA_SEGMENT, BDA_TICKS + 2, (ticks >> 16) as u16);
    ticks
}
