//! PC memory bus implementation
//!
//! Memory layout:
//! - 0x00000-0x003FF: Interrupt vector table
//! - 0x00400-0x004FF: BIOS data area
//! - 0x00500-0x9FFFF: Conventional memory (DOS, PSP, program)
//! - 0xB8000-0xB8F9F: CGA text page
//! - 0xF0000-0xFFFFF: BIOS entry points
//!
//! The whole megabyte is backed by RAM so the reset stubs and the host
//! service entry points can be written like any other memory.

use crate::bios::TickClock;
use crate::keyboard::Keyboard;
use crate::video::{page_text, TextScreen, TEXT_PAGE_SIZE};
use emu86_core::cpu_8086::{Memory8086, ADDRESS_MASK, MEMORY_SIZE};
use emu86_core::logging::{log, LogCategory, LogLevel};
use std::collections::{HashMap, VecDeque};
use std::io::Write;

/// Physical address of the CGA text page
pub const TEXT_PAGE_BASE: usize = 0xB8000;

/// Keyboard controller data port
const PORT_KB_DATA: u16 = 0x60;
/// Port B (speaker gate, keyboard acknowledge)
const PORT_B: u16 = 0x61;
/// Keyboard controller status port
const PORT_KB_STATUS: u16 = 0x64;
/// CGA status register
const PORT_CGA_STATUS: u16 = 0x3DA;

/// Ports with a device behind them; reads return the last value written
const LATCHED_PORTS: [u16; 9] = [0x20, 0x21, 0x40, 0x41, 0x42, 0x43, PORT_B, 0x3D4, 0x3D5];

/// Bytes of console output kept; older output is dropped first
pub const CONSOLE_LIMIT: usize = 64 * 1024;

/// PC memory bus
#[derive(Debug, Clone)]
pub struct PcBus {
    /// Flat 1 MiB address space
    ram: Vec<u8>,
    /// Keyboard controller
    pub keyboard: Keyboard,
    /// Text-mode cursor and video mode
    pub screen: TextScreen,
    /// BIOS time-of-day counter
    pub clock: TickClock,
    /// Segment of the running program's PSP (0 when none is loaded)
    pub psp_segment: u16,
    /// Last byte written to each port
    ports: HashMap<u16, u8>,
    /// Most recent console output, at most `CONSOLE_LIMIT` bytes
    console: VecDeque<u8>,
    /// Copy console output to the host's stdout
    echo_console: bool,
    /// Toggled on every CGA status read so retrace polls terminate
    retrace: bool,
    /// Conventional memory reported to programs
    memory_kb: u16,
    /// Return code of the terminated program
    exit_code: Option<u8>,
}

impl PcBus {
    pub fn new(memory_kb: u16, echo_console: bool) -> Self {
        let mut bus = Self {
            ram: vec![0; MEMORY_SIZE],
            keyboard: Keyboard::new(),
            screen: TextScreen::new(),
            clock: TickClock::new(),
            psp_segment: 0,
            ports: HashMap::new(),
            console: VecDeque::new(),
            echo_console,
            retrace: false,
            memory_kb,
            exit_code: None,
        };
        bus.reset();
        bus
    }

    /// Clear memory, devices and the console transcript
    pub fn reset(&mut self) {
        self.ram.fill(0);
        self.keyboard.clear();
        self.ports.clear();
        self.console.clear();
        self.retrace = false;
        self.exit_code = None;
        self.clock = TickClock::new();
        self.psp_segment = 0;
        self.screen = TextScreen::new();
        self.with_screen(|screen, vram| screen.clear(vram));
    }

    pub fn memory_kb(&self) -> u16 {
        self.memory_kb
    }

    /// The 80x25 text page as (character, attribute) pairs
    pub fn text_page(&self) -> &[u8] {
        &self.ram[TEXT_PAGE_BASE..TEXT_PAGE_BASE + TEXT_PAGE_SIZE]
    }

    pub fn text_page_mut(&mut self) -> &mut [u8] {
        &mut self.ram[TEXT_PAGE_BASE..TEXT_PAGE_BASE + TEXT_PAGE_SIZE]
    }

    /// Visible characters of the text page
    pub fn screen_text(&self) -> String {
        page_text(self.text_page())
    }

    /// Run `f` with the screen state and its text page borrowed together
    pub fn with_screen<R>(&mut self, f: impl FnOnce(&mut TextScreen, &mut [u8]) -> R) -> R {
        let vram = &mut self.ram[TEXT_PAGE_BASE..TEXT_PAGE_BASE + TEXT_PAGE_SIZE];
        f(&mut self.screen, vram)
    }

    /// Teletype a character to the screen and the console transcript
    pub fn teletype(&mut self, ch: u8) {
        self.with_screen(|screen, vram| screen.teletype(vram, ch));
        if self.console.len() == CONSOLE_LIMIT {
            self.console.pop_front();
        }
        self.console.push_back(ch);
        if self.echo_console {
            let mut stdout = std::io::stdout();
            // Host stdout failures must not stop the guest
            let _ = stdout.write_all(&[ch]);
            let _ = stdout.flush();
        }
    }

    /// Console transcript decoded as lossy UTF-8
    pub fn console_output(&self) -> String {
        String::from_utf8_lossy(&self.console_bytes()).into_owned()
    }

    pub fn console_bytes(&self) -> Vec<u8> {
        self.console.iter().copied().collect()
    }

    pub fn set_echo_console(&mut self, echo: bool) {
        self.echo_console = echo;
    }

    /// Last value written to `port`
    pub fn port_value(&self, port: u16) -> Option<u8> {
        self.ports.get(&port).copied()
    }

    pub fn exit_code(&self) -> Option<u8> {
        self.exit_code
    }

    pub fn set_exit_code(&mut self, code: u8) {
        self.exit_code = Some(code);
    }
}

impl Memory8086 for PcBus {
    #[inline]
    fn read(&self, addr: u32) -> u8 {
        self.ram[(addr & ADDRESS_MASK) as usize]
    }

    #[inline]
    fn write(&mut self, addr: u32, val: u8) {
        self.ram[(addr & ADDRESS_MASK) as usize] = val;
    }

    fn read_block(&self, addr: u32, buf: &mut [u8]) {
        let start = (addr & ADDRESS_MASK) as usize;
        if start + buf.len() <= MEMORY_SIZE {
            buf.copy_from_slice(&self.ram[start..start + buf.len()]);
        } else {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = self.read(addr.wrapping_add(i as u32));
            }
        }
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) {
        let start = (addr & ADDRESS_MASK) as usize;
        if start + data.len() <= MEMORY_SIZE {
            self.ram[start..start + data.len()].copy_from_slice(data);
        } else {
            for (i, &byte) in data.iter().enumerate() {
                self.write(addr.wrapping_add(i as u32), byte);
            }
        }
    }

    fn io_read(&mut self, port: u16) -> u8 {
        let value = match port {
            PORT_KB_DATA => self.keyboard.peek_scancode(),
            // Bit 0: output buffer full
            PORT_KB_STATUS => u8::from(self.keyboard.has_key()),
            PORT_CGA_STATUS => {
                self.retrace = !self.retrace;
                if self.retrace {
                    0x09
                } else {
                    0x00
                }
            }
            p if LATCHED_PORTS.contains(&p) => self.port_value(p).unwrap_or(0),
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("IN from unassigned port 0x{:04X}", port)
                });
                0xFF
            }
        };
        log(LogCategory::Memory, LogLevel::Trace, || {
            format!("IN  port 0x{:04X} -> 0x{:02X}", port, value)
        });
        value
    }

    fn io_write(&mut self, port: u16, val: u8) {
        log(LogCategory::Memory, LogLevel::Trace, || {
            format!("OUT port 0x{:04X} <- 0x{:02X}", port, val)
        });
        if !LATCHED_PORTS.contains(&port) && port != PORT_KB_DATA && port != PORT_KB_STATUS {
            log(LogCategory::Stubs, LogLevel::Debug, || {
                format!("OUT to unassigned port 0x{:04X} (0x{:02X})", port, val)
            });
        }
        self.ports.insert(port, val);
    }
}
