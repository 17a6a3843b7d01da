//! Real-mode memory address space
//!
//! Systems implement [`Memory8086`] with a byte-level `read`/`write` over a
//! 20-bit physical address; every segment:offset accessor is layered on top as
//! a provided method so a bus only has to decode physical addresses.

/// Size of the real-mode physical address space (1 MiB)
pub const MEMORY_SIZE: usize = 0x10_0000;

/// Mask applied to every computed physical address
pub const ADDRESS_MASK: u32 = 0x000F_FFFF;

/// Translate a segment:offset pair into a physical address.
///
/// `FFFF:FFFF` lands on `0x0FFEF`, reproducing the real-mode wraparound.
#[inline]
pub fn physical_address(segment: u16, offset: u16) -> u32 {
    (((segment as u32) << 4) + offset as u32) & ADDRESS_MASK
}

/// Order in which a multi-element copy walks its ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending addresses (DF = 0)
    #[default]
    Forward,
    /// Descending addresses (DF = 1)
    Backward,
}

impl Direction {
    /// Pointer delta for one element of `size` bytes
    #[inline]
    pub fn step(self, size: u16) -> i32 {
        match self {
            Direction::Forward => size as i32,
            Direction::Backward => -(size as i32),
        }
    }
}

/// Memory interface trait for the 8086 CPU
///
/// Systems using the 8086 must implement `read` and `write`; port I/O and
/// the segmented helpers have default implementations. Physical addresses
/// handed to `read`/`write` by the provided methods are always below
/// [`MEMORY_SIZE`].
pub trait Memory8086 {
    /// Read a byte from memory at the given physical address
    fn read(&self, addr: u32) -> u8;

    /// Write a byte to memory at the given physical address
    fn write(&mut self, addr: u32, val: u8);

    /// Read a byte from an I/O port. Unassigned ports float high.
    fn io_read(&mut self, _port: u16) -> u8 {
        0xFF
    }

    /// Write a byte to an I/O port
    fn io_write(&mut self, _port: u16, _val: u8) {}

    /// Read a word from two consecutive I/O ports
    fn io_read_word(&mut self, port: u16) -> u16 {
        let low = self.io_read(port) as u16;
        let high = self.io_read(port.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Write a word to two consecutive I/O ports
    fn io_write_word(&mut self, port: u16, val: u16) {
        self.io_write(port, val as u8);
        self.io_write(port.wrapping_add(1), (val >> 8) as u8);
    }

    /// Read `buf.len()` bytes starting at a physical address (wrapping at 1 MiB)
    fn read_block(&self, addr: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.read((addr + i as u32) & ADDRESS_MASK);
        }
    }

    /// Write `data` starting at a physical address (wrapping at 1 MiB)
    fn write_block(&mut self, addr: u32, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.write((addr + i as u32) & ADDRESS_MASK, byte);
        }
    }

    /// Read a byte at segment:offset
    #[inline]
    fn get_byte(&self, segment: u16, offset: u16) -> u8 {
        self.read(physical_address(segment, offset))
    }

    /// Write a byte at segment:offset
    #[inline]
    fn set_byte(&mut self, segment: u16, offset: u16, val: u8) {
        self.write(physical_address(segment, offset), val);
    }

    /// Read a little-endian word at segment:offset.
    ///
    /// The high byte comes from `offset + 1` within the same segment, so a
    /// word at offset 0xFFFF takes its high byte from offset 0x0000.
    #[inline]
    fn get_word(&self, segment: u16, offset: u16) -> u16 {
        let low = self.get_byte(segment, offset) as u16;
        let high = self.get_byte(segment, offset.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Write a little-endian word at segment:offset (offset wraps in-segment)
    #[inline]
    fn set_word(&mut self, segment: u16, offset: u16, val: u16) {
        self.set_byte(segment, offset, val as u8);
        self.set_byte(segment, offset.wrapping_add(1), (val >> 8) as u8);
    }

    /// Read `count` bytes from segment:offset, offset wrapping in-segment
    fn get_bytes(&self, segment: u16, offset: u16, count: usize) -> Vec<u8> {
        (0..count)
            .map(|i| self.get_byte(segment, offset.wrapping_add(i as u16)))
            .collect()
    }

    /// Write `data` at segment:offset, offset wrapping in-segment
    fn set_bytes(&mut self, segment: u16, offset: u16, data: &[u8]) {
        if !wraps_segment(offset, data.len()) {
            let addr = physical_address(segment, offset);
            self.write_block(addr, data);
            return;
        }
        for (i, &byte) in data.iter().enumerate() {
            self.set_byte(segment, offset.wrapping_add(i as u16), byte);
        }
    }

    /// Fill `count` bytes at segment:offset with `val`
    fn fill(&mut self, segment: u16, offset: u16, count: usize, val: u8) {
        for i in 0..count {
            self.set_byte(segment, offset.wrapping_add(i as u16), val);
        }
    }

    /// Copy `count` bytes between two segmented ranges.
    ///
    /// With [`Direction::Forward`] bytes are copied in ascending order
    /// starting at the given offsets; with [`Direction::Backward`] the given
    /// offsets address the *last*-copied element's start and both ranges are
    /// walked downwards. The result is always identical to copying one byte
    /// at a time, including overlapping ranges (a forward copy whose
    /// destination sits one byte past the source replicates the first byte).
    fn copy_bytes(
        &mut self,
        src_segment: u16,
        src_offset: u16,
        dst_segment: u16,
        dst_offset: u16,
        count: usize,
        direction: Direction,
    ) {
        if count == 0 {
            return;
        }

        if direction == Direction::Forward
            && !wraps_segment(src_offset, count)
            && !wraps_segment(dst_offset, count)
        {
            let src = physical_address(src_segment, src_offset);
            let dst = physical_address(dst_segment, dst_offset);
            let fits = (src as usize) + count <= MEMORY_SIZE && (dst as usize) + count <= MEMORY_SIZE;
            // A forward element copy equals a block copy unless the
            // destination starts inside the source range
            let disjoint = dst <= src || dst as usize >= src as usize + count;
            if fits && disjoint {
                let mut buf = vec![0u8; count];
                self.read_block(src, &mut buf);
                self.write_block(dst, &buf);
                return;
            }
        }

        let delta = direction.step(1);
        let mut si = src_offset;
        let mut di = dst_offset;
        for _ in 0..count {
            let byte = self.get_byte(src_segment, si);
            self.set_byte(dst_segment, di, byte);
            si = (si as i32).wrapping_add(delta) as u16;
            di = (di as i32).wrapping_add(delta) as u16;
        }
    }
}

/// True when `count` bytes starting at `offset` run past the end of the segment
#[inline]
fn wraps_segment(offset: u16, count: usize) -> bool {
    offset as usize + count > 0x1_0000
}

/// Simple flat 1 MiB memory implementation for testing and tooling
#[derive(Debug, Clone)]
pub struct ArrayMemory {
    data: Vec<u8>,
}

impl ArrayMemory {
    pub fn new() -> Self {
        Self {
            data: vec![0; MEMORY_SIZE],
        }
    }

    /// Load a program at a specific physical address
    pub fn load_program(&mut self, addr: u32, program: &[u8]) {
        self.write_block(addr & ADDRESS_MASK, program);
    }

    /// Read a 16-bit word from memory (little-endian)
    pub fn read_u16(&self, addr: u32) -> u16 {
        let low = self.read(addr & ADDRESS_MASK);
        let high = self.read((addr + 1) & ADDRESS_MASK);
        (high as u16) << 8 | low as u16
    }

    /// Write a 16-bit word to memory (little-endian)
    pub fn write_u16(&mut self, addr: u32, val: u16) {
        self.write(addr & ADDRESS_MASK, (val & 0xFF) as u8);
        self.write((addr + 1) & ADDRESS_MASK, ((val >> 8) & 0xFF) as u8);
    }

    /// Raw view of the whole address space
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}

impl Default for ArrayMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl Memory8086 for ArrayMemory {
    fn read(&self, addr: u32) -> u8 {
        self.data.get(addr as usize).copied().unwrap_or(0xFF)
    }

    fn write(&mut self, addr: u32, val: u8) {
        if let Some(slot) = self.data.get_mut(addr as usize) {
            *slot = val;
        }
    }

    fn read_block(&self, addr: u32, buf: &mut [u8]) {
        let start = addr as usize;
        if start + buf.len() <= self.data.len() {
            buf.copy_from_slice(&self.data[start..start + buf.len()]);
        } else {
            for (i, byte) in buf.iter_mut().enumerate() {
                *byte = self.read((addr + i as u32) & ADDRESS_MASK);
            }
        }
    }

    fn write_block(&mut self, addr: u32, data: &[u8]) {
        let start = addr as usize;
        if start + data.len() <= self.data.len() {
            self.data[start..start + data.len()].copy_from_slice(data);
        } else {
            for (i, &byte) in data.iter().enumerate() {
                self.write((addr + i as u32) & ADDRESS_MASK, byte);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_address_wraps() {
        assert_eq!(physical_address(0x1234, 0x0010), 0x12350);
        assert_eq!(physical_address(0xFFFF, 0xFFFF), 0x0FFEF);
        assert_eq!(physical_address(0xFFFF, 0x0010), 0x00000);
    }

    #[test]
    fn test_word_access_wraps_in_segment() {
        let mut mem = ArrayMemory::new();
        mem.set_word(0x2000, 0xFFFF, 0xBEEF);
        assert_eq!(mem.get_byte(0x2000, 0xFFFF), 0xEF);
        assert_eq!(mem.get_byte(0x2000, 0x0000), 0xBE);
        assert_eq!(mem.get_word(0x2000, 0xFFFF), 0xBEEF);
    }

    #[test]
    fn test_set_and_get_bytes() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x0100, 0x0020, b"hello");
        assert_eq!(mem.get_bytes(0x0100, 0x0020, 5), b"hello".to_vec());
        assert_eq!(mem.read(0x1020), b'h');
    }

    #[test]
    fn test_fill() {
        let mut mem = ArrayMemory::new();
        mem.fill(0x0000, 0x0500, 4, 0xAA);
        assert_eq!(mem.get_bytes(0x0000, 0x04FF, 6), vec![0, 0xAA, 0xAA, 0xAA, 0xAA, 0]);
    }

    #[test]
    fn test_copy_forward_disjoint() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x1000, 0x0000, &[1, 2, 3, 4]);
        mem.copy_bytes(0x1000, 0x0000, 0x2000, 0x0010, 4, Direction::Forward);
        assert_eq!(mem.get_bytes(0x2000, 0x0010, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_forward_overlap_replicates() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x1000, 0x0000, &[7, 0, 0, 0, 0]);
        // Destination one past source: element-by-element semantics smear byte 0
        mem.copy_bytes(0x1000, 0x0000, 0x1000, 0x0001, 4, Direction::Forward);
        assert_eq!(mem.get_bytes(0x1000, 0x0000, 5), vec![7, 7, 7, 7, 7]);
    }

    #[test]
    fn test_copy_backward_descends() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x1000, 0x0000, &[1, 2, 3, 4]);
        mem.copy_bytes(0x1000, 0x0003, 0x2000, 0x0003, 4, Direction::Backward);
        assert_eq!(mem.get_bytes(0x2000, 0x0000, 4), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_backward_overlap() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x1000, 0x0000, &[1, 2, 3, 4, 0]);
        // memmove-style shift right by one, walking downwards
        mem.copy_bytes(0x1000, 0x0003, 0x1000, 0x0004, 4, Direction::Backward);
        assert_eq!(mem.get_bytes(0x1000, 0x0000, 5), vec![1, 1, 2, 3, 4]);
    }

    #[test]
    fn test_copy_wraps_offset() {
        let mut mem = ArrayMemory::new();
        mem.set_bytes(0x1000, 0xFFFE, &[9, 8, 7]);
        mem.copy_bytes(0x1000, 0xFFFE, 0x3000, 0x0000, 3, Direction::Forward);
        assert_eq!(mem.get_bytes(0x3000, 0x0000, 3), vec![9, 8, 7]);
    }

    #[test]
    fn test_default_port_io() {
        let mut mem = ArrayMemory::new();
        assert_eq!(mem.io_read(0x60), 0xFF);
        assert_eq!(mem.io_read_word(0x60), 0xFFFF);
        mem.io_write(0x61, 0x12);
    }
}
