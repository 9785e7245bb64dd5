//! ELF32 constants, the permission/flag newtypes the renderer emits, and the
//! endian-aware integer encoding shared by numeric literals and references.

use core::fmt;

/// Size in bytes of the ELF32 file header.
pub const EHDR_SIZE: u32 = 52;
/// Size in bytes of a single ELF32 program header entry.
pub const PHDR_SIZE: u32 = 32;

/// `e_ident[EI_CLASS]` value for 32-bit objects.
const ELFCLASS32: u8 = 1;
/// `e_ident[EI_VERSION]` / `e_version` value for the only defined ELF version.
const EV_CURRENT: u8 = 1;
/// `e_type` value for executable files.
const ET_EXEC: u16 = 2;
/// `p_type` value for loadable segments.
const PT_LOAD: u32 = 1;

/// The byte order in which a program's multi-byte fields are encoded.
///
/// Mirrors the ELF `e_ident[EI_DATA]` distinction between `ELFDATA2LSB` and
/// `ELFDATA2MSB`; there is no "native"/"any" variant because every field in
/// a rendered binary must be encoded in exactly one, program-wide, order.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum Endianness {
    /// Least-significant byte first (`ELFDATA2LSB`).
    Little,
    /// Most-significant byte first (`ELFDATA2MSB`).
    Big,
}

impl Endianness {
    /// The `e_ident[EI_DATA]` value for this [`Endianness`].
    fn ei_data(self) -> u8 {
        match self {
            Self::Little => 1,
            Self::Big => 2,
        }
    }

    /// Encodes `value` as `n` bytes in this [`Endianness`].
    fn write(self, value: u128, n: usize, out: &mut Vec<u8>) {
        let bytes = value.to_le_bytes();
        match self {
            Self::Little => out.extend_from_slice(&bytes[..n]),
            Self::Big => out.extend(bytes[..n].iter().rev()),
        }
    }
}

/// The permissions carried by a rendered segment's `p_flags`.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct SegmentFlags(pub u32);

impl SegmentFlags {
    /// The segment may be executed.
    pub const EXECUTE: Self = Self(0x1);
    /// The segment may be written.
    pub const WRITE: Self = Self(0x2);
    /// The segment may be read.
    pub const READ: Self = Self(0x4);

    /// Parses the surface syntax's `r`/`rw`/`rx`/`rwx` flag spelling.
    ///
    /// Returns `None` for any other spelling; callers turn that into a
    /// parse-level diagnostic.
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            "r" => Some(Self::READ),
            "rw" => Some(Self::READ.or(Self::WRITE)),
            "rx" => Some(Self::READ.or(Self::EXECUTE)),
            "rwx" => Some(Self::READ.or(Self::WRITE).or(Self::EXECUTE)),
            _ => None,
        }
    }

    /// Combines two sets of flags.
    const fn or(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl core::ops::BitOr for SegmentFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.or(rhs)
    }
}

/// An overflow error raised when encoding a value into a fixed-width field.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub struct RangeError;

/// Encodes `value` as an unsigned two's-complement integer of `width` bytes.
///
/// # Errors
///
/// Returns [`RangeError`] if `value` is negative or does not fit in `width`
/// unsigned bytes.
pub fn encode_unsigned(value: i128, width: u32, endianness: Endianness) -> Result<Vec<u8>, RangeError> {
    if value < 0 {
        return Err(RangeError);
    }
    let width = width as usize;
    if width < 16 && value >= (1i128 << (8 * width)) {
        return Err(RangeError);
    }
    let mut out = Vec::with_capacity(width);
    endianness.write(value as u128, width, &mut out);
    Ok(out)
}

/// Encodes `value` as a signed two's-complement integer of `width` bytes.
///
/// # Errors
///
/// Returns [`RangeError`] if `value` does not fit in `width` signed bytes.
pub fn encode_signed(value: i128, width: u32, endianness: Endianness) -> Result<Vec<u8>, RangeError> {
    let width_usize = width as usize;
    if width < 16 {
        let bits = 8 * width;
        let max = (1i128 << (bits - 1)) - 1;
        let min = -(1i128 << (bits - 1));
        if value < min || value > max {
            return Err(RangeError);
        }
    }
    let unsigned = (value as u128) & mask(width);
    let mut out = Vec::with_capacity(width_usize);
    endianness.write(unsigned, width_usize, &mut out);
    Ok(out)
}

/// Returns a mask with the low `8 * width` bits set (saturating at 128 bits).
fn mask(width: u32) -> u128 {
    if width >= 16 {
        u128::MAX
    } else {
        (1u128 << (8 * width)) - 1
    }
}

/// Assembles the 52-byte ELF32 file header.
pub fn write_header(machine: u16, endianness: Endianness, entry: u32, phnum: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(EHDR_SIZE as usize);

    out.extend([0x7f, b'E', b'L', b'F']);
    out.push(ELFCLASS32);
    out.push(endianness.ei_data());
    out.push(EV_CURRENT);
    out.push(0); // EI_OSABI
    out.extend([0u8; 8]); // EI_ABIVERSION + padding

    write_u16(&mut out, ET_EXEC, endianness);
    write_u16(&mut out, machine, endianness);
    write_u32(&mut out, EV_CURRENT as u32, endianness);
    write_u32(&mut out, entry, endianness);
    write_u32(&mut out, EHDR_SIZE, endianness); // e_phoff
    write_u32(&mut out, 0, endianness); // e_shoff
    write_u32(&mut out, 0, endianness); // e_flags
    write_u16(&mut out, EHDR_SIZE as u16, endianness); // e_ehsize
    write_u16(&mut out, PHDR_SIZE as u16, endianness); // e_phentsize
    write_u16(&mut out, phnum, endianness);
    write_u16(&mut out, 0, endianness); // e_shentsize
    write_u16(&mut out, 0, endianness); // e_shnum
    write_u16(&mut out, 0, endianness); // e_shstrndx

    debug_assert_eq!(out.len(), EHDR_SIZE as usize);
    out
}

/// Assembles one `PT_LOAD` program header entry.
#[allow(clippy::too_many_arguments)]
pub fn write_program_header(
    file_offset: u32,
    vaddr: u32,
    file_size: u32,
    mem_size: u32,
    flags: SegmentFlags,
    alignment: u32,
    endianness: Endianness,
) -> Vec<u8> {
    let mut out = Vec::with_capacity(PHDR_SIZE as usize);

    write_u32(&mut out, PT_LOAD, endianness);
    write_u32(&mut out, file_offset, endianness);
    write_u32(&mut out, vaddr, endianness); // p_vaddr
    write_u32(&mut out, vaddr, endianness); // p_paddr, identical to p_vaddr
    write_u32(&mut out, file_size, endianness);
    write_u32(&mut out, mem_size, endianness);
    write_u32(&mut out, flags.0, endianness);
    write_u32(&mut out, alignment, endianness);

    debug_assert_eq!(out.len(), PHDR_SIZE as usize);
    out
}

fn write_u16(out: &mut Vec<u8>, value: u16, endianness: Endianness) {
    endianness.write(u128::from(value), 2, out);
}

fn write_u32(out: &mut Vec<u8>, value: u32, endianness: Endianness) {
    endianness.write(u128::from(value), 4, out);
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad("value does not fit in the requested width")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsigned_round_trip_boundaries() {
        let cases = [
            (0i128, 1u32, vec![0x00]),
            (0xff, 1, vec![0xff]),
            (0xffff, 2, vec![0xff, 0xff]),
            (1, 4, vec![0x01, 0x00, 0x00, 0x00]),
            (0xffff_ffff, 4, vec![0xff, 0xff, 0xff, 0xff]),
        ];
        for (value, width, expected) in cases {
            assert_eq!(
                encode_unsigned(value, width, Endianness::Little).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn unsigned_overflow_is_rejected() {
        assert_eq!(encode_unsigned(256, 1, Endianness::Little), Err(RangeError));
        assert_eq!(encode_unsigned(-1, 1, Endianness::Little), Err(RangeError));
    }

    #[test]
    fn signed_round_trip_boundaries() {
        assert_eq!(
            encode_signed(-1, 1, Endianness::Little).unwrap(),
            vec![0xff]
        );
        assert_eq!(
            encode_signed(-128, 1, Endianness::Little).unwrap(),
            vec![0x80]
        );
        assert_eq!(
            encode_signed(127, 1, Endianness::Little).unwrap(),
            vec![0x7f]
        );
    }

    #[test]
    fn signed_overflow_is_rejected() {
        assert_eq!(encode_signed(128, 1, Endianness::Little), Err(RangeError));
        assert_eq!(encode_signed(-129, 1, Endianness::Little), Err(RangeError));
    }

    #[test]
    fn big_endian_reverses_byte_order() {
        assert_eq!(
            encode_unsigned(0x0102_0304, 4, Endianness::Big).unwrap(),
            vec![0x01, 0x02, 0x03, 0x04]
        );
        assert_eq!(
            encode_unsigned(0x0102_0304, 4, Endianness::Little).unwrap(),
            vec![0x04, 0x03, 0x02, 0x01]
        );
    }

    #[test]
    fn segment_flags_parse_known_spellings() {
        assert_eq!(SegmentFlags::parse("r"), Some(SegmentFlags::READ));
        assert_eq!(
            SegmentFlags::parse("rwx"),
            Some(SegmentFlags::READ | SegmentFlags::WRITE | SegmentFlags::EXECUTE)
        );
        assert_eq!(SegmentFlags::parse("wat"), None);
    }
}
