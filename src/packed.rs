//! Bit-packed record codec.
//!
//! Records are fixed-size slots whose fields live at arbitrary bit offsets
//! with arbitrary widths (1..=64 bits), independent of byte boundaries.
//! Decoding masks and shifts the minimal byte span covering a field;
//! encoding is a read-modify-write that preserves every bit outside the
//! target span, since neighbouring fields usually share bytes.
//!
//! Bit order is LSB-first within each byte, bytes in ascending order
//! (little-endian bit addressing). Values wider than their declared field
//! are rejected with [`FlatarcError::OutOfRange`], never truncated.

use crate::error::{FlatarcError, Result};
use crate::schema::{FieldKind, RecordLayout};

/// Number of whole bytes needed to hold `bits` bits.
pub fn byte_len(bits: u32) -> usize {
    (bits as usize + 7) / 8
}

/// Largest value an unsigned field of `width` bits can hold.
pub fn max_unsigned(width: u32) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1u64 << width) - 1
    }
}

/// Smallest value a signed field of `width` bits can hold.
pub fn min_signed(width: u32) -> i64 {
    if width >= 64 {
        i64::MIN
    } else {
        -(1i64 << (width - 1))
    }
}

/// Largest value a signed field of `width` bits can hold.
pub fn max_signed(width: u32) -> i64 {
    if width >= 64 {
        i64::MAX
    } else {
        (1i64 << (width - 1)) - 1
    }
}

/// Read an unsigned field of `width` bits starting at `bit_offset`.
///
/// The caller guarantees the buffer covers the field's byte span.
pub fn read_unsigned(buf: &[u8], bit_offset: usize, width: u32) -> u64 {
    debug_assert!(width >= 1 && width <= 64);
    debug_assert!(buf.len() * 8 >= bit_offset + width as usize);

    let mut value: u64 = 0;
    let mut bits_read: u32 = 0;
    let mut byte = bit_offset / 8;
    let mut shift = (bit_offset % 8) as u32;

    while bits_read < width {
        let take = (8 - shift).min(width - bits_read);
        let chunk = ((buf[byte] as u64) >> shift) & ((1u64 << take) - 1);
        value |= chunk << bits_read;
        bits_read += take;
        byte += 1;
        shift = 0;
    }

    value
}

/// Read a signed field, sign-extending from bit `width - 1`.
pub fn read_signed(buf: &[u8], bit_offset: usize, width: u32) -> i64 {
    sign_extend(read_unsigned(buf, bit_offset, width), width)
}

/// Sign-extend the low `width` bits of `value`.
pub fn sign_extend(value: u64, width: u32) -> i64 {
    if width >= 64 {
        return value as i64;
    }
    let sign = 1u64 << (width - 1);
    (value ^ sign).wrapping_sub(sign) as i64
}

/// Write the low `width` bits of `value` at `bit_offset`, preserving all
/// surrounding bits.
///
/// The caller guarantees the value fits the width and the buffer covers
/// the field's byte span; range enforcement lives in [`RecordMut`].
pub fn write_unsigned(buf: &mut [u8], bit_offset: usize, width: u32, value: u64) {
    debug_assert!(width >= 1 && width <= 64);
    debug_assert!(buf.len() * 8 >= bit_offset + width as usize);
    debug_assert!(value <= max_unsigned(width));

    let mut bits_written: u32 = 0;
    let mut byte = bit_offset / 8;
    let mut shift = (bit_offset % 8) as u32;

    while bits_written < width {
        let take = (8 - shift).min(width - bits_written);
        let mask = (((1u16 << take) - 1) as u8) << shift;
        let chunk = (((value >> bits_written) as u8) << shift) & mask;
        buf[byte] = (buf[byte] & !mask) | chunk;
        bits_written += take;
        byte += 1;
        shift = 0;
    }
}

/// Write a signed value as its `width`-bit two's-complement representation.
pub fn write_signed(buf: &mut [u8], bit_offset: usize, width: u32, value: i64) {
    debug_assert!(value >= min_signed(width) && value <= max_signed(width));
    write_unsigned(buf, bit_offset, width, (value as u64) & max_unsigned(width));
}

/// One decoded field value, tagged by the field's declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldValue {
    Unsigned(u64),
    Signed(i64),
    Bool(bool),
}

impl FieldValue {
    /// Unsigned or boolean payload; `None` for signed fields.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(v) => Some(*v),
            FieldValue::Bool(b) => Some(*b as u64),
            FieldValue::Signed(_) => None,
        }
    }

    /// Value widened to i64; `None` if an unsigned payload overflows.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Unsigned(v) => i64::try_from(*v).ok(),
            FieldValue::Signed(v) => Some(*v),
            FieldValue::Bool(b) => Some(*b as i64),
        }
    }

    /// Boolean payload; `None` for numeric fields.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Read-only view of one packed record.
#[derive(Debug, Clone, Copy)]
pub struct RecordRef<'a> {
    bytes: &'a [u8],
    layout: &'a RecordLayout,
}

impl<'a> RecordRef<'a> {
    pub(crate) fn new(bytes: &'a [u8], layout: &'a RecordLayout) -> Self {
        debug_assert!(bytes.len() >= layout.byte_size());
        Self { bytes, layout }
    }

    /// Layout this record was decoded with.
    pub fn layout(&self) -> &'a RecordLayout {
        self.layout
    }

    /// Decode one field by name.
    pub fn get(&self, field: &str) -> Result<FieldValue> {
        let def = self.field_def(field)?;
        let value = match def.kind {
            FieldKind::Unsigned => FieldValue::Unsigned(read_unsigned(
                self.bytes,
                def.bit_offset as usize,
                def.bit_width,
            )),
            FieldKind::Signed => FieldValue::Signed(read_signed(
                self.bytes,
                def.bit_offset as usize,
                def.bit_width,
            )),
            FieldKind::Bool => FieldValue::Bool(
                read_unsigned(self.bytes, def.bit_offset as usize, def.bit_width) != 0,
            ),
        };
        Ok(value)
    }

    /// Decode an unsigned field by name.
    pub fn get_u64(&self, field: &str) -> Result<u64> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Unsigned {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "unsigned",
            });
        }
        Ok(read_unsigned(
            self.bytes,
            def.bit_offset as usize,
            def.bit_width,
        ))
    }

    /// Decode a signed field by name.
    pub fn get_i64(&self, field: &str) -> Result<i64> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Signed {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "signed",
            });
        }
        Ok(read_signed(
            self.bytes,
            def.bit_offset as usize,
            def.bit_width,
        ))
    }

    /// Decode a boolean field by name.
    pub fn get_bool(&self, field: &str) -> Result<bool> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Bool {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "bool",
            });
        }
        Ok(read_unsigned(self.bytes, def.bit_offset as usize, def.bit_width) != 0)
    }

    fn field_def(&self, field: &str) -> Result<&'a crate::schema::FieldDef> {
        self.layout
            .field(field)
            .ok_or_else(|| FlatarcError::UnknownField {
                record: self.layout.name.clone(),
                field: field.to_string(),
            })
    }
}

/// Mutable view of one packed record being built.
///
/// Setters enforce the declared bit width; an over-wide value is an
/// [`FlatarcError::OutOfRange`] error and leaves the record untouched.
#[derive(Debug)]
pub struct RecordMut<'a> {
    bytes: &'a mut [u8],
    layout: &'a RecordLayout,
}

impl<'a> RecordMut<'a> {
    pub(crate) fn new(bytes: &'a mut [u8], layout: &'a RecordLayout) -> Self {
        debug_assert!(bytes.len() >= layout.byte_size());
        Self { bytes, layout }
    }

    /// Encode an unsigned field by name.
    pub fn set(&mut self, field: &str, value: u64) -> Result<()> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Unsigned {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "unsigned",
            });
        }
        if value > max_unsigned(def.bit_width) {
            return Err(FlatarcError::OutOfRange {
                field: field.to_string(),
                width: def.bit_width,
                value: value as i128,
            });
        }
        write_unsigned(self.bytes, def.bit_offset as usize, def.bit_width, value);
        Ok(())
    }

    /// Encode a signed field by name.
    pub fn set_signed(&mut self, field: &str, value: i64) -> Result<()> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Signed {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "signed",
            });
        }
        if value < min_signed(def.bit_width) || value > max_signed(def.bit_width) {
            return Err(FlatarcError::OutOfRange {
                field: field.to_string(),
                width: def.bit_width,
                value: value as i128,
            });
        }
        write_signed(self.bytes, def.bit_offset as usize, def.bit_width, value);
        Ok(())
    }

    /// Encode a boolean field by name.
    pub fn set_bool(&mut self, field: &str, value: bool) -> Result<()> {
        let def = self.field_def(field)?;
        if def.kind != FieldKind::Bool {
            return Err(FlatarcError::FieldKindMismatch {
                record: self.layout.name.clone(),
                field: field.to_string(),
                expected: "bool",
            });
        }
        write_unsigned(
            self.bytes,
            def.bit_offset as usize,
            def.bit_width,
            value as u64,
        );
        Ok(())
    }

    fn field_def(&self, field: &str) -> Result<&'a crate::schema::FieldDef> {
        self.layout
            .field(field)
            .ok_or_else(|| FlatarcError::UnknownField {
                record: self.layout.name.clone(),
                field: field.to_string(),
            })
    }
}
