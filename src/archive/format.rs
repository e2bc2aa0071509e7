use crate::error::{FlatarcError, Result};
use std::io::{Read, Write};

/// Magic number: 0x89 'F' 'A' 'R' 0x0D 0x0A 0x1A 0x0A
/// Follows PNG pattern for corruption detection
pub const MAGIC_NUMBER: [u8; 8] = [0x89, b'F', b'A', b'R', 0x0D, 0x0A, 0x1A, 0x0A];

/// Current format version
pub const FORMAT_VERSION_MAJOR: u16 = 1;
pub const FORMAT_VERSION_MINOR: u16 = 0;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// RSRC signature for resource table entries
pub const RESOURCE_ENTRY_SIGNATURE: [u8; 4] = [0x52, 0x53, 0x52, 0x43]; // "RSRC"

/// Maximum resource name length in bytes (UTF-8)
pub const MAX_NAME_LENGTH: usize = 255;

/// Storage kind tag of a resource region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResourceKindTag {
    Vector = 0,
    Multivector = 1,
    RawData = 2,
}

impl ResourceKindTag {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Vector),
            1 => Ok(Self::Multivector),
            2 => Ok(Self::RawData),
            _ => Err(FlatarcError::InvalidFormat(format!(
                "unknown resource kind tag: {}",
                value
            ))),
        }
    }
}

/// Fixed header at the beginning of the archive
///
/// Structure (64 bytes fixed):
/// - Magic: 8 bytes
/// - Version Major: uint16 (2 bytes)
/// - Version Minor: uint16 (2 bytes)
/// - Header CRC32: uint32 (4 bytes), computed with this field zeroed
/// - Resource Table Offset: uint64 (8 bytes)
/// - Resource Table Size: uint64 (8 bytes)
/// - Resource Count: uint32 (4 bytes)
/// - Schema Blob Offset: uint64 (8 bytes)
/// - Schema Blob Size: uint64 (8 bytes)
/// - Reserved: 12 bytes
#[derive(Debug, Clone)]
pub struct ArchiveHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub header_crc: u32,
    pub table_offset: u64,
    pub table_size: u64,
    pub resource_count: u32,
    pub schema_offset: u64,
    pub schema_size: u64,
}

impl ArchiveHeader {
    pub fn new() -> Self {
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            header_crc: 0,
            table_offset: 0,
            table_size: 0,
            resource_count: 0,
            schema_offset: 0,
            schema_size: 0,
        }
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC_NUMBER)?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.header_crc.to_le_bytes())?;
        writer.write_all(&self.table_offset.to_le_bytes())?;
        writer.write_all(&self.table_size.to_le_bytes())?;
        writer.write_all(&self.resource_count.to_le_bytes())?;
        writer.write_all(&self.schema_offset.to_le_bytes())?;
        writer.write_all(&self.schema_size.to_le_bytes())?;

        // Reserved bytes
        writer.write_all(&[0u8; 12])?;

        Ok(())
    }

    /// Read header from a reader
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;

        if magic != MAGIC_NUMBER {
            return Err(FlatarcError::InvalidMagic);
        }

        let version_major = read_u16(&mut reader)?;
        let version_minor = read_u16(&mut reader)?;
        let header_crc = read_u32(&mut reader)?;
        let table_offset = read_u64(&mut reader)?;
        let table_size = read_u64(&mut reader)?;
        let resource_count = read_u32(&mut reader)?;
        let schema_offset = read_u64(&mut reader)?;
        let schema_size = read_u64(&mut reader)?;

        // Skip reserved bytes
        let mut reserved = [0u8; 12];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            version_major,
            version_minor,
            header_crc,
            table_offset,
            table_size,
            resource_count,
            schema_offset,
            schema_size,
        })
    }

    /// Validate version compatibility
    pub fn validate_version(&self) -> Result<()> {
        if self.version_major > FORMAT_VERSION_MAJOR {
            return Err(FlatarcError::UnsupportedVersion(self.version_major));
        }
        Ok(())
    }

    /// CRC32 of the serialized header with the CRC field zeroed
    pub fn compute_crc(&self) -> u32 {
        let mut scratch = self.clone();
        scratch.header_crc = 0;
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        // Writing into a Vec cannot fail
        scratch.write_to(&mut buf).expect("header serialization");
        crc32fast::hash(&buf)
    }

    /// Verify the stored header CRC
    pub fn validate_crc(&self) -> Result<()> {
        let computed = self.compute_crc();
        if computed != self.header_crc {
            return Err(FlatarcError::CrcMismatch {
                expected: self.header_crc,
                actual: computed,
            });
        }
        Ok(())
    }
}

impl Default for ArchiveHeader {
    fn default() -> Self {
        Self::new()
    }
}

/// Resource table entry metadata
///
/// Structure (variable length):
/// - Signature: "RSRC" (4 bytes)
/// - Kind Tag: uint8 (1 byte)
/// - Reserved: 3 bytes
/// - Data Offset: uint64 (8 bytes), from archive start
/// - Data Size: uint64 (8 bytes)
/// - Count: uint64 (8 bytes): stored records / logical items / byte length
/// - Index Size: uint64 (8 bytes): multivector offset-index bytes, else 0
/// - CRC32: uint32 (4 bytes), of the region bytes
/// - Name Length: uint16 (2 bytes)
/// - Name: variable (UTF-8)
#[derive(Debug, Clone)]
pub struct ResourceEntry {
    pub name: String,
    pub kind: ResourceKindTag,
    pub data_offset: u64,
    pub data_size: u64,
    pub count: u64,
    pub index_size: u64,
    pub crc32: u32,
}

impl ResourceEntry {
    /// Write entry to the resource table
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        let name_bytes = self.name.as_bytes();
        if name_bytes.len() > MAX_NAME_LENGTH {
            return Err(FlatarcError::InvalidFormat(format!(
                "Resource name too long: {} bytes (max {})",
                name_bytes.len(),
                MAX_NAME_LENGTH
            )));
        }

        writer.write_all(&RESOURCE_ENTRY_SIGNATURE)?;
        writer.write_all(&[self.kind as u8])?;
        writer.write_all(&[0u8; 3])?;
        writer.write_all(&self.data_offset.to_le_bytes())?;
        writer.write_all(&self.data_size.to_le_bytes())?;
        writer.write_all(&self.count.to_le_bytes())?;
        writer.write_all(&self.index_size.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;

        let name_len = name_bytes.len() as u16;
        writer.write_all(&name_len.to_le_bytes())?;
        writer.write_all(name_bytes)?;

        Ok(4 + 1 + 3 + 8 + 8 + 8 + 8 + 4 + 2 + name_bytes.len())
    }

    /// Read entry from the resource table
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut sig = [0u8; 4];
        reader.read_exact(&mut sig)?;
        if sig != RESOURCE_ENTRY_SIGNATURE {
            return Err(FlatarcError::InvalidFormat(
                "Invalid resource table entry signature".to_string(),
            ));
        }

        let mut kind_byte = [0u8; 1];
        reader.read_exact(&mut kind_byte)?;
        let kind = ResourceKindTag::from_u8(kind_byte[0])?;

        let mut reserved = [0u8; 3];
        reader.read_exact(&mut reserved)?;

        let data_offset = read_u64(&mut reader)?;
        let data_size = read_u64(&mut reader)?;
        let count = read_u64(&mut reader)?;
        let index_size = read_u64(&mut reader)?;
        let crc32 = read_u32(&mut reader)?;

        let name_len = read_u16(&mut reader)?;
        if name_len as usize > MAX_NAME_LENGTH {
            return Err(FlatarcError::InvalidFormat(format!(
                "Resource name too long: {} bytes (max {})",
                name_len, MAX_NAME_LENGTH
            )));
        }

        let mut name_buf = vec![0u8; name_len as usize];
        reader.read_exact(&mut name_buf)?;
        let name = String::from_utf8(name_buf).map_err(|e| {
            FlatarcError::InvalidFormat(format!("Invalid UTF-8 in resource name: {}", e))
        })?;

        Ok(Self {
            name,
            kind,
            data_offset,
            data_size,
            count,
            index_size,
            crc32,
        })
    }
}

// Helper functions for reading primitive types
fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(mut reader: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
