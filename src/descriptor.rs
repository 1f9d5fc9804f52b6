//! Image descriptor: region layout computation and its on-disk encoding.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::config::*;
use crate::{BlockDevice, Descriptor, Error, Result};

/// Parses a capacity such as `600KB` or `10MB` into bytes.
/// Units are binary multiples, `B`, `KB`, `MB` and `GB`, case is ignored.
pub fn parse_size(size: &str) -> Result<i32> {
    let size = size.trim();
    let split = size
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| Error::InvalidSize(size.to_string()))?;
    let (number, unit) = size.split_at(split);
    let number: u64 = number
        .parse()
        .map_err(|_| Error::InvalidSize(size.to_string()))?;
    let multiplier: u64 = match unit.to_ascii_uppercase().as_str() {
        "B" => 1,
        "KB" => 1 << 10,
        "MB" => 1 << 20,
        "GB" => 1 << 30,
        _ => return Err(Error::InvalidSize(size.to_string())),
    };
    let bytes = number
        .checked_mul(multiplier)
        .filter(|&b| b > 0 && b <= i32::MAX as u64)
        .ok_or_else(|| Error::InvalidSize(size.to_string()))?;
    Ok(bytes as i32)
}

impl Descriptor {
    /// Lays out an image of `disk_size` bytes.
    /// Tables follow the descriptor, the data region follows the mirror table.
    pub fn new(disk_size: i32) -> Result<Self> {
        let cluster_count = disk_size / CLUSTER_SIZE as i32;
        if disk_size <= 0 || cluster_count < (FIRST_DATA_CLUSTER + 1) as i32 {
            return Err(Error::InvalidSize(format!("{} bytes", disk_size)));
        }
        let fat_count = cluster_count;
        let fat1_start = DESCRIPTOR_SIZE as i32;
        let fat2_start = fat1_start + fat_count * FAT_ENTRY_SIZE as i32;
        let data_start = fat2_start + fat_count * FAT_ENTRY_SIZE as i32;

        Ok(Self {
            signature: *SIGNATURE,
            disk_size,
            cluster_size: CLUSTER_SIZE as i32,
            cluster_count,
            fat_count,
            fat1_start,
            fat2_start,
            data_start,
            dir_start: data_start,
        })
    }

    /// Byte offset of a cluster inside the image.
    pub fn cluster_offset(&self, cluster: i32) -> u64 {
        self.data_start as u64 + cluster as u64 * CLUSTER_SIZE as u64
    }

    /// A descriptor read back from disk must describe exactly the layout
    /// `Descriptor::new` would compute for its capacity.
    pub fn validate(&self) -> Result<()> {
        if self.signature != *SIGNATURE {
            return Err(Error::InvalidSignature);
        }
        let expected = Self::new(self.disk_size)
            .map_err(|_| Error::CorruptedImage(format!("bad disk size {}", self.disk_size)))?;
        if *self != expected {
            return Err(Error::CorruptedImage("descriptor layout mismatch".to_string()));
        }
        Ok(())
    }

    pub fn encode(&self, out: &mut impl Write) -> Result<()> {
        out.write_all(&self.signature)?;
        out.write_all(&[0; DESCRIPTOR_SIZE - SIGNATURE_LEN - 8 * 4])?;
        for field in [
            self.disk_size,
            self.cluster_size,
            self.cluster_count,
            self.fat_count,
            self.fat1_start,
            self.fat2_start,
            self.data_start,
            self.dir_start,
        ] {
            out.write_i32::<LittleEndian>(field)?;
        }
        Ok(())
    }

    pub fn decode(input: &mut impl Read) -> Result<Self> {
        let mut signature = [0; SIGNATURE_LEN];
        input.read_exact(&mut signature)?;
        let mut padding = [0; DESCRIPTOR_SIZE - SIGNATURE_LEN - 8 * 4];
        input.read_exact(&mut padding)?;
        Ok(Self {
            signature,
            disk_size: input.read_i32::<LittleEndian>()?,
            cluster_size: input.read_i32::<LittleEndian>()?,
            cluster_count: input.read_i32::<LittleEndian>()?,
            fat_count: input.read_i32::<LittleEndian>()?,
            fat1_start: input.read_i32::<LittleEndian>()?,
            fat2_start: input.read_i32::<LittleEndian>()?,
            data_start: input.read_i32::<LittleEndian>()?,
            dir_start: input.read_i32::<LittleEndian>()?,
        })
    }
}

pub fn read_descriptor<D: BlockDevice>(device: &D) -> Result<Descriptor> {
    let mut buf = [0u8; DESCRIPTOR_SIZE];
    device.read_at(0, &mut buf)?;
    let descriptor = Descriptor::decode(&mut Cursor::new(&buf[..]))?;
    descriptor.validate()?;
    Ok(descriptor)
}

pub fn write_descriptor<D: BlockDevice>(device: &D, descriptor: &Descriptor) -> Result<()> {
    let mut buf = Vec::with_capacity(DESCRIPTOR_SIZE);
    descriptor.encode(&mut buf)?;
    device.write_at(0, &buf)?;
    Ok(())
}
