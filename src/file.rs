//! Moving file content in and out of clusters.

use std::io::{Read, Write};

use crate::config::*;
use crate::{BlockDevice, Descriptor, Error, Result};

/// Fills `buf` from `src`, stopping early only at end of input.
/// Returns the number of bytes read.
fn read_full(src: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Streams `src` into the given clusters, one whole cluster at a time.
/// The tail of the last cluster is zero padded.
/// Failures of `src` go through `src_error`, those of the device stay image errors.
/// Returns the number of bytes taken from `src`.
pub fn fwrite(
    device: &impl BlockDevice,
    desc: &Descriptor,
    clusters: &[i32],
    src: &mut impl Read,
    src_error: impl Fn(std::io::Error) -> Error,
) -> Result<usize> {
    let mut buf = Box::new([0u8; CLUSTER_SIZE]);
    let mut written = 0;
    for &cluster in clusters {
        let n = read_full(src, buf.as_mut()).map_err(&src_error)?;
        buf[n..].fill(0);
        device.write_at(desc.cluster_offset(cluster), buf.as_ref())?;
        written += n;
    }
    Ok(written)
}

/// Reads `size` bytes of content spread over `clusters` into `out`.
/// Each cluster contributes at most `CLUSTER_SIZE` bytes, the last one only
/// what is left of `size`.
pub fn fread(
    device: &impl BlockDevice,
    desc: &Descriptor,
    clusters: &[i32],
    size: usize,
    out: &mut impl Write,
) -> Result<usize> {
    let mut buf = Box::new([0u8; CLUSTER_SIZE]);
    let mut remaining = size;
    for &cluster in clusters {
        if remaining == 0 {
            break;
        }
        let n = CLUSTER_SIZE.min(remaining);
        device.read_at(desc.cluster_offset(cluster), &mut buf[..n])?;
        out.write_all(&buf[..n])?;
        remaining -= n;
    }
    if remaining > 0 {
        return Err(Error::CorruptedImage(format!(
            "cluster chain ends {} bytes short",
            remaining
        )));
    }
    Ok(size)
}

/// Duplicates the content of `from` into `to` cluster by cluster.
pub fn fcopy(device: &impl BlockDevice, desc: &Descriptor, from: &[i32], to: &[i32]) -> Result<()> {
    let mut buf = Box::new([0u8; CLUSTER_SIZE]);
    for (&src, &dst) in from.iter().zip(to) {
        device.read_at(desc.cluster_offset(src), buf.as_mut())?;
        device.write_at(desc.cluster_offset(dst), buf.as_ref())?;
    }
    Ok(())
}

/// Number of clusters needed to hold `size` bytes.
pub fn clusters_for(size: u64) -> usize {
    size.div_ceil(CLUSTER_SIZE as u64) as usize
}
