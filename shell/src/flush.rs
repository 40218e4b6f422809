//! Flush engine: deferred write-back of dirty image caches.
//!
//! The emulated drive writes in bursts; flushing every write immediately
//! would thrash the SD card and blow the core's acknowledgement
//! deadline.  The cache is therefore written back only after the
//! hardware-enforced quiet period, in iterations bounded by
//! `param::ITER_SIZE` bytes, restarting from the top of the image
//! whenever a fresh write lands.
//!
//! Per-drive states: Clean (not dirty, the dispatcher never calls in),
//! Pending (dirty, quiet period still running), Starting (seek to 0,
//! capture the remaining count), Flushing (bounded copy iterations),
//! Flushed (FAT32 flush, flags cleared).  A write serviced while
//! flushing clears `flushing` and leaves `cache_dirty` set, which is the
//! Pending state.
//!
//! Seek, write or flush failures are fatal: the cache is authoritative,
//! and hiding a partial write-back would silently lose user data.

use crate::hif::Hif;
use crate::mmap::drive as reg;
use crate::param;
use crate::sdcard::Fat32;
use crate::vdrive::{image_read, Drive, FlushCursor};
use crate::{Fatal, Result};

/// One bounded iteration for a dirty drive.  At most
/// `param::ITER_SIZE` bytes reach the card per call.
pub fn step<H: Hif, F: Fat32>(hif: &mut H, fs: &mut F, drive: &mut Drive) -> Result<()> {
    debug_assert!(drive.cache_dirty && drive.mounted);
    let handle = drive.handle.expect("dirty drive without a file handle");

    if !drive.flushing {
        // Pending until the hardware reports the quiet period over.
        hif.select(drive.regs_dev(), 0);
        if hif.peek(reg::CACHE_READY) == 0 {
            return Ok(());
        }
        // Starting: rewind the file and capture the image size.
        fs.seek(handle, 0, 0).map_err(|_| Fatal::FlushSeek)?;
        drive.cursor = FlushCursor {
            window: 0,
            offset: 0,
            remaining_lo: drive.size_lo,
            remaining_hi: drive.size_hi,
        };
        drive.flushing = true;
        return Ok(());
    }

    let remaining = drive.cursor.remaining();
    let n = (remaining as usize).min(param::ITER_SIZE);
    let mut buf = [0u8; param::ITER_SIZE];
    image_read(hif, drive.image_dev, drive.cursor.addr(), &mut buf[..n]);
    for &b in &buf[..n] {
        fs.write_byte(handle, b).map_err(|_| Fatal::FlushWrite)?;
    }
    drive.cursor.advance(n as u16);
    drive.cursor.set_remaining(remaining - n as u32);

    if drive.cursor.remaining() == 0 {
        // Flushed: push the FAT32 buffers out, then back to Clean.
        fs.flush(handle).map_err(|_| Fatal::FlushSync)?;
        drive.cache_dirty = false;
        drive.flushing = false;
    }
    Ok(())
}

/// Write the whole cache back in one synchronous pass, ignoring the
/// anti-thrash gate.  Used on unmount and image swap, where the user has
/// asked for the image to go away and no further writes can land.
pub fn drain<H: Hif, F: Fat32>(hif: &mut H, fs: &mut F, drive: &mut Drive) -> Result<()> {
    let handle = drive.handle.expect("dirty drive without a file handle");
    fs.seek(handle, 0, 0).map_err(|_| Fatal::FlushSeek)?;

    let size = drive.image_size();
    let mut buf = [0u8; param::ITER_SIZE];
    let mut addr = 0u32;
    while addr < size {
        let n = ((size - addr) as usize).min(param::ITER_SIZE);
        image_read(hif, drive.image_dev, addr, &mut buf[..n]);
        for &b in &buf[..n] {
            fs.write_byte(handle, b).map_err(|_| Fatal::FlushWrite)?;
        }
        addr += n as u32;
    }
    fs.flush(handle).map_err(|_| Fatal::FlushSync)?;
    drive.cache_dirty = false;
    drive.flushing = false;
    drive.cursor = FlushCursor::default();
    Ok(())
}
