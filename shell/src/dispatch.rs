//! Request dispatcher: the cooperative pass the main loop runs first.
//!
//! Order per invocation: the ROM-integrity check, hot-swap detection,
//! the read sweep, the write sweep, the flush sweep.  Drives are swept
//! in ascending order and each request is transferred and acknowledged
//! completely before the next drive is considered; within a transfer the
//! bytes move strictly lowest-to-highest address.

use crate::config::Config;
use crate::flush;
use crate::hif::Hif;
use crate::mmap::{drive as reg, Csr};
use crate::param;
use crate::sdcard::Fat32;
use crate::vdrive::{image_read, image_write, Drive};
use crate::{Fatal, Result};

/// SD-slot bookkeeping owned by the dispatcher.
pub struct SdState {
    /// Slot observed at startup.  Settings must never be written to a
    /// different card than they were read from.
    pub startup_slot: bool,
    pub last_slot: bool,
    /// Set on hot-swap; inhibits mounts until a mount retry restarts
    /// the card.
    pub changed: bool,
}

impl SdState {
    pub fn new(slot: bool) -> SdState {
        SdState {
            startup_slot: slot,
            last_slot: slot,
            changed: false,
        }
    }
}

/// One dispatcher pass.
pub fn poll<H: Hif, F: Fat32>(
    hif: &mut H,
    fs: &mut F,
    sd: &mut SdState,
    config: &mut Config,
    drives: &mut [Drive],
) -> Result<()> {
    let slot = hif.csr().contains(Csr::SD_ACTIVE);

    // Writing settings to a card other than the one they were read from
    // would corrupt it.
    if slot != sd.startup_slot {
        config.set_persist(false);
    }

    if slot != sd.last_slot {
        sd.changed = true;
        sd.last_slot = slot;
    }

    // Read sweep.
    for drive in drives.iter_mut() {
        if !drive.mounted {
            continue;
        }
        hif.select(drive.regs_dev(), 0);
        if hif.peek(reg::SD_RD) != 0 {
            service_read(hif, drive)?;
        }
    }

    // Write sweep.
    for drive in drives.iter_mut() {
        if !drive.mounted {
            continue;
        }
        hif.select(drive.regs_dev(), 0);
        if hif.peek(reg::SD_WR) != 0 {
            service_write(hif, drive)?;
        }
    }

    // Flush sweep: one bounded iteration per dirty drive.
    for drive in drives.iter_mut() {
        if drive.mounted && drive.cache_dirty {
            flush::step(hif, fs, drive)?;
        }
    }

    Ok(())
}

/// Pull the request geometry out of the drive's register file.  Returns
/// (start byte address in the image buffer, byte count).
fn request_geometry<H: Hif>(hif: &mut H, drive: &Drive) -> Result<(u32, usize)> {
    hif.select(drive.regs_dev(), 0);
    let size = hif.peek(reg::SIZE_BYTES) as usize;
    let win = hif.peek(reg::WIN4K) as u32;
    let off = hif.peek(reg::OFF4K) as u32;
    if size > param::XFER_MAX {
        // The internal buffer cannot hold this; a protocol breach, not
        // a recoverable request.
        return Err(Fatal::BufferOverrun.into());
    }
    Ok((win << 12 | off, size))
}

/// Image buffer to internal drive buffer, then acknowledge.
fn service_read<H: Hif>(hif: &mut H, drive: &mut Drive) -> Result<()> {
    let (start, size) = request_geometry(hif, drive)?;
    hif.poke(reg::ACK, 1);

    let mut chunk = [0u8; param::XFER_CHUNK];
    let mut done = 0;
    while done < size {
        let n = (size - done).min(param::XFER_CHUNK);
        image_read(hif, drive.image_dev, start + done as u32, &mut chunk[..n]);
        hif.select(drive.regs_dev(), 0);
        for (k, &b) in chunk[..n].iter().enumerate() {
            hif.poke(reg::BUF_ADDR, (done + k) as u16);
            hif.poke(reg::BUF_DOUT, b as u16);
            hif.poke(reg::BUF_WREN, 1);
            hif.poke(reg::BUF_WREN, 0);
        }
        done += n;
    }

    hif.select(drive.regs_dev(), 0);
    hif.poke(reg::ACK, 0);
    Ok(())
}

/// Internal drive buffer to image buffer; dirties the cache and
/// restarts any flush in progress.
fn service_write<H: Hif>(hif: &mut H, drive: &mut Drive) -> Result<()> {
    let (start, size) = request_geometry(hif, drive)?;
    hif.poke(reg::ACK, 1);

    let mut chunk = [0u8; param::XFER_CHUNK];
    let mut done = 0;
    while done < size {
        let n = (size - done).min(param::XFER_CHUNK);
        hif.select(drive.regs_dev(), 0);
        for (k, b) in chunk[..n].iter_mut().enumerate() {
            hif.poke(reg::BUF_ADDR, (done + k) as u16);
            *b = hif.peek(reg::BUF_DIN) as u8;
        }
        image_write(hif, drive.image_dev, start + done as u32, &chunk[..n]);
        done += n;
    }

    hif.select(drive.regs_dev(), 0);
    hif.poke(reg::ACK, 0);

    if !drive.read_only {
        drive.cache_dirty = true;
        drive.flushing = false;
    }
    Ok(())
}
