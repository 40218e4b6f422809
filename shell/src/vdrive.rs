//! Virtual-drive registry.
//!
//! One record per logical drive, in a fixed arena indexed by drive
//! number.  The record owns the drive's file handle and the identity of
//! its image buffer; the dispatcher and the flush engine operate on the
//! record through this module.
//!
//! Invariants, held at every main-loop boundary:
//! - mounted implies a live file handle and a valid image-buffer device;
//! - cache_dirty implies mounted;
//! - flushing implies cache_dirty, and the quiet period had elapsed when
//!   the flush started;
//! - a serviced write sets cache_dirty and clears flushing.

use crate::dispatch::SdState;
use crate::flush;
use crate::hif::Hif;
use crate::mmap::{self, drive as reg};
use crate::param;
use crate::sdcard::{DiskError, Fat32, Handle, ImagePath};
use crate::{Error, Result};

/// Image format discriminator surfaced to the emulated core.  Only the
/// fixed-size, error-byte-free layouts are supported.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ImageKind {
    D64 = 0,
    D71 = 1,
    D81 = 2,
}

impl ImageKind {
    pub fn from_size(bytes: u32) -> Option<ImageKind> {
        match bytes {
            174_848 | 196_608 => Some(ImageKind::D64),
            349_696 => Some(ImageKind::D71),
            819_200 => Some(ImageKind::D81),
            _ => None,
        }
    }
}

/// Saved position of a partially flushed image, valid between bounded
/// flush iterations.
#[derive(Clone, Copy, Debug, Default)]
pub struct FlushCursor {
    pub window: u16,
    pub offset: u16,
    pub remaining_lo: u16,
    pub remaining_hi: u16,
}

impl FlushCursor {
    pub fn remaining(&self) -> u32 {
        (self.remaining_hi as u32) << 16 | self.remaining_lo as u32
    }

    pub fn set_remaining(&mut self, n: u32) {
        self.remaining_lo = n as u16;
        self.remaining_hi = (n >> 16) as u16;
    }

    /// Linear byte address of the cursor inside the image buffer.
    pub fn addr(&self) -> u32 {
        (self.window as u32) << 12 | self.offset as u32
    }

    /// Advance by `n` bytes, carrying the offset into the window
    /// selector when it wraps past 4096.
    pub fn advance(&mut self, n: u16) {
        let linear = self.addr() + n as u32;
        self.window = (linear >> 12) as u16;
        self.offset = (linear & 0xFFF) as u16;
    }
}

pub struct Drive {
    index: usize,
    pub(crate) mounted: bool,
    pub(crate) kind: ImageKind,
    pub(crate) read_only: bool,
    pub(crate) handle: Option<Handle>,
    pub(crate) image_dev: u16,
    pub(crate) cache_dirty: bool,
    pub(crate) flushing: bool,
    pub(crate) cursor: FlushCursor,
    pub(crate) size_lo: u16,
    pub(crate) size_hi: u16,
    pub(crate) path: ImagePath,
    mount_snapshot: bool,
    menu_group: Option<u16>,
}

impl Drive {
    pub fn new(index: usize) -> Drive {
        Drive {
            index,
            mounted: false,
            kind: ImageKind::D64,
            read_only: false,
            handle: None,
            image_dev: mmap::drive_image(index),
            cache_dirty: false,
            flushing: false,
            cursor: FlushCursor::default(),
            size_lo: 0,
            size_hi: 0,
            path: ImagePath::empty(),
            mount_snapshot: false,
            menu_group: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn regs_dev(&self) -> u16 {
        mmap::drive_regs(self.index)
    }

    pub fn mounted(&self) -> bool {
        self.mounted
    }

    pub fn cache_dirty(&self) -> bool {
        self.cache_dirty
    }

    pub fn flushing(&self) -> bool {
        self.flushing
    }

    pub fn image_size(&self) -> u32 {
        (self.size_hi as u32) << 16 | self.size_lo as u32
    }

    pub fn menu_group_of(&self) -> Option<u16> {
        self.menu_group
    }

    pub fn set_menu_group(&mut self, group: Option<u16>) {
        self.menu_group = group;
    }

    /// True while the menu's last-drawn mount state disagrees with the
    /// record; the frontend redraw calls [`Drive::sync_snapshot`].
    pub fn mount_changed(&self) -> bool {
        self.mounted != self.mount_snapshot
    }

    pub fn sync_snapshot(&mut self) {
        self.mount_snapshot = self.mounted;
    }
}

/// Read `dst.len()` bytes from an image buffer starting at linear byte
/// address `start`.  One byte per window word; the window selector is
/// re-latched at every 4-KiB boundary.
pub fn image_read<H: Hif>(hif: &mut H, dev: u16, start: u32, dst: &mut [u8]) {
    let mut addr = start;
    let mut done = 0;
    while done < dst.len() {
        let off = (addr & 0xFFF) as u16;
        hif.select(dev, (addr >> 12) as u16);
        let span = (dst.len() - done).min(param::WIN_WORDS - off as usize);
        for k in 0..span {
            dst[done + k] = hif.peek(off + k as u16) as u8;
        }
        done += span;
        addr += span as u32;
    }
}

/// Counterpart of [`image_read`].
pub fn image_write<H: Hif>(hif: &mut H, dev: u16, start: u32, src: &[u8]) {
    let mut addr = start;
    let mut done = 0;
    while done < src.len() {
        let off = (addr & 0xFFF) as u16;
        hif.select(dev, (addr >> 12) as u16);
        let span = (src.len() - done).min(param::WIN_WORDS - off as usize);
        for k in 0..span {
            hif.poke(off + k as u16, src[done + k] as u16);
        }
        done += span;
        addr += span as u32;
    }
}

/// Latch size, read-only and type into the core-facing registers and
/// pulse the mount bit for one cycle.  The core samples the auxiliaries
/// on the rising edge; they are cleared after the pulse.
pub fn strobe_mount<H: Hif>(
    hif: &mut H,
    n: usize,
    size_lo: u16,
    size_hi: u16,
    read_only: bool,
    kind: ImageKind,
) {
    hif.select(mmap::drive_regs(n), 0);
    hif.poke(reg::TYPE, kind as u16);
    hif.poke(reg::RO, read_only as u16);
    hif.poke(reg::IMG_SIZE_LO, size_lo);
    hif.poke(reg::IMG_SIZE_HI, size_hi);
    hif.poke(reg::MOUNT, 1);
    hif.poke(reg::MOUNT, 0);
    hif.poke(reg::IMG_SIZE_LO, 0);
    hif.poke(reg::IMG_SIZE_HI, 0);
    hif.poke(reg::RO, 0);
    hif.poke(reg::TYPE, 0);
}

/// Mount an image file on a drive.
///
/// Re-mounting the image that is already mounted is a no-op: the cache
/// and the emulated drive are left untouched.  Mounting a different
/// image over a mounted drive drains any dirty cache to the old file
/// first, then swaps.
pub fn mount<H: Hif, F: Fat32>(
    hif: &mut H,
    fs: &mut F,
    sd: &mut SdState,
    drive: &mut Drive,
    path: &[u8],
    read_only: bool,
) -> Result<()> {
    if drive.mounted && drive.path == *path {
        return Ok(());
    }

    // A hot-swapped card inhibits mounts until this retry restarts it.
    if sd.changed {
        fs.card_mount(param::SD_PARTITION).map_err(Error::Mount)?;
        sd.changed = false;
    }

    if drive.mounted {
        unmount(hif, fs, drive)?;
    }

    let handle = fs.open(path).map_err(Error::ImageLoad)?;
    match load_image(hif, fs, drive, handle) {
        Ok((size_lo, size_hi, kind)) => {
            drive.mounted = true;
            drive.kind = kind;
            drive.read_only = read_only;
            drive.handle = Some(handle);
            drive.cache_dirty = false;
            drive.flushing = false;
            drive.cursor = FlushCursor::default();
            drive.size_lo = size_lo;
            drive.size_hi = size_hi;
            drive.path.set(path);
            strobe_mount(hif, drive.index, size_lo, size_hi, read_only, kind);
            Ok(())
        }
        Err(e) => {
            // The drive stays unmounted; the caller returns the user to
            // the file browser.
            fs.close(handle);
            Err(e)
        }
    }
}

fn load_image<H: Hif, F: Fat32>(
    hif: &mut H,
    fs: &mut F,
    drive: &mut Drive,
    handle: Handle,
) -> Result<(u16, u16, ImageKind)> {
    let (size_lo, size_hi) = fs.size(handle).map_err(Error::ImageLoad)?;
    let size = (size_hi as u32) << 16 | size_lo as u32;
    let kind = ImageKind::from_size(size).ok_or(Error::ImageLoad(DiskError::BadImage))?;

    fs.seek(handle, 0, 0).map_err(Error::ImageLoad)?;
    let mut buf = [0u8; param::XFER_CHUNK];
    let mut addr = 0u32;
    while addr < size {
        let want = ((size - addr) as usize).min(param::XFER_CHUNK);
        for b in buf.iter_mut().take(want) {
            *b = fs
                .read_byte(handle)
                .map_err(Error::ImageLoad)?
                .ok_or(Error::ImageLoad(DiskError::Eof))?;
        }
        image_write(hif, drive.image_dev, addr, &buf[..want]);
        addr += want as u32;
    }
    Ok((size_lo, size_hi, kind))
}

/// Unmount: drain a dirty cache to the file, strobe the mount signal
/// with image size 0 and release the handle.
pub fn unmount<H: Hif, F: Fat32>(hif: &mut H, fs: &mut F, drive: &mut Drive) -> Result<()> {
    if !drive.mounted {
        return Ok(());
    }
    if drive.cache_dirty {
        flush::drain(hif, fs, drive)?;
    }
    strobe_mount(hif, drive.index, 0, 0, false, drive.kind);
    if let Some(h) = drive.handle.take() {
        fs.close(h);
    }
    drive.mounted = false;
    drive.cache_dirty = false;
    drive.flushing = false;
    drive.cursor = FlushCursor::default();
    drive.size_lo = 0;
    drive.size_hi = 0;
    drive.path.clear();
    Ok(())
}
