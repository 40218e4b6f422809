//! Shared harness: a mock hardware façade that plays the emulated
//! core's side of the register protocols, and a mock FAT32 volume.

#![allow(dead_code)]

use shell::hif::Hif;
use shell::mmap::{self, cart, drive as dreg, Csr};
use shell::param;
use shell::sdcard::{DiskError, Fat32, Handle};
use shell::shell::Shell;

const WIN: usize = param::WIN_WORDS;
const IMAGE_CAP: usize = 1 << 20;

/// One observed rising edge of a drive's mount bit, with the
/// auxiliaries as they were latched.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct MountPulse {
    pub drive: usize,
    pub size_lo: u16,
    pub size_hi: u16,
    pub read_only: bool,
    pub kind: u16,
}

/// One observed bank-table strobe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BankEntry {
    pub load_addr: u16,
    pub bank_size: u16,
    pub bank: u16,
    pub ram_offset: u32,
}

enum Target {
    DriveRegs(usize),
    Image(usize),
    Dram,
    BramLo,
    BramHi,
    Cart,
    Config,
}

pub struct MockHif {
    dev: u16,
    win: u16,
    pub drive_regs: Vec<[u16; 32]>,
    pub drive_buf: Vec<Vec<u8>>,
    pub images: Vec<Vec<u8>>,
    pub dram: Vec<u16>,
    pub bram_lo: Vec<u16>,
    pub bram_hi: Vec<u16>,
    pub cart_regs: [u16; 32],
    pub config_regs: [u16; 4],
    pub csr: Csr,
    cycles: u32,
    pub cycle_step: u32,
    pub mount_pulses: Vec<MountPulse>,
    pub bank_entries: Vec<BankEntry>,
    /// (drive, new level) per ack transition.
    pub ack_edges: Vec<(usize, u16)>,
    pub trace_out: Vec<u8>,
}

impl MockHif {
    pub fn new() -> MockHif {
        MockHif {
            dev: 0,
            win: 0,
            drive_regs: vec![[0; 32]; param::NDRIVES],
            drive_buf: vec![vec![0; param::XFER_MAX]; param::NDRIVES],
            images: vec![vec![0; IMAGE_CAP]; param::NDRIVES],
            dram: vec![0; 1 << 17],
            bram_lo: vec![0; WIN],
            bram_hi: vec![0; WIN],
            cart_regs: [0; 32],
            config_regs: [0; 4],
            csr: Csr::empty(),
            cycles: 0,
            cycle_step: 1000,
            mount_pulses: Vec::new(),
            bank_entries: Vec::new(),
            ack_edges: Vec::new(),
            trace_out: Vec::new(),
        }
    }

    fn target(&self) -> Target {
        let d = self.dev;
        let n = param::NDRIVES as u16;
        if (mmap::DEV_DRIVE_BASE..mmap::DEV_DRIVE_BASE + n).contains(&d) {
            Target::DriveRegs((d - mmap::DEV_DRIVE_BASE) as usize)
        } else if (mmap::DEV_IMAGE_BASE..mmap::DEV_IMAGE_BASE + n).contains(&d) {
            Target::Image((d - mmap::DEV_IMAGE_BASE) as usize)
        } else if d == mmap::DEV_DRAM {
            Target::Dram
        } else if d == mmap::DEV_BRAM_LO {
            Target::BramLo
        } else if d == mmap::DEV_BRAM_HI {
            Target::BramHi
        } else if d == mmap::DEV_CART {
            Target::Cart
        } else if d == mmap::DEV_CONFIG {
            Target::Config
        } else {
            panic!("access to unmapped device {:#06x}", d);
        }
    }

    fn linear(&self, offset: u16) -> usize {
        self.win as usize * WIN + offset as usize
    }

    /// Core raises a read request: `size` bytes from image byte
    /// address `start` into its internal buffer.
    pub fn raise_read(&mut self, n: usize, start: u32, size: u16) {
        let regs = &mut self.drive_regs[n];
        regs[dreg::SD_RD as usize] = 1;
        regs[dreg::BYTES_LO as usize] = start as u16;
        regs[dreg::BYTES_HI as usize] = (start >> 16) as u16;
        regs[dreg::SIZE_BYTES as usize] = size;
        regs[dreg::WIN4K as usize] = (start >> 12) as u16;
        regs[dreg::OFF4K as usize] = (start & 0xFFF) as u16;
    }

    /// Core raises a write request with `data` already in its internal
    /// buffer.
    pub fn raise_write(&mut self, n: usize, start: u32, data: &[u8]) {
        self.drive_buf[n][..data.len()].copy_from_slice(data);
        let regs = &mut self.drive_regs[n];
        regs[dreg::SD_WR as usize] = 1;
        regs[dreg::BYTES_LO as usize] = start as u16;
        regs[dreg::BYTES_HI as usize] = (start >> 16) as u16;
        regs[dreg::SIZE_BYTES as usize] = data.len() as u16;
        regs[dreg::WIN4K as usize] = (start >> 12) as u16;
        regs[dreg::OFF4K as usize] = (start & 0xFFF) as u16;
    }

    /// Model the hardware quiet-period timer.
    pub fn set_cache_ready(&mut self, n: usize, ready: bool) {
        self.drive_regs[n][dreg::CACHE_READY as usize] = ready as u16;
    }

    pub fn core_buf(&self, n: usize) -> &[u8] {
        &self.drive_buf[n]
    }

    pub fn image(&self, n: usize) -> &[u8] {
        &self.images[n]
    }

    /// Pack a byte stream into DRAM words, earlier byte in the low
    /// octet, starting at a word address.
    pub fn load_dram_bytes(&mut self, word_addr: u32, bytes: &[u8]) {
        for (i, pair) in bytes.chunks(2).enumerate() {
            let lo = pair[0] as u16;
            let hi = if pair.len() > 1 { pair[1] as u16 } else { 0 };
            self.dram[word_addr as usize + i] = hi << 8 | lo;
        }
    }

    pub fn bram_lo_bytes(&self) -> Vec<u8> {
        words_to_bytes(&self.bram_lo)
    }

    pub fn bram_hi_bytes(&self) -> Vec<u8> {
        words_to_bytes(&self.bram_hi)
    }

    pub fn cart_reg(&self, offset: u16) -> u16 {
        self.cart_regs[offset as usize]
    }
}

pub fn words_to_bytes(words: &[u16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(words.len() * 2);
    for &w in words {
        out.push(w as u8);
        out.push((w >> 8) as u8);
    }
    out
}

impl Hif for MockHif {
    fn select(&mut self, dev: u16, window: u16) {
        self.dev = dev;
        self.win = window;
    }

    fn peek(&mut self, offset: u16) -> u16 {
        match self.target() {
            Target::DriveRegs(n) => {
                if offset == dreg::BUF_DIN {
                    let addr = self.drive_regs[n][dreg::BUF_ADDR as usize] as usize;
                    self.drive_buf[n][addr] as u16
                } else {
                    self.drive_regs[n][offset as usize]
                }
            }
            Target::Image(n) => self.images[n][self.linear(offset)] as u16,
            Target::Dram => self.dram[self.linear(offset)],
            Target::BramLo => self.bram_lo[offset as usize],
            Target::BramHi => self.bram_hi[offset as usize],
            Target::Cart => self.cart_regs[offset as usize],
            Target::Config => self.config_regs[offset as usize],
        }
    }

    fn poke(&mut self, offset: u16, word: u16) {
        match self.target() {
            Target::DriveRegs(n) => {
                let old = self.drive_regs[n][offset as usize];
                self.drive_regs[n][offset as usize] = word;
                match offset {
                    dreg::BUF_WREN if old == 0 && word == 1 => {
                        let addr = self.drive_regs[n][dreg::BUF_ADDR as usize] as usize;
                        self.drive_buf[n][addr] =
                            self.drive_regs[n][dreg::BUF_DOUT as usize] as u8;
                    }
                    dreg::MOUNT if old == 0 && word == 1 => {
                        let regs = &self.drive_regs[n];
                        self.mount_pulses.push(MountPulse {
                            drive: n,
                            size_lo: regs[dreg::IMG_SIZE_LO as usize],
                            size_hi: regs[dreg::IMG_SIZE_HI as usize],
                            read_only: regs[dreg::RO as usize] != 0,
                            kind: regs[dreg::TYPE as usize],
                        });
                    }
                    dreg::ACK if old != word => {
                        self.ack_edges.push((n, word));
                        if word == 1 {
                            // The core drops its request once acknowledged.
                            self.drive_regs[n][dreg::SD_RD as usize] = 0;
                            self.drive_regs[n][dreg::SD_WR as usize] = 0;
                        }
                    }
                    _ => {}
                }
            }
            Target::Image(n) => {
                let addr = self.linear(offset);
                self.images[n][addr] = word as u8;
            }
            Target::Dram => {
                let addr = self.linear(offset);
                self.dram[addr] = word;
            }
            Target::BramLo => self.bram_lo[offset as usize] = word,
            Target::BramHi => self.bram_hi[offset as usize] = word,
            Target::Cart => {
                let old = self.cart_regs[offset as usize];
                self.cart_regs[offset as usize] = word;
                if offset == cart::BANK_STROBE && old == 0 && word == 1 {
                    let r = &self.cart_regs;
                    self.bank_entries.push(BankEntry {
                        load_addr: r[cart::BANK_ADDR as usize],
                        bank_size: r[cart::BANK_SIZE as usize],
                        bank: r[cart::BANK_NUM as usize],
                        ram_offset: (r[cart::BANK_OFF_HI as usize] as u32) << 16
                            | r[cart::BANK_OFF_LO as usize] as u32,
                    });
                }
            }
            Target::Config => self.config_regs[offset as usize] = word,
        }
    }

    fn csr(&mut self) -> Csr {
        self.csr
    }

    fn set_csr(&mut self, csr: Csr) {
        self.csr = csr;
    }

    fn cycles(&mut self) -> u32 {
        self.cycles = self.cycles.wrapping_add(self.cycle_step);
        self.cycles
    }

    fn keys(&mut self) -> u16 {
        0
    }

    fn trace_byte(&mut self, b: u8) {
        self.trace_out.push(b);
    }
}

pub struct MockFile {
    pub name: Vec<u8>,
    pub data: Vec<u8>,
    pos: usize,
    pub writes: usize,
    pub flushes: usize,
}

pub struct MockFs {
    pub files: Vec<MockFile>,
    pub mounted: bool,
    pub mount_calls: u32,
    pub fail_card: bool,
    pub fail_seek: bool,
    pub fail_write: bool,
    pub fail_flush: bool,
}

impl MockFs {
    pub fn new() -> MockFs {
        MockFs {
            files: Vec::new(),
            mounted: false,
            mount_calls: 0,
            fail_card: false,
            fail_seek: false,
            fail_write: false,
            fail_flush: false,
        }
    }

    pub fn with_file(mut self, name: &[u8], data: Vec<u8>) -> MockFs {
        self.files.push(MockFile {
            name: name.to_vec(),
            data,
            pos: 0,
            writes: 0,
            flushes: 0,
        });
        self
    }

    pub fn file(&self, name: &[u8]) -> &MockFile {
        self.files
            .iter()
            .find(|f| f.name == name)
            .expect("no such mock file")
    }
}

impl Fat32 for MockFs {
    fn card_mount(&mut self, _partition: u8) -> Result<(), DiskError> {
        if self.fail_card {
            return Err(DiskError::NoCard);
        }
        self.mounted = true;
        self.mount_calls += 1;
        Ok(())
    }

    fn open(&mut self, path: &[u8]) -> Result<Handle, DiskError> {
        match self.files.iter_mut().enumerate().find(|(_, f)| f.name == path) {
            Some((i, f)) => {
                f.pos = 0;
                Ok(Handle(i as u16))
            }
            None => Err(DiskError::NotFound),
        }
    }

    fn close(&mut self, _h: Handle) {}

    fn size(&self, h: Handle) -> Result<(u16, u16), DiskError> {
        let f = self.files.get(h.0 as usize).ok_or(DiskError::InvalidHandle)?;
        Ok((f.data.len() as u16, (f.data.len() >> 16) as u16))
    }

    fn seek(&mut self, h: Handle, lo: u16, hi: u16) -> Result<(), DiskError> {
        if self.fail_seek {
            return Err(DiskError::Io);
        }
        let f = self
            .files
            .get_mut(h.0 as usize)
            .ok_or(DiskError::InvalidHandle)?;
        let pos = ((hi as u32) << 16 | lo as u32) as usize;
        if pos > f.data.len() {
            return Err(DiskError::Io);
        }
        f.pos = pos;
        Ok(())
    }

    fn read_byte(&mut self, h: Handle) -> Result<Option<u8>, DiskError> {
        let f = self
            .files
            .get_mut(h.0 as usize)
            .ok_or(DiskError::InvalidHandle)?;
        if f.pos >= f.data.len() {
            return Ok(None);
        }
        let b = f.data[f.pos];
        f.pos += 1;
        Ok(Some(b))
    }

    fn write_byte(&mut self, h: Handle, b: u8) -> Result<(), DiskError> {
        if self.fail_write {
            return Err(DiskError::Io);
        }
        let f = self
            .files
            .get_mut(h.0 as usize)
            .ok_or(DiskError::InvalidHandle)?;
        if f.pos == f.data.len() {
            f.data.push(b);
        } else {
            f.data[f.pos] = b;
        }
        f.pos += 1;
        f.writes += 1;
        Ok(())
    }

    fn flush(&mut self, h: Handle) -> Result<(), DiskError> {
        if self.fail_flush {
            return Err(DiskError::Io);
        }
        let f = self
            .files
            .get_mut(h.0 as usize)
            .ok_or(DiskError::InvalidHandle)?;
        f.flushes += 1;
        Ok(())
    }
}

/// A 35-track disk image with a recognisable pattern.
pub fn d64_image() -> Vec<u8> {
    (0..174_848u32).map(|i| (i % 251) as u8).collect()
}

/// Build a CRT container: standard 0x40-byte file header followed by
/// one CHIP packet per (load address, bank number, payload) triple.
pub fn crt_file(chips: &[(u16, u16, &[u8])]) -> Vec<u8> {
    let mut f = Vec::new();
    f.extend_from_slice(b"C64 CARTRIDGE   ");
    f.extend_from_slice(&0x40u32.to_be_bytes()); // header length
    f.extend_from_slice(&0x0100u16.to_be_bytes()); // version
    f.extend_from_slice(&0x0013u16.to_be_bytes()); // cartridge type
    f.push(1); // exrom
    f.push(0); // game
    f.extend_from_slice(&[0u8; 6]);
    f.extend_from_slice(&[0u8; 0x20]); // pad to the 0x40 header length
    for &(load, bank, payload) in chips {
        f.extend_from_slice(b"CHIP");
        f.extend_from_slice(&(payload.len() as u32 + 0x10).to_be_bytes());
        f.extend_from_slice(&0u16.to_be_bytes()); // ROM chip
        f.extend_from_slice(&bank.to_be_bytes());
        f.extend_from_slice(&load.to_be_bytes());
        f.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        f.extend_from_slice(payload);
    }
    f
}

/// An 8-KiB bank payload with a per-bank pattern.
pub fn bank_payload(seed: u8) -> Vec<u8> {
    (0..param::BANK_BYTES)
        .map(|i| seed.wrapping_add((i % 253) as u8))
        .collect()
}

/// A shell over the mocks, with the card mounted and settings loaded.
pub fn booted_shell(fs: MockFs) -> Shell<MockHif, MockFs> {
    let mut s = Shell::new(MockHif::new(), fs);
    s.init().expect("init");
    s
}
