//! CRT cartridge loader.
//!
//! The cartridge container lives in external DRAM, streamed there before
//! the loader starts; the core executes out of two 8-KiB BRAMs.  The
//! loader walks the container once, publishes a bank-table entry per
//! CHIP packet, then stays resident servicing bank-switch requests by
//! copying the selected bank from DRAM into the corresponding BRAM.
//!
//! All integers in the container are big-endian; DRAM packs two file
//! bytes per word, earlier byte in the low octet.  Multi-byte fields are
//! therefore decoded with explicit big-endian types at the field site,
//! never through platform endianness.

use crate::hif::{Deadline, Hif};
use crate::mmap::{self, cart};
use crate::param;
use core::mem;
use static_assertions::const_assert_eq;
use zerocopy::byteorder::{BigEndian, U16, U32};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

/// Second 16 bytes of the container.  The header-length field is
/// authoritative for where the CHIP chain starts.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct FileHeader {
    header_len: U32<BigEndian>,
    version: U16<BigEndian>,
    hw_type: U16<BigEndian>,
    exrom: u8,
    game: u8,
    _reserved: [u8; 6],
}
const_assert_eq!(mem::size_of::<FileHeader>(), 16);

/// 16-byte header of one CHIP packet.
#[derive(FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
struct ChipHeader {
    magic: [u8; 4],
    packet_len: U32<BigEndian>,
    chip_type: U16<BigEndian>,
    bank: U16<BigEndian>,
    load_addr: U16<BigEndian>,
    image_size: U16<BigEndian>,
}
const_assert_eq!(mem::size_of::<ChipHeader>(), 16);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    Idle,
    Parsing,
    Ready,
    Error,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ParseError {
    None,
    LengthTooSmall,
    MissingCrtHeader,
    MissingChipHeader,
}

impl ParseError {
    pub fn code(self) -> u16 {
        match self {
            ParseError::None => 0,
            ParseError::LengthTooSmall => 1,
            ParseError::MissingCrtHeader => 2,
            ParseError::MissingChipHeader => 3,
        }
    }
}

pub struct Loader {
    status: Status,
    error: ParseError,
    /// File byte offset at which a parse error was detected.
    resp_addr: u32,
    /// DRAM word address of byte 0 of the container.
    dram_base: u32,
    /// Container length in bytes.
    file_len: u32,
    /// DRAM word address where the first CHIP payload begins; bank n
    /// sits `0x1008 * n` words past it.
    base: u32,
    /// File byte offset of the first CHIP payload.
    first_payload: u32,
    cart_id: u16,
    exrom: u8,
    game: u8,
    banks: u16,
    lo_active: u16,
    hi_active: u16,
    lo_pending: bool,
    hi_pending: bool,
}

impl Loader {
    pub const fn new() -> Loader {
        Loader {
            status: Status::Idle,
            error: ParseError::None,
            resp_addr: 0,
            dram_base: 0,
            file_len: 0,
            base: 0,
            first_payload: 0,
            cart_id: 0,
            exrom: 0,
            game: 0,
            banks: 0,
            lo_active: 0,
            hi_active: 0,
            lo_pending: false,
            hi_pending: false,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn error(&self) -> ParseError {
        self.error
    }

    pub fn resp_addr(&self) -> u32 {
        self.resp_addr
    }

    pub fn banks(&self) -> u16 {
        self.banks
    }

    pub fn active_banks(&self) -> (u16, u16) {
        (self.lo_active, self.hi_active)
    }

    /// Parse the container previously streamed to DRAM.
    ///
    /// `dram_addr_16w` is the container's start address in 16-word
    /// units, `file_len` its byte length.  The core is held in reset for
    /// the duration and released, unpaused, only on success; on error
    /// the status register carries the code and the byte offset of the
    /// first offending byte, and the core stays inert.
    pub fn start<H: Hif>(&mut self, hif: &mut H, dram_addr_16w: u32, file_len: u32) {
        *self = Loader::new();
        self.dram_base = dram_addr_16w * 16;
        self.file_len = file_len;

        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::FSIZE_LO, file_len as u16);
        hif.poke(cart::FSIZE_HI, (file_len >> 16) as u16);
        hif.poke(cart::ADDR_LO, dram_addr_16w as u16);
        hif.poke(cart::ADDR_HI, (dram_addr_16w >> 16) as u16);
        hif.poke(cart::STATUS, cart::ST_LOADING);

        // Give the cartridge hardware a bounded window to leave its
        // busy state, then check it has nothing to report.
        let deadline = Deadline::after_ms(hif, param::CRT_HW_TIMEOUT_MS);
        loop {
            hif.select(mmap::DEV_CART, 0);
            let hw = hif.peek(cart::HW_ERR);
            if hw != cart::HW_BUSY {
                if hw != 0 {
                    self.status = Status::Error;
                    hif.poke(cart::STATUS, cart::ST_ERROR);
                    hif.poke(cart::ERR_CODE, hw);
                    return;
                }
                break;
            }
            let now = hif.cycles();
            if deadline.is_elapsed(now) {
                break;
            }
        }

        // The machine must not execute out of half-filled BRAMs.
        let csr = hif.csr();
        hif.set_csr((csr | mmap::Csr::RESET) - mmap::Csr::UNPAUSE);

        self.status = Status::Parsing;
        self.parse(hif);
        if self.status != Status::Ready {
            return;
        }

        // Force the first LO bank so the machine has something to run.
        self.load_bank(hif, mmap::DEV_BRAM_LO, 0);
        self.lo_active = 0;
        self.hi_active = 0;

        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::STATUS, cart::ST_OK);
        let csr = hif.csr();
        hif.set_csr((csr - mmap::Csr::RESET) | mmap::Csr::UNPAUSE);
    }

    fn parse<H: Hif>(&mut self, hif: &mut H) {
        if self.file_len < param::CRT_MIN_LEN {
            return self.fail(hif, ParseError::LengthTooSmall, 0);
        }

        let mut sig = [0u8; 16];
        self.dram_read(hif, 0, &mut sig);
        if let Some(i) = mismatch(&sig, &param::CRT_SIGNATURE) {
            return self.fail(hif, ParseError::MissingCrtHeader, i as u32);
        }

        let mut raw = [0u8; 16];
        self.dram_read(hif, 0x10, &mut raw);
        let hdr: FileHeader = zerocopy::transmute!(raw);
        self.cart_id = hdr.hw_type.get();
        self.exrom = hdr.exrom;
        self.game = hdr.game;
        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::ID, self.cart_id);
        hif.poke(cart::EXROM, self.exrom as u16);
        hif.poke(cart::GAME, self.game as u16);

        // The header-length field is authoritative, trailing spaces in
        // the signature and all.
        let mut cursor = hdr.header_len.get();
        loop {
            // The cursor comes from file-supplied lengths; never let it
            // walk past the end.
            match cursor.checked_add(0x10) {
                Some(end) if end <= self.file_len => {}
                _ => return self.fail(hif, ParseError::MissingChipHeader, cursor),
            }
            let mut raw = [0u8; 16];
            self.dram_read(hif, cursor, &mut raw);
            let chip: ChipHeader = zerocopy::transmute!(raw);
            if let Some(i) = mismatch(&chip.magic, &param::CHIP_SIGNATURE) {
                return self.fail(hif, ParseError::MissingChipHeader, cursor + i as u32);
            }

            let payload = cursor + 0x10;
            if self.banks == 0 {
                self.first_payload = payload;
                self.base = self.dram_base + payload / 2;
            }
            self.publish_bank(
                hif,
                chip.load_addr.get(),
                chip.image_size.get(),
                chip.bank.get(),
                (payload - self.first_payload) / 2,
            );
            self.banks += 1;

            cursor = payload;
            let size = chip.image_size.get() as u32;
            if self.file_len - cursor >= size + 0x10 {
                cursor += size;
            } else {
                break;
            }
        }
        self.status = Status::Ready;
    }

    /// One bank-table entry, handed to the core with a one-cycle strobe.
    fn publish_bank<H: Hif>(
        &mut self,
        hif: &mut H,
        load_addr: u16,
        bank_size: u16,
        bank: u16,
        ram_offset_words: u32,
    ) {
        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::BANK_ADDR, load_addr);
        hif.poke(cart::BANK_SIZE, bank_size);
        hif.poke(cart::BANK_NUM, bank);
        hif.poke(cart::BANK_OFF_LO, ram_offset_words as u16);
        hif.poke(cart::BANK_OFF_HI, (ram_offset_words >> 16) as u16);
        hif.poke(cart::BANK_STROBE, 1);
        hif.poke(cart::BANK_STROBE, 0);
    }

    fn fail<H: Hif>(&mut self, hif: &mut H, error: ParseError, resp_addr: u32) {
        self.status = Status::Error;
        self.error = error;
        self.resp_addr = resp_addr;
        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::STATUS, cart::ST_ERROR);
        hif.poke(cart::ERR_CODE, error.code());
        hif.poke(cart::DIAG0, resp_addr as u16);
        hif.poke(cart::DIAG1, (resp_addr >> 16) as u16);
    }

    /// Per-loop housekeeping: edge-detect bank-change requests from the
    /// core and stream the selected bank in.  Requests arriving while a
    /// stream is under way stay latched in the request registers and are
    /// picked up on the next pass.
    pub fn service<H: Hif>(&mut self, hif: &mut H) {
        if self.status != Status::Ready {
            return;
        }
        hif.select(mmap::DEV_CART, 0);
        let lo_req = hif.peek(cart::BANK_LO_REQ);
        let hi_req = hif.peek(cart::BANK_HI_REQ);
        if lo_req != self.lo_active {
            self.lo_pending = true;
        }
        if hi_req != self.hi_active {
            self.hi_pending = true;
        }
        if self.lo_pending {
            self.load_bank(hif, mmap::DEV_BRAM_LO, lo_req);
            self.lo_active = lo_req;
            self.lo_pending = false;
        }
        if self.hi_pending {
            self.load_bank(hif, mmap::DEV_BRAM_HI, hi_req);
            self.hi_active = hi_req;
            self.hi_pending = false;
        }
    }

    /// Reset path: back to idle, nothing published.
    pub fn reset<H: Hif>(&mut self, hif: &mut H) {
        *self = Loader::new();
        hif.select(mmap::DEV_CART, 0);
        hif.poke(cart::STATUS, cart::ST_IDLE);
    }

    /// Stream one 8-KiB bank from DRAM into a BRAM in bursts of at most
    /// `param::BANK_BURST_BYTES`.
    fn load_bank<H: Hif>(&mut self, hif: &mut H, bram: u16, bank: u16) {
        let src = self.base + param::BANK_STRIDE_WORDS * bank as u32;
        let mut words = [0u16; param::BANK_BURST_BYTES / 2];
        let mut done: u32 = 0;
        while done < param::BANK_WORDS {
            let n = ((param::BANK_WORDS - done) as usize).min(words.len());
            let mut w = src + done;
            let mut filled = 0;
            while filled < n {
                hif.select(mmap::DEV_DRAM, (w >> 12) as u16);
                let off = (w & 0xFFF) as u16;
                let span = (n - filled).min(param::WIN_WORDS - off as usize);
                for k in 0..span {
                    words[filled + k] = hif.peek(off + k as u16);
                }
                filled += span;
                w += span as u32;
            }
            hif.select(bram, 0);
            for (k, &word) in words[..n].iter().enumerate() {
                hif.poke(done as u16 + k as u16, word);
            }
            done += n as u32;
        }
    }

    /// Read container bytes out of DRAM.  Words pack two file bytes,
    /// earlier byte in the low octet; an odd starting offset begins in
    /// the high octet.
    fn dram_read<H: Hif>(&self, hif: &mut H, byte_off: u32, dst: &mut [u8]) {
        let mut w = self.dram_base + byte_off / 2;
        let mut hi_first = byte_off % 2 == 1;
        let mut i = 0;
        let mut selected = u32::MAX;
        while i < dst.len() {
            let win = w >> 12;
            if win != selected {
                hif.select(mmap::DEV_DRAM, win as u16);
                selected = win;
            }
            let word = hif.peek((w & 0xFFF) as u16);
            if hi_first {
                dst[i] = (word >> 8) as u8;
                i += 1;
                hi_first = false;
            } else {
                dst[i] = word as u8;
                i += 1;
                if i < dst.len() {
                    dst[i] = (word >> 8) as u8;
                    i += 1;
                }
            }
            w += 1;
        }
    }
}

impl Default for Loader {
    fn default() -> Loader {
        Loader::new()
    }
}

/// Index of the first differing byte, if any.
fn mismatch(got: &[u8], want: &[u8]) -> Option<usize> {
    got.iter().zip(want).position(|(a, b)| a != b)
}
