//! Parses Roland S-10 DT1 SysEx dumps into a [`qd_sample::Sample`].
//!
//! Bytes outside an active `F0..F7` envelope are ignored. Within a message,
//! a bad manufacturer/model/command ID abandons that message only — the
//! next `F0` resets cleanly, matching a malformed dump's ability to still
//! yield whatever valid messages it contains.

use qd_sample::{Bank, LoopMode, SampleRate, SamplingStructure, ScanMode};

const MANUFACTURER_ROLAND: u8 = 0x41;
const MODEL_S10: u8 = 0x10;
const COMMAND_DT1: u8 = 0x12;
const VALID_COMMANDS: [u8; 9] = [0x11, 0x12, 0x40, 0x41, 0x42, 0x43, 0x45, 0x4E, 0x4F];

/// Word capacity of [`qd_sample::Sample::memory`] — the hard ceiling wave
/// data decoding will not write past.
const S10_MEMORY_MAX: usize = qd_sample::MEMORY_BYTES / 2;

/// A second wave-parameter block, when present in the same message, starts
/// this many bytes into the payload.
const PARAM_BLOCK_STRIDE: usize = 0x49;

/// Byte offset (relative to payload start) where the 24-byte nibblized
/// address block begins.
const ADDR_BLOCK_START: usize = 0x11;

enum Dispatch {
    WaveParam,
    WaveData { addr0: u8, addr1: u8, addr2: u8 },
    Performance,
    Unrecognized,
}

struct InMessage {
    counter: usize,
    command: u8,
    address: [u8; 3],
    payload: Vec<u8>,
    aborted: bool,
}

impl InMessage {
    fn new() -> Self {
        InMessage { counter: 0, command: 0, address: [0; 3], payload: Vec::new(), aborted: false }
    }

    fn abort(&mut self, reason: &str) {
        self.aborted = true;
        log::warn!("abandoning sysex message: {reason}");
    }

    fn push(&mut self, byte: u8) {
        if self.aborted {
            return;
        }
        match self.counter {
            0 if byte != MANUFACTURER_ROLAND => self.abort("non-Roland manufacturer id"),
            1 if byte > 0x0F => self.abort("channel out of range"),
            2 if byte != MODEL_S10 => self.abort("unexpected model id"),
            3 => {
                self.command = byte;
                if !VALID_COMMANDS.contains(&byte) {
                    self.abort("unrecognized command id");
                }
            }
            4..=6 => self.address[self.counter - 4] = byte,
            _ => self.payload.push(byte),
        }
        self.counter += 1;
    }

    fn dispatch(&self) -> Dispatch {
        let combined =
            (u32::from(self.address[0]) << 16) | (u32::from(self.address[1]) << 8) | u32::from(self.address[2]);
        if (0x010000..=0x010048).contains(&combined)
            || (0x010049..=0x010111).contains(&combined)
            || (0x010112..=0x01015A).contains(&combined)
            || (0x01015B..=0x010224).contains(&combined)
        {
            Dispatch::WaveParam
        } else if self.address[0] == 0x01 && self.address[1] == 0x08 {
            Dispatch::Performance
        } else if (0x02..=0x11).contains(&self.address[0]) {
            Dispatch::WaveData { addr0: self.address[0], addr1: self.address[1], addr2: self.address[2] }
        } else {
            Dispatch::Unrecognized
        }
    }
}

/// Push-model SysEx parser: feed bytes in order, read out the accumulated
/// [`qd_sample::Sample`] when done.
pub struct SysexReader {
    sample: qd_sample::Sample,
    current: Option<InMessage>,
}

impl Default for SysexReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SysexReader {
    #[must_use]
    pub fn new() -> Self {
        SysexReader { sample: qd_sample::Sample::blank(), current: None }
    }

    pub fn push_byte(&mut self, byte: u8) {
        match byte {
            0xF0 => self.current = Some(InMessage::new()),
            0xF7 => {
                if let Some(msg) = self.current.take() {
                    self.finalize(msg);
                }
            }
            _ => {
                if let Some(msg) = self.current.as_mut() {
                    msg.push(byte);
                }
            }
        }
    }

    fn finalize(&mut self, msg: InMessage) {
        if msg.aborted || msg.command != COMMAND_DT1 {
            return;
        }
        match msg.dispatch() {
            Dispatch::WaveParam => {
                let mut block_start = 0;
                while block_start < msg.payload.len() {
                    apply_wave_param_block(&mut self.sample, &msg.payload[block_start..]);
                    block_start += PARAM_BLOCK_STRIDE;
                }
            }
            Dispatch::WaveData { addr0, addr1, addr2 } => {
                apply_wave_data(&mut self.sample, addr0, addr1, addr2, &msg.payload);
            }
            Dispatch::Performance => {
                log::trace!("ignoring performance parameter message");
            }
            Dispatch::Unrecognized => {
                log::debug!("unrecognized DT1 address {:02X}{:02X}{:02X}", msg.address[0], msg.address[1], msg.address[2]);
            }
        }
    }

    /// Consume the reader and return the sample assembled so far.
    #[must_use]
    pub fn into_sample(self) -> qd_sample::Sample {
        self.sample
    }
}

/// Feed `data` through a fresh [`SysexReader`] and return the result.
#[must_use]
pub fn read(data: &[u8]) -> qd_sample::Sample {
    let mut reader = SysexReader::new();
    for &byte in data {
        reader.push_byte(byte);
    }
    reader.into_sample()
}

fn filesafe_byte(b: u8) -> u8 {
    let printable = (0x20..=0x7E).contains(&b);
    let reserved = matches!(b, b'/' | b'\\' | b':' | b'*' | b'?' | b'"' | b'<' | b'>' | b'|');
    if printable && !reserved {
        b
    } else {
        b' '
    }
}

fn nibble_value(chunk: &[u8], start: usize) -> Option<u32> {
    let bytes = chunk.get(start..start + 4)?;
    Some(
        (u32::from(bytes[0] & 0x0F) << 12)
            | (u32::from(bytes[1] & 0x0F) << 8)
            | (u32::from(bytes[2] & 0x0F) << 4)
            | u32::from(bytes[3] & 0x0F),
    )
}

fn resolve_end(raw_end: u32, start: u32) -> u32 {
    let end = if raw_end > 65_535 { raw_end - 65_536 } else { raw_end };
    end.wrapping_sub(start)
}

fn apply_wave_param_block(sample: &mut qd_sample::Sample, chunk: &[u8]) {
    if chunk.len() <= 0x0E {
        log::debug!("wave parameter block too short to parse");
        return;
    }

    let name: Vec<u8> = (0..=0x08).map(|i| filesafe_byte(chunk[i])).collect();
    sample.tone_name = String::from_utf8_lossy(&name).trim_end().to_string();

    if let Ok(structure) = SamplingStructure::from_index(chunk[0x09]) {
        sample.sampling_structure = structure;
    } else {
        log::debug!("invalid sampling structure index {:#04x}", chunk[0x09]);
    }

    let dest_bank = chunk[0x0A] as usize;
    if dest_bank >= sample.banks.len() {
        log::debug!("destination bank {dest_bank} out of range");
        return;
    }

    let sample_rate = SampleRate::from_bit(chunk[0x0B] & 0x01 != 0);
    let loop_mode = LoopMode::try_from((chunk[0x0C] >> 2) & 0x03).unwrap_or(LoopMode::OneShot);
    let scan_mode = ScanMode::try_from(chunk[0x0C] & 0x03).unwrap_or(ScanMode::Forward);
    let rec_key = (chunk[0x0D] & 0x0F) | ((chunk[0x0E] & 0x0F) << 4);

    let Some(raw_start) = nibble_value(chunk, ADDR_BLOCK_START) else {
        log::debug!("wave parameter block missing address block");
        return;
    };
    let raw_manual_loop = nibble_value(chunk, ADDR_BLOCK_START + 0x04).unwrap_or(0);
    let raw_manual_end = nibble_value(chunk, ADDR_BLOCK_START + 0x08).unwrap_or(0);
    let raw_auto_loop = nibble_value(chunk, ADDR_BLOCK_START + 0x0C).unwrap_or(0);
    let raw_auto_end = nibble_value(chunk, ADDR_BLOCK_START + 0x10).unwrap_or(0);
    let tail_manual = chunk.get(ADDR_BLOCK_START + 0x14).copied().unwrap_or(0);
    let tail_auto = chunk.get(ADDR_BLOCK_START + 0x15).copied().unwrap_or(0);

    let full_manual_loop = (u32::from(tail_manual & 0x03) << 16) | raw_manual_loop;
    let full_manual_end = (u32::from((tail_manual >> 2) & 0x03) << 16) | raw_manual_end;
    let full_auto_loop = (u32::from(tail_auto & 0x03) << 16) | raw_auto_loop;
    let full_auto_end = (u32::from((tail_auto >> 2) & 0x03) << 16) | raw_auto_end;

    let bank = Bank {
        loop_mode,
        scan_mode,
        rec_key,
        sample_rate,
        start: raw_start,
        manual_loop_length: full_manual_loop.wrapping_sub(1),
        manual_end: resolve_end(full_manual_end, raw_start),
        auto_loop_length: full_auto_loop.wrapping_sub(1),
        auto_end: resolve_end(full_auto_end, raw_start),
    };

    if let Err(err) = bank.validate() {
        log::debug!("decoded bank fails address invariants: {err}");
    }
    sample.banks[dest_bank] = bank;
}

fn apply_wave_data(sample: &mut qd_sample::Sample, addr0: u8, addr1: u8, addr2: u8, payload: &[u8]) {
    let local = u32::from(addr0 - 0x02);
    let bank = (addr0 - 0x02) >> 2;
    let start_position = ((local << 14) | (u32::from(addr1) << 7) | u32::from(addr2)) as usize;
    log::trace!("wave data for bank {bank}, starting position {start_position}");

    let mut position = start_position;
    for pair in payload.chunks_exact(2) {
        if position >= S10_MEMORY_MAX {
            log::debug!("wave data position {position} exceeds memory, stopping");
            break;
        }
        let prev = pair[0];
        let cur = pair[1];
        let sample_data = (u16::from(prev & 0x7F) << 7) | u16::from(cur & 0x7C);
        sample.write_word(position, sample_data);
        position += 1;
    }
}
