#![allow(dead_code)]
//! Byte level model of 1-Wire memory devices, driven through the `OneWire` trait.

use std::collections::VecDeque;

use embedded_onewire::{
    OneWire, OneWireCrc, OneWireCrc16, OneWireError, OneWireResult, OneWireStatus, PowerDelivery,
};

pub const ROM: u64 = 0x5a00_0000_1234_5600;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Model {
    Ds2431,
    Ds2433,
    Ds28ec20,
    Ds1977,
    Ds2505,
    Ds2406,
    Ds2502,
    Ds2430,
    Ds2760,
    /// 16 byte scratchpad with CRC, erase command `0xC3` and an ending
    /// mask of `0x10`. Two zero bytes precede the copy completion.
    Staged,
}

impl Model {
    fn is_eprom(self) -> bool {
        matches!(self, Model::Ds2505 | Model::Ds2406 | Model::Ds2502)
    }

    fn scratch_len(self) -> usize {
        match self {
            Model::Ds2431 => 8,
            Model::Ds1977 => 64,
            Model::Staged => 16,
            Model::Ds2433 | Model::Ds28ec20 => 32,
            _ => 0,
        }
    }

    fn scratch_crc(self) -> bool {
        !matches!(self, Model::Ds2433)
    }

    fn ending_mask(self) -> u8 {
        match self {
            Model::Staged => 0x10,
            _ => 0,
        }
    }

    fn page_len(self) -> usize {
        match self {
            Model::Ds1977 => 64,
            Model::Staged => 16,
            _ => 32,
        }
    }

    fn copy_cmd(self) -> u8 {
        match self {
            Model::Ds1977 => 0x99,
            _ => 0x55,
        }
    }

    fn memory_len(self) -> usize {
        match self {
            Model::Ds2431 => 0x88,
            Model::Ds2433 => 512,
            Model::Ds28ec20 => 2560,
            Model::Ds1977 => 0x8000,
            Model::Ds2505 => 2048,
            Model::Ds2406 | Model::Ds2502 => 128,
            Model::Ds2430 => 8,
            Model::Ds2760 => 0x40,
            Model::Staged => 64,
        }
    }

    /// Status memory of EPROMs, the lock status of the DS2430 and the
    /// EEPROM behind the DS2760 shadow.
    fn status_len(self) -> usize {
        match self {
            Model::Ds2505 => 0x160,
            Model::Ds2406 | Model::Ds2502 => 8,
            Model::Ds2430 => 1,
            Model::Ds2760 => 32,
            _ => 0,
        }
    }

    fn status_page_len(self) -> usize {
        match self {
            Model::Ds2505 => 32,
            _ => 8,
        }
    }

    fn redirect_offset(self) -> usize {
        match self {
            Model::Ds2505 => 0x100,
            _ => 1,
        }
    }

    /// The main memory read sends the redirection byte of every page.
    fn redirect_extra(self) -> bool {
        matches!(self, Model::Ds2505 | Model::Ds2406)
    }

    fn crc8(self) -> bool {
        self == Model::Ds2502
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimStatus {
    presence: bool,
}

impl OneWireStatus for SimStatus {
    fn presence(&self) -> bool {
        self.presence
    }

    fn shortcircuit(&self) -> bool {
        false
    }
}

#[derive(Debug)]
enum State {
    Idle,
    MatchRom(Vec<u8>),
    Function,
    Header { cmd: u8, bytes: Vec<u8> },
    WriteScratch { offset: usize, crc: OneWireCrc16 },
    ProgramData { status: bool, addr: u16 },
    ProgramPulse { status: bool, addr: u16, data: u8 },
    RegisterWrite { addr: usize },
    Output,
    Dead,
}

impl State {
    fn accepts_input(&self) -> bool {
        matches!(
            self,
            State::Idle
                | State::MatchRom(_)
                | State::Function
                | State::Header { .. }
                | State::WriteScratch { .. }
                | State::ProgramData { .. }
                | State::RegisterWrite { .. }
        )
    }
}

/// A single device on a simulated bus.
#[derive(Debug)]
pub struct SimBus {
    pub model: Model,
    pub rom: u64,
    pub present: bool,
    pub memory: Vec<u8>,
    pub status: Vec<u8>,
    pub power: bool,
    pub program: bool,
    /// Current bus speed.
    pub overdrive: bool,
    /// Devices addressed with the overdrive Match/Skip ROM commands.
    pub overdrive_selects: usize,
    /// Reset pulses seen, one per transaction.
    pub resets: usize,
    pub copies: usize,
    pub powered_copies: usize,
    pub pulses: usize,
    /// Flip a bit of the next CRC the device sends.
    pub corrupt_next_crc: bool,
    /// Completion byte of the next successful copy.
    pub copy_status: Option<u8>,
    scratch: Vec<u8>,
    ta: u16,
    es: u8,
    armed: bool,
    state: State,
    out: VecDeque<u8>,
}

impl SimBus {
    pub fn new(model: Model) -> Self {
        let mut memory = vec![0xff; model.memory_len()];
        if model == Model::Ds2760 {
            // no block locked, lock disabled
            memory[7] = 0;
        }
        Self {
            model,
            rom: ROM | model_family(model) as u64,
            present: true,
            memory,
            status: vec![0xff; model.status_len()],
            power: false,
            program: model.is_eprom(),
            overdrive: false,
            overdrive_selects: 0,
            resets: 0,
            copies: 0,
            powered_copies: 0,
            pulses: 0,
            corrupt_next_crc: false,
            copy_status: None,
            scratch: vec![0xff; model.scratch_len()],
            ta: 0,
            es: 0,
            armed: false,
            state: State::Dead,
            out: VecDeque::new(),
        }
    }

    pub fn with_power(mut self, power: bool) -> Self {
        self.power = power;
        self
    }

    pub fn with_memory(mut self, fill: impl Fn(usize) -> u8) -> Self {
        for (i, byte) in self.memory.iter_mut().enumerate() {
            *byte = fill(i);
        }
        if self.model == Model::Ds1977 {
            // password registers and control start cleared
            self.memory[0x7fc0..0x7fd1].fill(0);
        }
        if self.model == Model::Ds2431 {
            self.memory[0x80..0x88].fill(0xff);
        }
        self
    }

    /// Scratchpad contents, from offset 0.
    pub fn scratch(&self) -> &[u8] {
        &self.scratch
    }

    /// CRC of `bytes` in the flavour of this device.
    fn crc(&self, seed: u16, bytes: &[u8]) -> u16 {
        if self.model.crc8() {
            OneWireCrc::compute(seed as u8, bytes) as u16
        } else {
            OneWireCrc16::compute(seed, bytes)
        }
    }

    fn push_crc(&mut self, crc: u16) {
        let mut trailer = if self.model.crc8() {
            vec![crc as u8]
        } else {
            (!crc).to_le_bytes().to_vec()
        };
        if self.corrupt_next_crc {
            trailer[0] ^= 0x01;
            self.corrupt_next_crc = false;
        }
        self.out.extend(trailer);
    }

    fn header_len(&self, cmd: u8) -> usize {
        match (self.model, cmd) {
            (Model::Ds2430 | Model::Ds2760, _) => 1,
            (model, 0x0f | 0x55) if model.is_eprom() => 3,
            (Model::Ds1977, 0x69 | 0xc3) => 10,
            (Model::Ds1977, 0x99) => 11,
            (_, 0x55) => 3,
            _ => 2,
        }
    }

    fn feed(&mut self, byte: u8) {
        let state = std::mem::replace(&mut self.state, State::Dead);
        self.state = match state {
            State::Idle => match (byte, self.overdrive) {
                (0x55, false) => State::MatchRom(Vec::new()),
                (0xcc, false) => State::Function,
                (0x69, true) => {
                    self.overdrive_selects += 1;
                    State::MatchRom(Vec::new())
                }
                (0x3c, true) => {
                    self.overdrive_selects += 1;
                    State::Function
                }
                _ => State::Dead,
            },
            State::MatchRom(mut bytes) => {
                bytes.push(byte);
                if bytes.len() < 8 {
                    State::MatchRom(bytes)
                } else if bytes == self.rom.to_le_bytes() {
                    State::Function
                } else {
                    State::Dead
                }
            }
            State::Function => self.command(byte),
            State::Header { cmd, mut bytes } => {
                bytes.push(byte);
                if bytes.len() == self.header_len(cmd) {
                    self.execute(cmd, &bytes)
                } else {
                    State::Header { cmd, bytes }
                }
            }
            State::WriteScratch { mut offset, mut crc } => {
                let len = self.model.scratch_len();
                if offset < len {
                    self.scratch[offset] = byte;
                    self.es = offset as u8;
                    crc.update(byte);
                    offset += 1;
                    if offset == len && self.model.scratch_crc() {
                        self.push_crc(crc.value());
                    }
                }
                State::WriteScratch { offset, crc }
            }
            State::ProgramData { status, addr } => {
                let crc = self.crc(addr, &[byte]);
                self.push_crc(crc);
                State::ProgramPulse {
                    status,
                    addr,
                    data: byte,
                }
            }
            State::RegisterWrite { addr } => {
                self.write_register(addr, byte);
                State::RegisterWrite { addr: addr + 1 }
            }
            other => other,
        };
    }

    fn command(&mut self, cmd: u8) -> State {
        let header = State::Header {
            cmd,
            bytes: Vec::new(),
        };
        match (self.model, cmd) {
            (Model::Ds2505 | Model::Ds2406, 0xa5 | 0xaa | 0x0f | 0x55) => header,
            (Model::Ds2502, 0xc3 | 0xaa | 0x0f | 0x55) => header,
            (Model::Ds2430, 0xc3 | 0x99 | 0x5a | 0x66) => header,
            (Model::Ds2760, 0xb8 | 0x69 | 0x6c | 0x48 | 0x6a) => header,
            (model, _) if model.is_eprom() || model.scratch_len() == 0 => State::Dead,
            (_, 0x0f) => header,
            (_, 0xaa) => {
                self.emit_scratchpad();
                State::Output
            }
            (model, c) if c == model.copy_cmd() => header,
            (Model::Ds1977, 0x69 | 0xc3) => header,
            (Model::Ds1977, _) => State::Dead,
            (Model::Staged, 0xc3) => header,
            (_, 0xf0) => header,
            (Model::Ds28ec20, 0xa5) => header,
            _ => State::Dead,
        }
    }

    fn execute(&mut self, cmd: u8, bytes: &[u8]) -> State {
        match self.model {
            Model::Ds2430 => return self.execute_register(cmd, bytes[0]),
            Model::Ds2760 => return self.execute_block(cmd, bytes[0]),
            _ => {}
        }
        let ta = u16::from_le_bytes([bytes[0], bytes[1]]);
        match (self.model, cmd) {
            (model, 0xa5 | 0xc3) if model.is_eprom() => {
                self.emit_eprom_main(cmd, ta as usize);
                State::Output
            }
            (model, 0xaa) if model.is_eprom() => {
                self.emit_eprom_status(ta as usize);
                State::Output
            }
            (model, _) if model.is_eprom() => {
                let crc = self.crc(0, &[cmd, bytes[0], bytes[1], bytes[2]]);
                self.push_crc(crc);
                State::ProgramPulse {
                    status: cmd == 0x55,
                    addr: ta,
                    data: bytes[2],
                }
            }
            (_, 0x0f) => {
                self.ta = ta;
                let offset = ta as usize & (self.model.scratch_len() - 1);
                State::WriteScratch {
                    offset,
                    crc: OneWireCrc16::new(OneWireCrc16::compute(0, &[cmd, bytes[0], bytes[1]])),
                }
            }
            (Model::Ds1977, 0x69) => {
                if self.read_allowed(&bytes[2..10]) {
                    self.emit_page_crc(cmd, ta as usize);
                }
                State::Output
            }
            (Model::Ds1977, 0xc3) => {
                let ta = ta as usize;
                if self.memory[ta..ta + 8] == bytes[2..10] {
                    self.out.push_back(0xaa);
                }
                State::Output
            }
            (Model::Staged, 0xc3) => {
                self.scratch.fill(0xff);
                self.ta = ta;
                self.out.push_back(0xaa);
                State::Output
            }
            (model, c) if c == model.copy_cmd() => {
                self.copy(ta, bytes[2], &bytes[3..]);
                State::Output
            }
            (_, 0xf0) => {
                self.out.extend(&self.memory[ta as usize..]);
                State::Output
            }
            (Model::Ds28ec20, 0xa5) => {
                self.emit_page_crc(cmd, ta as usize);
                State::Output
            }
            _ => State::Dead,
        }
    }

    /// DS2430 application register commands.
    fn execute_register(&mut self, cmd: u8, arg: u8) -> State {
        let addr = arg as usize;
        match cmd {
            0xc3 => {
                if addr < self.memory.len() {
                    self.out.extend(&self.memory[addr..]);
                }
                State::Output
            }
            0x99 => State::RegisterWrite { addr },
            0x5a if arg == 0xa5 => {
                self.copies += 1;
                if self.armed {
                    self.powered_copies += 1;
                }
                self.status[0] = 0xfc;
                State::Output
            }
            0x66 => {
                self.out.push_back(self.status[0]);
                State::Output
            }
            _ => State::Dead,
        }
    }

    fn block_locked(&self, block: usize) -> bool {
        self.memory[7] & (1 << ((block - 0x20) / 16)) != 0
    }

    /// DS2760 register and EEPROM block commands.
    fn execute_block(&mut self, cmd: u8, arg: u8) -> State {
        let addr = arg as usize;
        let block = matches!(arg, 0x20 | 0x30);
        match cmd {
            0xb8 if block => {
                let eeprom = self.status[addr - 0x20..addr - 0x10].to_vec();
                self.memory[addr..addr + 16].copy_from_slice(&eeprom);
                State::Output
            }
            0x69 => {
                if addr < self.memory.len() {
                    self.out.extend(&self.memory[addr..]);
                }
                State::Output
            }
            0x6c => State::RegisterWrite { addr },
            0x48 if block => {
                if !self.block_locked(addr) {
                    self.copies += 1;
                    let shadow = self.memory[addr..addr + 16].to_vec();
                    self.status[addr - 0x20..addr - 0x10].copy_from_slice(&shadow);
                }
                State::Output
            }
            0x6a if block => {
                if self.memory[7] & 0x40 != 0 {
                    self.memory[7] |= 1 << ((addr - 0x20) / 16);
                }
                State::Output
            }
            _ => State::Dead,
        }
    }

    fn write_register(&mut self, addr: usize, byte: u8) {
        if addr >= self.memory.len() {
            return;
        }
        match self.model {
            Model::Ds2430 if self.status[0] == 0xfc => {}
            // block lock bits are read only
            Model::Ds2760 if addr == 7 => self.memory[7] = (self.memory[7] & 0x03) | (byte & !0x03),
            Model::Ds2760 if addr >= 0x20 && self.block_locked(addr & !0x0f) => {}
            _ => self.memory[addr] = byte,
        }
    }

    fn passwords_enabled(&self) -> bool {
        self.model == Model::Ds1977 && self.memory[0x7fd0] == 0xaa
    }

    fn read_allowed(&self, password: &[u8]) -> bool {
        !self.passwords_enabled()
            || self.memory[0x7fc0..0x7fc8] == *password
            || self.memory[0x7fc8..0x7fd0] == *password
    }

    fn emit_scratchpad(&mut self) {
        let len = self.model.scratch_len();
        let offset = self.ta as usize & (len - 1);
        let [lo, hi] = self.ta.to_le_bytes();
        let mut bytes = vec![0xaa, lo, hi, self.es | self.model.ending_mask()];
        bytes.extend(&self.scratch[offset..]);
        self.out.extend(&bytes[1..]);
        if self.model.scratch_crc() {
            self.push_crc(OneWireCrc16::compute(0, &bytes));
        }
    }

    fn copy(&mut self, ta: u16, es: u8, password: &[u8]) {
        self.copies += 1;
        if self.armed {
            self.powered_copies += 1;
        }
        if ta != self.ta || es != self.es | self.model.ending_mask() {
            return;
        }
        if self.passwords_enabled() && self.memory[0x7fc8..0x7fd0] != *password {
            return;
        }
        let len = self.model.scratch_len();
        let row = ta as usize & !(len - 1);
        let offset = ta as usize & (len - 1);
        for i in offset..=self.es as usize {
            self.commit_byte(row + i, self.scratch[i]);
        }
        if self.model == Model::Staged {
            self.out.extend([0x00, 0x00]);
        }
        let status = self.copy_status.take().unwrap_or(0xaa);
        self.out.extend([status; 8]);
    }

    fn commit_byte(&mut self, addr: usize, value: u8) {
        if addr >= self.memory.len() {
            return;
        }
        match self.model {
            Model::Ds2431 if addr < 0x80 => match self.memory[0x80 + addr / 32] {
                0x55 => {}
                0xaa => self.memory[addr] &= value,
                _ => self.memory[addr] = value,
            },
            Model::Ds2431 if addr < 0x84 => {
                if !matches!(self.memory[addr], 0x55 | 0xaa) {
                    self.memory[addr] = value;
                }
            }
            _ => self.memory[addr] = value,
        }
    }

    fn emit_page_crc(&mut self, cmd: u8, ta: usize) {
        let pl = self.model.page_len();
        let [lo, hi] = (ta as u16).to_le_bytes();
        let mut crc = OneWireCrc16::new(0);
        crc.update_slice(&[cmd, lo, hi]);
        let mut addr = ta;
        while addr < self.memory.len() {
            let end = (addr / pl + 1) * pl;
            let page = self.memory[addr..end].to_vec();
            crc.update_slice(&page);
            self.out.extend(page);
            self.push_crc(crc.value());
            crc = OneWireCrc16::new(0);
            addr = end;
        }
    }

    fn emit_eprom_main(&mut self, cmd: u8, ta: usize) {
        let [lo, hi] = (ta as u16).to_le_bytes();
        let mut head = vec![cmd, lo, hi];
        let mut first = true;
        let mut addr = ta;
        while addr < self.memory.len() {
            let page = addr / 32;
            if self.model.redirect_extra() {
                let redirect = self.status[self.model.redirect_offset() + page];
                head.push(redirect);
                self.out.push_back(redirect);
                self.push_crc(self.crc(0, &head));
            } else if first {
                self.push_crc(self.crc(0, &head));
            }
            head.clear();
            first = false;
            let end = (page + 1) * 32;
            let data = self.memory[addr..end].to_vec();
            self.out.extend(&data);
            self.push_crc(self.crc(0, &data));
            addr = end;
        }
    }

    fn emit_eprom_status(&mut self, ta: usize) {
        let [lo, hi] = (ta as u16).to_le_bytes();
        let pl = self.model.status_page_len();
        // the DS2406 sends no CRC after the address
        let mut head = vec![0xaa, lo, hi];
        if self.model != Model::Ds2406 {
            self.push_crc(self.crc(0, &head));
            head.clear();
        }
        let mut addr = ta;
        while addr < self.status.len() {
            let end = ((addr / pl + 1) * pl).min(self.status.len());
            let data = self.status[addr..end].to_vec();
            self.out.extend(&data);
            head.extend(&data);
            self.push_crc(self.crc(0, &head));
            head.clear();
            addr = end;
        }
    }
}

fn model_family(model: Model) -> u8 {
    match model {
        Model::Ds2431 => 0x2d,
        Model::Ds2433 => 0x23,
        Model::Ds28ec20 => 0x43,
        Model::Ds1977 => 0x37,
        Model::Ds2505 => 0x0b,
        Model::Ds2406 => 0x12,
        Model::Ds2502 => 0x09,
        Model::Ds2430 => 0x14,
        Model::Ds2760 => 0x30,
        Model::Staged => 0x7e,
    }
}

impl OneWire for SimBus {
    type Status = SimStatus;
    type BusError = ();

    fn reset(&mut self) -> OneWireResult<SimStatus, ()> {
        self.resets += 1;
        self.out.clear();
        self.armed = false;
        self.state = if self.present { State::Idle } else { State::Dead };
        Ok(SimStatus {
            presence: self.present,
        })
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), ()> {
        self.feed(byte);
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, ()> {
        if let Some(byte) = self.out.pop_front() {
            return Ok(byte);
        }
        if self.state.accepts_input() {
            self.feed(0xff);
        }
        Ok(0xff)
    }

    fn write_bit(&mut self, _bit: bool) -> OneWireResult<(), ()> {
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, ()> {
        Ok(true)
    }

    fn get_overdrive_mode(&mut self) -> OneWireResult<bool, ()> {
        Ok(self.overdrive)
    }

    fn set_overdrive_mode(&mut self, enable: bool) -> OneWireResult<(), ()> {
        self.overdrive = enable;
        Ok(())
    }

    fn can_deliver_power(&self) -> bool {
        self.power
    }

    fn start_power_delivery(&mut self, _when: PowerDelivery) -> OneWireResult<(), ()> {
        if !self.power {
            return Err(OneWireError::Unimplemented);
        }
        self.armed = true;
        Ok(())
    }

    fn set_power_normal(&mut self) -> OneWireResult<(), ()> {
        self.armed = false;
        Ok(())
    }

    fn can_program(&self) -> bool {
        self.program
    }

    fn program_pulse(&mut self) -> OneWireResult<(), ()> {
        if !self.program {
            return Err(OneWireError::Unimplemented);
        }
        self.pulses += 1;
        if let State::ProgramPulse { status, addr, data } = self.state {
            let a = addr as usize;
            let result = if status {
                self.status[a] &= data;
                self.status[a]
            } else {
                let page = a / 32;
                if self.status[page / 8] & (1 << (page % 8)) != 0 {
                    self.memory[a] &= data;
                }
                self.memory[a]
            };
            self.out.push_back(result);
            self.state = State::ProgramData {
                status,
                addr: addr + 1,
            };
        }
        Ok(())
    }
}
