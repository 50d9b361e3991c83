use std::fmt::Display;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use embedded_hal::delay::DelayNs;
use embedded_onewire::OneWire;
use log::{debug, error, info};
use onewire_memory::devices::{self, DeviceProfile};
use onewire_memory::{BusSession, MAX_PAGE_LENGTH, MemoryBank, ReadProtocol};

/// Read and write the memory of a 1-Wire device behind a DS2484
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to I2C bus (e.g., /dev/i2c-1)
    #[arg(short, long)]
    path: String,
    /// ROM id of the device, in hex with the family code in the low byte.
    /// Skip ROM is used when absent.
    #[arg(short, long, value_parser = parse_rom)]
    rom: Option<u64>,
    /// Part name (e.g. DS2431), when the ROM id does not tell it
    #[arg(short, long)]
    device: Option<String>,
    /// Read access password, 16 hex digits
    #[arg(long, value_parser = parse_password)]
    read_password: Option<[u8; 8]>,
    /// Full access password, 16 hex digits
    #[arg(long, value_parser = parse_password)]
    full_password: Option<[u8; 8]>,
    /// Talk to the device at overdrive speed
    #[arg(long)]
    overdrive: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the memory banks of the device
    Info,
    /// Print the contents of a bank
    Dump {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
    },
    /// Write hex data at an address of a bank
    Write {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
        #[arg(value_parser = parse_address)]
        address: usize,
        #[arg(value_parser = parse_hex)]
        data: Bytes,
    },
    /// Read the packet stored in a page
    ReadPacket {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
        page: usize,
    },
    /// Store hex data as a packet in a page
    WritePacket {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
        page: usize,
        #[arg(value_parser = parse_hex)]
        data: Bytes,
    },
    /// Lock a page, permanently
    Lock {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
        page: usize,
    },
    /// Redirect a page to another one, permanently
    Redirect {
        #[arg(short, long, default_value_t = 0)]
        bank: usize,
        page: usize,
        to: usize,
    },
}

#[derive(Debug, Clone)]
struct Bytes(Vec<u8>);

fn parse_hex(s: &str) -> Result<Bytes, String> {
    let digits: Vec<u8> = s
        .bytes()
        .filter(|c| !c.is_ascii_whitespace() && *c != b':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err("odd number of hex digits".into());
    }
    digits
        .chunks(2)
        .map(|pair| {
            let pair = std::str::from_utf8(pair).map_err(|e| e.to_string())?;
            u8::from_str_radix(pair, 16).map_err(|e| format!("{pair}: {e}"))
        })
        .collect::<Result<_, _>>()
        .map(Bytes)
}

fn parse_password(s: &str) -> Result<[u8; 8], String> {
    let Bytes(bytes) = parse_hex(s)?;
    bytes
        .try_into()
        .map_err(|_| "a password is 8 bytes".to_string())
}

fn parse_rom(s: &str) -> Result<u64, String> {
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_address(s: &str) -> Result<usize, String> {
    match s.strip_prefix("0x") {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => s.parse(),
    }
    .map_err(|e| e.to_string())
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect::<Vec<_>>().join(" ")
}

fn profile(args: &Args) -> Result<&'static DeviceProfile, String> {
    if let Some(name) = &args.device {
        return devices::by_name(name).ok_or_else(|| format!("unknown device {name}"));
    }
    let family = args
        .rom
        .map(|rom| rom as u8)
        .ok_or("either --rom or --device is needed")?;
    devices::by_family(family).ok_or_else(|| format!("no memory map for family 0x{family:02x}"))
}

fn fail<E: Display>(what: &'static str) -> impl FnOnce(E) -> String {
    move |e| format!("{what}: {e}")
}

fn info<O: OneWire, D: DelayNs>(
    session: &mut BusSession<'_, O, D>,
    device: &DeviceProfile,
) -> Result<(), String>
where
    O::BusError: core::fmt::Debug,
{
    println!("{}", device.name);
    for (index, config) in device.banks.iter().enumerate() {
        let bank = MemoryBank::new(config);
        println!(
            "[{index}] {}: 0x{:04x}, {} pages of {} bytes{}{}{}",
            bank.description(),
            bank.start_physical_address(),
            bank.number_pages(),
            bank.page_length(),
            if bank.is_read_only() { ", read-only" } else { "" },
            if bank.has_page_auto_crc() { ", CRC pages" } else { "" },
            if bank.needs_program_pulse() { ", EPROM" } else { "" },
        );
        if let Some(extra) = bank.extra_info_description() {
            println!("    {} byte(s) of extra information: {extra}", bank.extra_info_length());
        }
        if bank.can_lock_page() {
            let mut locked = Vec::new();
            for page in 0..bank.number_pages() {
                if bank
                    .is_page_locked(session, page)
                    .map_err(fail("lock status"))?
                {
                    locked.push(page);
                }
            }
            println!("    locked pages: {locked:?}");
        }
    }
    Ok(())
}

fn dump<O: OneWire, D: DelayNs>(
    session: &mut BusSession<'_, O, D>,
    bank: &MemoryBank<'_>,
) -> Result<(), String>
where
    O::BusError: core::fmt::Debug,
{
    let pl = bank.page_length();
    let mut buf = [0; MAX_PAGE_LENGTH];
    // recalled blocks and the scratchpad are read one page at a time
    let streams = matches!(
        bank.config().read_protocol(),
        ReadProtocol::Memory { .. } | ReadProtocol::PageCrc { .. } | ReadProtocol::Register { .. }
    );
    for page in 0..bank.number_pages() {
        let page_buf = &mut buf[..pl];
        // stream the bank in one transaction unless pages may be redirected
        let result = if page == 0 || !streams || bank.can_redirect_page() {
            bank.read_page(session, page, page_buf)
        } else if bank.has_page_auto_crc() {
            bank.read_page_crc_continue(session, page, page_buf, None)
        } else {
            bank.read_continue(session, page * pl, page_buf)
        };
        result.map_err(fail("read"))?;
        println!("{:04x}: {}", bank.start_physical_address() as usize + page * pl, hex(page_buf));
    }
    Ok(())
}

fn run(args: Args) -> Result<(), String> {
    let device = profile(&args)?;
    info!("{} at {:x?}", device.name, args.rom);
    let i2c = linux_embedded_hal::I2cdev::new(&args.path).map_err(fail("open I2C bus"))?;
    let mut ds2484 = ds2484::Ds2484Builder::default()
        .build(i2c, linux_embedded_hal::Delay)
        .map_err(fail("DS2484"))?;
    let mut session =
        BusSession::begin(&mut ds2484, linux_embedded_hal::Delay, args.rom).with_overdrive(args.overdrive);
    if let Some(password) = args.read_password {
        session = session.with_read_password(password);
    }
    if let Some(password) = args.full_password {
        session = session.with_full_password(password);
    }
    let bank_of = |index: usize| {
        device
            .banks
            .get(index)
            .map(|config| MemoryBank::new(config))
            .ok_or_else(|| format!("{} has {} banks", device.name, device.banks.len()))
    };
    match args.command {
        Command::Info => info(&mut session, device)?,
        Command::Dump { bank } => dump(&mut session, &bank_of(bank)?)?,
        Command::Write { bank, address, data } => {
            bank_of(bank)?
                .write(&mut session, address, &data.0)
                .map_err(fail("write"))?;
            info!("Wrote {} bytes at 0x{address:x}", data.0.len());
        }
        Command::ReadPacket { bank, page } => {
            let mut buf = [0; MAX_PAGE_LENGTH];
            let len = bank_of(bank)?
                .read_page_packet(&mut session, page, &mut buf)
                .map_err(fail("read packet"))?;
            println!("{}", hex(&buf[..len]));
        }
        Command::WritePacket { bank, page, data } => {
            bank_of(bank)?
                .write_page_packet(&mut session, page, &data.0)
                .map_err(fail("write packet"))?;
            debug!("Packet of {} bytes in page {page}", data.0.len());
        }
        Command::Lock { bank, page } => bank_of(bank)?
            .lock_page(&mut session, page)
            .map_err(fail("lock"))?,
        Command::Redirect { bank, page, to } => bank_of(bank)?
            .redirect_page(&mut session, page, to)
            .map_err(fail("redirect"))?,
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::init();
    // Parse command line arguments
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
