mod common;

use common::{Model, SimBus, init_logging};
use embedded_hal_mock::eh1::delay::NoopDelay;
use onewire_memory::{BusSession, MemoryBank, MemoryError, devices};

#[test]
fn application_register_is_written_in_place() {
    init_logging();
    let mut bus = SimBus::new(Model::Ds2430).with_power(true);
    let bank = MemoryBank::new(&devices::DS2430_APPLICATION);
    {
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        bank.write(&mut session, 2, &[0x11, 0x22, 0x33]).unwrap();
        let mut buf = [0; 8];
        let mut extra = [0; 1];
        bank.read_page_extra(&mut session, 0, &mut buf, &mut extra)
            .unwrap();
        assert_eq!(buf, [0xff, 0xff, 0x11, 0x22, 0x33, 0xff, 0xff, 0xff]);
        assert_eq!(extra, [0xff]);
        assert!(!bank.is_page_locked(&mut session, 0).unwrap());
    }
    assert_eq!(bus.memory[2..5], [0x11, 0x22, 0x33]);
    assert_eq!(bus.copies, 0);
}

#[test]
fn application_register_needs_a_strong_pullup() {
    let mut bus = SimBus::new(Model::Ds2430);
    let bank = MemoryBank::new(&devices::DS2430_APPLICATION);
    {
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        assert!(matches!(
            bank.write(&mut session, 0, &[0]),
            Err(MemoryError::Unsupported(_))
        ));
        assert!(matches!(
            bank.lock_page(&mut session, 0),
            Err(MemoryError::Unsupported(_))
        ));
    }
    assert_eq!(bus.memory[0], 0xff);
    assert_eq!(bus.copies, 0);
}

#[test]
fn copy_and_lock_freezes_the_register() {
    let mut bus = SimBus::new(Model::Ds2430).with_power(true);
    {
        let bank = MemoryBank::new(&devices::DS2430_APPLICATION);
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        bank.write(&mut session, 0, b"app").unwrap();
        bank.lock_page(&mut session, 0).unwrap();
        assert!(bank.is_page_locked(&mut session, 0).unwrap());
        assert_eq!(
            bank.write(&mut session, 4, &[0]),
            Err(MemoryError::PageLocked(0))
        );
    }
    assert_eq!(bus.powered_copies, 1);
    assert_eq!(bus.status[0], 0xfc);
    {
        let bank = MemoryBank::new(&devices::DS2430_APPLICATION);
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        assert_eq!(
            bank.write(&mut session, 4, &[0]),
            Err(MemoryError::PageLocked(0))
        );
        let mut buf = [0; 8];
        let mut extra = [0; 1];
        bank.read_page_extra(&mut session, 0, &mut buf, &mut extra)
            .unwrap();
        assert_eq!(&buf[..3], b"app");
        assert_eq!(extra, [0xfc]);
    }
    assert_eq!(bus.memory[4], 0xff);
}

#[test]
fn eeprom_blocks_are_written_whole() {
    init_logging();
    let mut bus = SimBus::new(Model::Ds2760);
    let bank = MemoryBank::new(&devices::DS2760_EEPROM);
    let data = [1, 2, 3, 4, 5, 6, 7, 8];
    {
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        bank.write(&mut session, 12, &data).unwrap();
        let mut buf = [0; 10];
        bank.read(&mut session, 10, &mut buf).unwrap();
        assert_eq!(buf[..2], [0xff, 0xff]);
        assert_eq!(buf[2..], data);
        assert!(matches!(
            bank.read_continue(&mut session, 20, &mut buf),
            Err(MemoryError::Unsupported(_))
        ));
    }
    assert_eq!(bus.copies, 2);
    assert_eq!(bus.status[12..20], data);
    assert_eq!(bus.status[..12], [0xff; 12]);
    assert_eq!(bus.status[20..], [0xff; 12]);
}

#[test]
fn reads_recall_the_eeprom() {
    let mut bus = SimBus::new(Model::Ds2760);
    bus.status[16..32].copy_from_slice(b"recalled from ee");
    let bank = MemoryBank::new(&devices::DS2760_EEPROM);
    {
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        let mut page = [0; 16];
        bank.read_page(&mut session, 1, &mut page).unwrap();
        assert_eq!(&page, b"recalled from ee");
    }
    assert_eq!(&bus.memory[0x30..0x40], b"recalled from ee");
    assert_eq!(bus.copies, 0);
}

#[test]
fn locked_block_refuses_writes() {
    let mut bus = SimBus::new(Model::Ds2760);
    {
        let bank = MemoryBank::new(&devices::DS2760_EEPROM);
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        assert!(!bank.is_page_locked(&mut session, 1).unwrap());
        bank.lock_page(&mut session, 1).unwrap();
        assert!(bank.is_page_locked(&mut session, 1).unwrap());
        assert!(!bank.is_page_locked(&mut session, 0).unwrap());
    }
    assert_eq!(bus.memory[7], 0x42);
    {
        let bank = MemoryBank::new(&devices::DS2760_EEPROM);
        let mut session = BusSession::begin(&mut bus, NoopDelay::new(), None);
        assert_eq!(
            bank.write(&mut session, 16, &[0]),
            Err(MemoryError::PageLocked(1))
        );
        bank.write(&mut session, 0, &[0x5a]).unwrap();
    }
    assert_eq!(bus.copies, 1);
    assert_eq!(bus.status[0], 0x5a);
    assert_eq!(bus.status[16], 0xff);
}
