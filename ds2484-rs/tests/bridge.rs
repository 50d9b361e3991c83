use ds2484::{Ds2484, Ds2484Builder, Ds2484Error, OneWire, OneWireError, PowerDelivery};
use embedded_hal_mock::eh1::{
    delay::NoopDelay,
    i2c::{Mock, Transaction},
};

const ADDR: u8 = 0x18;

/// Device reset followed by the default configuration (active pull-up).
fn startup() -> Vec<Transaction> {
    vec![
        Transaction::write(ADDR, vec![0xf0]),
        Transaction::read(ADDR, vec![0x10]),
        Transaction::write(ADDR, vec![0xe1, 0xf0]),
        Transaction::read(ADDR, vec![0x00]),
        Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]),
    ]
}

fn idle() -> [Transaction; 2] {
    [
        Transaction::write(ADDR, vec![0xe1, 0xf0]),
        Transaction::read(ADDR, vec![0x00]),
    ]
}

fn bridge(expectations: &[Transaction]) -> Ds2484<Mock, NoopDelay> {
    Ds2484Builder::default()
        .build(Mock::new(expectations), NoopDelay::new())
        .unwrap()
}

fn finish(dev: Ds2484<Mock, NoopDelay>) {
    let (mut i2c, _) = dev.release();
    i2c.done();
}

#[test]
fn strong_pullup_is_armed_for_the_next_byte() {
    let mut expectations = startup();
    expectations.extend(idle());
    expectations.push(Transaction::write_read(ADDR, vec![0xd2, 0xa5], vec![0x05]));
    expectations.extend(idle());
    expectations.push(Transaction::write(ADDR, vec![0xa5, 0x55]));
    expectations.extend(idle());
    expectations.push(Transaction::write_read(ADDR, vec![0xd2, 0xe1], vec![0x01]));
    let mut dev = bridge(&expectations);
    assert!(dev.can_deliver_power());
    dev.start_power_delivery(PowerDelivery::AfterNextByte).unwrap();
    assert!(dev.configuration().strong_pullup());
    dev.write_byte(0x55).unwrap();
    dev.set_power_normal().unwrap();
    assert!(!dev.configuration().strong_pullup());
    // already back to normal, nothing to send
    dev.set_power_normal().unwrap();
    finish(dev);
}

#[test]
fn immediate_pullup_is_not_available() {
    let mut dev = bridge(&startup());
    assert_eq!(
        dev.start_power_delivery(PowerDelivery::Now),
        Err(OneWireError::Unimplemented)
    );
    assert!(!dev.can_program());
    finish(dev);
}

#[test]
fn read_byte_goes_through_the_data_register() {
    let mut expectations = startup();
    expectations.extend(idle());
    expectations.push(Transaction::write(ADDR, vec![0x96]));
    expectations.extend(idle());
    expectations.push(Transaction::write_read(ADDR, vec![0xe1, 0xe1], vec![0x5a]));
    let mut dev = bridge(&expectations);
    assert_eq!(dev.read_byte(), Ok(0x5a));
    finish(dev);
}

#[test]
fn reset_without_presence_pulse() {
    let mut expectations = startup();
    expectations.extend(idle());
    expectations.push(Transaction::write(ADDR, vec![0xb4]));
    expectations.extend(idle());
    let mut dev = bridge(&expectations);
    assert!(matches!(dev.reset(), Err(OneWireError::NoDevicePresent)));
    finish(dev);
}

#[test]
fn reset_with_presence_pulse() {
    let mut expectations = startup();
    expectations.extend(idle());
    expectations.push(Transaction::write(ADDR, vec![0xb4]));
    expectations.push(Transaction::write(ADDR, vec![0xe1, 0xf0]));
    expectations.push(Transaction::read(ADDR, vec![0x02]));
    let mut dev = bridge(&expectations);
    assert!(dev.reset().is_ok());
    assert_eq!(dev.get_overdrive_mode(), Ok(false));
    finish(dev);
}

#[test]
fn busy_line_times_out() {
    let mut expectations = startup();
    expectations.push(Transaction::write(ADDR, vec![0xe1, 0xf0]));
    expectations.push(Transaction::read(ADDR, vec![0x01]));
    let mut dev = Ds2484Builder::default()
        .with_retries(0)
        .build(Mock::new(&expectations), NoopDelay::new())
        .unwrap();
    assert_eq!(
        dev.write_byte(0x00),
        Err(OneWireError::Other(Ds2484Error::RetriesExceeded))
    );
    finish(dev);
}

#[test]
fn bridge_reset_needs_a_new_configuration() {
    let mut expectations = startup();
    expectations.push(Transaction::write(ADDR, vec![0xf0]));
    expectations.push(Transaction::read(ADDR, vec![0x10]));
    let mut dev = bridge(&expectations);
    dev.bus_reset().unwrap();
    assert_eq!(dev.write_byte(0xcc), Err(OneWireError::BusUninitialized));
    finish(dev);
}
