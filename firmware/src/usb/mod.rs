//! USB device exposing the operator console as a single CDC ACM interface.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

#[cfg(target_os = "none")]
use embassy_usb::class::cdc_acm;
#[cfg(target_os = "none")]
use embassy_usb::driver::Driver;

#[cfg(target_os = "none")]
pub const MAX_PACKET_SIZE: u16 = 64;

#[cfg(target_os = "none")]
const EP0_PACKET_SIZE: u8 = 64;

/// pid.codes test VID with the console product id.
const USB_IDS: (u16, u16) = (0x1209, 0x0002);
/// Bus power requested in the configuration descriptor, in mA.
const BUS_POWER_MA: u16 = 100;

/// Strings advertised in the device descriptor.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "PMC Bring-up",
            product: "WiFi Power Management Console",
            serial_number: None,
        }
    }
}

/// Descriptor and class buffers; lives in a `StaticCell` for the device's lifetime.
#[cfg(target_os = "none")]
pub struct UsbDeviceStorage {
    ep0: [u8; 64],
    config: [u8; 128],
    bos: [u8; 64],
    msos: [u8; 64],
    acm: cdc_acm::State<'static>,
}

#[cfg(target_os = "none")]
impl UsbDeviceStorage {
    pub fn new() -> Self {
        Self {
            ep0: [0; 64],
            config: [0; 128],
            bos: [0; 64],
            msos: [0; 64],
            acm: cdc_acm::State::new(),
        }
    }
}

/// Console endpoints after the ACM class is split.
#[cfg(target_os = "none")]
pub struct ConsolePort<D: Driver<'static>> {
    pub sender: cdc_acm::Sender<'static, D>,
    pub receiver: cdc_acm::Receiver<'static, D>,
    pub control: cdc_acm::ControlChanged<'static>,
}

#[cfg(target_os = "none")]
pub fn build<D: Driver<'static>>(
    driver: D,
    storage: &'static mut UsbDeviceStorage,
    strings: UsbDeviceStrings,
) -> (embassy_usb::UsbDevice<'static, D>, ConsolePort<D>) {
    let (vid, pid) = USB_IDS;
    let mut descriptor = embassy_usb::Config::new(vid, pid);
    descriptor.manufacturer = Some(strings.manufacturer);
    descriptor.product = Some(strings.product);
    descriptor.serial_number = strings.serial_number;
    descriptor.max_packet_size_0 = EP0_PACKET_SIZE;
    descriptor.max_power = BUS_POWER_MA;

    let UsbDeviceStorage {
        ep0,
        config,
        bos,
        msos,
        acm,
    } = storage;
    let mut builder = embassy_usb::Builder::new(driver, descriptor, config, bos, msos, ep0);
    let (sender, receiver, control) =
        cdc_acm::CdcAcmClass::new(&mut builder, acm, MAX_PACKET_SIZE).split_with_control();

    let port = ConsolePort {
        sender,
        receiver,
        control,
    };
    (builder.build(), port)
}
