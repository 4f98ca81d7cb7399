use embassy_futures::join::join;
use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_usb::class::cdc_acm::{ControlChanged, Receiver, Sender};
use embassy_usb::driver::{Driver, EndpointError};

use super::{CONSOLE_TX, EVENTS, PmcEvent, USB_STORAGE};
use crate::console::{self, ConsoleFrame, LineAssembler, PROMPT};
use crate::status;
use crate::usb::{self, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new());
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let (mut device, port) = usb::build(driver, storage, UsbDeviceStrings::default());
    let console = serve_console(port.sender, port.receiver, port.control);

    // Neither future completes.
    join(device.run(), console).await;
    loop {
        core::future::pending::<()>().await;
    }
}

async fn serve_console<D: Driver<'static>>(
    mut sender: Sender<'static, D>,
    mut receiver: Receiver<'static, D>,
    control: ControlChanged<'static>,
) -> ! {
    let events = EVENTS.sender();
    let console_tx = CONSOLE_TX.receiver();
    let mut packet = [0u8; usb::MAX_PACKET_SIZE as usize];
    let mut assembler = LineAssembler::new();
    let mut pending_tx: Option<ConsoleFrame>;

    loop {
        join(receiver.wait_connection(), sender.wait_connection()).await;
        host_listening(&control, &sender).await;
        assembler.reset();
        pending_tx = console::frames(PROMPT).next();

        defmt::info!(
            "usb: console connected (radio {})",
            status::power_state().label()
        );

        loop {
            match select3(
                receiver.read_packet(&mut packet),
                async {
                    // The frame stays queued until written; this future may be dropped.
                    if pending_tx.is_none() {
                        pending_tx = Some(console_tx.receive().await);
                    }
                    let Some(frame) = pending_tx.as_ref() else {
                        return Ok(());
                    };
                    let written = sender.write_packet(frame).await;
                    if written.is_ok() {
                        pending_tx = None;
                    }
                    written
                },
                control.control_changed(),
            )
            .await
            {
                Either3::First(Ok(count)) => {
                    for byte in &packet[..count] {
                        match assembler.push(*byte) {
                            Ok(Some(line)) => events.send(PmcEvent::Console(line)).await,
                            Ok(None) => {}
                            Err(error) => {
                                defmt::warn!(
                                    "usb: console input dropped: {}",
                                    defmt::Display2Format(&error)
                                );
                            }
                        }
                    }
                }
                Either3::First(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console interface disabled");
                    break;
                }
                Either3::First(Err(_)) => {
                    defmt::warn!("usb: console read error");
                }
                Either3::Second(Ok(())) => {}
                Either3::Second(Err(EndpointError::Disabled)) => {
                    defmt::warn!("usb: console write disabled");
                    break;
                }
                Either3::Second(Err(_)) => {
                    defmt::warn!("usb: console write error");
                }
                Either3::Third(()) => {
                    if !sender.dtr() {
                        defmt::warn!("usb: console host dropped DTR");
                        break;
                    }
                }
            }
        }
    }
}

/// Terminal programs raise DTR once they are ready to read the prompt.
async fn host_listening<D: Driver<'static>>(
    control: &ControlChanged<'static>,
    sender: &Sender<'static, D>,
) {
    while !sender.dtr() {
        control.control_changed().await;
    }
}
