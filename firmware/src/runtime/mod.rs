use core::mem::MaybeUninit;

use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_sync::blocking_mutex::raw::ThreadModeRawMutex;
use embassy_sync::channel::Channel;
use embedded_alloc::LlffHeap as Heap;
use pmc_core::command::{COMMAND_POOL_CAPACITY, CommandPool};
use pmc_core::registry::PowerHooks;
use static_cell::StaticCell;

use crate::console::{ConsoleLine, ConsoleQueue};
use crate::link::{GpioRfVote, LinkQueue, LinkResponse};
use crate::usb;

mod link_task;
mod pmc_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

/// Completion callbacks and registry entries are boxed.
#[global_allocator]
static HEAP: Heap = Heap::empty();
const HEAP_SIZE: usize = 8 * 1024;
static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];

/// Depth of the queue feeding the PMC task.
const EVENT_QUEUE_DEPTH: usize = 8;

/// Inputs to the PMC task, handled one at a time.
pub(super) enum PmcEvent {
    Link(LinkResponse),
    Console(ConsoleLine),
}

pub(super) type EventQueue = Channel<ThreadModeRawMutex, PmcEvent, EVENT_QUEUE_DEPTH>;

pub(super) static EVENTS: EventQueue = Channel::new();
pub(super) static LINK_QUEUE: LinkQueue = Channel::new();
pub(super) static CONSOLE_TX: ConsoleQueue = Channel::new();
pub(super) static HOOKS: PowerHooks<ThreadModeRawMutex> =
    PowerHooks::new(ThreadModeRawMutex::new());
pub(super) static POOL: CommandPool = CommandPool::new(COMMAND_POOL_CAPACITY);
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    unsafe {
        HEAP.init(&raw mut HEAP_MEM as usize, HEAP_SIZE);
    }

    let config = hal::Config::default();
    let hal::Peripherals {
        PA8, USB, PA11, PA12, ..
    } = hal::init(config);

    // Supplies start powered; the controller votes them off for standby.
    let rf_vote = GpioRfVote::new(Output::new(PA8, Level::High, Speed::Low));

    spawner
        .spawn(pmc_task::run(rf_vote))
        .expect("failed to spawn PMC task");

    spawner
        .spawn(link_task::run())
        .expect("failed to spawn link task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
