//! Fake platform hosts shared by the integration tests
#![allow(dead_code)]

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::{FutureExt, StreamExt};
use parking_lot::Mutex;
use pos_printer::{
    BluetoothHost, BondedDevice, PrintError, PrintResult, UsbDeviceInfo, UsbEvent, UsbHost, UsbLink,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

/// How a [`FakeUsb`] answers a permission prompt
#[derive(Clone, Copy)]
pub enum PromptAnswer {
    /// Grant after the given delay
    GrantAfter(Duration),
    /// Deny right away
    Deny,
    /// Never answer
    Ignore,
}

pub struct FakeUsb {
    pub devices: Vec<UsbDeviceInfo>,
    pub granted: Arc<AtomicBool>,
    pub prompts: AtomicUsize,
    pub answer: PromptAnswer,
    pub fail_enumeration: bool,
    /// Every bulk OUT transfer fails
    pub fail_write: bool,
    pub opens: AtomicUsize,
    pub closes: Arc<AtomicUsize>,
    pub written: Arc<Mutex<Vec<u8>>>,
    held: Mutex<Vec<oneshot::Sender<bool>>>,
    events: Mutex<Option<fmpsc::UnboundedReceiver<UsbEvent>>>,
    events_tx: fmpsc::UnboundedSender<UsbEvent>,
}

impl FakeUsb {
    pub fn new(devices: Vec<UsbDeviceInfo>, answer: PromptAnswer) -> Self {
        let (events_tx, events_rx) = fmpsc::unbounded();
        Self {
            devices,
            granted: Arc::new(AtomicBool::new(false)),
            prompts: AtomicUsize::new(0),
            answer,
            fail_enumeration: false,
            fail_write: false,
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            written: Arc::new(Mutex::new(Vec::new())),
            held: Mutex::new(Vec::new()),
            events: Mutex::new(Some(events_rx)),
            events_tx,
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), PromptAnswer::Deny)
    }

    /// Already granted by the OS
    pub fn with_grant(devices: Vec<UsbDeviceInfo>) -> Self {
        let host = Self::new(devices, PromptAnswer::Deny);
        host.granted.store(true, Ordering::SeqCst);
        host
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    /// Simulate the OS announcing a newly attached device
    pub fn attach(&self, device: UsbDeviceInfo) {
        let _ = self.events_tx.unbounded_send(UsbEvent::Attached(device));
    }
}

impl UsbHost for FakeUsb {
    fn list_devices(&self) -> PrintResult<Vec<UsbDeviceInfo>> {
        if self.fail_enumeration {
            return Err(PrintError::Io(std::io::Error::other("usb stack unavailable")));
        }
        Ok(self.devices.clone())
    }

    fn has_permission(&self, _device: &UsbDeviceInfo) -> bool {
        self.granted.load(Ordering::SeqCst)
    }

    fn request_permission(&self, _device: &UsbDeviceInfo, reply: oneshot::Sender<bool>) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        match self.answer {
            PromptAnswer::GrantAfter(delay) => {
                // The user taps "allow" a little later
                let granted = self.granted.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    granted.store(true, Ordering::SeqCst);
                    let _ = reply.send(true);
                });
            }
            PromptAnswer::Deny => {
                let _ = reply.send(false);
            }
            PromptAnswer::Ignore => self.held.lock().push(reply),
        }
    }

    fn watch(&self) -> PrintResult<BoxStream<'static, UsbEvent>> {
        let rx = self
            .events
            .lock()
            .take()
            .ok_or_else(|| PrintError::Io(std::io::Error::other("already watching")))?;
        Ok(rx.boxed())
    }

    fn open(&self, device: &UsbDeviceInfo) -> PrintResult<Box<dyn UsbLink>> {
        if !self.has_permission(device) {
            return Err(PrintError::PermissionDenied(device.device_path()));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeLink {
            fail: self.fail_write,
            closes: self.closes.clone(),
            written: self.written.clone(),
        }))
    }
}

/// Records bulk OUT transfers into the owning [`FakeUsb`]
struct FakeLink {
    fail: bool,
    closes: Arc<AtomicUsize>,
    written: Arc<Mutex<Vec<u8>>>,
}

impl UsbLink for FakeLink {
    fn write(&mut self, data: Vec<u8>) -> BoxFuture<'_, PrintResult<()>> {
        let result = if self.fail {
            Err(PrintError::WriteFailed("endpoint stalled".into()))
        } else {
            self.written.lock().extend_from_slice(&data);
            Ok(())
        };
        futures::future::ready(result).boxed()
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct FakeBluetooth {
    pub available: bool,
    pub bonded: Vec<BondedDevice>,
}

impl FakeBluetooth {
    pub fn new(bonded: &[(&str, Option<&str>)]) -> Self {
        Self {
            available: true,
            bonded: bonded
                .iter()
                .map(|(address, name)| BondedDevice {
                    address: address.to_string(),
                    name: name.map(str::to_string),
                })
                .collect(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            bonded: Vec::new(),
        }
    }
}

impl BluetoothHost for FakeBluetooth {
    fn is_available(&self) -> bool {
        self.available
    }

    fn bonded_devices(&self) -> PrintResult<Vec<BondedDevice>> {
        Ok(self.bonded.clone())
    }

    fn cancel_discovery(&self) {}
}

pub fn usb_device(bus: u8, address: u8, vid: u16, pid: u16) -> UsbDeviceInfo {
    UsbDeviceInfo {
        bus_number: bus,
        device_address: address,
        vendor_id: vid,
        product_id: pid,
        class: 0,
        interface_classes: vec![0xFF],
        manufacturer: None,
        product: None,
    }
}
