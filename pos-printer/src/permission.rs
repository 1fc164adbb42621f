//! USB permission gate and attach listener
//!
//! Access to a USB printer is granted by the OS, sometimes only after a user
//! prompt. [`PermissionGate`] makes sure a device has at most one outstanding
//! prompt: concurrent callers join the pending request instead of issuing
//! their own. The OS permission store stays authoritative; the prompt
//! callback only tells us when to look again.

use crate::error::PrintResult;
use crate::discovery::is_likely_usb_printer;
use crate::transport::{UsbDeviceInfo, UsbEvent, UsbHost};
use futures::StreamExt;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-device permission lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Unrequested,
    Requested,
    Granted,
    Denied,
    /// The prompt was not answered in time
    TimedOut,
}

#[derive(Default)]
struct GateState {
    states: HashMap<String, PermissionState>,
    pending: HashMap<String, watch::Receiver<Option<bool>>>,
}

/// Coalesces USB permission requests per device
pub struct PermissionGate {
    host: Arc<dyn UsbHost>,
    timeout: Duration,
    inner: Mutex<GateState>,
}

enum Role {
    Leader(watch::Sender<Option<bool>>),
    Follower(watch::Receiver<Option<bool>>),
}

/// Clears the pending entry even if the leader is cancelled mid-wait
struct PendingGuard<'a> {
    gate: &'a PermissionGate,
    key: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut inner = self.gate.inner.lock();
        if inner.pending.remove(&self.key).is_some() {
            inner.states.insert(self.key.clone(), PermissionState::TimedOut);
        }
    }
}

impl PermissionGate {
    pub fn new(host: Arc<dyn UsbHost>, timeout: Duration) -> Self {
        Self {
            host,
            timeout,
            inner: Mutex::new(GateState::default()),
        }
    }

    pub fn host(&self) -> &Arc<dyn UsbHost> {
        &self.host
    }

    /// Query the OS permission store off the async workers
    async fn has_permission(&self, device: &UsbDeviceInfo) -> bool {
        let host = self.host.clone();
        let device = device.clone();
        match tokio::task::spawn_blocking(move || host.has_permission(&device)).await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(target: "printer", "USB: permission query failed: {}", e);
                false
            }
        }
    }

    /// Current state of a device. A grant in the OS store always wins over
    /// what was recorded here.
    pub async fn state(&self, device: &UsbDeviceInfo) -> PermissionState {
        if self.has_permission(device).await {
            return PermissionState::Granted;
        }
        self.inner
            .lock()
            .states
            .get(&device.identity())
            .copied()
            .unwrap_or(PermissionState::Unrequested)
    }

    /// Return whether the device may be opened, prompting at most once.
    ///
    /// Waits up to the gate timeout for an answer, then re-reads the OS store.
    pub async fn check_or_request(&self, device: &UsbDeviceInfo) -> bool {
        let key = device.identity();
        if self.has_permission(device).await {
            debug!(target: "printer", "USB: permission already granted for {}", key);
            self.inner.lock().states.insert(key, PermissionState::Granted);
            return true;
        }

        let role = {
            let mut inner = self.inner.lock();
            match inner.pending.get(&key) {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.pending.insert(key.clone(), rx);
                    inner.states.insert(key.clone(), PermissionState::Requested);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => self.lead(device, key, tx).await,
            Role::Follower(mut rx) => {
                debug!(target: "printer", "USB: joining outstanding permission request for {}", key);
                let _ = tokio::time::timeout(self.timeout, rx.wait_for(Option::is_some)).await;
                self.has_permission(device).await
            }
        }
    }

    async fn lead(&self, device: &UsbDeviceInfo, key: String, tx: watch::Sender<Option<bool>>) -> bool {
        let guard = PendingGuard { gate: self, key };

        info!(target: "printer", "USB: requesting permission for {}", guard.key);
        let (reply_tx, reply_rx) = oneshot::channel();
        let host = self.host.clone();
        let target = device.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || host.request_permission(&target, reply_tx)).await {
            warn!(target: "printer", "USB: permission request failed: {}", e);
        }

        let answered = tokio::time::timeout(self.timeout, reply_rx).await.is_ok();
        if !answered {
            warn!(target: "printer", "USB: permission request timed out after {:?}", self.timeout);
        }

        let granted = self.has_permission(device).await;
        let state = match (granted, answered) {
            (true, _) => PermissionState::Granted,
            (false, true) => PermissionState::Denied,
            (false, false) => PermissionState::TimedOut,
        };
        {
            let mut inner = self.inner.lock();
            inner.pending.remove(&guard.key);
            inner.states.insert(guard.key.clone(), state);
        }
        let _ = tx.send(Some(granted));

        info!(target: "printer", "USB: final permission state for {}: {:?}", guard.key, state);
        granted
    }
}

/// Pre-requests permission for devices as they are attached
///
/// Start and stop follow the host's foreground lifecycle. Starting twice is
/// a no-op; stopping an idle listener is harmless.
#[derive(Default)]
pub struct AttachListener {
    active: AtomicBool,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl AttachListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Subscribe to attach events. Must be called inside a tokio runtime.
    ///
    /// Returns `Ok(false)` if the listener was already running.
    pub fn start(&self, gate: Arc<PermissionGate>) -> PrintResult<bool> {
        if self.active.swap(true, Ordering::SeqCst) {
            debug!(target: "printer", "USB attach receiver already registered");
            return Ok(false);
        }

        let events = match gate.host().watch() {
            Ok(events) => events,
            Err(e) => {
                self.active.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(run_listener(events, gate, shutdown.clone()));
        *self.task.lock() = Some((shutdown, handle));
        info!(target: "printer", "USB attach receiver registered");
        Ok(true)
    }

    pub fn stop(&self) {
        if let Some((shutdown, _handle)) = self.task.lock().take() {
            shutdown.cancel();
        }
        if self.active.swap(false, Ordering::SeqCst) {
            info!(target: "printer", "USB attach receiver unregistered");
        }
    }
}

impl Drop for AttachListener {
    fn drop(&mut self) {
        if let Some((shutdown, _)) = self.task.get_mut().take() {
            shutdown.cancel();
        }
    }
}

async fn run_listener(
    mut events: BoxStream<'static, UsbEvent>,
    gate: Arc<PermissionGate>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.next() => event,
        };
        match event {
            None => break,
            Some(UsbEvent::Attached(device)) => {
                info!(
                    target: "printer",
                    "USB ATTACHED: {} ({}) likely_printer={}",
                    device.usb_device_id(),
                    device.device_path(),
                    is_likely_usb_printer(&device)
                );
                // Never block the event loop on a prompt
                let gate = gate.clone();
                tokio::spawn(async move {
                    gate.check_or_request(&device).await;
                });
            }
            Some(UsbEvent::Detached(id)) => {
                info!(target: "printer", "USB DETACHED: {}", id);
            }
        }
    }
    debug!(target: "printer", "USB attach listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrintError;
    use crate::transport::UsbLink;
    use std::sync::atomic::AtomicUsize;

    /// Never grants and never answers
    struct SilentHost {
        prompts: AtomicUsize,
        held: Mutex<Vec<oneshot::Sender<bool>>>,
    }

    impl UsbHost for SilentHost {
        fn list_devices(&self) -> PrintResult<Vec<UsbDeviceInfo>> {
            Ok(Vec::new())
        }
        fn has_permission(&self, _device: &UsbDeviceInfo) -> bool {
            false
        }
        fn request_permission(&self, _device: &UsbDeviceInfo, reply: oneshot::Sender<bool>) {
            self.prompts.fetch_add(1, Ordering::SeqCst);
            self.held.lock().push(reply);
        }
        fn watch(&self) -> PrintResult<BoxStream<'static, UsbEvent>> {
            Ok(futures::stream::empty().boxed())
        }
        fn open(&self, device: &UsbDeviceInfo) -> PrintResult<Box<dyn UsbLink>> {
            Err(PrintError::PermissionDenied(device.device_path()))
        }
    }

    /// Denies at once and records which threads the gate called it on
    #[derive(Default)]
    struct RecordingHost {
        threads: Mutex<Vec<std::thread::ThreadId>>,
    }

    impl UsbHost for RecordingHost {
        fn list_devices(&self) -> PrintResult<Vec<UsbDeviceInfo>> {
            Ok(Vec::new())
        }
        fn has_permission(&self, _device: &UsbDeviceInfo) -> bool {
            self.threads.lock().push(std::thread::current().id());
            false
        }
        fn request_permission(&self, _device: &UsbDeviceInfo, reply: oneshot::Sender<bool>) {
            self.threads.lock().push(std::thread::current().id());
            let _ = reply.send(false);
        }
        fn watch(&self) -> PrintResult<BoxStream<'static, UsbEvent>> {
            Ok(futures::stream::empty().boxed())
        }
        fn open(&self, device: &UsbDeviceInfo) -> PrintResult<Box<dyn UsbLink>> {
            Err(PrintError::PermissionDenied(device.device_path()))
        }
    }

    fn device() -> UsbDeviceInfo {
        UsbDeviceInfo {
            bus_number: 2,
            device_address: 7,
            vendor_id: 0x0519,
            product_id: 0x0001,
            class: 7,
            interface_classes: vec![7],
            manufacturer: None,
            product: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_prompt_times_out() {
        let host = Arc::new(SilentHost {
            prompts: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        });
        let gate = PermissionGate::new(host.clone(), Duration::from_secs(4));
        let d = device();

        assert_eq!(gate.state(&d).await, PermissionState::Unrequested);
        assert!(!gate.check_or_request(&d).await);
        assert_eq!(gate.state(&d).await, PermissionState::TimedOut);
        assert_eq!(host.prompts.load(Ordering::SeqCst), 1);

        // A later request prompts again
        assert!(!gate.check_or_request(&d).await);
        assert_eq!(host.prompts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_leader_releases_pending_entry() {
        let host = Arc::new(SilentHost {
            prompts: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        });
        let gate = PermissionGate::new(host.clone(), Duration::from_secs(4));
        let d = device();

        let cancelled = tokio::time::timeout(Duration::from_millis(10), gate.check_or_request(&d)).await;
        assert!(cancelled.is_err());
        assert!(gate.inner.lock().pending.is_empty());
        assert_eq!(gate.state(&d).await, PermissionState::TimedOut);
    }

    #[tokio::test]
    async fn test_host_calls_run_off_the_runtime_thread() {
        let host = Arc::new(RecordingHost::default());
        let gate = PermissionGate::new(host.clone(), Duration::from_secs(4));
        let d = device();

        assert!(!gate.check_or_request(&d).await);
        assert_eq!(gate.state(&d).await, PermissionState::Denied);

        let runtime_thread = std::thread::current().id();
        let threads = host.threads.lock();
        // initial check, prompt, re-check after the answer, state query
        assert_eq!(threads.len(), 4);
        assert!(threads.iter().all(|t| *t != runtime_thread));
    }

    #[tokio::test]
    async fn test_listener_start_stop_idempotent() {
        let host = Arc::new(SilentHost {
            prompts: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        });
        let gate = Arc::new(PermissionGate::new(host, Duration::from_secs(4)));
        let listener = AttachListener::new();

        listener.stop();
        assert!(listener.start(gate.clone()).unwrap());
        assert!(!listener.start(gate).unwrap());
        assert!(listener.is_running());
        listener.stop();
        listener.stop();
        assert!(!listener.is_running());
    }
}
