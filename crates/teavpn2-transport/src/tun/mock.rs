// ============================================
// File: crates/teavpn2-transport/src/tun/mock.rs
// ============================================
//! # Mock TUN Device
//!
//! ## Creation Reason
//! In-memory stand-in for the kernel TUN device, so the reactor and the
//! end-to-end tests run without root and without touching host routing.
//!
//! ## Main Functionality
//! - `inject(..)`: queue a datagram for the next `read()`
//! - `write(..)`: capture datagrams for later assertions
//! - `next_written()` / `drain_written()`: observe the write sink
//!
//! ## ⚠️ Important Note for Next Developer
//! - Test-only; `up()`/`down()` flip a flag and provision nothing
//! - Queues are bounded; an unread backlog past the cap fails the write,
//!   mirroring a saturated device
//!
//! ## Last Modified
//! v0.1.0 - Initial mock implementation

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::{Result, TransportError};
use crate::traits::{IfaceInfo, TunDevice};

/// Queue bound for both directions.
const MAX_QUEUE_SIZE: usize = 1024;

// ============================================
// MockTun
// ============================================

/// Mock TUN device with injectable reads and captured writes.
///
/// # Example
/// ```
/// use teavpn2_transport::tun::MockTun;
/// use teavpn2_transport::traits::{IfaceInfo, TunDevice};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let tun = MockTun::new(IfaceInfo::new("mock0"));
///
/// tun.inject(b"datagram".to_vec());
/// let mut buf = [0u8; 64];
/// let len = tun.read(&mut buf).await.unwrap();
/// assert_eq!(&buf[..len], b"datagram");
///
/// tun.write(b"reply").await.unwrap();
/// assert_eq!(tun.drain_written(), vec![b"reply".to_vec()]);
/// # }
/// ```
pub struct MockTun {
    /// Interface parameters.
    info: IfaceInfo,
    /// Datagrams waiting to be read by the server.
    read_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Datagrams the server wrote.
    write_queue: Mutex<VecDeque<Vec<u8>>>,
    /// Up/down flag.
    is_up: AtomicBool,
    /// Wakes readers when a datagram is injected.
    read_notify: Notify,
    /// Wakes test code waiting on the write sink.
    write_notify: Notify,
}

impl MockTun {
    /// Creates a mock device.
    #[must_use]
    pub fn new(info: IfaceInfo) -> Self {
        Self {
            info,
            read_queue: Mutex::new(VecDeque::new()),
            write_queue: Mutex::new(VecDeque::new()),
            is_up: AtomicBool::new(false),
            read_notify: Notify::new(),
            write_notify: Notify::new(),
        }
    }

    /// Queues a datagram for the next `read()` call.
    ///
    /// # Panics
    /// Panics if the read queue is over its bound; a test injecting that
    /// much without draining is broken.
    pub fn inject(&self, datagram: Vec<u8>) {
        let mut queue = self.read_queue.lock();
        assert!(queue.len() < MAX_QUEUE_SIZE, "mock TUN read queue overflow");
        queue.push_back(datagram);
        drop(queue);
        self.read_notify.notify_one();
    }

    /// Takes every datagram written so far, clearing the sink.
    #[must_use]
    pub fn drain_written(&self) -> Vec<Vec<u8>> {
        self.write_queue.lock().drain(..).collect()
    }

    /// Waits for the next written datagram and returns it.
    pub async fn next_written(&self) -> Vec<u8> {
        loop {
            if let Some(datagram) = self.write_queue.lock().pop_front() {
                return datagram;
            }
            self.write_notify.notified().await;
        }
    }

    /// Returns how many written datagrams are waiting in the sink.
    #[must_use]
    pub fn written_count(&self) -> usize {
        self.write_queue.lock().len()
    }

    /// Returns how many injected datagrams are waiting to be read.
    #[must_use]
    pub fn pending_reads(&self) -> usize {
        self.read_queue.lock().len()
    }
}

#[async_trait]
impl TunDevice for MockTun {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        loop {
            {
                let mut queue = self.read_queue.lock();
                if let Some(datagram) = queue.pop_front() {
                    let len = datagram.len().min(buf.len());
                    buf[..len].copy_from_slice(&datagram[..len]);
                    return Ok(len);
                }
            }
            self.read_notify.notified().await;
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        {
            let mut queue = self.write_queue.lock();
            if queue.len() >= MAX_QUEUE_SIZE {
                return Err(TransportError::TunWriteFailed {
                    reason: "mock write queue full".into(),
                });
            }
            queue.push_back(buf.to_vec());
        }
        self.write_notify.notify_waiters();
        Ok(buf.len())
    }

    fn name(&self) -> &str {
        &self.info.dev
    }

    fn mtu(&self) -> u16 {
        self.info.mtu
    }

    fn iface(&self) -> &IfaceInfo {
        &self.info
    }

    async fn up(&self) -> Result<()> {
        self.is_up.store(true, Ordering::Release);
        Ok(())
    }

    async fn down(&self) -> Result<()> {
        self.is_up.store(false, Ordering::Release);
        Ok(())
    }

    fn is_up(&self) -> bool {
        self.is_up.load(Ordering::Acquire)
    }
}

impl Default for MockTun {
    fn default() -> Self {
        Self::new(IfaceInfo::new("mock0"))
    }
}

impl std::fmt::Debug for MockTun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTun")
            .field("dev", &self.info.dev)
            .field("pending_reads", &self.pending_reads())
            .field("written", &self.written_count())
            .field("is_up", &self.is_up())
            .finish()
    }
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_inject_then_read() {
        let tun = MockTun::default();
        tun.inject(b"one".to_vec());
        tun.inject(b"two".to_vec());
        assert_eq!(tun.pending_reads(), 2);

        let mut buf = [0u8; 16];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"one");
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..len], b"two");
        assert_eq!(tun.pending_reads(), 0);
    }

    #[tokio::test]
    async fn test_read_waits_for_injection() {
        let tun = std::sync::Arc::new(MockTun::default());

        let reader = {
            let tun = std::sync::Arc::clone(&tun);
            tokio::spawn(async move {
                let mut buf = [0u8; 16];
                let len = tun.read(&mut buf).await.unwrap();
                buf[..len].to_vec()
            })
        };

        tokio::task::yield_now().await;
        tun.inject(b"late".to_vec());
        assert_eq!(reader.await.unwrap(), b"late");
    }

    #[tokio::test]
    async fn test_write_capture() {
        let tun = MockTun::default();
        tun.write(b"a").await.unwrap();
        tun.write(b"b").await.unwrap();

        assert_eq!(tun.written_count(), 2);
        assert_eq!(tun.drain_written(), vec![b"a".to_vec(), b"b".to_vec()]);
        assert_eq!(tun.written_count(), 0);
    }

    #[tokio::test]
    async fn test_next_written_waits() {
        let tun = std::sync::Arc::new(MockTun::default());

        let waiter = {
            let tun = std::sync::Arc::clone(&tun);
            tokio::spawn(async move { tun.next_written().await })
        };

        tokio::task::yield_now().await;
        tun.write(b"sunk").await.unwrap();
        assert_eq!(waiter.await.unwrap(), b"sunk");
    }

    #[tokio::test]
    async fn test_read_truncates_to_buffer() {
        let tun = MockTun::default();
        tun.inject(vec![0x42; 100]);

        let mut buf = [0u8; 10];
        let len = tun.read(&mut buf).await.unwrap();
        assert_eq!(len, 10);
    }

    #[tokio::test]
    async fn test_up_down() {
        let tun = MockTun::default();
        assert!(!tun.is_up());
        tun.up().await.unwrap();
        assert!(tun.is_up());
        tun.down().await.unwrap();
        assert!(!tun.is_up());
    }
}
