//! Network reachability tracking.
//!
//! A [`Monitor`] holds the current reachable/unreachable flag and fans out
//! transitions to subscribers. Subscriptions are RAII guards: dropping one
//! unregisters it, so a torn-down view never leaves a listener behind.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    WentOnline,
    WentOffline,
}

/// Source of the current connectivity signal.
pub trait Probe: Send + Sync {
    fn check(&self) -> bool;
}

/// Reports reachable when a TCP connection to the API host can be opened.
/// The host is resolved on every check, so a DNS failure reads as offline.
pub struct TcpProbe {
    host: String,
    port: u16,
    timeout: Duration,
}

impl TcpProbe {
    pub fn for_url(url: &Url, timeout: Duration) -> Result<Self> {
        let host = url
            .host_str()
            .ok_or_else(|| anyhow!("reachability: url {url} has no host"))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| anyhow!("reachability: url {url} has no port"))?;
        Ok(Self {
            host: host.trim_matches(|c| c == '[' || c == ']').to_string(),
            port,
            timeout,
        })
    }

    fn addrs(&self) -> Vec<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map(|addrs| addrs.collect())
            .unwrap_or_default()
    }
}

impl Probe for TcpProbe {
    fn check(&self) -> bool {
        self.addrs()
            .iter()
            .any(|addr| TcpStream::connect_timeout(addr, self.timeout).is_ok())
    }
}

struct Inner {
    reachable: AtomicBool,
    next_id: AtomicU64,
    subscribers: Mutex<Vec<(u64, Sender<Transition>)>>,
}

#[derive(Clone)]
pub struct Monitor {
    inner: Arc<Inner>,
}

impl Monitor {
    pub fn new(reachable: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                reachable: AtomicBool::new(reachable),
                next_id: AtomicU64::new(1),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Seeds the flag from the probe's current answer.
    pub fn detect(probe: &dyn Probe) -> Self {
        Self::new(probe.check())
    }

    pub fn is_reachable(&self) -> bool {
        self.inner.reachable.load(Ordering::SeqCst)
    }

    /// Records the latest signal; subscribers hear about actual transitions only.
    pub fn set_reachable(&self, reachable: bool) {
        let previous = self.inner.reachable.swap(reachable, Ordering::SeqCst);
        if previous == reachable {
            return;
        }
        let transition = if reachable {
            Transition::WentOnline
        } else {
            Transition::WentOffline
        };
        info!("network reachability changed - {:?}", transition);
        let mut subscribers = self.inner.subscribers.lock();
        subscribers.retain(|(_, tx)| tx.send(transition).is_ok());
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded();
        self.inner.subscribers.lock().push((id, tx));
        debug!("reachability subscription acquired - id={}", id);
        Subscription {
            id,
            rx,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

pub struct Subscription {
    id: u64,
    rx: Receiver<Transition>,
    monitor: Weak<Inner>,
}

impl Subscription {
    /// Next pending transition, if any, without blocking.
    pub fn try_next(&self) -> Option<Transition> {
        match self.rx.try_recv() {
            Ok(transition) => Some(transition),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            inner.subscribers.lock().retain(|(id, _)| *id != self.id);
            debug!("reachability subscription released - id={}", self.id);
        }
    }
}

/// Polls a probe on a background thread and feeds the monitor.
/// Stops when dropped.
pub struct Watcher {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn spawn(monitor: Monitor, probe: Arc<dyn Probe>, interval: Duration) -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::spawn(move || loop {
            match stop_rx.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => monitor.set_reachable(probe.check()),
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        });
        Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
