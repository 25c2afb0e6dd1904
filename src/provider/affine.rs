//! Thread-affine provider wrapper
//!
//! Some sources (debugger sessions, COM objects) may only be touched from the
//! thread that created them. [`AffineProvider`] builds such a source on its
//! own thread and forwards every call to it over a channel, blocking until
//! the reply arrives, so callers see an ordinary synchronous provider.

use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::Provider;
use crate::error::{Error, Result};

type Job = Box<dyn FnOnce(&mut dyn Provider) + Send>;

/// Provider that lives on a dedicated thread
pub struct AffineProvider {
    jobs: Option<mpsc::Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl AffineProvider {
    /// Start a thread named `thread_name` and build the provider on it
    pub fn spawn<P, F>(thread_name: &str, factory: F) -> Result<Self>
    where
        P: Provider + 'static,
        F: FnOnce() -> P + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || {
                let mut provider = factory();
                debug!("Provider thread started for '{}'", provider.name());
                for job in rx {
                    job(&mut provider);
                }
                debug!("Provider thread finished");
            })?;

        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Run `f` on the owning thread and wait for its result.
    ///
    /// Returns `None` once the owning thread has gone away.
    fn call<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut dyn Provider) -> R + Send + 'static,
    {
        let jobs = self.jobs.as_ref()?;
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        let job: Job = Box::new(move |provider| {
            let _ = reply_tx.send(f(provider));
        });
        if jobs.send(job).is_err() {
            warn!("Provider thread is gone");
            return None;
        }
        reply_rx.recv().ok()
    }

    fn gone() -> Error {
        Error::Provider("provider thread is gone".to_string())
    }
}

impl Provider for AffineProvider {
    fn size(&self) -> u64 {
        self.call(|p| p.size()).unwrap_or(0)
    }

    fn read(&self, addr: u64, buf: &mut [u8]) -> Result<()> {
        let len = buf.len();
        let reply = self.call(move |p| {
            let mut tmp = vec![0u8; len];
            p.read(addr, &mut tmp).map(|_| tmp).map_err(|e| e.to_string())
        });
        match reply {
            Some(Ok(bytes)) => {
                buf.copy_from_slice(&bytes);
                Ok(())
            }
            Some(Err(msg)) => {
                buf.fill(0);
                Err(Error::Provider(msg))
            }
            None => {
                buf.fill(0);
                Err(Self::gone())
            }
        }
    }

    fn is_readable(&self, addr: u64, len: usize) -> bool {
        self.call(move |p| p.is_readable(addr, len))
            .unwrap_or(false)
    }

    fn is_writable(&self) -> bool {
        self.call(|p| p.is_writable()).unwrap_or(false)
    }

    fn write(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        let data = data.to_vec();
        match self.call(move |p| p.write(addr, &data).map_err(|e| e.to_string())) {
            Some(Ok(())) => Ok(()),
            Some(Err(msg)) => Err(Error::Provider(msg)),
            None => Err(Self::gone()),
        }
    }

    fn name(&self) -> String {
        self.call(|p| p.name()).unwrap_or_default()
    }

    fn kind(&self) -> String {
        self.call(|p| p.kind()).unwrap_or_else(|| "None".to_string())
    }

    fn is_live(&self) -> bool {
        self.call(|p| p.is_live()).unwrap_or(false)
    }

    fn base(&self) -> u64 {
        self.call(|p| p.base()).unwrap_or(0)
    }

    fn set_base(&mut self, base: u64) {
        let _ = self.call(move |p| p.set_base(base));
    }

    fn get_symbol(&self, addr: u64) -> Option<String> {
        self.call(move |p| p.get_symbol(addr)).flatten()
    }
}

impl Drop for AffineProvider {
    fn drop(&mut self) {
        // Closing the channel ends the worker loop
        drop(self.jobs.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Provider thread panicked");
            }
        }
    }
}
