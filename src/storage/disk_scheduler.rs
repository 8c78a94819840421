//! Disk scheduler — the asynchronous front door to the [`DiskManager`].
//!
//! The buffer pool manager never talks to the disk manager directly. It
//! submits a [`DiskRequest`] to the scheduler and blocks on the returned
//! [`DiskFuture`], mirroring a promise/future completion handle. A single
//! background worker thread drains the request queue and drives the disk
//! manager; this keeps `DiskManager` single-threaded while letting the BPM
//! treat disk access as a scheduled, asynchronous operation it happens to
//! wait on synchronously.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

use parking_lot::RwLock;

use crate::common::{Error, PageId, Result};
use crate::storage::disk_manager::DiskManager;
use crate::storage::page::Page;

/// The sending half of a one-shot completion handle.
///
/// Dropping a promise without calling [`DiskPromise::fulfill`] (e.g. because
/// the worker thread panicked mid-request) resolves the paired future to
/// `Err(Error::IoFailure)` rather than hanging the waiter forever.
pub struct DiskPromise {
    tx: Sender<Result<bool>>,
}

impl DiskPromise {
    fn fulfill(self, result: Result<bool>) {
        // The receiver may already be gone if the waiter stopped caring;
        // that's not this promise's problem.
        let _ = self.tx.send(result);
    }
}

/// The receiving half of a one-shot completion handle.
pub struct DiskFuture {
    rx: Receiver<Result<bool>>,
}

impl DiskFuture {
    /// Block until the paired promise is fulfilled, or the scheduler drops
    /// it without an answer.
    pub fn wait(self) -> Result<bool> {
        self.rx.recv().unwrap_or(Err(Error::IoFailure(0)))
    }
}

/// Create a new one-shot completion handle pair.
pub fn create_promise() -> (DiskPromise, DiskFuture) {
    let (tx, rx) = mpsc::channel();
    (DiskPromise { tx }, DiskFuture { rx })
}

/// A read or write request for the scheduler to execute.
///
/// `buffer` stands in for the "raw bytes pointer" of the spec this crate
/// implements: rather than an unsafe pointer, the request carries a cloned
/// `Arc` to the destination frame's page lock, which the worker thread reads
/// from (write requests) or writes into (read requests) directly.
pub struct DiskRequest {
    pub is_write: bool,
    pub page_id: PageId,
    pub buffer: Arc<RwLock<Page>>,
    pub promise: DiskPromise,
}

enum WorkItem {
    Io(DiskRequest),
    Allocate(Sender<Result<PageId>>),
    Deallocate(PageId),
}

/// Schedules disk I/O onto a dedicated worker thread.
pub struct DiskScheduler {
    queue: Sender<Option<WorkItem>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl DiskScheduler {
    /// Spawn the background worker thread, taking ownership of the disk
    /// manager it will drive.
    pub fn new(disk_manager: DiskManager) -> Self {
        let (tx, rx) = mpsc::channel();
        let worker = thread::spawn(move || Self::run_worker(rx, disk_manager));
        Self {
            queue: tx,
            worker: Some(worker),
        }
    }

    /// Submit a request. The implementation may reorder requests across
    /// distinct pages, but every request's promise is completed exactly
    /// once.
    pub fn schedule(&self, request: DiskRequest) {
        self.queue
            .send(Some(WorkItem::Io(request)))
            .expect("disk scheduler worker thread is gone");
    }

    /// Reclaim `page_id`'s on-disk slot. Fire-and-forget: there is no
    /// success/failure signal a caller needs to observe.
    pub fn deallocate_page(&self, page_id: PageId) {
        self.queue
            .send(Some(WorkItem::Deallocate(page_id)))
            .expect("disk scheduler worker thread is gone");
    }

    /// Ask the disk manager for a fresh page id, blocking until the worker
    /// thread answers. The `DiskManager` lives on the worker thread, so this
    /// is the only way the buffer pool manager can grow the file - it can't
    /// call `DiskManager::allocate_page` itself.
    pub fn allocate_page(&self) -> Result<PageId> {
        let (tx, rx) = mpsc::channel();
        self.queue
            .send(Some(WorkItem::Allocate(tx)))
            .expect("disk scheduler worker thread is gone");
        rx.recv().unwrap_or(Err(Error::IoFailure(0)))
    }

    fn run_worker(rx: Receiver<Option<WorkItem>>, mut disk_manager: DiskManager) {
        while let Ok(Some(item)) = rx.recv() {
            match item {
                WorkItem::Io(DiskRequest {
                    is_write,
                    page_id,
                    buffer,
                    promise,
                }) => {
                    let result = if is_write {
                        let guard = buffer.read_arc();
                        disk_manager.write_page(page_id, &guard).map(|_| true)
                    } else {
                        disk_manager.read_page(page_id).map(|page| {
                            buffer.write_arc().as_mut_slice().copy_from_slice(page.as_slice());
                            true
                        })
                    };
                    promise.fulfill(result);
                }
                WorkItem::Allocate(reply) => {
                    let _ = reply.send(disk_manager.allocate_page());
                }
                WorkItem::Deallocate(page_id) => {
                    disk_manager.deallocate_page(page_id);
                }
            }
        }
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Signal the worker to stop, then join it so in-flight requests
        // finish before the disk manager (and its file handle) goes away.
        let _ = self.queue.send(None);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
