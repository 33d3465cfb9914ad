use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};
use log::{debug, trace};

use super::backend::{PageBackend, PageMemory};
use super::config::SweepingSupport;
use super::space::{Page, RawHeap};
use super::stats::StatsCollector;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepingType {
    /// Sweep inline, inside the stop-the-world pause.
    Atomic,
    /// Sweep on the background worker; joined back at the next pause point.
    ConcurrentThenAtomic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactableSpaceHandling {
    /// Reclaim compactable spaces in this sweep.
    SweepNow,
    /// Leave compactable spaces to the compactor.
    DeferToCompaction,
}

#[derive(Debug, Clone, Copy)]
pub struct SweepingConfig {
    pub sweeping_type: SweepingType,
    pub compactable_space_handling: CompactableSpaceHandling,
}

/// The sweeping seam the heap drives. `finish_if_running` is a blocking
/// join: any path needing a consistent global view calls it before trusting
/// page contents.
pub trait Sweep: Send + Sync {
    fn start(&self, config: SweepingConfig);

    fn finish_if_running(&self);

    /// Residual bookkeeping that can complete without a pause: pruning free
    /// headers, returning empty pages, notifying the statistics collector.
    fn notify_done_if_needed(&self);
}

struct SweepShared {
    raw_heap: Arc<Mutex<RawHeap>>,
    stats: Arc<StatsCollector>,
    needs_done_notification: AtomicBool,
}

struct SweepJob {
    compactable_space_handling: CompactableSpaceHandling,
}

struct SweepSummary {
    freed_bytes: usize,
}

struct Worker {
    job_tx: Sender<SweepJob>,
    done_rx: Receiver<SweepSummary>,
    thread: JoinHandle<()>,
}

struct WorkerState {
    worker: Option<Worker>,
    pending: usize,
}

/// Default sweeper: frees every unmarked header, clears the mark bit on
/// survivors, and releases emptied pages back to the backend during the
/// done notification.
pub struct Sweeper {
    shared: Arc<SweepShared>,
    backend: Arc<dyn PageBackend>,
    support: SweepingSupport,
    state: Mutex<WorkerState>,
}

impl Sweeper {
    pub(crate) fn new(
        raw_heap: Arc<Mutex<RawHeap>>,
        backend: Arc<dyn PageBackend>,
        stats: Arc<StatsCollector>,
        support: SweepingSupport,
    ) -> Self {
        Self {
            shared: Arc::new(SweepShared {
                raw_heap,
                stats,
                needs_done_notification: AtomicBool::new(false),
            }),
            backend,
            support,
            state: Mutex::new(WorkerState {
                worker: None,
                pending: 0,
            }),
        }
    }
}

impl Sweep for Sweeper {
    fn start(&self, config: SweepingConfig) {
        // Two sweeps must not overlap.
        self.finish_if_running();

        let concurrent = config.sweeping_type == SweepingType::ConcurrentThenAtomic
            && self.support == SweepingSupport::IncrementalAndConcurrent;
        if !concurrent {
            sweep_spaces(&self.shared, config.compactable_space_handling);
            return;
        }

        let mut state = self.state.lock().unwrap();
        if state.worker.is_none() {
            let (job_tx, job_rx) = crossbeam_channel::unbounded::<SweepJob>();
            let (done_tx, done_rx) = crossbeam_channel::unbounded::<SweepSummary>();
            let shared = self.shared.clone();
            let thread = thread::spawn(move || {
                for job in job_rx {
                    let freed_bytes = sweep_spaces(&shared, job.compactable_space_handling);
                    if done_tx.send(SweepSummary { freed_bytes }).is_err() {
                        break;
                    }
                }
            });
            state.worker = Some(Worker {
                job_tx,
                done_rx,
                thread,
            });
        }
        state
            .worker
            .as_ref()
            .expect("worker was just spawned")
            .job_tx
            .send(SweepJob {
                compactable_space_handling: config.compactable_space_handling,
            })
            .expect("sweep worker hung up");
        state.pending += 1;
    }

    fn finish_if_running(&self) {
        let mut state = self.state.lock().unwrap();
        while state.pending > 0 {
            let summary = state
                .worker
                .as_ref()
                .expect("pending sweep without a worker")
                .done_rx
                .recv()
                .expect("sweep worker hung up");
            state.pending -= 1;
            debug!("joined background sweep, freed {} bytes", summary.freed_bytes);
        }
    }

    fn notify_done_if_needed(&self) {
        if !self
            .shared
            .needs_done_notification
            .swap(false, Ordering::SeqCst)
        {
            return;
        }

        let mut freed_pages = Vec::new();
        {
            let mut heap = self.shared.raw_heap.lock().unwrap();
            for space in heap.normal_spaces_mut() {
                collect_empty_pages(space.pages_mut(), &mut freed_pages);
            }
            for space in heap.custom_spaces_mut() {
                collect_empty_pages(space.pages_mut(), &mut freed_pages);
            }
        }
        for memory in freed_pages {
            self.shared.stats.notify_page_freed(memory.committed_bytes());
            self.backend.free_page(memory);
        }
        self.shared.stats.notify_sweeping_completed();
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let worker = self.state.lock().unwrap().worker.take();
        if let Some(Worker {
            job_tx,
            done_rx,
            thread,
        }) = worker
        {
            drop(job_tx);
            drop(done_rx);
            let _ = thread.join();
        }
    }
}

fn sweep_spaces(shared: &SweepShared, handling: CompactableSpaceHandling) -> usize {
    let mut freed = 0;
    {
        let mut heap = shared.raw_heap.lock().unwrap();
        for space in heap.normal_spaces_mut() {
            let bytes = sweep_pages(space.pages_mut());
            space.sub_allocated_bytes(bytes);
            freed += bytes;
        }
        for space in heap.custom_spaces_mut() {
            if space.supports_compaction() && handling == CompactableSpaceHandling::DeferToCompaction
            {
                continue;
            }
            let bytes = sweep_pages(space.pages_mut());
            space.sub_allocated_bytes(bytes);
            freed += bytes;
        }
    }
    if freed > 0 {
        shared.stats.notify_object_bytes_reclaimed(freed);
    }
    shared.needs_done_notification.store(true, Ordering::SeqCst);
    trace!("sweep freed {freed} bytes");
    freed
}

fn sweep_pages(pages: &mut [Page]) -> usize {
    let mut freed = 0;
    for page in pages.iter_mut() {
        for header in page.headers_mut() {
            if header.is_free() {
                continue;
            }
            if header.is_marked() {
                header.unmark();
            } else {
                header.mark_free();
                freed += header.size();
            }
        }
    }
    freed
}

fn collect_empty_pages(pages: &mut Vec<Page>, freed: &mut Vec<PageMemory>) {
    let mut index = 0;
    while index < pages.len() {
        pages[index].prune_free_headers();
        if pages[index].is_empty() {
            freed.push(pages.swap_remove(index).into_memory());
        } else {
            index += 1;
        }
    }
}
