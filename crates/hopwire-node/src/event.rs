use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// The three categories of deferred work a node schedules onto itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    PacketOutgoing,
    PacketIncoming,
    RouteCacheUpdate,
}

const KINDS: [EventKind; 3] = [
    EventKind::PacketOutgoing,
    EventKind::PacketIncoming,
    EventKind::RouteCacheUpdate,
];

pub type Task = Box<dyn FnOnce() + Send>;

/// Three independent FIFO queues, one per `EventKind`. Producers from any
/// thread push onto a queue; a single scheduler pump drains each queue in
/// enqueue order. No ordering is guaranteed across different queues.
#[derive(Default)]
pub struct EventQueues {
    outgoing: Mutex<VecDeque<Task>>,
    incoming: Mutex<VecDeque<Task>>,
    cache_update: Mutex<VecDeque<Task>>,
}

impl EventQueues {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_for(&self, kind: EventKind) -> &Mutex<VecDeque<Task>> {
        match kind {
            EventKind::PacketOutgoing => &self.outgoing,
            EventKind::PacketIncoming => &self.incoming,
            EventKind::RouteCacheUpdate => &self.cache_update,
        }
    }

    pub fn push(&self, kind: EventKind, task: Task) {
        self.queue_for(kind)
            .lock()
            .expect("event queue lock poisoned")
            .push_back(task);
    }

    pub fn is_empty(&self) -> bool {
        KINDS.iter().all(|k| {
            self.queue_for(*k)
                .lock()
                .expect("event queue lock poisoned")
                .is_empty()
        })
    }

    /// Drains every queue once, in FIFO order per queue, running each task
    /// to completion before popping the next. Returns the number of tasks run.
    pub fn drain_pass(&self) -> usize {
        let mut ran = 0usize;
        for kind in KINDS {
            loop {
                let next = self
                    .queue_for(kind)
                    .lock()
                    .expect("event queue lock poisoned")
                    .pop_front();
                match next {
                    Some(task) => {
                        task();
                        ran += 1;
                    }
                    None => break,
                }
            }
        }
        ran
    }
}

/// Runs the scheduler pump loop on the calling thread: repeatedly drains
/// all event queues, then invokes `on_each_pass` (used for the ACK-timeout
/// sweep), then sleeps briefly, until `stop` is set.
pub fn run_pump(queues: &EventQueues, stop: &AtomicBool, on_each_pass: impl Fn(), tick: Duration) {
    while !stop.load(Ordering::SeqCst) {
        queues.drain_pass();
        on_each_pass();
        std::thread::sleep(tick);
    }
    // final drain so nothing queued right before shutdown is lost
    queues.drain_pass();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn tasks_on_the_same_queue_run_in_fifo_order() {
        let queues = EventQueues::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            queues.push(EventKind::PacketOutgoing, Box::new(move || {
                order.lock().unwrap().push(i);
            }));
        }

        queues.drain_pass();
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn drain_pass_runs_tasks_from_every_queue() {
        let queues = EventQueues::new();
        let count = Arc::new(AtomicUsize::new(0));

        for kind in KINDS {
            let count = Arc::clone(&count);
            queues.push(kind, Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        let ran = queues.drain_pass();
        assert_eq!(ran, 3);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert!(queues.is_empty());
    }

    #[test]
    fn run_pump_stops_when_flag_is_set() {
        let queues = EventQueues::new();
        let stop = Arc::new(AtomicBool::new(false));
        let passes = Arc::new(AtomicUsize::new(0));

        let passes_clone = Arc::clone(&passes);
        let stop_clone = Arc::clone(&stop);
        run_pump(
            &queues,
            &stop,
            move || {
                let n = passes_clone.fetch_add(1, Ordering::SeqCst);
                if n >= 2 {
                    stop_clone.store(true, Ordering::SeqCst);
                }
            },
            Duration::from_millis(1),
        );

        assert!(passes.load(Ordering::SeqCst) >= 3);
    }
}
