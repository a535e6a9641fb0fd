use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};

use super::WorkerEvent;

/// Creates the worker-to-owner event channel for one session.
pub fn completion_mailbox() -> (MailboxSender, CompletionMailbox) {
    let (tx, rx) = channel();
    (
        MailboxSender {
            tx,
            finished: AtomicBool::new(false),
        },
        CompletionMailbox { rx },
    )
}

/// Worker side of the mailbox. Not `Clone`: a session has a single poster.
pub struct MailboxSender {
    tx: Sender<WorkerEvent>,
    finished: AtomicBool,
}

impl MailboxSender {
    /// Returns false when the event was rejected: a second `Finished`, or the
    /// owner has gone away.
    pub fn post(&self, event: WorkerEvent) -> bool {
        if let WorkerEvent::Finished(completion) = &event {
            if self.finished.swap(true, Ordering::AcqRel) {
                tracing::error!(
                    session = %completion.session,
                    "second completion posted for one session; dropping it"
                );
                return false;
            }
        }
        self.tx.send(event).is_ok()
    }
}

/// Owner side of the mailbox, drained once per tick.
pub struct CompletionMailbox {
    rx: Receiver<WorkerEvent>,
}

impl CompletionMailbox {
    /// Everything posted so far, in post order. Never blocks.
    pub fn drain(&mut self) -> Vec<WorkerEvent> {
        self.rx.try_iter().collect()
    }
}
