use std::collections::VecDeque;

use tokio::sync::{Mutex, Notify, oneshot};

use crate::models::SubmissionRecord;

pub enum GradeMessage {
    FireAndForget {
        submission_id: i64,
    },
    Blocking {
        submission_id: i64,
        responder: oneshot::Sender<SubmissionRecord>,
    },
}

impl GradeMessage {
    pub fn id(&self) -> i64 {
        match self {
            Self::FireAndForget { submission_id } => *submission_id,
            Self::Blocking { submission_id, .. } => *submission_id,
        }
    }
}

/// FIFO of submissions waiting for a grading worker
pub struct SubmissionQueue {
    queue: Mutex<VecDeque<GradeMessage>>,
    notify: Notify,
}

impl SubmissionQueue {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Enqueues a message. Returns `false` if the submission is already queued.
    pub async fn push(&self, message: GradeMessage) -> bool {
        let mut queue = self.queue.lock().await;
        if queue.iter().any(|m| m.id() == message.id()) {
            return false;
        }
        queue.push_back(message);
        drop(queue);

        self.notify.notify_one();
        true
    }

    pub async fn pop(&self) -> GradeMessage {
        loop {
            if let Some(message) = self.queue.lock().await.pop_front() {
                return message;
            }
            self.notify.notified().await;
        }
    }

    /// Removes a queued submission. Returns whether it was still waiting.
    pub async fn cancel(&self, submission_id: i64) -> bool {
        let mut queue = self.queue.lock().await;
        let before_len = queue.len();
        queue.retain(|m| m.id() != submission_id);
        before_len != queue.len()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }
}

impl Default for SubmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}
