//! In-memory reminder timers.
//!
//! Reminders are created by the reminder tools and deliberately outlive the
//! session that set them: a standalone subsystem with its own timer tasks.
//! Firing goes through an announce callback that is gated on a liveness
//! flag, so a timer from an ended session can never touch a closed playback
//! device.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::ToolError;

/// A pending reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderTask {
    pub id: String,
    pub fire_at: DateTime<Local>,
    pub text: String,
}

/// Lifecycle notifications for the UI badge list.
#[derive(Debug, Clone)]
pub enum ReminderEvent {
    Added(ReminderTask),
    Fired(ReminderTask),
    Cancelled(String),
}

/// Callback that speaks a fired reminder.
pub type AnnounceFn =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Schedules and fires reminders, independent of any session.
#[derive(Clone)]
pub struct ReminderScheduler {
    pending: Arc<Mutex<Vec<ReminderTask>>>,
    events_tx: mpsc::UnboundedSender<ReminderEvent>,
    announce: AnnounceFn,
    /// True while a live playback path exists.
    alive: watch::Receiver<bool>,
}

impl ReminderScheduler {
    pub fn new(
        announce: AnnounceFn,
        alive: watch::Receiver<bool>,
    ) -> (Self, mpsc::UnboundedReceiver<ReminderEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Arc::new(Mutex::new(Vec::new())),
                events_tx,
                announce,
                alive,
            },
            events_rx,
        )
    }

    /// Schedule a reminder `delay` from now.
    pub fn set_after(&self, delay: Duration, text: &str) -> ReminderTask {
        let task = ReminderTask {
            id: Uuid::new_v4().to_string()[..8].to_string(),
            fire_at: Local::now() + chrono::Duration::from_std(delay).unwrap_or_default(),
            text: text.to_string(),
        };
        self.arm(task.clone(), delay);
        task
    }

    /// Schedule a reminder at the next occurrence of `HH:MM` local time.
    pub fn set_at(&self, hhmm: &str, text: &str) -> Result<ReminderTask, ToolError> {
        let time = NaiveTime::parse_from_str(hhmm, "%H:%M").map_err(|e| ToolError::InvalidArgs {
            name: "setReminderAtTime".to_string(),
            message: format!("bad time '{hhmm}': {e}"),
        })?;
        let now = Local::now();
        let mut delta = time - now.time();
        if delta <= chrono::Duration::zero() {
            delta = delta + chrono::Duration::days(1);
        }
        let delay = delta.to_std().unwrap_or_default();
        Ok(self.set_after(delay, text))
    }

    /// Pending reminders, soonest first.
    pub fn list(&self) -> Vec<ReminderTask> {
        let mut tasks = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        tasks.sort_by_key(|t| t.fire_at);
        tasks
    }

    /// Cancel a pending reminder. Returns `true` if one was removed.
    pub fn cancel(&self, id: &str) -> bool {
        let mut g = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        let before = g.len();
        g.retain(|t| t.id != id);
        let removed = g.len() < before;
        if removed {
            let _ = self.events_tx.send(ReminderEvent::Cancelled(id.to_string()));
            info!("reminder {id} cancelled");
        }
        removed
    }

    fn arm(&self, task: ReminderTask, delay: Duration) {
        {
            let mut g = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            g.push(task.clone());
        }
        let _ = self.events_tx.send(ReminderEvent::Added(task.clone()));
        info!("reminder {} set for {}", task.id, task.fire_at);

        let pending = self.pending.clone();
        let events_tx = self.events_tx.clone();
        let announce = self.announce.clone();
        let alive = self.alive.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let still_pending = {
                let mut g = pending.lock().unwrap_or_else(|e| e.into_inner());
                let before = g.len();
                g.retain(|t| t.id != task.id);
                g.len() < before
            };
            if !still_pending {
                return; // cancelled while sleeping
            }
            let _ = events_tx.send(ReminderEvent::Fired(task.clone()));
            if *alive.borrow() {
                (announce)(task.text.clone()).await;
            } else {
                debug!("reminder {} fired with no live playback; dropped", task.id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_announcer() -> (AnnounceFn, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let announce: AnnounceFn = Arc::new(move |_text| {
            let c = c.clone();
            Box::pin(async move {
                c.fetch_add(1, Ordering::SeqCst);
            })
        });
        (announce, count)
    }

    #[tokio::test(start_paused = true)]
    async fn reminder_fires_and_announces_when_alive() {
        let (announce, count) = counting_announcer();
        let (_alive_tx, alive_rx) = watch::channel(true);
        let (sched, mut events) = ReminderScheduler::new(announce, alive_rx);

        sched.set_after(Duration::from_secs(30), "tea is ready");
        assert_eq!(sched.list().len(), 1);
        assert!(matches!(events.recv().await, Some(ReminderEvent::Added(_))));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(matches!(events.recv().await, Some(ReminderEvent::Fired(t)) if t.text == "tea is ready"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(sched.list().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fired_reminder_is_dropped_without_live_playback() {
        let (announce, count) = counting_announcer();
        let (_alive_tx, alive_rx) = watch::channel(false);
        let (sched, mut events) = ReminderScheduler::new(announce, alive_rx);

        sched.set_after(Duration::from_secs(5), "stale");
        tokio::time::sleep(Duration::from_secs(6)).await;
        let _ = events.recv().await; // Added
        assert!(matches!(events.recv().await, Some(ReminderEvent::Fired(_))));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_reminder_never_fires() {
        let (announce, count) = counting_announcer();
        let (_alive_tx, alive_rx) = watch::channel(true);
        let (sched, _events) = ReminderScheduler::new(announce, alive_rx);

        let task = sched.set_after(Duration::from_secs(10), "nope");
        assert!(sched.cancel(&task.id));
        assert!(!sched.cancel(&task.id));
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn set_at_rejects_malformed_time() {
        let (announce, _) = counting_announcer();
        let (_alive_tx, alive_rx) = watch::channel(true);
        let (sched, _events) = ReminderScheduler::new(announce, alive_rx);
        assert!(sched.set_at("25:99", "x").is_err());
        assert!(sched.set_at("not a time", "x").is_err());
    }

    #[tokio::test]
    async fn set_at_schedules_in_the_future() {
        let (announce, _) = counting_announcer();
        let (_alive_tx, alive_rx) = watch::channel(true);
        let (sched, _events) = ReminderScheduler::new(announce, alive_rx);
        let task = sched.set_at("00:00", "midnight").unwrap();
        assert!(task.fire_at > Local::now());
    }
}
