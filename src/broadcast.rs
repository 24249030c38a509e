//! Broadcast engine
//!
//! Logs each message, then fans it out to every registered session
//! (the sender included). A failed delivery to one recipient is counted
//! and skipped; it never stops delivery to the others.

use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::chat_log::{ChatLog, LogEntry};
use crate::registry::SessionRegistry;
use crate::types::{SessionId, SYSTEM_SENDER};

/// Outcome of one `broadcast` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReport {
    /// Whether the log line reached the sink
    pub logged: bool,
    /// Recipients whose queue accepted the message
    pub delivered: usize,
    /// Recipients skipped because their queue was closed or stayed full
    pub failed: usize,
}

/// Logs and fans out messages to the session registry
#[derive(Debug)]
pub struct Broadcaster {
    registry: SessionRegistry,
    /// Held across append + fan-out so delivery order matches log order
    log: Mutex<ChatLog>,
    send_timeout: Duration,
}

impl Broadcaster {
    pub fn new(registry: SessionRegistry, log: ChatLog, send_timeout: Duration) -> Self {
        Self {
            registry,
            log: Mutex::new(log),
            send_timeout,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Log `message` under `sender` and deliver it to every Active session
    pub async fn broadcast(&self, message: &str, sender: &str) -> DeliveryReport {
        let entry = LogEntry::now(sender, message);
        let mut log = self.log.lock().await;

        let mut report = DeliveryReport::default();
        match log.append(&entry).await {
            Ok(()) => report.logged = true,
            Err(e) => error!("Failed to append to chat log: {}", e),
        }

        for recipient in self.registry.snapshot() {
            match recipient
                .outbound
                .send(message.to_string(), self.send_timeout)
                .await
            {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    debug!(
                        "Skipping '{}' ({}): {}",
                        recipient.username, recipient.session_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        drop(log);
        report
    }

    /// Announce that `username` joined
    pub async fn announce_join(&self, username: &str) -> DeliveryReport {
        self.broadcast(&format!("{username} has joined the chat."), SYSTEM_SENDER)
            .await
    }

    /// Remove a session and announce its departure
    ///
    /// Only the call that actually removes the entry broadcasts; later calls
    /// for the same session return `None` and send nothing.
    pub async fn depart(&self, session_id: SessionId) -> Option<String> {
        let username = self.registry.unregister(session_id)?;
        self.broadcast(&format!("{username} has left the chat."), SYSTEM_SENDER)
            .await;
        Some(username)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Outbound;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    const DEADLINE: Duration = Duration::from_millis(50);

    async fn broadcaster(tmp: &TempDir) -> Broadcaster {
        let log = ChatLog::open(&tmp.path().join("server_log.txt")).await.unwrap();
        Broadcaster::new(SessionRegistry::new(), log, DEADLINE)
    }

    fn join(b: &Broadcaster, username: &str, capacity: usize) -> (SessionId, mpsc::Receiver<String>) {
        let id = SessionId::new();
        let (tx, rx) = mpsc::channel(capacity);
        b.registry().register(id, username, Outbound::new(tx));
        (id, rx)
    }

    async fn log_lines(tmp: &TempDir) -> Vec<String> {
        tokio::fs::read_to_string(tmp.path().join("server_log.txt"))
            .await
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_broadcast_reaches_sender_and_others() {
        let tmp = TempDir::new().unwrap();
        let b = broadcaster(&tmp).await;
        let (_alice, mut alice_rx) = join(&b, "alice", 8);
        let (_bob, mut bob_rx) = join(&b, "bob", 8);

        let report = b.broadcast("[alice]: hi", "alice").await;
        assert_eq!(
            report,
            DeliveryReport {
                logged: true,
                delivered: 2,
                failed: 0
            }
        );

        assert_eq!(alice_rx.recv().await.unwrap(), "[alice]: hi");
        assert_eq!(bob_rx.recv().await.unwrap(), "[alice]: hi");
        assert!(alice_rx.try_recv().is_err());
        assert!(bob_rx.try_recv().is_err());

        let lines = log_lines(&tmp).await;
        assert_eq!(lines.len(), 1);
        let entry = LogEntry::parse(&lines[0]).unwrap();
        assert_eq!(entry.sender, "alice");
        assert_eq!(entry.message, "[alice]: hi");
    }

    #[tokio::test]
    async fn test_closed_recipient_does_not_block_live_one() {
        let tmp = TempDir::new().unwrap();
        let b = broadcaster(&tmp).await;
        let (_gone, gone_rx) = join(&b, "gone", 8);
        let (_live, mut live_rx) = join(&b, "live", 8);
        drop(gone_rx);

        let report = b.broadcast("still here", SYSTEM_SENDER).await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(live_rx.recv().await.unwrap(), "still here");
    }

    #[tokio::test]
    async fn test_stalled_recipient_times_out() {
        let tmp = TempDir::new().unwrap();
        let b = broadcaster(&tmp).await;
        let (_stalled, _stalled_rx) = join(&b, "stalled", 1);
        let (_live, mut live_rx) = join(&b, "live", 8);

        b.broadcast("one", SYSTEM_SENDER).await;
        let report = b.broadcast("two", SYSTEM_SENDER).await;

        // stalled's queue is full after "one"; it is skipped, not waited on forever
        assert_eq!(report.failed, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(live_rx.recv().await.unwrap(), "one");
        assert_eq!(live_rx.recv().await.unwrap(), "two");
    }

    /// Sink whose every write fails
    struct BrokenDisk;

    impl tokio::io::AsyncWrite for BrokenDisk {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Err(std::io::Error::other("disk full")))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_log_failure_still_fans_out() {
        let b = Broadcaster::new(SessionRegistry::new(), ChatLog::from_writer(BrokenDisk), DEADLINE);
        let (_id, mut rx) = join(&b, "alice", 8);

        let report = b.broadcast("m", SYSTEM_SENDER).await;
        assert_eq!(
            report,
            DeliveryReport {
                logged: false,
                delivered: 1,
                failed: 0
            }
        );
        assert_eq!(rx.recv().await.unwrap(), "m");
    }

    #[tokio::test]
    async fn test_depart_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let b = broadcaster(&tmp).await;
        let (alice, _alice_rx) = join(&b, "alice", 8);
        let (_bob, mut bob_rx) = join(&b, "bob", 8);

        assert_eq!(b.depart(alice).await, Some("alice".to_string()));
        assert_eq!(b.depart(alice).await, None);

        assert_eq!(bob_rx.recv().await.unwrap(), "alice has left the chat.");
        assert!(bob_rx.try_recv().is_err());

        let lines = log_lines(&tmp).await;
        assert_eq!(lines.len(), 1);
        assert!(lines[0].ends_with("] Server: alice has left the chat."));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_broadcasts_log_whole_lines() {
        const SENDERS: usize = 40;

        let tmp = TempDir::new().unwrap();
        let b = Arc::new(broadcaster(&tmp).await);

        let mut receivers = Vec::new();
        for i in 0..SENDERS {
            let (_id, rx) = join(&b, &format!("user{i}"), SENDERS + 1);
            receivers.push(rx);
        }

        let mut tasks = Vec::new();
        for i in 0..SENDERS {
            let b = Arc::clone(&b);
            tasks.push(tokio::spawn(async move {
                let user = format!("user{i}");
                b.broadcast(&format!("[{user}]: message number {i}"), &user)
                    .await
            }));
        }
        for task in tasks {
            let report = task.await.unwrap();
            assert_eq!(report.delivered, SENDERS);
        }

        let lines = log_lines(&tmp).await;
        assert_eq!(lines.len(), SENDERS);
        let mut seen: Vec<String> = lines
            .iter()
            .map(|line| {
                let entry = LogEntry::parse(line).expect("corrupted log line");
                assert_eq!(entry.message, format!("[{}]: message number {}", entry.sender, &entry.sender[4..]));
                entry.sender
            })
            .collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), SENDERS);

        // Every recipient sees the messages in log order
        let logged: Vec<String> = lines
            .iter()
            .map(|line| LogEntry::parse(line).unwrap().message)
            .collect();
        for rx in receivers.iter_mut() {
            let mut got = Vec::new();
            while let Ok(msg) = rx.try_recv() {
                got.push(msg);
            }
            assert_eq!(got, logged);
        }
    }
}
