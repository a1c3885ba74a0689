//! Message-queue multiplexer (C3): one FIFO per in-flight sequence number,
//! inside a single logical socket. Ties directly to `core.py`'s
//! `CoreMessageQueue` — unknown tags fall back to the root queue (seq 0) so
//! broadcasts and unexpected replies are never dropped.

use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;

pub const ROOT_TAG: u32 = 0;

#[derive(Default)]
struct Queue {
    items: VecDeque<Vec<u8>>,
    notify: std::sync::Arc<Notify>,
}

/// Owns one `seq -> FIFO` map. Not `Sync` by itself across kernel sockets —
/// each thread's [`crate::netlink::socket::NetlinkSocket`] owns its own
/// `MessageQueue`, per the "no cross-thread sharing of socket state" rule.
#[derive(Default)]
pub struct MessageQueue {
    queues: HashMap<u32, Queue>,
}

impl MessageQueue {
    pub fn new() -> Self {
        let mut queues = HashMap::new();
        queues.insert(ROOT_TAG, Queue::default());
        MessageQueue { queues }
    }

    pub fn ensure_tag(&mut self, seq: u32) {
        self.queues.entry(seq).or_default();
    }

    pub fn free_tag(&mut self, seq: u32) {
        if seq != ROOT_TAG {
            self.queues.remove(&seq);
        }
    }

    /// Enqueue `bytes` on `seq`'s queue, or the root queue if `seq` is
    /// unknown (never silently drop).
    pub fn put_nowait(&mut self, seq: u32, bytes: Vec<u8>) {
        let target = if self.queues.contains_key(&seq) { seq } else { ROOT_TAG };
        let queue = self.queues.get_mut(&target).expect("root queue always present");
        queue.items.push_back(bytes);
        queue.notify.notify_one();
    }

    /// Await the next item queued for `seq`. Returns `None` if the tag does
    /// not exist (freed or never created).
    pub async fn get(&mut self, seq: u32) -> Option<Vec<u8>> {
        loop {
            let notify = {
                let queue = self.queues.get_mut(&seq)?;
                if let Some(item) = queue.items.pop_front() {
                    return Some(item);
                }
                queue.notify.clone()
            };
            notify.notified().await;
        }
    }

    /// Try to pop without waiting; used by the mock engine and tests.
    pub fn try_get(&mut self, seq: u32) -> Option<Vec<u8>> {
        self.queues.get_mut(&seq)?.items.pop_front()
    }

    /// Enqueue a synthetic `ECONNRESET` `NLMSG_ERROR` on every open queue so
    /// any awaiting `get` wakes up, per the connection-loss contract.
    pub fn close(&mut self) {
        let synthetic = synthetic_econnreset(0);
        for queue in self.queues.values_mut() {
            queue.items.push_back(synthetic.clone());
            queue.notify.notify_one();
        }
    }

    pub fn tags(&self) -> impl Iterator<Item = u32> + '_ {
        self.queues.keys().copied()
    }
}

fn synthetic_econnreset(seq: u32) -> Vec<u8> {
    use crate::netlink::messages::{NlMsgHeader, NLMSG_ERROR};
    use crate::netlink::wire::Header;

    let errno = -(libc::ECONNRESET);
    let mut body = Vec::new();
    body.extend_from_slice(&errno.to_ne_bytes());
    body.extend_from_slice(&[0u8; 16]); // echoed request header, zeroed

    let mut buf = Vec::new();
    let header = NlMsgHeader { len: (16 + body.len()) as u32, kind: NLMSG_ERROR, flags: 0, seq, pid: 0 };
    header.encode(&mut buf);
    buf.extend_from_slice(&body);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tag_falls_back_to_root() {
        let mut mq = MessageQueue::new();
        mq.put_nowait(42, b"hello".to_vec());
        assert_eq!(mq.try_get(ROOT_TAG), Some(b"hello".to_vec()));
    }

    #[test]
    fn known_tag_keeps_fifo_order() {
        let mut mq = MessageQueue::new();
        mq.ensure_tag(5);
        mq.put_nowait(5, b"a".to_vec());
        mq.put_nowait(5, b"b".to_vec());
        assert_eq!(mq.try_get(5), Some(b"a".to_vec()));
        assert_eq!(mq.try_get(5), Some(b"b".to_vec()));
    }

    #[test]
    fn free_tag_removes_queue() {
        let mut mq = MessageQueue::new();
        mq.ensure_tag(5);
        mq.free_tag(5);
        mq.put_nowait(5, b"x".to_vec());
        assert_eq!(mq.try_get(5), None);
        assert_eq!(mq.try_get(ROOT_TAG), Some(b"x".to_vec()));
    }

    #[tokio::test]
    async fn close_wakes_waiters_with_econnreset() {
        let mut mq = MessageQueue::new();
        mq.ensure_tag(7);
        mq.close();
        let item = mq.get(7).await.unwrap();
        assert!(item.len() >= 16);
    }
}
