//! Outgoing packets built on the counted lifecycle.
//!
//! A packet queued on several connections carries one pending use per
//! connection. Each connection writes it and then completes it; the last
//! completion sends the packet back to its pool.

use std::sync::Arc;
use std::thread;

use hotpath_core::error::LifecycleError;
use hotpath_core::traits::Reusable;
use log::warn;

use crate::pool::{Completion, Counted};

/// A payload that can serialize itself for the wire.
pub trait SendablePacket: Reusable + Send + Sync + 'static {
    /// Append the encoded packet to `buffer`.
    fn write_to(&self, buffer: &mut Vec<u8>);
}

impl<P: SendablePacket> Counted<P> {
    /// Encode the packet into `buffer`, returning the number of bytes written.
    ///
    /// Writing a packet with no pending use means it was never claimed or has
    /// already gone back to its pool, so the write is refused.
    pub fn write(&self, buffer: &mut Vec<u8>) -> Result<usize, LifecycleError> {
        if let Err(err) = self.check_active() {
            warn!(
                "Refusing to write released packet on thread {}: {}",
                thread::current().name().unwrap_or("<unnamed>"),
                err
            );
            return Err(err);
        }

        let start = buffer.len();
        self.payload().write_to(buffer);
        Ok(buffer.len() - start)
    }

    /// Encode the packet into `buffer` and release the use this write held.
    pub fn write_and_complete(
        self: &Arc<Self>,
        buffer: &mut Vec<u8>,
    ) -> Result<Completion, LifecycleError> {
        self.write(buffer)?;
        self.complete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::CountedPool;

    #[derive(Debug, Default)]
    struct Chat {
        sender: u16,
        text: String,
    }

    impl Reusable for Chat {
        fn free(&mut self) {
            self.sender = 0;
            self.text.clear();
        }
    }

    impl SendablePacket for Chat {
        fn write_to(&self, buffer: &mut Vec<u8>) {
            buffer.extend_from_slice(&self.sender.to_le_bytes());
            buffer.extend_from_slice(self.text.as_bytes());
        }
    }

    #[test]
    fn test_broadcast_to_three_connections() {
        let pool = CountedPool::new(Chat::default);
        let packet = pool.acquire_with_uses(3).unwrap();
        {
            let mut chat = packet.payload_mut();
            chat.sender = 2;
            chat.text.push_str("hi");
        }

        let mut outputs = vec![Vec::new(), Vec::new(), Vec::new()];
        let mut outcomes = vec![];
        for output in &mut outputs {
            outcomes.push(packet.write_and_complete(output).unwrap());
        }

        assert_eq!(outputs[0], vec![2, 0, b'h', b'i']);
        assert_eq!(outputs[0], outputs[2]);
        assert_eq!(
            outcomes,
            vec![
                Completion::Pending(2),
                Completion::Pending(1),
                Completion::Released
            ]
        );
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_write_without_pending_use_rejected() {
        let pool = CountedPool::new(Chat::default);
        let packet = pool.acquire();
        let mut buffer = Vec::new();

        assert_eq!(packet.write(&mut buffer), Err(LifecycleError::Inactive));

        packet.increase_uses(1).unwrap();
        assert_eq!(packet.write(&mut buffer), Ok(2));
        packet.complete().unwrap();

        assert_eq!(packet.write(&mut buffer), Err(LifecycleError::Released));
        assert_eq!(buffer.len(), 2);
    }
}
