/*!
 * The IEEE 488.2 status byte shared by a session and its device.
 */
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Named status byte bits
pub struct StatusBits;

impl StatusBits {
    /// MAV: output is waiting to be read
    pub const MESSAGE_AVAILABLE: u8 = 0x10;
    /// ESB: a standard event is pending
    pub const EVENT_SUMMARY: u8 = 0x20;
    /// RQS/MSS: the device requests service
    pub const REQUEST_SERVICE: u8 = 0x40;
}

/// An 8-bit status cell.
///
/// The device writes it; the client reads it, and a client read clears it.
#[derive(Default)]
pub struct StatusByte(AtomicU8);

impl StatusByte {
    /// A cleared status byte
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole byte
    pub fn set(&self, value: u8) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Current value, leaving it untouched
    pub fn peek(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    /// Current value, zeroing it in the same step
    pub fn read_and_clear(&self) -> u8 {
        self.0.swap(0, Ordering::SeqCst)
    }

    /// OR `mask` into the byte, returning the previous value
    pub fn raise(&self, mask: u8) -> u8 {
        self.0.fetch_or(mask, Ordering::SeqCst)
    }

    /// Clear the bits of `mask`, returning the previous value
    pub fn lower(&self, mask: u8) -> u8 {
        self.0.fetch_and(!mask, Ordering::SeqCst)
    }

    /// Zero the byte
    pub fn clear(&self) {
        self.set(0);
    }

    /// Whether every bit of `mask` is set
    pub fn contains(&self, mask: u8) -> bool {
        self.peek() & mask == mask
    }
}

impl fmt::Debug for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusByte({:#04x})", self.peek())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_peek_does_not_clear() {
        let stb = StatusByte::new();
        stb.set(0x41);
        assert_eq!(stb.peek(), 0x41);
        assert_eq!(stb.peek(), 0x41);
        assert_eq!(stb.read_and_clear(), 0x41);
        assert_eq!(stb.read_and_clear(), 0);
    }

    #[test]
    fn test_raise_and_contains() {
        let stb = StatusByte::new();
        stb.raise(0x01);
        stb.raise(StatusBits::REQUEST_SERVICE);
        assert_eq!(stb.peek(), 0x41);
        assert!(stb.contains(StatusBits::REQUEST_SERVICE));
        assert!(!stb.contains(StatusBits::MESSAGE_AVAILABLE));
        assert_eq!(stb.lower(0x01), 0x41);
        assert_eq!(stb.peek(), StatusBits::REQUEST_SERVICE);
        stb.clear();
        assert_eq!(format!("{:?}", stb), "StatusByte(0x00)");
    }

    #[test]
    fn test_concurrent_raises_are_not_lost() {
        let stb = Arc::new(StatusByte::new());
        let handles: Vec<_> = (0..8)
            .map(|bit| {
                let stb = stb.clone();
                thread::spawn(move || {
                    stb.raise(1 << bit);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(stb.read_and_clear(), 0xff);
    }
}
