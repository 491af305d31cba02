//! Four-slot player-indicator LED registry (§4.6).

use std::sync::Mutex;

/// A mutex-guarded 4-slot boolean registry for player LEDs.
///
/// Only [`SessionRegistry`](crate::registry::SessionRegistry) acquires
/// and releases slots; sessions themselves never touch this directly.
#[derive(Debug, Default)]
pub struct LedAllocator {
    slots: Mutex<[bool; 4]>,
}

impl LedAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the 1-based index of the first free slot. If all four
    /// slots are taken, returns 1 without marking anything free (the
    /// original driver's last-slot overflow policy, preserved here).
    pub fn acquire(&self) -> u8 {
        let mut slots = self.slots.lock().unwrap();
        for (i, taken) in slots.iter_mut().enumerate() {
            if !*taken {
                *taken = true;
                return (i + 1) as u8;
            }
        }
        1
    }

    /// Frees the slot at `index` (1-based). Indices outside `1..=4` are
    /// ignored.
    pub fn release(&self, index: u8) {
        if let Some(slot) = (index as usize).checked_sub(1) {
            if let Some(taken) = self.slots.lock().unwrap().get_mut(slot) {
                *taken = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquires_in_order_and_overflows_to_one() {
        let alloc = LedAllocator::new();
        assert_eq!(alloc.acquire(), 1);
        assert_eq!(alloc.acquire(), 2);
        assert_eq!(alloc.acquire(), 3);
        assert_eq!(alloc.acquire(), 4);
        // Fifth concurrent acquire, all slots taken.
        assert_eq!(alloc.acquire(), 1);
    }

    #[test]
    fn release_frees_a_slot_for_reuse() {
        let alloc = LedAllocator::new();
        let a = alloc.acquire();
        let _b = alloc.acquire();
        alloc.release(a);
        assert_eq!(alloc.acquire(), a);
    }

    #[test]
    fn released_slot_is_not_returned_until_freed() {
        let alloc = LedAllocator::new();
        let s = alloc.acquire();
        assert_ne!(alloc.acquire(), s);
    }
}
