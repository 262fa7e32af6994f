//! Rx Soft-Buffer Pool
//!
//! Bounded pool of HARQ combining buffers used by the uplink decoder.
//! A reservation is keyed by `(ue_index, harq_id, ndi)`: re-reserving
//! the same key refreshes the expiry and returns the same physical
//! buffer so soft bits accumulate across retransmissions. Entries not
//! refreshed within the expiry timeout are swept back to free by the
//! per-slot run.

use common::slot_point::SlotPoint;
use common::types::{HarqProcessId, UeIndex};
use tracing::debug;

/// Identifier of one logical HARQ soft buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftbufferId {
    pub ue_index: UeIndex,
    pub harq_id: HarqProcessId,
    /// New-data indicator of the initial transmission
    pub ndi: bool,
}

/// Pool sizing and expiry parameters
#[derive(Debug, Clone)]
pub struct RxSoftbufferPoolConfig {
    /// Number of physical buffers; provisioned for peak UE load
    pub max_softbuffers: usize,
    /// Codeblocks per buffer
    pub max_nof_codeblocks: usize,
    /// Soft bits per codeblock
    pub max_codeblock_size: usize,
    /// Slots a reservation survives without refresh
    pub expire_timeout_slots: u32,
}

struct Reservation {
    id: SoftbufferId,
    expire_slot: SlotPoint,
    nof_codeblocks: usize,
}

/// One physical combining buffer
pub struct RxSoftbuffer {
    index: usize,
    reservation: Option<Reservation>,
    codeblocks: Vec<Vec<i8>>,
}

impl RxSoftbuffer {
    fn new(index: usize, max_nof_codeblocks: usize, max_codeblock_size: usize) -> Self {
        Self {
            index,
            reservation: None,
            codeblocks: vec![vec![0; max_codeblock_size]; max_nof_codeblocks],
        }
    }

    /// Stable index of this buffer within the pool
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_reserved(&self) -> bool {
        self.reservation.is_some()
    }

    fn match_id(&self, id: &SoftbufferId) -> bool {
        self.reservation.as_ref().is_some_and(|r| r.id == *id)
    }

    /// Codeblocks of the current reservation
    pub fn nof_codeblocks(&self) -> usize {
        self.reservation.as_ref().map_or(0, |r| r.nof_codeblocks)
    }

    /// Soft bits of one codeblock
    pub fn codeblock_soft_bits(&mut self, codeblock: usize) -> &mut [i8] {
        assert!(
            codeblock < self.nof_codeblocks(),
            "Codeblock {} out of range",
            codeblock
        );
        &mut self.codeblocks[codeblock]
    }

    fn reserve(&mut self, id: SoftbufferId, expire_slot: SlotPoint, nof_codeblocks: usize) {
        match &mut self.reservation {
            Some(res) if res.id == id => {
                // Refresh: keep accumulated soft bits, extend the expiry
                // and grow the codeblock count if the retransmission
                // needs more.
                res.expire_slot = expire_slot;
                if nof_codeblocks > res.nof_codeblocks {
                    for cb in &mut self.codeblocks[res.nof_codeblocks..nof_codeblocks] {
                        cb.iter_mut().for_each(|b| *b = 0);
                    }
                    res.nof_codeblocks = nof_codeblocks;
                }
            }
            _ => {
                for cb in &mut self.codeblocks[..nof_codeblocks] {
                    cb.iter_mut().for_each(|b| *b = 0);
                }
                self.reservation = Some(Reservation {
                    id,
                    expire_slot,
                    nof_codeblocks,
                });
            }
        }
    }

    fn free(&mut self) {
        self.reservation = None;
    }

    fn run_slot(&mut self, slot: SlotPoint) {
        if let Some(res) = &self.reservation {
            if res.expire_slot <= slot {
                debug!("Softbuffer {} expired at slot {}", self.index, slot);
                self.reservation = None;
            }
        }
    }
}

/// Pool of receive soft buffers. Designed for single-threaded use from
/// the uplink cell executor; wrap in an external lock for cross-cell
/// sharing.
pub struct RxSoftbufferPool {
    buffers: Vec<RxSoftbuffer>,
    expire_timeout_slots: u32,
}

impl RxSoftbufferPool {
    pub fn new(config: &RxSoftbufferPoolConfig) -> Self {
        Self {
            buffers: (0..config.max_softbuffers)
                .map(|i| RxSoftbuffer::new(i, config.max_nof_codeblocks, config.max_codeblock_size))
                .collect(),
            expire_timeout_slots: config.expire_timeout_slots,
        }
    }

    /// Reserve a buffer for `id`. An existing reservation with the same
    /// id is refreshed and returned; otherwise the free entry with the
    /// lowest index is taken. Exhaustion is a provisioning error.
    pub fn reserve(
        &mut self,
        slot: SlotPoint,
        id: SoftbufferId,
        nof_codeblocks: usize,
    ) -> &mut RxSoftbuffer {
        assert!(
            nof_codeblocks <= self.buffers[0].codeblocks.len(),
            "Requested {} codeblocks exceeds the configured maximum",
            nof_codeblocks
        );
        let expire_slot = slot + self.expire_timeout_slots;

        // Look for the same identifier.
        if let Some(i) = self.buffers.iter().position(|b| b.match_id(&id)) {
            self.buffers[i].reserve(id, expire_slot, nof_codeblocks);
            return &mut self.buffers[i];
        }

        // If the same identifier was not found, select the first available.
        if let Some(i) = self.buffers.iter().position(|b| !b.is_reserved()) {
            self.buffers[i].reserve(id, expire_slot, nof_codeblocks);
            return &mut self.buffers[i];
        }

        panic!(
            "Failed to reserve softbuffer. {} entries are not enough.",
            self.buffers.len()
        );
    }

    /// Release the reservation matching `id`; no-op if absent.
    pub fn free(&mut self, id: SoftbufferId) {
        if let Some(buffer) = self.buffers.iter_mut().find(|b| b.match_id(&id)) {
            buffer.free();
        }
    }

    /// Sweep reservations whose expiry slot has passed.
    pub fn run_slot(&mut self, slot: SlotPoint) {
        for buffer in &mut self.buffers {
            buffer.run_slot(slot);
        }
    }

    /// Number of currently reserved entries
    pub fn nof_reserved(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_reserved()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::SubcarrierSpacing;

    fn sl(count: u32) -> SlotPoint {
        SlotPoint::new(SubcarrierSpacing::Scs15, (count / 10) as u16, count % 10)
    }

    fn pool(max_softbuffers: usize, timeout: u32) -> RxSoftbufferPool {
        RxSoftbufferPool::new(&RxSoftbufferPoolConfig {
            max_softbuffers,
            max_nof_codeblocks: 8,
            max_codeblock_size: 64,
            expire_timeout_slots: timeout,
        })
    }

    fn id(ue: u16, harq: u8) -> SoftbufferId {
        SoftbufferId {
            ue_index: UeIndex(ue),
            harq_id: HarqProcessId(harq),
            ndi: false,
        }
    }

    #[test]
    fn test_harq_retx_returns_same_buffer_with_refreshed_expiry() {
        let mut pool = pool(4, 8);

        let idx = {
            let buffer = pool.reserve(sl(10), id(1, 3), 6);
            buffer.codeblock_soft_bits(0)[0] = 42;
            buffer.index()
        };
        // Retransmission one slot later maps to the same physical buffer
        // and keeps the accumulated soft bits.
        let buffer = pool.reserve(sl(11), id(1, 3), 6);
        assert_eq!(buffer.index(), idx);
        assert_eq!(buffer.codeblock_soft_bits(0)[0], 42);

        // The refresh moved the expiry to slot 11 + 8: the buffer
        // survives the sweep at 18 and expires at 19.
        pool.run_slot(sl(18));
        assert_eq!(pool.nof_reserved(), 1);
        pool.run_slot(sl(19));
        assert_eq!(pool.nof_reserved(), 0);
    }

    #[test]
    fn test_distinct_ids_get_distinct_buffers_lowest_index_first() {
        let mut pool = pool(4, 8);
        let a = pool.reserve(sl(0), id(1, 0), 2).index();
        let b = pool.reserve(sl(0), id(1, 1), 2).index();
        let c = pool.reserve(sl(0), id(2, 0), 2).index();
        assert_eq!((a, b, c), (0, 1, 2));
    }

    #[test]
    fn test_free_releases_and_reuse_is_deterministic() {
        let mut pool = pool(3, 8);
        pool.reserve(sl(0), id(1, 0), 2);
        pool.reserve(sl(0), id(1, 1), 2);
        pool.free(id(1, 0));
        // Freeing an unknown id is a no-op.
        pool.free(id(9, 9));
        assert_eq!(pool.nof_reserved(), 1);

        // The freed slot 0 is handed out again first.
        let buffer = pool.reserve(sl(1), id(3, 0), 2);
        assert_eq!(buffer.index(), 0);
    }

    #[test]
    fn test_run_slot_is_idempotent() {
        let mut pool = pool(2, 4);
        pool.reserve(sl(0), id(1, 0), 2);
        pool.run_slot(sl(4));
        let after_first = pool.nof_reserved();
        pool.run_slot(sl(4));
        assert_eq!(pool.nof_reserved(), after_first);
        assert_eq!(after_first, 0);
    }

    #[test]
    fn test_new_reservation_zeroes_soft_bits() {
        let mut pool = pool(1, 8);
        {
            let buffer = pool.reserve(sl(0), id(1, 0), 2);
            buffer.codeblock_soft_bits(1)[5] = 77;
        }
        pool.free(id(1, 0));
        let buffer = pool.reserve(sl(1), id(2, 0), 2);
        assert_eq!(buffer.codeblock_soft_bits(1)[5], 0);
    }

    #[test]
    fn test_refresh_can_grow_codeblock_count() {
        let mut pool = pool(2, 8);
        {
            let buffer = pool.reserve(sl(0), id(1, 0), 2);
            buffer.codeblock_soft_bits(0)[0] = 5;
        }
        let buffer = pool.reserve(sl(1), id(1, 0), 4);
        assert_eq!(buffer.nof_codeblocks(), 4);
        // Old codeblocks keep their soft bits, new ones start clean.
        assert_eq!(buffer.codeblock_soft_bits(0)[0], 5);
        assert_eq!(buffer.codeblock_soft_bits(3)[0], 0);

        // A smaller follow-up request keeps the grown allocation.
        let buffer = pool.reserve(sl(2), id(1, 0), 2);
        assert_eq!(buffer.nof_codeblocks(), 4);
    }

    #[test]
    #[should_panic(expected = "entries are not enough")]
    fn test_exhaustion_is_fatal() {
        let mut pool = pool(2, 8);
        pool.reserve(sl(0), id(1, 0), 2);
        pool.reserve(sl(0), id(1, 1), 2);
        pool.reserve(sl(0), id(1, 2), 2);
    }
}
