//! Task pool: arena of sibling slots backing every in-flight logical I/O.
//!
//! Siblings are addressed by `u32` arena index rather than pointer, per the
//! intrusive-list replacement recommended for a closed, small, fixed N: a
//! copy carries only the primary's index, never a pointer, and the arena
//! alone owns payloads.

use crate::util::buffer::AlignedBuffer;

pub type SiblingId = u32;

/// One iovec-like chunk of a DMA payload: an owned `AlignedBuffer` region.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IoVec {
    pub offset: usize,
    pub len: usize,
}

/// A sibling sub-operation: either the primary (owns the DMA payload) or a
/// copy (borrows the primary's payload by index, never frees it).
pub struct Sibling {
    pub id: SiblingId,
    /// Index of the primary sibling in this logical I/O's group; equals `id` for the primary.
    pub primary_id: SiblingId,
    pub ns_id: u32,
    pub io_id: u64,
    /// Split of the shared payload into `ceil(max_io_size_bytes / io_unit_size)` chunks.
    pub iovecs: Vec<IoVec>,
    pub md_iovec: Option<IoVec>,
    pub create_time: crate::util::fast_time::FastInstant,
    pub submit_time: Option<crate::util::fast_time::FastInstant>,
}

/// The primary sibling's extra bookkeeping: owns the DMA payload and the
/// insertion-ordered sibling list (by arena index) for its logical I/O.
pub struct PrimaryExtra {
    pub payload: AlignedBuffer,
    pub md_payload: Option<AlignedBuffer>,
    /// Insertion-ordered sibling ids, including the primary's own id.
    pub sibling_ids: Vec<SiblingId>,
    pub rep_completed_num: u32,
    pub is_read: bool,
    pub offset_in_ios: u64,
}

/// Arena of sibling slots. Slots are recycled by `release_replica_group`;
/// there is no free-list reuse across logical I/Os mid-run because each
/// coordinator holds at most one in-flight logical-I/O's worth of slots at
/// a time per (primary) group — the arena just grows monotonically and
/// shrinks back on release.
pub struct TaskPool {
    siblings: Vec<Option<Sibling>>,
    primaries: Vec<Option<PrimaryExtra>>,
    free: Vec<SiblingId>,
    io_align: usize,
}

impl TaskPool {
    pub fn new(io_align: usize) -> Self {
        Self {
            siblings: Vec::new(),
            primaries: Vec::new(),
            free: Vec::new(),
            io_align,
        }
    }

    fn alloc_slot(&mut self) -> SiblingId {
        if let Some(id) = self.free.pop() {
            id
        } else {
            let id = self.siblings.len() as SiblingId;
            self.siblings.push(None);
            self.primaries.push(None);
            id
        }
    }

    /// `allocate_primary(ns_worker_ctx, io_id, ns_id)` — allocates a sibling,
    /// sets up its DMA payload filled with `pattern = queue_depth % 8 + 1`,
    /// and seeds the sibling list with only the primary.
    pub fn allocate_primary(
        &mut self,
        io_id: u64,
        ns_id: u32,
        max_io_size_bytes: usize,
        io_unit_size: usize,
        pattern: u8,
        is_read: bool,
        offset_in_ios: u64,
    ) -> SiblingId {
        let id = self.alloc_slot();
        let mut payload = AlignedBuffer::new(max_io_size_bytes, self.io_align);
        payload.fill(crate::util::buffer::FillPattern::Random(pattern as u64));
        let iovecs = split_iovecs(max_io_size_bytes, io_unit_size);

        let sibling = Sibling {
            id,
            primary_id: id,
            ns_id,
            io_id,
            iovecs,
            md_iovec: None,
            create_time: crate::util::fast_time::FastInstant::now(),
            submit_time: None,
        };
        self.siblings[id as usize] = Some(sibling);
        self.primaries[id as usize] = Some(PrimaryExtra {
            payload,
            md_payload: None,
            sibling_ids: vec![id],
            rep_completed_num: 0,
            is_read,
            offset_in_ios,
        });
        id
    }

    /// `clone_into(primary, ns_worker_ctx, ns_id)` — allocates a copy sibling
    /// that bitwise-aliases the primary's iovecs (same underlying buffer,
    /// separate iovec array) and links it into the primary's sibling list.
    pub fn clone_into(&mut self, primary_id: SiblingId, ns_id: u32) -> SiblingId {
        let (io_id, iovecs, md_iovec) = {
            let p = self.siblings[primary_id as usize].as_ref().expect("primary exists");
            (p.io_id, p.iovecs.clone(), p.md_iovec)
        };
        let id = self.alloc_slot();
        let copy = Sibling {
            id,
            primary_id,
            ns_id,
            io_id,
            iovecs,
            md_iovec,
            create_time: crate::util::fast_time::FastInstant::now(),
            submit_time: None,
        };
        self.siblings[id as usize] = Some(copy);
        self.primaries[primary_id as usize]
            .as_mut()
            .expect("primary exists")
            .sibling_ids
            .push(id);
        id
    }

    /// Physically move the primary to the end of its own sibling list
    /// (`send_main_rep_finally` / `-f`).
    pub fn reorder_primary_last(&mut self, primary_id: SiblingId) {
        let p = self.primaries[primary_id as usize].as_mut().expect("primary exists");
        if let Some(pos) = p.sibling_ids.iter().position(|&id| id == primary_id) {
            let id = p.sibling_ids.remove(pos);
            p.sibling_ids.push(id);
        }
    }

    pub fn sibling(&self, id: SiblingId) -> &Sibling {
        self.siblings[id as usize].as_ref().expect("sibling live")
    }

    pub fn sibling_mut(&mut self, id: SiblingId) -> &mut Sibling {
        self.siblings[id as usize].as_mut().expect("sibling live")
    }

    pub fn primary(&self, primary_id: SiblingId) -> &PrimaryExtra {
        self.primaries[primary_id as usize].as_ref().expect("primary live")
    }

    pub fn primary_mut(&mut self, primary_id: SiblingId) -> &mut PrimaryExtra {
        self.primaries[primary_id as usize].as_mut().expect("primary live")
    }

    pub fn payload_slice(&self, primary_id: SiblingId) -> &[u8] {
        self.primaries[primary_id as usize]
            .as_ref()
            .expect("primary live")
            .payload
            .as_slice()
    }

    pub fn payload_slice_mut(&mut self, primary_id: SiblingId) -> &mut [u8] {
        self.primaries[primary_id as usize]
            .as_mut()
            .expect("primary live")
            .payload
            .as_mut_slice()
    }

    /// `release_replica_group(primary)` — frees the DMA payload exactly once
    /// (owned solely by the primary), then every sibling's slot.
    pub fn release_replica_group(&mut self, primary_id: SiblingId) {
        let sibling_ids = self.primaries[primary_id as usize]
            .as_ref()
            .expect("primary live")
            .sibling_ids
            .clone();
        // Dropping the PrimaryExtra frees payload/md_payload via AlignedBuffer's Drop.
        self.primaries[primary_id as usize] = None;
        for id in sibling_ids {
            self.siblings[id as usize] = None;
            self.free.push(id);
        }
    }
}

fn split_iovecs(total: usize, unit: usize) -> Vec<IoVec> {
    let mut v = Vec::with_capacity((total + unit - 1) / unit.max(1));
    let mut off = 0;
    while off < total {
        let len = unit.min(total - off);
        v.push(IoVec { offset: off, len });
        off += len;
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_owns_payload_copies_alias() {
        let mut pool = TaskPool::new(512);
        let primary = pool.allocate_primary(1, 0, 4096, 4096, 3, true, 0);
        let copy1 = pool.clone_into(primary, 1);
        let copy2 = pool.clone_into(primary, 2);

        assert_eq!(pool.primary(primary).sibling_ids, vec![primary, copy1, copy2]);
        assert_eq!(pool.sibling(copy1).iovecs, pool.sibling(primary).iovecs);
    }

    #[test]
    fn reorder_primary_last_moves_primary_to_tail() {
        let mut pool = TaskPool::new(512);
        let primary = pool.allocate_primary(1, 0, 4096, 4096, 1, false, 0);
        let copy1 = pool.clone_into(primary, 1);
        let copy2 = pool.clone_into(primary, 2);
        pool.reorder_primary_last(primary);
        assert_eq!(pool.primary(primary).sibling_ids, vec![copy1, copy2, primary]);
    }

    #[test]
    fn release_frees_every_slot_and_payload_once() {
        let mut pool = TaskPool::new(512);
        let primary = pool.allocate_primary(1, 0, 4096, 4096, 1, false, 0);
        let copy1 = pool.clone_into(primary, 1);
        pool.release_replica_group(primary);
        assert!(pool.primaries[primary as usize].is_none());
        assert!(pool.siblings[primary as usize].is_none());
        assert!(pool.siblings[copy1 as usize].is_none());
    }
}
