use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CoreConfig;

pub const UID_FLAG_MASK: u32 = 0xC000_0000;
pub const UID_VALUE_MASK: u32 = !UID_FLAG_MASK;
pub const FAKE_ITEM_UID_FLAG: u32 = 0x4000_0000;

/// 1-based object identifier. Zero is never a valid uid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(u32);

impl Uid {
    pub fn new(raw: u32) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }

    pub fn get(self) -> u32 {
        self.0
    }

    fn from_index(index: usize) -> Self {
        Self(index as u32 + 1)
    }

    fn index(self) -> usize {
        self.0 as usize - 1
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

pub fn uid_clear_flags(raw: u32) -> u32 {
    raw & UID_VALUE_MASK
}

pub fn fake_item_uid(uid: Uid) -> u32 {
    uid.0 | FAKE_ITEM_UID_FLAG
}

/// Generation-checked reference to an arena slot. Goes stale once the slot is released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    pub uid: Uid,
    pub generation: u32,
}

/// Implemented by everything the arena stores so the slot/uid invariant can be kept.
pub trait UidSlot {
    fn uid(&self) -> Option<Uid>;
    fn set_uid(&mut self, uid: Option<Uid>);
    fn is_deleted(&self) -> bool {
        false
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UidError {
    #[error("uid 0 is reserved and cannot hold an object")]
    Reserved,
    #[error("cannot load object at uid {uid}: loading already finished")]
    LoadingSealed { uid: u32 },
    #[error("uid {uid} is already occupied")]
    DuplicateUid { uid: u32 },
    #[error("uid {uid} exceeds the real uid range (max {max})")]
    OutOfRange { uid: u32, max: u32 },
    #[error("uid space exhausted at {max} slots")]
    Exhausted { max: u32 },
    #[error("fake uid space exhausted at {reserve} entries")]
    FakeExhausted { reserve: u32 },
    #[error("fake uid {uid:#x} is not allocated")]
    FakeNotAllocated { uid: u32 },
}

#[derive(Debug)]
pub struct UidArena<T> {
    slots: Vec<Option<T>>,
    generations: Vec<u32>,
    free_slots: VecDeque<usize>,
    highest: usize,
    count: usize,
    queue_max_count: usize,
    max_uid: u32,
    sealed: bool,
    fake: FakeUids,
}

impl<T: UidSlot> UidArena<T> {
    pub fn new(config: &CoreConfig) -> Self {
        let max_uid = config.max_real_uid();
        let capacity = config.initial_uid_capacity.clamp(1, max_uid.max(1) as usize);
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            slots,
            generations: vec![0; capacity],
            free_slots: VecDeque::new(),
            highest: 0,
            count: 0,
            queue_max_count: config.uid_queue_max_count.max(1),
            max_uid,
            sealed: false,
            fake: FakeUids::new(config),
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Upper bound on occupied uids. `remove_at` only lowers it by one, so it may lag.
    pub fn highest_uid(&self) -> u32 {
        self.highest as u32
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn add_loaded(&mut self, mut obj: T, uid: u32) -> Result<Uid, UidError> {
        if self.sealed {
            return Err(UidError::LoadingSealed { uid });
        }
        let uid = Uid::new(uid).ok_or(UidError::Reserved)?;
        if uid.0 > self.max_uid {
            return Err(UidError::OutOfRange {
                uid: uid.0,
                max: self.max_uid,
            });
        }
        let index = uid.index();
        if index >= self.slots.len() {
            let target = (index + 1).next_power_of_two().min(self.max_uid as usize);
            self.resize(target);
        }
        if self.slots[index].is_some() {
            return Err(UidError::DuplicateUid { uid: uid.0 });
        }
        obj.set_uid(Some(uid));
        self.place(index, obj);
        Ok(uid)
    }

    pub fn add(&mut self, mut obj: T) -> Result<Uid, UidError> {
        loop {
            while let Some(index) = self.free_slots.pop_front() {
                if index < self.slots.len() && self.slots[index].is_none() {
                    let uid = Uid::from_index(index);
                    obj.set_uid(Some(uid));
                    self.place(index, obj);
                    return Ok(uid);
                }
            }
            if self.rescan() == 0 {
                self.grow()?;
            }
        }
    }

    pub fn get(&self, uid: Uid) -> Option<&T> {
        self.slots.get(uid.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, uid: Uid) -> Option<&mut T> {
        self.slots.get_mut(uid.index()).and_then(Option::as_mut)
    }

    pub fn get_raw(&self, raw: u32) -> Option<&T> {
        Uid::new(raw).and_then(|uid| self.get(uid))
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.get(uid).is_some()
    }

    pub fn handle(&self, uid: Uid) -> Option<Handle> {
        self.get(uid).map(|_| Handle {
            uid,
            generation: self.generations[uid.index()],
        })
    }

    pub fn resolve(&self, handle: Handle) -> Option<&T> {
        let generation = self.generations.get(handle.uid.index()).copied()?;
        if generation != handle.generation {
            return None;
        }
        self.get(handle.uid)
    }

    pub fn is_live(&self, handle: Handle) -> bool {
        self.resolve(handle).is_some_and(|obj| !obj.is_deleted())
    }

    pub fn remove_at(&mut self, uid: Uid) -> Option<T> {
        let index = uid.index();
        let mut obj = self.slots.get_mut(index)?.take()?;
        obj.set_uid(None);
        self.generations[index] = self.generations[index].wrapping_add(1);
        self.count -= 1;
        if index + 1 == self.highest {
            self.highest -= 1;
        } else if self.free_slots.len() < self.queue_max_count {
            self.free_slots.push_back(index);
        }
        Some(obj)
    }

    /// Compacts live objects into `1..=len()` in uid order. Returns `(old, new)` for every
    /// object whose uid changed.
    pub fn reindex_all(&mut self) -> Vec<(Uid, Uid)> {
        let mut remapped = Vec::new();
        let mut next = 0usize;
        for index in 0..self.highest {
            let Some(mut obj) = self.slots[index].take() else {
                continue;
            };
            if index != next {
                let new_uid = Uid::from_index(next);
                obj.set_uid(Some(new_uid));
                self.generations[index] = self.generations[index].wrapping_add(1);
                self.generations[next] = self.generations[next].wrapping_add(1);
                remapped.push((Uid::from_index(index), new_uid));
            }
            self.slots[next] = Some(obj);
            next += 1;
        }
        self.highest = next;
        self.free_slots.clear();
        remapped
    }

    pub fn loading_finished(&mut self) {
        self.sealed = true;
        self.free_slots.clear();
    }

    /// Lazily walks `1..=highest_uid()`. Mutating the arena while iterating is a caller bug.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.slots[..self.highest].iter().filter_map(Option::as_ref)
    }

    pub fn uids(&self) -> Vec<Uid> {
        (0..self.highest)
            .filter(|index| self.slots[*index].is_some())
            .map(Uid::from_index)
            .collect()
    }

    pub fn get_fake_uid(&mut self) -> Result<u32, UidError> {
        self.fake.allocate(self.queue_max_count)
    }

    pub fn dispose_fake_uid(&mut self, uid: u32) -> Result<(), UidError> {
        self.fake.dispose(uid, self.queue_max_count)
    }

    pub fn is_fake_uid(&self, uid: u32) -> bool {
        self.fake.is_allocated(uid)
    }

    fn place(&mut self, index: usize, obj: T) {
        self.slots[index] = Some(obj);
        self.count += 1;
        if index + 1 > self.highest {
            self.highest = index + 1;
        }
    }

    fn rescan(&mut self) -> usize {
        self.free_slots.clear();
        for (index, slot) in self.slots.iter().enumerate() {
            if slot.is_none() {
                self.free_slots.push_back(index);
                if self.free_slots.len() >= self.queue_max_count {
                    break;
                }
            }
        }
        self.free_slots.len()
    }

    fn grow(&mut self) -> Result<(), UidError> {
        let current = self.slots.len();
        if current >= self.max_uid as usize {
            return Err(UidError::Exhausted { max: self.max_uid });
        }
        let target = current.saturating_mul(2).max(1).min(self.max_uid as usize);
        self.resize(target);
        Ok(())
    }

    fn resize(&mut self, target: usize) {
        self.slots.resize_with(target, || None);
        self.generations.resize(target, 0);
    }
}

/// Fake uids count down from the ceiling; bit `i` tracks uid `ceiling - i`.
#[derive(Debug)]
struct FakeUids {
    ceiling: u32,
    reserve: u32,
    words: Vec<u64>,
    bits: usize,
    free: VecDeque<usize>,
}

impl FakeUids {
    fn new(config: &CoreConfig) -> Self {
        let reserve = config.fake_uid_reserve;
        let bits = (reserve as usize).min(64);
        Self {
            ceiling: config.uid_ceiling,
            reserve,
            words: vec![0; bits.div_ceil(64)],
            bits,
            free: VecDeque::new(),
        }
    }

    fn allocate(&mut self, queue_max_count: usize) -> Result<u32, UidError> {
        loop {
            while let Some(bit) = self.free.pop_front() {
                if bit < self.bits && !self.bit(bit) {
                    self.set_bit(bit, true);
                    return Ok(self.ceiling - bit as u32);
                }
            }
            if self.rescan(queue_max_count) == 0 {
                self.grow()?;
            }
        }
    }

    fn dispose(&mut self, uid: u32, queue_max_count: usize) -> Result<(), UidError> {
        let bit = self
            .bit_for(uid)
            .filter(|bit| self.bit(*bit))
            .ok_or(UidError::FakeNotAllocated { uid })?;
        self.set_bit(bit, false);
        if self.free.len() < queue_max_count {
            self.free.push_back(bit);
        }
        Ok(())
    }

    fn is_allocated(&self, uid: u32) -> bool {
        self.bit_for(uid).is_some_and(|bit| self.bit(bit))
    }

    fn bit_for(&self, uid: u32) -> Option<usize> {
        let offset = self.ceiling.checked_sub(uid)? as usize;
        (offset < self.bits).then_some(offset)
    }

    fn rescan(&mut self, queue_max_count: usize) -> usize {
        self.free.clear();
        for bit in 0..self.bits {
            if !self.bit(bit) {
                self.free.push_back(bit);
                if self.free.len() >= queue_max_count {
                    break;
                }
            }
        }
        self.free.len()
    }

    fn grow(&mut self) -> Result<(), UidError> {
        let reserve = self.reserve as usize;
        if self.bits >= reserve {
            return Err(UidError::FakeExhausted {
                reserve: self.reserve,
            });
        }
        self.bits = self.bits.saturating_mul(2).max(1).min(reserve);
        self.words.resize(self.bits.div_ceil(64), 0);
        Ok(())
    }

    fn bit(&self, bit: usize) -> bool {
        self.words[bit / 64] & (1 << (bit % 64)) != 0
    }

    fn set_bit(&mut self, bit: usize, value: bool) {
        let mask = 1u64 << (bit % 64);
        if value {
            self.words[bit / 64] |= mask;
        } else {
            self.words[bit / 64] &= !mask;
        }
    }
}
