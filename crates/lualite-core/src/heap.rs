//! Generational arena for native objects owned by the runtime.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Handle to a heap-allocated native object.
///
/// This is a copyable token for an object in the [`ObjectHeap`]. The
/// generation detects use after free and the `TypeId` detects a handle being
/// read back as the wrong native type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObjectHandle {
    /// Index into ObjectHeap.slots
    pub index: u32,
    /// Generation for use-after-free detection
    pub generation: u32,
    /// Rust TypeId of the stored object
    pub type_id: TypeId,
}

impl ObjectHandle {
    /// Create a new object handle.
    pub fn new(index: u32, generation: u32, type_id: TypeId) -> Self {
        Self {
            index,
            generation,
            type_id,
        }
    }

    /// Check whether this handle was allocated for `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object#{}.{}", self.index, self.generation)
    }
}

/// Heap storage for native objects with generational indices.
///
/// Each object lives in an `Rc<RefCell<T>>` so a dispatch stub can hold the
/// object while it keeps mutable access to the rest of the runtime. Freeing a
/// slot bumps its generation; outstanding handles to it become stale.
#[derive(Default)]
pub struct ObjectHeap {
    slots: Vec<HeapSlot>,
    free_list: Vec<u32>,
    live: usize,
}

struct HeapSlot {
    generation: u32,
    value: Option<HeapEntry>,
}

/// One allocation seen two ways: as `Rc<RefCell<T>>` behind `dyn Any` for
/// typed access, and as `RefCell<dyn Any>` for borrowing without knowing `T`.
struct HeapEntry {
    typed: Rc<dyn Any>,
    erased: Rc<RefCell<dyn Any>>,
}

impl ObjectHeap {
    /// Create a new empty object heap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a new object on the heap.
    pub fn allocate<T: Any>(&mut self, value: T) -> ObjectHandle {
        let type_id = TypeId::of::<T>();
        let cell = Rc::new(RefCell::new(value));
        let entry = HeapEntry {
            typed: Rc::clone(&cell) as Rc<dyn Any>,
            erased: cell,
        };
        self.live += 1;

        if let Some(index) = self.free_list.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(entry);
            ObjectHandle::new(index, slot.generation, type_id)
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(HeapSlot {
                generation: 0,
                value: Some(entry),
            });
            ObjectHandle::new(index, 0, type_id)
        }
    }

    /// Get a shared pointer to an object.
    ///
    /// Returns None if the handle is stale or the type doesn't match.
    pub fn get<T: Any>(&self, handle: ObjectHandle) -> Option<Rc<RefCell<T>>> {
        Rc::clone(&self.entry(handle)?.typed)
            .downcast::<RefCell<T>>()
            .ok()
    }

    /// Get an object without naming its type.
    ///
    /// Returns None if the handle is stale.
    pub fn get_erased(&self, handle: ObjectHandle) -> Option<Rc<RefCell<dyn Any>>> {
        self.entry(handle).map(|entry| Rc::clone(&entry.erased))
    }

    fn entry(&self, handle: ObjectHandle) -> Option<&HeapEntry> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.value.as_ref()
    }

    /// Check whether the handle still refers to a live object.
    pub fn contains(&self, handle: ObjectHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| slot.generation == handle.generation && slot.value.is_some())
    }

    /// Release an object immediately.
    ///
    /// Returns true if a live object was freed. Freeing a stale handle is a
    /// no-op, so a double release cannot reach a reused slot.
    pub fn free(&mut self, handle: ObjectHandle) -> bool {
        if let Some(slot) = self.slots.get_mut(handle.index as usize)
            && slot.generation == handle.generation
            && slot.value.is_some()
        {
            slot.value = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free_list.push(handle.index);
            self.live -= 1;
            return true;
        }
        false
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.live
    }
}

impl fmt::Debug for ObjectHeap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHeap")
            .field("slots", &self.slots.len())
            .field("live", &self.live)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_get() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(42i32);
        assert!(handle.is::<i32>());
        let value = heap.get::<i32>(handle).unwrap();
        assert_eq!(*value.borrow(), 42);
    }

    #[test]
    fn get_mut_through_cell() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(String::from("a"));
        heap.get::<String>(handle).unwrap().borrow_mut().push('b');
        assert_eq!(*heap.get::<String>(handle).unwrap().borrow(), "ab");
    }

    #[test]
    fn type_mismatch_returns_none() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(1u8);
        assert!(heap.get::<i32>(handle).is_none());
    }

    #[test]
    fn erased_access_shares_the_object() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(5i32);
        let erased = heap.get_erased(handle).unwrap();
        *erased.borrow_mut().downcast_mut::<i32>().unwrap() += 1;
        assert_eq!(*heap.get::<i32>(handle).unwrap().borrow(), 6);
        heap.free(handle);
        assert!(heap.get_erased(handle).is_none());
    }

    #[test]
    fn stale_handle_after_free() {
        let mut heap = ObjectHeap::new();
        let handle = heap.allocate(1i32);
        assert!(heap.free(handle));
        assert!(!heap.contains(handle));
        assert!(heap.get::<i32>(handle).is_none());
        assert!(!heap.free(handle));
    }

    #[test]
    fn slot_reuse_bumps_generation() {
        let mut heap = ObjectHeap::new();
        let first = heap.allocate(1i32);
        heap.free(first);
        let second = heap.allocate(2i32);
        assert_eq!(first.index, second.index);
        assert_ne!(first.generation, second.generation);
        assert!(heap.get::<i32>(first).is_none());
        assert_eq!(*heap.get::<i32>(second).unwrap().borrow(), 2);
    }

    #[test]
    fn live_count_tracks_allocations() {
        let mut heap = ObjectHeap::new();
        let a = heap.allocate(1i32);
        let _b = heap.allocate(2i32);
        assert_eq!(heap.live_count(), 2);
        heap.free(a);
        assert_eq!(heap.live_count(), 1);
    }
}
