//! # Boundary-tag heap
//!
//! The allocator managing the arena: an explicit free list with LIFO
//! insertion, first-fit search, split-on-place and four-case boundary-tag
//! coalescing, on top of any [`Arena`] provider.
//!
//! ## Arena anatomy
//!
//! ```text
//!            ARENA (grows upward ──►, never shrinks)
//!
//!   ┌─────┬──────────────┬─────────┬─────────┬───────────┬──────────┐
//!   │ pad │   prologue   │ block 1 │ block 2 │    ...    │ epilogue │
//!   │  W  │ 6W allocated │         │         │           │ 0|alloc  │
//!   └─────┴──────────────┴─────────┴─────────┴───────────┴──────────┘
//!         ▲                                               ▲
//!         │                                               │
//!     prologue block                           zero-size header word,
//!     (low sentinel)                           overwritten by the next
//!                                              extension (high sentinel)
//! ```
//!
//! The prologue and epilogue are permanently tagged allocated, so the four
//! coalescing cases need no boundary tests: the neighbor below the first
//! real block and the neighbor above the last one always read as allocated,
//! and a merge can never run off the arena.
//!
//! ## One allocation, step by step
//!
//! ```text
//!   allocate(size)
//!       │
//!       ├── size == 0 ──────────────────────────────► null
//!       │
//!       ├── asize = max(align!(size + 2W), 6W)
//!       │
//!       ├── first fit over the free list ── hit ────► place(bp, asize)
//!       │                                             (split if the tail
//!       │                                              would be ≥ 6W)
//!       │
//!       └── miss: extend by max(asize, CHUNK) ──────► place(bp, asize)
//!                 (provider refusal ► null)
//! ```
//!
//! Freeing clears the tags, merges with whichever arena neighbors are free,
//! and pushes the merged block onto the list. Resizing grows in place when
//! the upstairs neighbor is free and large enough, and falls back to
//! allocate-copy-free otherwise.

use std::ptr;

use log::{debug, trace};
use thiserror::Error;

use crate::align;
use crate::arena::Arena;
use crate::block::{self, Block, CHUNK, DSIZE, MIN_BLOCK, WSIZE};
use crate::list::FreeList;

/// Failure to bring up a heap.
#[derive(Debug, Error)]
pub enum HeapError {
  /// The arena provider refused to append the requested bytes.
  #[error("arena provider refused to extend by {requested} bytes")]
  Exhausted {
    /// Size of the refused extension.
    requested: usize,
  },
}

/// A heap over an [`Arena`] provider.
///
/// The two anchors of the allocator state (the prologue block and the free
/// list head) live inside this value, so independent heaps, each with its
/// own provider, can coexist in one process.
///
/// # Thread safety
///
/// `Heap` is **not** thread-safe. Callers requiring concurrency must
/// serialize access externally.
pub struct Heap<A: Arena> {
  pub(crate) arena: A,

  /// The low sentinel block; also the free list's terminator.
  pub(crate) prologue: Block,

  pub(crate) free: FreeList,
}

impl<A: Arena> Heap<A> {
  /// Brings up a heap on the given provider.
  ///
  /// Obtains four double words for the arena skeleton (one padding word, a
  /// 6W prologue block, and the epilogue header, laid out flush against the
  /// provider's break), then extends by [`CHUNK`] bytes to create the first
  /// free block.
  ///
  /// # Errors
  ///
  /// Returns [`HeapError::Exhausted`] if either provider call is refused.
  /// No partial heap is observable on failure.
  pub fn init(mut arena: A) -> Result<Self, HeapError> {
    let skeleton = 8 * WSIZE;
    let start = arena
      .extend(skeleton)
      .ok_or(HeapError::Exhausted { requested: skeleton })?
      .as_ptr();

    let prologue = Block::from_payload(unsafe { start.add(DSIZE) });
    unsafe {
      block::put(start, 0); // alignment padding
      prologue.set_tags(MIN_BLOCK, true);
      prologue.set_prev_free(Block::NULL);
      prologue.set_next_free(Block::NULL);
      block::put(start.add(WSIZE + MIN_BLOCK), block::pack(0, true)); // epilogue
    }

    let mut heap = Self {
      arena,
      prologue,
      free: FreeList::new(prologue),
    };

    unsafe { heap.extend(CHUNK / WSIZE) }.ok_or(HeapError::Exhausted { requested: CHUNK })?;

    Ok(heap)
  }

  /// Allocates a block with at least `size` payload bytes.
  ///
  /// The returned address is double-word aligned. Returns null for a
  /// zero-size request or when the provider refuses to grow the arena; on
  /// refusal no heap state has changed.
  ///
  /// # Safety
  ///
  /// The caller must treat the returned region as exactly `size` usable
  /// bytes and must not access it after passing it to [`Heap::free`].
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    // A request this close to the address-space limit cannot carry its
    // header/footer overhead.
    if size == 0 || size.checked_add(2 * DSIZE).is_none() {
      return ptr::null_mut();
    }

    // Round the payload plus one word each of header and footer up to the
    // double-word boundary, with a floor at the minimum block size.
    let asize = usize::max(align!(size + DSIZE), MIN_BLOCK);

    unsafe {
      if let Some(bp) = self.find_fit(asize) {
        self.place(bp, asize);
        trace!("allocated {asize} bytes at {:p} from the free list", bp.payload());
        return bp.payload();
      }

      let grow = usize::max(asize, CHUNK);
      match self.extend(grow / WSIZE) {
        Some(bp) => {
          self.place(bp, asize);
          trace!("allocated {asize} bytes at {:p} after extension", bp.payload());
          bp.payload()
        }
        None => ptr::null_mut(),
      }
    }
  }

  /// Returns a block to the heap.
  ///
  /// Freeing null is a no-op. The block is merged with any free arena
  /// neighbors before rejoining the free list.
  ///
  /// # Safety
  ///
  /// `bp` must be null or an address previously returned by
  /// [`Heap::allocate`] or [`Heap::reallocate`] on this heap, not yet freed.
  pub unsafe fn free(
    &mut self,
    bp: *mut u8,
  ) {
    if bp.is_null() {
      return;
    }

    unsafe {
      let bp = Block::from_payload(bp);
      let size = bp.size();
      bp.set_tags(size, false);
      let merged = self.coalesce(bp);
      trace!("freed {size} bytes at {:p} into {:p}", bp.payload(), merged.payload());
    }
  }

  /// Resizes an allocated block to at least `size` payload bytes.
  ///
  /// A null `bp` degenerates to [`Heap::allocate`]; a zero `size` frees the
  /// block and returns null. A request no larger than the current block
  /// returns `bp` unchanged. When the upstairs arena neighbor is free and
  /// together they cover the request, the block grows in place; otherwise a
  /// new block is allocated, the old payload copied over, and the old block
  /// freed. Returns null (leaving `bp` valid) if the heap cannot satisfy
  /// the request.
  ///
  /// # Safety
  ///
  /// `bp` must be null or a live allocation of this heap. On success the
  /// old pointer must no longer be used unless it is the returned one.
  pub unsafe fn reallocate(
    &mut self,
    bp: *mut u8,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      if size == 0 {
        self.free(bp);
        return ptr::null_mut();
      }
      if bp.is_null() {
        return self.allocate(size);
      }

      let block = Block::from_payload(bp);
      let old = block.size();
      let Some(new) = size.checked_add(DSIZE) else {
        return ptr::null_mut();
      };

      // No shrink-split: a smaller request keeps the block as-is.
      if new <= old {
        return bp;
      }

      let next = block.next();
      if !next.allocated() && old + next.size() >= new {
        let combined = old + next.size();
        self.free.remove(next);
        block.set_tags(combined, true);
        trace!("grew {:p} in place to {combined} bytes", bp);
        return bp;
      }

      let dst = self.allocate(new);
      if dst.is_null() {
        return ptr::null_mut();
      }
      // The old payload always fits: this path only runs for growth.
      ptr::copy_nonoverlapping(bp, dst, usize::min(old - DSIZE, size));
      self.free(bp);
      dst
    }
  }

  /// Total bytes held by free blocks.
  pub fn free_bytes(&self) -> usize {
    let mut total = 0;
    let mut bp = self.free.head();
    unsafe {
      while !bp.allocated() {
        total += bp.size();
        bp = bp.next_free();
      }
    }
    total
  }

  /// Number of blocks on the free list.
  pub fn free_blocks(&self) -> usize {
    let mut count = 0;
    let mut bp = self.free.head();
    unsafe {
      while !bp.allocated() {
        count += 1;
        bp = bp.next_free();
      }
    }
    count
  }

  /// The provider underneath this heap.
  pub fn arena(&self) -> &A {
    &self.arena
  }

  /// Grows the arena by `words` words and installs the new free block.
  ///
  /// The word count is rounded up to even so the block stays a double-word
  /// multiple. The new block's header lands exactly on the old epilogue,
  /// and a fresh epilogue is written past the block before coalescing it
  /// with a possibly-free trailing block.
  unsafe fn extend(
    &mut self,
    words: usize,
  ) -> Option<Block> {
    let words = words + (words & 1);
    let size = usize::max(words * WSIZE, MIN_BLOCK);

    let region = self.arena.extend(size)?;
    debug!("extended the arena by {size} bytes");

    let bp = Block::from_payload(region.as_ptr());
    unsafe {
      bp.set_tags(size, false);
      block::put(bp.next().header_ptr(), block::pack(0, true));
      Some(self.coalesce(bp))
    }
  }

  /// Merges a just-cleared block with its free arena neighbors and pushes
  /// the result onto the free list.
  ///
  /// The four cases are selected by the allocated bits of the two
  /// neighbors; the sentinels guarantee both reads are in-arena.
  unsafe fn coalesce(
    &mut self,
    bp: Block,
  ) -> Block {
    unsafe {
      let prev = bp.prev();
      let next = bp.next();
      let prev_free = !prev.allocated();
      let next_free = !next.allocated();

      let mut bp = bp;
      let mut size = bp.size();

      match (prev_free, next_free) {
        // Both neighbors allocated: nothing to merge.
        (false, false) => {}

        // Only the block above is free.
        (false, true) => {
          size += next.size();
          self.free.remove(next);
          bp.set_tags(size, false);
        }

        // Only the block below is free: the merged block starts there.
        (true, false) => {
          size += prev.size();
          self.free.remove(prev);
          bp = prev;
          bp.set_tags(size, false);
        }

        // Free on both sides.
        (true, true) => {
          size += prev.size() + next.size();
          self.free.remove(prev);
          self.free.remove(next);
          bp = prev;
          bp.set_tags(size, false);
        }
      }

      self.free.push(bp);
      bp
    }
  }

  /// First-fit search over the free list.
  ///
  /// The walk follows `next_free` and stops at the first allocated block,
  /// which is always the prologue sentinel in a well-formed list.
  unsafe fn find_fit(
    &self,
    asize: usize,
  ) -> Option<Block> {
    unsafe {
      let mut bp = self.free.head();
      while !bp.allocated() {
        if bp.size() >= asize {
          return Some(bp);
        }
        bp = bp.next_free();
      }
      None
    }
  }

  /// Carves `asize` bytes out of the free block `bp`.
  ///
  /// Splits when the remainder would still be a representable block;
  /// otherwise the whole block is handed out and the slack becomes internal
  /// fragmentation.
  unsafe fn place(
    &mut self,
    bp: Block,
    asize: usize,
  ) {
    unsafe {
      let csize = bp.size();

      if csize - asize >= MIN_BLOCK {
        bp.set_tags(asize, true);
        self.free.remove(bp);

        let rest = bp.next();
        rest.set_tags(csize - asize, false);
        self.coalesce(rest);
      } else {
        bp.set_tags(csize, true);
        self.free.remove(bp);
      }
    }
  }
}
