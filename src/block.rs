//! Block layout and boundary-tag primitives.
//!
//! Every block in the arena, allocated or free, is framed by a header and a
//! footer word carrying the same packed `(size, allocated)` value:
//!
//! ```text
//!   ┌────────┬──────────────────────────────────────────┬────────┐
//!   │ header │                 payload                  │ footer │
//!   │ size|a │                                          │ size|a │
//!   └────────┴──────────────────────────────────────────┴────────┘
//!            ▲
//!            └── payload pointer (the block handle, double-word aligned)
//! ```
//!
//! While a block is free, the first and third payload words are repurposed
//! as the explicit free-list links:
//!
//! ```text
//!   ┌────────┬───────────┬───────────┬──────────────────┬────────┐
//!   │ header │ prev_free │ next_free │     (unused)     │ footer │
//!   └────────┴───────────┴───────────┴──────────────────┴────────┘
//!            0           2W          4W
//! ```
//!
//! Sizes are multiples of a double word, so the low three header bits are
//! spare; bit 0 carries the allocated flag. The footer duplicates the header
//! so the predecessor's size can be read from the word just before any
//! header, which is what makes constant-time backward coalescing possible.
//!
//! All raw memory access in the crate happens in this module. Everything
//! above it manipulates opaque [`Block`] handles.

use std::mem;
use std::ptr;

/// One machine word: the size of a pointer, and of a header or footer.
pub(crate) const WSIZE: usize = mem::size_of::<usize>();

/// A double word: the block alignment unit.
pub(crate) const DSIZE: usize = 2 * WSIZE;

/// Smallest representable block: header + two link words (double-word
/// spaced) + footer.
pub(crate) const MIN_BLOCK: usize = 6 * WSIZE;

/// Default number of bytes the arena grows by when the free list has no fit.
pub(crate) const CHUNK: usize = 4096;

const ALLOC_MASK: usize = 0x1;
const SIZE_MASK: usize = !0x7;

/// Packs a block size and its allocated flag into one tag word.
pub(crate) fn pack(
  size: usize,
  allocated: bool,
) -> usize {
  size | allocated as usize
}

/// Reads one word at `p`.
///
/// # Safety
///
/// `p` must point to a readable, word-aligned word inside the arena.
pub(crate) unsafe fn get(p: *const u8) -> usize {
  unsafe { (p as *const usize).read() }
}

/// Writes one word at `p`.
///
/// # Safety
///
/// `p` must point to a writable, word-aligned word inside the arena.
pub(crate) unsafe fn put(
  p: *mut u8,
  value: usize,
) {
  unsafe { (p as *mut usize).write(value) }
}

/// An opaque handle to a block, identified by its payload address.
///
/// `Block` is a plain copyable pointer wrapper; all accessors are `unsafe`
/// because they trust the handle to point at a well-formed block inside a
/// live arena.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) struct Block(*mut u8);

impl Block {
  pub(crate) const NULL: Block = Block(ptr::null_mut());

  /// Wraps a payload pointer previously produced by the allocator.
  pub(crate) fn from_payload(bp: *mut u8) -> Self {
    Block(bp)
  }

  /// The payload address handed to client code.
  pub(crate) fn payload(self) -> *mut u8 {
    self.0
  }

  /// The payload address as an integer, for bounds checks and diagnostics.
  pub(crate) fn addr(self) -> usize {
    self.0 as usize
  }

  pub(crate) fn is_null(self) -> bool {
    self.0.is_null()
  }

  /// Address of the header word, one word below the payload.
  ///
  /// # Safety
  ///
  /// The handle must point into a live arena with at least one word of
  /// headroom below the payload.
  pub(crate) unsafe fn header_ptr(self) -> *mut u8 {
    unsafe { self.0.sub(WSIZE) }
  }

  /// Address of the footer word, in the last word of the block.
  ///
  /// # Safety
  ///
  /// The block's header must hold its current size.
  pub(crate) unsafe fn footer_ptr(self) -> *mut u8 {
    unsafe { self.0.add(self.size() - DSIZE) }
  }

  /// The raw header word.
  ///
  /// # Safety
  ///
  /// See [`Block::header_ptr`].
  pub(crate) unsafe fn header_word(self) -> usize {
    unsafe { get(self.header_ptr()) }
  }

  /// The raw footer word.
  ///
  /// # Safety
  ///
  /// See [`Block::footer_ptr`].
  pub(crate) unsafe fn footer_word(self) -> usize {
    unsafe { get(self.footer_ptr()) }
  }

  /// Total block size in bytes, header and footer included.
  ///
  /// # Safety
  ///
  /// The handle must point at a tagged block.
  pub(crate) unsafe fn size(self) -> usize {
    unsafe { self.header_word() & SIZE_MASK }
  }

  /// Whether the block is currently handed out.
  ///
  /// # Safety
  ///
  /// The handle must point at a tagged block.
  pub(crate) unsafe fn allocated(self) -> bool {
    unsafe { self.header_word() & ALLOC_MASK != 0 }
  }

  /// Writes `(size, allocated)` to both boundary tags.
  ///
  /// The footer position is derived from the `size` argument, not from the
  /// current header, so this is also how a block changes size.
  ///
  /// # Safety
  ///
  /// The `size` bytes starting at the header must lie inside the arena and
  /// be exclusively owned by this block.
  pub(crate) unsafe fn set_tags(
    self,
    size: usize,
    allocated: bool,
  ) {
    let word = pack(size, allocated);
    unsafe {
      put(self.0.sub(WSIZE), word);
      put(self.0.add(size - DSIZE), word);
    }
  }

  /// The arena neighbor directly above this block.
  ///
  /// # Safety
  ///
  /// The handle must point at a tagged block that is not the epilogue.
  pub(crate) unsafe fn next(self) -> Block {
    unsafe { Block(self.0.add(self.size())) }
  }

  /// The arena neighbor directly below this block, located through the
  /// predecessor's footer in the word just before this header.
  ///
  /// # Safety
  ///
  /// The handle must point at a tagged block that is not the prologue.
  pub(crate) unsafe fn prev(self) -> Block {
    let prev_size = unsafe { get(self.0.sub(DSIZE)) } & SIZE_MASK;
    unsafe { Block(self.0.sub(prev_size)) }
  }

  /// The previous node in the explicit free list.
  ///
  /// # Safety
  ///
  /// The block must be free (its first payload word is the link).
  pub(crate) unsafe fn prev_free(self) -> Block {
    unsafe { Block(get(self.0) as *mut u8) }
  }

  /// The next node in the explicit free list.
  ///
  /// # Safety
  ///
  /// The block must be free (its third payload word is the link).
  pub(crate) unsafe fn next_free(self) -> Block {
    unsafe { Block(get(self.0.add(DSIZE)) as *mut u8) }
  }

  /// # Safety
  ///
  /// The block must be free.
  pub(crate) unsafe fn set_prev_free(
    self,
    target: Block,
  ) {
    unsafe { put(self.0, target.0 as usize) }
  }

  /// # Safety
  ///
  /// The block must be free.
  pub(crate) unsafe fn set_next_free(
    self,
    target: Block,
  ) {
    unsafe { put(self.0.add(DSIZE), target.0 as usize) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  /// A double-word aligned backing buffer for fabricating blocks.
  #[repr(align(16))]
  struct Buffer([u8; 512]);

  fn buffer() -> Box<Buffer> {
    Box::new(Buffer([0; 512]))
  }

  #[test]
  fn tags_round_trip_through_header_and_footer() {
    let mut buf = buffer();
    let bp = Block::from_payload(unsafe { buf.0.as_mut_ptr().add(WSIZE) });

    unsafe {
      bp.set_tags(MIN_BLOCK, true);
      assert_eq!(bp.size(), MIN_BLOCK);
      assert!(bp.allocated());
      assert_eq!(bp.header_word(), bp.footer_word());

      bp.set_tags(8 * WSIZE, false);
      assert_eq!(bp.size(), 8 * WSIZE);
      assert!(!bp.allocated());
      assert_eq!(bp.header_word(), bp.footer_word());
    }
  }

  #[test]
  fn allocated_bit_does_not_leak_into_size() {
    assert_eq!(pack(MIN_BLOCK, true) & SIZE_MASK, MIN_BLOCK);
    assert_eq!(pack(MIN_BLOCK, false), MIN_BLOCK);

    let mut buf = buffer();
    let bp = Block::from_payload(unsafe { buf.0.as_mut_ptr().add(WSIZE) });

    unsafe {
      bp.set_tags(10 * WSIZE, true);
      assert_eq!(bp.size(), 10 * WSIZE);
    }
  }

  #[test]
  fn arena_neighbors_are_derived_from_tags() {
    let mut buf = buffer();
    let base = buf.0.as_mut_ptr();

    let first = Block::from_payload(unsafe { base.add(WSIZE) });
    unsafe {
      first.set_tags(MIN_BLOCK, true);

      let second = first.next();
      assert_eq!(second.addr(), first.addr() + MIN_BLOCK);

      second.set_tags(8 * WSIZE, false);
      assert_eq!(second.prev(), first);
      assert_eq!(second.next().addr(), second.addr() + 8 * WSIZE);
    }
  }

  #[test]
  fn free_list_links_live_in_the_payload() {
    let mut buf = buffer();
    let base = buf.0.as_mut_ptr();

    let bp = Block::from_payload(unsafe { base.add(WSIZE) });
    let other = Block::from_payload(unsafe { base.add(WSIZE + MIN_BLOCK) });

    unsafe {
      bp.set_tags(MIN_BLOCK, false);
      bp.set_prev_free(Block::NULL);
      bp.set_next_free(other);

      assert!(bp.prev_free().is_null());
      assert_eq!(bp.next_free(), other);

      // The links occupy the first and third payload words.
      assert_eq!(get(bp.payload().add(DSIZE)), other.addr());
      assert_eq!(get(bp.payload()), 0);
    }
  }
}
