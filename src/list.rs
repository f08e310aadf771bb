//! The explicit free list.
//!
//! Free blocks are threaded through their own payloads into an unordered,
//! doubly linked list with LIFO insertion:
//!
//! ```text
//!   head ──► [newest free] ◄──► [older free] ◄──► ... ◄──► [sentinel]
//! ```
//!
//! The list is not null-terminated. Its tail always links to the heap's
//! prologue block, which is permanently marked allocated and therefore acts
//! as the sentinel: traversals stop at the first allocated block, and
//! [`FreeList::remove`] may patch `next.prev` unconditionally because a
//! node's forward link is never null.

use crate::block::Block;

pub(crate) struct FreeList {
  /// Most recently inserted free block, or the sentinel when empty.
  head: Block,
}

impl FreeList {
  /// Creates an empty list anchored at `sentinel`, an allocated block whose
  /// payload can absorb link writes.
  pub(crate) fn new(sentinel: Block) -> Self {
    Self { head: sentinel }
  }

  pub(crate) fn head(&self) -> Block {
    self.head
  }

  /// Inserts `bp` at the head of the list. O(1).
  ///
  /// # Safety
  ///
  /// `bp` must be a free block that is not currently on the list.
  pub(crate) unsafe fn push(
    &mut self,
    bp: Block,
  ) {
    unsafe {
      bp.set_next_free(self.head);
      bp.set_prev_free(Block::NULL);
      self.head.set_prev_free(bp);
    }
    self.head = bp;
  }

  /// Unlinks `bp` from the list. O(1).
  ///
  /// # Safety
  ///
  /// `bp` must currently be on the list.
  pub(crate) unsafe fn remove(
    &mut self,
    bp: Block,
  ) {
    unsafe {
      let prev = bp.prev_free();
      let next = bp.next_free();
      debug_assert!(!next.is_null(), "tail links to the sentinel, never null");

      if prev.is_null() {
        self.head = next;
      } else {
        prev.set_next_free(next);
      }
      next.set_prev_free(prev);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::block::{Block, MIN_BLOCK, WSIZE};

  #[repr(align(16))]
  struct Buffer([u8; 512]);

  /// Lays out an allocated sentinel followed by `n` free blocks, all of
  /// minimum size, and returns the handles.
  fn carve(
    buf: &mut Buffer,
    n: usize,
  ) -> (Block, Vec<Block>) {
    let base = buf.0.as_mut_ptr();
    let sentinel = Block::from_payload(unsafe { base.add(WSIZE) });
    unsafe {
      sentinel.set_tags(MIN_BLOCK, true);
      sentinel.set_prev_free(Block::NULL);
      sentinel.set_next_free(Block::NULL);
    }

    let mut blocks = Vec::new();
    for i in 0..n {
      let bp = Block::from_payload(unsafe { base.add(WSIZE + (i + 1) * MIN_BLOCK) });
      unsafe { bp.set_tags(MIN_BLOCK, false) };
      blocks.push(bp);
    }

    (sentinel, blocks)
  }

  /// Collects the list contents by walking forward links up to the sentinel.
  fn collect(list: &FreeList) -> Vec<Block> {
    let mut out = Vec::new();
    let mut bp = list.head();
    unsafe {
      while !bp.allocated() {
        out.push(bp);
        bp = bp.next_free();
      }
    }
    out
  }

  #[test]
  fn push_is_lifo() {
    let mut buf = Buffer([0; 512]);
    let (sentinel, blocks) = carve(&mut buf, 3);
    let mut list = FreeList::new(sentinel);

    unsafe {
      for bp in &blocks {
        list.push(*bp);
      }
    }

    assert_eq!(collect(&list), vec![blocks[2], blocks[1], blocks[0]]);
  }

  #[test]
  fn links_stay_symmetric() {
    let mut buf = Buffer([0; 512]);
    let (sentinel, blocks) = carve(&mut buf, 3);
    let mut list = FreeList::new(sentinel);

    unsafe {
      for bp in &blocks {
        list.push(*bp);
      }

      let mut bp = list.head();
      assert!(bp.prev_free().is_null());
      while !bp.allocated() {
        let next = bp.next_free();
        assert_eq!(next.prev_free(), bp);
        bp = next;
      }
    }
  }

  #[test]
  fn remove_head_middle_and_tail() {
    let mut buf = Buffer([0; 512]);
    let (sentinel, blocks) = carve(&mut buf, 3);
    let mut list = FreeList::new(sentinel);

    unsafe {
      for bp in &blocks {
        list.push(*bp);
      }

      // Middle.
      list.remove(blocks[1]);
      assert_eq!(collect(&list), vec![blocks[2], blocks[0]]);

      // Head.
      list.remove(blocks[2]);
      assert_eq!(collect(&list), vec![blocks[0]]);

      // Tail (also the last node): the list collapses back to the sentinel.
      list.remove(blocks[0]);
      assert_eq!(collect(&list), vec![]);
      assert_eq!(list.head(), sentinel);
    }
  }

  #[test]
  fn reinsertion_after_removal() {
    let mut buf = Buffer([0; 512]);
    let (sentinel, blocks) = carve(&mut buf, 2);
    let mut list = FreeList::new(sentinel);

    unsafe {
      list.push(blocks[0]);
      list.push(blocks[1]);
      list.remove(blocks[0]);
      list.push(blocks[0]);
    }

    assert_eq!(collect(&list), vec![blocks[0], blocks[1]]);
  }
}
