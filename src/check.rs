//! Heap consistency diagnostics.
//!
//! The checker walks the arena and the free list independently and reports
//! every violated invariant through the `log` facade. It is meant for tests
//! and debugging sessions; the allocator itself never calls it.

use log::{debug, error};

use crate::arena::Arena;
use crate::block::{DSIZE, MIN_BLOCK, WSIZE};
use crate::heap::Heap;

impl<A: Arena> Heap<A> {
  /// Verifies every structural invariant of the heap at a quiescent moment.
  ///
  /// Checked, in order: prologue and epilogue tags, double-word alignment
  /// of every payload, size validity, header/footer agreement, absence of
  /// adjacent free blocks, arena-walk termination exactly on the epilogue,
  /// free-list links staying inside the arena, link symmetry, no allocated
  /// entries on the list, and agreement between the free-list length and
  /// the number of free blocks seen by the walk.
  ///
  /// Returns the number of violations found; each one is also reported via
  /// `log::error!`. A well-formed heap returns 0.
  pub fn check(&self) -> usize {
    let violations = std::cell::Cell::new(0usize);
    let report = |message: String| {
      error!("heap check: {message}");
      violations.set(violations.get() + 1);
    };

    unsafe {
      let lo = self.arena.lo() as usize;
      let hi = self.arena.hi() as usize;

      let pro = self.prologue;
      if pro.size() != MIN_BLOCK || !pro.allocated() {
        report(format!("bad prologue tag [{}:{}]", pro.size(), pro.allocated() as u8));
      }
      if pro.header_word() != pro.footer_word() {
        report("prologue header and footer disagree".into());
      }

      // Arena walk: every byte between the sentinels belongs to exactly one
      // block, blocks tile the region, and the walk must land on the
      // zero-size epilogue header.
      let mut walk_free = 0;
      let mut walk_blocks = 0;
      let mut prev_was_free = false;
      let mut bp = pro.next();

      loop {
        if bp.addr() < lo || bp.addr() > hi {
          report(format!("walk left the arena at {:#x}", bp.addr()));
          return violations.get();
        }

        let size = bp.size();
        if size == 0 {
          break;
        }

        if bp.addr() % DSIZE != 0 {
          report(format!("payload {:#x} is not double-word aligned", bp.addr()));
        }
        if size % DSIZE != 0 || size < MIN_BLOCK {
          report(format!("block {:#x} has malformed size {size}", bp.addr()));
          return violations.get();
        }
        if bp.addr() + size - WSIZE > hi + 1 {
          report(format!("block {:#x} overflows the arena top", bp.addr()));
          return violations.get();
        }
        if bp.header_word() != bp.footer_word() {
          report(format!("block {:#x}: header and footer disagree", bp.addr()));
        }

        let free = !bp.allocated();
        if free && prev_was_free {
          report(format!("adjacent free blocks at {:#x}", bp.addr()));
        }

        walk_blocks += 1;
        walk_free += free as usize;
        prev_was_free = free;
        bp = bp.next();
      }

      if !bp.allocated() {
        report("bad epilogue tag".into());
      }
      if bp.header_ptr() as usize + WSIZE - 1 != hi {
        report(format!(
          "walk ended at {:#x}, not at the arena top {hi:#x}",
          bp.header_ptr() as usize,
        ));
      }

      // Free-list walk, bounded so a cyclic list cannot hang the checker.
      let cap = walk_blocks + 2;
      let mut list_count = 0;
      let mut steps = 0;
      let mut bp = self.free.head();

      while bp != pro && !bp.is_null() {
        steps += 1;
        if steps > cap {
          report("free list does not terminate at the sentinel".into());
          break;
        }

        if bp.addr() < lo || bp.addr() > hi {
          report(format!("free-list link leads outside the arena: {:#x}", bp.addr()));
          break;
        }

        if bp.allocated() {
          report(format!("allocated block {:#x} is on the free list", bp.addr()));
        } else {
          list_count += 1;
        }

        let next = bp.next_free();
        if next.is_null() {
          report(format!("free block {:#x} has a null forward link", bp.addr()));
          break;
        }
        if next != pro && ((next.addr() < lo) || (next.addr() > hi)) {
          report(format!("free-list link leads outside the arena: {:#x}", next.addr()));
          break;
        }
        if next.prev_free() != bp {
          report(format!("asymmetric free-list links between {:#x} and {:#x}", bp.addr(), next.addr()));
        }

        bp = next;
      }

      if list_count != walk_free {
        report(format!(
          "free list holds {list_count} blocks but the walk found {walk_free}",
        ));
      }
    }

    violations.get()
  }

  /// Logs every block in the arena, prologue to epilogue, one `log::debug!`
  /// line each. Free blocks also show their list links.
  pub fn dump(&self) {
    unsafe {
      debug!(
        "arena [{:p}, {:p}], {} free bytes in {} blocks",
        self.arena.lo(),
        self.arena.hi(),
        self.free_bytes(),
        self.free_blocks(),
      );

      let mut bp = self.prologue;
      loop {
        let size = bp.size();
        if size == 0 {
          debug!("{:p}: end of the arena", bp.payload());
          break;
        }

        let tag = if bp.allocated() { 'a' } else { 'f' };
        if bp.allocated() {
          debug!(
            "{:p}: header:[{size}:{tag}] footer:[{}:{tag}]",
            bp.payload(),
            bp.footer_word() & !0x7,
          );
        } else {
          debug!(
            "{:p}: header:[{size}:{tag}] footer:[{}:{tag}] prev:{:p} next:{:p}",
            bp.payload(),
            bp.footer_word() & !0x7,
            bp.prev_free().payload(),
            bp.next_free().payload(),
          );
        }

        bp = bp.next();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use crate::arena::FixedArena;
  use crate::block::Block;
  use crate::heap::Heap;

  fn heap() -> Heap<FixedArena> {
    Heap::init(FixedArena::new(64 * 1024)).expect("provider has room")
  }

  #[test]
  fn a_fresh_heap_passes() {
    let heap = heap();
    assert_eq!(heap.check(), 0);
    heap.dump();
  }

  #[test]
  fn a_worked_heap_passes() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(48);
      let b = heap.allocate(200);
      heap.free(a);
      let c = heap.reallocate(b, 400);
      assert_eq!(heap.check(), 0);
      heap.free(c);
    }

    assert_eq!(heap.check(), 0);
  }

  #[test]
  fn detects_a_clobbered_header() {
    let heap = heap();

    unsafe {
      // Flip the allocated bit of the lone free block's header only. The
      // checker must see the header/footer disagreement and the free list
      // no longer matching the arena walk.
      let bp = heap.free.head();
      let word = bp.header_word();
      crate::block::put(bp.header_ptr(), word | 1);
    }

    assert!(heap.check() > 0);
  }

  #[test]
  fn detects_uncoalesced_neighbors() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(64);
      let b = heap.allocate(64);

      heap.free(a);

      // Simulate a buggy free of `b`: clear its tags and push it straight
      // onto the list, skipping coalescing. `a` and `b` are now two
      // adjacent free blocks.
      let b = Block::from_payload(b);
      b.set_tags(b.size(), false);
      heap.free.push(b);
    }

    assert!(heap.check() > 0);
  }

  #[test]
  fn detects_a_broken_back_link() {
    let mut heap = heap();

    unsafe {
      let a = heap.allocate(64);
      let _b = heap.allocate(64);
      heap.free(a);

      // Two list nodes now: [a, remainder]. Cut a's back link on the
      // remainder to break symmetry.
      let second = heap.free.head().next_free();
      second.set_prev_free(Block::NULL);
    }

    assert!(heap.check() > 0);
  }
}
