//! The sbrk-style memory provider underneath the heap.
//!
//! The heap never owns pages itself; it asks an [`Arena`] for more bytes and
//! manages whatever it is given. The provider's contract is deliberately
//! narrow: append bytes to one contiguous region, and report the region's
//! current bounds. Memory is never handed back.
//!
//! Two providers ship with the crate:
//!
//! - [`SbrkArena`] grows the program's data segment with `sbrk(2)`, the
//!   classic heap provider on POSIX systems.
//! - [`FixedArena`] serves a bounded, owned buffer. Its refusals are
//!   deterministic, which makes it the provider of choice for tests and for
//!   embedding a capped heap inside another program.

use std::ptr::{self, NonNull};

use libc::{c_void, intptr_t, sbrk};
use log::{trace, warn};

use crate::align_to;
use crate::block::DSIZE;

/// A provider of one contiguous, monotonically growing memory region.
///
/// # Safety
///
/// Implementors must guarantee that:
///
/// - every successful [`extend`](Arena::extend) returns `len` writable bytes
///   for the caller's exclusive use, placed directly after the bytes of the
///   previous successful extension;
/// - the first successful extension returns a double-word aligned address;
/// - returned memory stays valid for the provider's lifetime.
pub unsafe trait Arena {
  /// Appends `len` bytes to the region and returns their address, or `None`
  /// if the provider refuses to grow.
  fn extend(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>>;

  /// Lowest valid address of the region.
  fn lo(&self) -> *mut u8;

  /// Highest valid address of the region (the last byte, not one past it).
  ///
  /// Meaningful once the arena has been extended at least once.
  fn hi(&self) -> *mut u8;
}

/// A provider backed by the program break, grown via `sbrk(2)`.
///
/// The program break is process-global state: if anything else moves it
/// between two extensions, the next region would not be adjacent to the
/// previous one. `SbrkArena` detects that and refuses the extension rather
/// than handing the heap a region it cannot legally merge into the arena.
pub struct SbrkArena {
  /// First byte ever returned; null until the first extension.
  lo: *mut u8,

  /// Last byte of the most recent extension.
  hi: *mut u8,
}

impl SbrkArena {
  pub fn new() -> Self {
    Self {
      lo: ptr::null_mut(),
      hi: ptr::null_mut(),
    }
  }
}

unsafe impl Arena for SbrkArena {
  fn extend(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    if len == 0 {
      return None;
    }

    unsafe {
      if self.lo.is_null() {
        // First extension: bump the break onto a double-word boundary so the
        // arena's base satisfies the block alignment contract.
        let brk = sbrk(0) as usize;
        let pad = align_to!(brk, DSIZE) - brk;
        if pad != 0 && sbrk(pad as intptr_t) == usize::MAX as *mut c_void {
          return None;
        }

        let start = sbrk(len as intptr_t);
        if start == usize::MAX as *mut c_void {
          return None;
        }

        self.lo = start as *mut u8;
        self.hi = self.lo.add(len - 1);
        trace!("sbrk arena opened at {:p}, {len} bytes", self.lo);
        NonNull::new(self.lo)
      } else {
        let start = sbrk(len as intptr_t);
        if start == usize::MAX as *mut c_void {
          return None;
        }

        let start = start as *mut u8;
        if start != self.hi.add(1) {
          // Someone else moved the break since our last extension; the new
          // region is not adjacent to the arena and cannot be used.
          warn!(
            "program break moved externally (expected {:p}, got {start:p}); refusing extension",
            self.hi.add(1),
          );
          return None;
        }

        self.hi = start.add(len - 1);
        trace!("sbrk arena extended by {len} bytes to {:p}", self.hi);
        NonNull::new(start)
      }
    }
  }

  fn lo(&self) -> *mut u8 {
    self.lo
  }

  fn hi(&self) -> *mut u8 {
    self.hi
  }
}

/// A provider serving slices of one owned, bounded buffer.
///
/// The buffer is allocated up front with double-word slack so its base can
/// be aligned; extensions simply advance a cursor. Once `capacity` bytes
/// have been served, every further extension is refused, which makes
/// provider-failure behavior reproducible.
pub struct FixedArena {
  buf: Vec<u8>,

  /// Offset of the aligned base within `buf`.
  base: usize,

  /// Bytes served so far.
  len: usize,

  capacity: usize,
}

impl FixedArena {
  /// Creates a provider that will serve at most `capacity` bytes.
  pub fn new(capacity: usize) -> Self {
    let buf = vec![0u8; capacity + DSIZE];
    let addr = buf.as_ptr() as usize;
    let base = align_to!(addr, DSIZE) - addr;

    Self {
      buf,
      base,
      len: 0,
      capacity,
    }
  }

  /// Total bytes this provider is willing to serve.
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes served so far.
  pub fn len(&self) -> usize {
    self.len
  }

  pub fn is_empty(&self) -> bool {
    self.len == 0
  }
}

unsafe impl Arena for FixedArena {
  fn extend(
    &mut self,
    len: usize,
  ) -> Option<NonNull<u8>> {
    let end = self.len.checked_add(len)?;
    if len == 0 || end > self.capacity {
      return None;
    }

    let start = unsafe { self.buf.as_mut_ptr().add(self.base + self.len) };
    self.len = end;
    NonNull::new(start)
  }

  fn lo(&self) -> *mut u8 {
    unsafe { (self.buf.as_ptr() as *mut u8).add(self.base) }
  }

  fn hi(&self) -> *mut u8 {
    unsafe { (self.buf.as_ptr() as *mut u8).add(self.base + self.len.saturating_sub(1)) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn fixed_arena_serves_adjacent_regions() {
    let mut arena = FixedArena::new(256);

    let first = arena.extend(64).expect("first extension fits");
    let second = arena.extend(64).expect("second extension fits");

    assert_eq!(first.as_ptr() as usize % DSIZE, 0);
    assert_eq!(second.as_ptr() as usize, first.as_ptr() as usize + 64);
    assert_eq!(arena.lo(), first.as_ptr());
    assert_eq!(arena.hi() as usize, first.as_ptr() as usize + 127);
  }

  #[test]
  fn fixed_arena_refuses_past_capacity() {
    let mut arena = FixedArena::new(128);

    assert!(arena.extend(128).is_some());
    assert!(arena.extend(1).is_none());

    // A refusal leaves the bounds untouched.
    assert_eq!(arena.len(), 128);
  }

  #[test]
  fn fixed_arena_refuses_zero_and_overflowing_requests() {
    let mut arena = FixedArena::new(128);

    assert!(arena.extend(0).is_none());
    assert!(arena.extend(usize::MAX).is_none());
    assert!(arena.is_empty());
  }
}
