//! # rmalloc - A Boundary-Tag Memory Allocator Library
//!
//! This crate provides an **explicit free list** allocator in Rust that
//! manages a single contiguous heap arena obtained from an sbrk-style
//! provider.
//!
//! ## Overview
//!
//! Every block carries a header and a footer word (the *boundary tags*), and
//! free blocks are threaded into a doubly-linked list through their own
//! payloads:
//!
//! ```text
//!   Arena layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                            HEAP ARENA                                │
//!   │                                                                      │
//!   │  ┌────┬──────────┬────────┬────────┬────────┬───────────┬─────────┐  │
//!   │  │pad │ prologue │ B1 (a) │ B2 (f) │ B3 (a) │  B4 (f)   │epilogue │  │
//!   │  └────┴──────────┴────────┴───┬────┴────────┴─────┬─────┴─────────┘  │
//!   │                               │      ▲            │       ▲          │
//!   │        free list:             └──────┼────────────┘       │          │
//!   │        head ──► B4 ◄──► B2 ──────────┴──► (sentinel = prologue)      │
//!   │                                                                      │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   (a) = allocated, (f) = free. The prologue and epilogue are permanently
//!   allocated sentinels; merges can never run off the arena.
//! ```
//!
//! Allocation is first fit over the free list with split-on-place; freeing
//! coalesces across all four neighbor configurations in constant time thanks
//! to the footer tags; resizing grows in place when the block above is free.
//!
//! ## Crate Structure
//!
//! ```text
//!   rmalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── arena      - Arena provider trait, SbrkArena, FixedArena
//!   ├── block      - Boundary-tag primitives (internal)
//!   ├── list       - Explicit free list (internal)
//!   ├── heap       - Heap: init / allocate / free / reallocate
//!   └── check      - Consistency checker and block dump
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use rmalloc::{FixedArena, Heap};
//!
//! // A heap over a bounded in-memory arena. Use SbrkArena to grow the
//! // program's data segment instead.
//! let mut heap = Heap::init(FixedArena::new(64 * 1024)).unwrap();
//!
//! unsafe {
//!     let p = heap.allocate(100);
//!     assert!(!p.is_null());
//!
//!     p.write(42);
//!     let p = heap.reallocate(p, 200);
//!     assert_eq!(p.read(), 42);
//!
//!     heap.free(p);
//! }
//! ```
//!
//! ## Diagnostics
//!
//! [`Heap::check`] verifies the structural invariants (tag agreement,
//! alignment, coalescing, free-list/arena agreement) and reports violations
//! through the [`log`] facade; [`Heap::dump`] logs the arena block by block.
//! Neither is called on the hot path.
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; wrap the heap
//!   in a lock if it must be shared.
//! - **Memory is never returned to the provider**: the arena only grows.
//! - **Natural alignment only**: every payload is double-word aligned, and
//!   no stricter alignment can be requested.
//!
//! ## Safety
//!
//! The allocator hands out raw pointers and trusts callers to honor the
//! usual malloc rules: no use after free, no double free, no foreign
//! pointers. All raw memory access is confined to the block-primitive
//! module; everything above it works with opaque block handles.

pub mod align;
pub mod arena;
mod block;
mod check;
mod heap;
mod list;

pub use arena::{Arena, FixedArena, SbrkArena};
pub use heap::{Heap, HeapError};
