use std::io::Read;
use std::ptr;

use libc::sbrk;
use rmalloc::{Heap, SbrkArena};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`,
/// `htop`, `gdb`, or just visually track how allocations change the
/// program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn print_heap_stats(heap: &Heap<SbrkArena>) {
  println!(
    "    free list: {} block(s), {} bytes; consistency violations: {}",
    heap.free_blocks(),
    heap.free_bytes(),
    heap.check(),
  );
}

fn main() {
  print_program_break("start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Bring up the heap. This lays out the arena skeleton and a first
  //    4 KiB free block, both obtained by moving the program break.
  // --------------------------------------------------------------------
  let mut heap = Heap::init(SbrkArena::new()).expect("sbrk refused the initial extension");
  println!("\n[1] Heap initialized");
  print_program_break("after init");
  print_heap_stats(&heap);
  block_until_enter_pressed();

  unsafe {
    // --------------------------------------------------------------------
    // 2) Allocate 100 bytes and fill them with a pattern.
    // --------------------------------------------------------------------
    let first = heap.allocate(100);
    println!("\n[2] Allocate 100 bytes at {first:?}");
    for i in 0..100 {
      first.add(i).write(i as u8);
    }
    println!("[2] Wrote 0..100 into the block");
    print_heap_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Allocate a second block; the first free block is split again.
    // --------------------------------------------------------------------
    let second = heap.allocate(64);
    println!("\n[3] Allocate 64 bytes at {second:?}");
    ptr::write_bytes(second, 0xAB, 64);
    print_heap_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Grow the first block. Its upstairs neighbor is allocated, so the
    //    heap moves the payload and the pattern survives the copy.
    // --------------------------------------------------------------------
    let grown = heap.reallocate(first, 200);
    println!("\n[4] Reallocate 100 -> 200 bytes: {first:?} -> {grown:?}");
    println!(
      "[4] Pattern intact after the move? {}",
      (0..100).all(|i| grown.add(i).read() == i as u8),
    );
    print_heap_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Free everything. The holes coalesce back into a single block.
    // --------------------------------------------------------------------
    heap.free(second);
    println!("\n[5] Freed the 64-byte block");
    print_heap_stats(&heap);

    heap.free(grown);
    println!("[5] Freed the 200-byte block");
    print_heap_stats(&heap);
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate past the first chunk to watch the arena grow.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");
    let big = heap.allocate(64 * 1024);
    println!("\n[6] Allocate 64 KiB at {big:?}");
    print_program_break("after large alloc");
    print_heap_stats(&heap);

    heap.free(big);
  }

  // --------------------------------------------------------------------
  // 7) End of demo. The arena is never returned to the OS; the process
  //    exit reclaims it.
  // --------------------------------------------------------------------
  println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
}
