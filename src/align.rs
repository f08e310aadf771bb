/// Rounds the given byte count up to the next double-word boundary.
///
/// A word is one machine pointer; every block the heap hands out is sized
/// and placed on double-word boundaries, so this is the alignment applied
/// to adjusted request sizes.
///
/// # Examples
///
/// ```rust
/// use rmalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(17), 32), // 64 bit machine.
///     4 => assert_eq!(align!(9), 16),  // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + 2 * ::std::mem::size_of::<usize>() - 1)
      & !(2 * ::std::mem::size_of::<usize>() - 1)
  };
}

/// Rounds `$value` up to the next multiple of `$align`.
///
/// `$align` must be a power of two. Used for arbitrary boundaries, e.g.
/// aligning a provider's base address before the first block is laid out.
///
/// # Examples
///
/// ```rust
/// use rmalloc::align_to;
///
/// assert_eq!(align_to!(13, 16), 16);
/// assert_eq!(align_to!(32, 16), 32);
/// ```
#[macro_export]
macro_rules! align_to {
  ($value:expr, $align:expr) => {
    ($value + $align - 1) & !($align - 1)
  };
}

#[cfg(test)]
mod tests {
  use std::mem;

  #[test]
  fn test_align() {
    let dword = 2 * mem::size_of::<usize>();

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (dword * i + 1)..=(dword * (i + 1));

      let expected_alignment = dword * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
      }
    }
  }

  #[test]
  fn test_align_to() {
    assert_eq!(align_to!(0, 16), 0);
    assert_eq!(align_to!(1, 16), 16);
    assert_eq!(align_to!(16, 16), 16);
    assert_eq!(align_to!(17, 16), 32);
    assert_eq!(align_to!(31, 32), 32);
    assert_eq!(align_to!(4095, 4096), 4096);
  }
}
