use std::mem::size_of;

/// Number of bytes needed to align `pos` to the size of `T`.
pub fn padding<T>(pos: u64) -> u64 {
    let size = size_of::<T>() as u64;
    size - (pos % size)
}
