/// Mark a path as unlikely, e.g. an allocator returning null
#[cold]
#[inline(never)]
pub fn cold<R, F: FnOnce() -> R>(f: F) -> R {
    f()
}
