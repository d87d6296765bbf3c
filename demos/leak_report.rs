//! Build a small linked list through the global tracer, free all but one
//! node, and write what is left to `leak_report.json` (or the path given as
//! the first argument).
//!
//! `RUST_LOG=trace` shows every recorded allocation and release.

use std::{mem, ptr};

use mtrace::{report::Report, trace_free, trace_malloc};

#[repr(C)]
struct Node {
    next: *mut Node,
    value: u32,
}

fn push(head: *mut Node, value: u32) -> *mut Node {
    let node = trace_malloc!(mem::size_of::<Node>()).unwrap().as_ptr() as *mut Node;
    unsafe { node.write(Node { next: head, value }) };
    node
}

fn main() {
    env_logger::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "leak_report.json".to_owned());

    let mut head = ptr::null_mut();
    for value in 0..5 {
        head = push(head, value);
    }

    // forget the last node on purpose
    while !head.is_null() {
        let node = head;
        head = unsafe { (*node).next };
        if unsafe { (*node).value } == 0 {
            continue;
        }
        unsafe { trace_free!(node as *mut u8).unwrap() };
    }

    // `free(NULL)` is harmless, but was never allocated
    if let Err(err) = unsafe { trace_free!(ptr::null_mut()) } {
        println!("expected: {err}");
    }

    let report = Report::collect(&*mtrace::global());
    for row in report.leaks() {
        println!(
            "{}: {} allocated, {} released, {} outstanding",
            row.site, row.allocate_count, row.release_count, row.outstanding
        );
    }
    report.write_to_file(&path).unwrap();
    println!("report written to {path}");
}
