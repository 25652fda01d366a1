/*
Replaces WhiteboxTools' global `verbose: bool` flag and direct
`println!`/`eprintln!` call sites with a small capability passed into the
run function, so the engine itself performs no ambient I/O. `floodca-cli`
wires this to stdout using the same percentage-only-on-change pattern
`d8_flow_accum.rs` and friends use (`if progress != old_progress`).
*/

/// Status/progress sink the main loop reports through instead of a global
/// verbose flag. `floodca-cli` supplies a stdout-backed implementation;
/// tests typically supply a no-op one.
pub struct ProgressSink<'a> {
    report: Box<dyn FnMut(&str) + 'a>,
    progress: Box<dyn FnMut(usize) + 'a>,
}

impl<'a> ProgressSink<'a> {
    pub fn new<R, P>(report: R, progress: P) -> ProgressSink<'a>
    where
        R: FnMut(&str) + 'a,
        P: FnMut(usize) + 'a,
    {
        ProgressSink {
            report: Box::new(report),
            progress: Box::new(progress),
        }
    }

    /// A sink that discards everything; used by tests and by callers that
    /// genuinely want a silent run.
    pub fn silent() -> ProgressSink<'a> {
        ProgressSink::new(|_| {}, |_| {})
    }

    pub fn report(&mut self, message: &str) {
        (self.report)(message)
    }

    pub fn progress(&mut self, percent: usize) {
        (self.progress)(percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn silent_sink_accepts_calls_without_panicking() {
        let mut sink = ProgressSink::silent();
        sink.report("hello");
        sink.progress(50);
    }

    #[test]
    fn closures_capture_external_state() {
        let log = RefCell::new(Vec::new());
        {
            let mut sink = ProgressSink::new(
                |msg: &str| log.borrow_mut().push(msg.to_string()),
                |_| {},
            );
            sink.report("a");
            sink.report("b");
        }
        assert_eq!(log.borrow().as_slice(), &["a".to_string(), "b".to_string()]);
    }
}
