//! Callback output and capture.
//!
//! Callbacks write through [`HookCall::echo`](crate::HookCall::echo) rather
//! than printing directly. Outside a capture, writes go to the registry's
//! writer (stdout unless replaced with
//! [`HookRegistry::with_output`]). Inside
//! [`HookRegistry::capture_output`] they land in an in-memory buffer that is
//! returned as a string, which is how a render side effect becomes data for
//! post-processing. Captures nest.

use std::cell::RefCell;
use std::io::Write;

use serde_json::Value;
use tracing::debug;

use crate::errors::HookResult;
use crate::registry::HookRegistry;

pub(crate) struct OutputSink {
    writer: RefCell<Box<dyn Write>>,
    captures: RefCell<Vec<Vec<u8>>>,
}

impl OutputSink {
    pub(crate) fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub(crate) fn new(writer: Box<dyn Write>) -> Self {
        Self {
            writer: RefCell::new(writer),
            captures: RefCell::new(Vec::new()),
        }
    }

    fn write(&self, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(buffer) = self.captures.borrow_mut().last_mut() {
            buffer.extend_from_slice(bytes);
            return Ok(());
        }
        self.writer.borrow_mut().write_all(bytes)
    }

    fn flush(&self) -> std::io::Result<()> {
        self.writer.borrow_mut().flush()
    }

    fn begin_capture(&self) -> CaptureGuard<'_> {
        self.captures.borrow_mut().push(Vec::new());
        CaptureGuard {
            sink: self,
            finished: false,
        }
    }

    fn end_capture(&self) -> Vec<u8> {
        self.captures.borrow_mut().pop().unwrap_or_default()
    }

    fn depth(&self) -> usize {
        self.captures.borrow().len()
    }
}

/// Pops its capture buffer on drop, so a failed dispatch does not leave
/// later output redirected.
struct CaptureGuard<'a> {
    sink: &'a OutputSink,
    finished: bool,
}

impl CaptureGuard<'_> {
    fn finish(mut self) -> Vec<u8> {
        self.finished = true;
        self.sink.end_capture()
    }
}

impl Drop for CaptureGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.sink.end_capture();
        }
    }
}

impl HookRegistry {
    /// Write `text` to the active capture buffer, or to the output writer
    /// when nothing is capturing.
    pub fn echo(&self, text: &str) -> HookResult<()> {
        self.output.write(text.as_bytes())?;
        Ok(())
    }

    /// Flush the output writer.
    pub fn flush_output(&self) -> HookResult<()> {
        self.output.flush()?;
        Ok(())
    }

    /// Run [`do_action`](Self::do_action) and return everything its
    /// callbacks echoed instead of letting it reach the writer.
    ///
    /// If a callback fails, the partial output is discarded and the error
    /// is returned.
    pub fn capture_output(&self, name: &str, params: &Value) -> HookResult<String> {
        let capture = self.output.begin_capture();
        debug!(hook = name, depth = self.output.depth(), "capturing hook output");
        self.do_action(name, params)?;
        let bytes = capture.finish();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}
