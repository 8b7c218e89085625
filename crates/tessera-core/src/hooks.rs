//! Host callbacks invoked while draining the event queues.
//!
//! Hooks only ever run on the thread that drains, never on the audio thread.

use tracing::debug;

use crate::config::PRINT_LINE_SIZE;
use crate::wire::AtomSlice;

pub type PrintHook = Box<dyn FnMut(&str) + Send>;
pub type BangHook = Box<dyn FnMut(&str) + Send>;
pub type FloatHook = Box<dyn FnMut(&str, f32) + Send>;
pub type SymbolHook = Box<dyn FnMut(&str, &str) + Send>;
pub type ListHook = Box<dyn for<'a> FnMut(&str, AtomSlice<'a>) + Send>;
pub type MessageHook = Box<dyn for<'a> FnMut(&str, &str, AtomSlice<'a>) + Send>;

pub type NoteOnHook = Box<dyn FnMut(i32, i32, i32) + Send>;
pub type ControlChangeHook = Box<dyn FnMut(i32, i32, i32) + Send>;
pub type ProgramChangeHook = Box<dyn FnMut(i32, i32) + Send>;
pub type PitchBendHook = Box<dyn FnMut(i32, i32) + Send>;
pub type AfterTouchHook = Box<dyn FnMut(i32, i32) + Send>;
pub type PolyAfterTouchHook = Box<dyn FnMut(i32, i32, i32) + Send>;
pub type MidiByteHook = Box<dyn FnMut(i32, i32) + Send>;

/// One optional callback per event kind. Events without a hook are skipped.
///
/// MIDI channel hooks receive the packed `port << 4 | channel`. The pitch bend hook
/// receives the signed value in `-8192..=8191`.
#[derive(Default)]
pub struct HookTable {
    pub(crate) print: Option<PrintHook>,
    pub(crate) bang: Option<BangHook>,
    pub(crate) float: Option<FloatHook>,
    pub(crate) symbol: Option<SymbolHook>,
    pub(crate) list: Option<ListHook>,
    pub(crate) message: Option<MessageHook>,
    pub(crate) note_on: Option<NoteOnHook>,
    pub(crate) control_change: Option<ControlChangeHook>,
    pub(crate) program_change: Option<ProgramChangeHook>,
    pub(crate) pitch_bend: Option<PitchBendHook>,
    pub(crate) after_touch: Option<AfterTouchHook>,
    pub(crate) poly_after_touch: Option<PolyAfterTouchHook>,
    pub(crate) midi_byte: Option<MidiByteHook>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_print_hook(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        debug!("print hook installed");
        self.print = Some(Box::new(hook));
    }

    /// Installs a print hook that only sees whole lines.
    ///
    /// Fragments are joined until one ends in a newline. The newline is stripped.
    pub fn set_concatenated_print_hook(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        let mut concat = PrintConcatenator::new(hook);
        self.set_print_hook(move |s| concat.push(s));
    }

    pub fn set_bang_hook(&mut self, hook: impl FnMut(&str) + Send + 'static) {
        self.bang = Some(Box::new(hook));
    }

    pub fn set_float_hook(&mut self, hook: impl FnMut(&str, f32) + Send + 'static) {
        self.float = Some(Box::new(hook));
    }

    pub fn set_symbol_hook(&mut self, hook: impl FnMut(&str, &str) + Send + 'static) {
        self.symbol = Some(Box::new(hook));
    }

    pub fn set_list_hook(&mut self, hook: impl for<'a> FnMut(&str, AtomSlice<'a>) + Send + 'static) {
        self.list = Some(Box::new(hook));
    }

    pub fn set_message_hook(
        &mut self,
        hook: impl for<'a> FnMut(&str, &str, AtomSlice<'a>) + Send + 'static,
    ) {
        self.message = Some(Box::new(hook));
    }

    pub fn set_note_on_hook(&mut self, hook: impl FnMut(i32, i32, i32) + Send + 'static) {
        self.note_on = Some(Box::new(hook));
    }

    pub fn set_control_change_hook(&mut self, hook: impl FnMut(i32, i32, i32) + Send + 'static) {
        self.control_change = Some(Box::new(hook));
    }

    pub fn set_program_change_hook(&mut self, hook: impl FnMut(i32, i32) + Send + 'static) {
        self.program_change = Some(Box::new(hook));
    }

    pub fn set_pitch_bend_hook(&mut self, hook: impl FnMut(i32, i32) + Send + 'static) {
        self.pitch_bend = Some(Box::new(hook));
    }

    pub fn set_after_touch_hook(&mut self, hook: impl FnMut(i32, i32) + Send + 'static) {
        self.after_touch = Some(Box::new(hook));
    }

    pub fn set_poly_after_touch_hook(&mut self, hook: impl FnMut(i32, i32, i32) + Send + 'static) {
        self.poly_after_touch = Some(Box::new(hook));
    }

    pub fn set_midi_byte_hook(&mut self, hook: impl FnMut(i32, i32) + Send + 'static) {
        self.midi_byte = Some(Box::new(hook));
    }

    /// Removes every hook.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl std::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookTable")
            .field("print", &self.print.is_some())
            .field("bang", &self.bang.is_some())
            .field("float", &self.float.is_some())
            .field("symbol", &self.symbol.is_some())
            .field("list", &self.list.is_some())
            .field("message", &self.message.is_some())
            .field("note_on", &self.note_on.is_some())
            .field("midi_byte", &self.midi_byte.is_some())
            .finish_non_exhaustive()
    }
}

/// Joins print fragments into lines.
///
/// A line is emitted when the accumulated text ends in `'\n'` (stripped), or when it
/// reaches `PRINT_LINE_SIZE - 1` bytes, in which case it is split.
pub struct PrintConcatenator<F> {
    line: String,
    sink: F,
}

impl<F: FnMut(&str)> PrintConcatenator<F> {
    pub fn new(sink: F) -> Self {
        Self {
            line: String::with_capacity(PRINT_LINE_SIZE),
            sink,
        }
    }

    pub fn push(&mut self, mut fragment: &str) {
        const LIMIT: usize = PRINT_LINE_SIZE - 1;

        while self.line.len() + fragment.len() >= PRINT_LINE_SIZE {
            let mut take = LIMIT - self.line.len();
            while !fragment.is_char_boundary(take) {
                take -= 1;
            }
            let (head, tail) = fragment.split_at(take);
            self.line.push_str(head);
            (self.sink)(&self.line);
            self.line.clear();
            fragment = tail;
        }

        self.line.push_str(fragment);
        if self.line.ends_with('\n') {
            self.line.pop();
            (self.sink)(&self.line);
            self.line.clear();
        }
    }

    /// Text waiting for a newline.
    pub fn pending(&self) -> &str {
        &self.line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collector() -> (Arc<Mutex<Vec<String>>>, impl FnMut(&str)) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let lines = lines.clone();
            move |s: &str| lines.lock().unwrap().push(s.to_owned())
        };
        (lines, sink)
    }

    #[test]
    fn test_concatenator_joins_until_newline() {
        let (lines, sink) = collector();
        let mut concat = PrintConcatenator::new(sink);
        concat.push("hello");
        concat.push(" ");
        concat.push("world\n");
        concat.push("next");
        assert_eq!(*lines.lock().unwrap(), vec!["hello world".to_string()]);
        assert_eq!(concat.pending(), "next");
    }

    #[test]
    fn test_concatenator_splits_long_lines() {
        let (lines, sink) = collector();
        let mut concat = PrintConcatenator::new(sink);
        let long = "x".repeat(PRINT_LINE_SIZE + 10);
        concat.push(&long);
        concat.push("\n");

        let lines = lines.lock().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), PRINT_LINE_SIZE - 1);
        assert_eq!(lines[1].len(), 11);
    }

    #[test]
    fn test_concatenator_splits_on_char_boundary() {
        let (lines, sink) = collector();
        let mut concat = PrintConcatenator::new(sink);
        let long = "é".repeat(PRINT_LINE_SIZE);
        concat.push(&long);

        let lines = lines.lock().unwrap();
        assert!(lines.iter().all(|l| l.len() < PRINT_LINE_SIZE));
        assert!(lines.iter().all(|l| l.chars().all(|c| c == 'é')));
    }

    #[test]
    fn test_clear_removes_hooks() {
        let mut hooks = HookTable::new();
        hooks.set_float_hook(|_, _| {});
        hooks.set_concatenated_print_hook(|_| {});
        assert!(hooks.float.is_some() && hooks.print.is_some());
        hooks.clear();
        assert!(hooks.float.is_none() && hooks.print.is_none());
    }
}
