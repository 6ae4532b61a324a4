/// Operator's in-progress modification of one pending tool call's
/// arguments, keyed by the call's index within the current snapshot.
/// Existence of a session means editing is active; it is discarded on
/// cancel, on a terminal submission outcome, and when the snapshot's
/// pending-call set changes underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    pub call_index: usize,
    pub original_args: String,
    pub edited_args: String,
}

impl EditSession {
    pub fn new(call_index: usize, original_args: &str) -> Self {
        Self {
            call_index,
            original_args: original_args.to_string(),
            edited_args: original_args.to_string(),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.edited_args != self.original_args
    }
}
