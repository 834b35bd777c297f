//! Correlates server-issued function calls with the caller's asynchronous
//! tool execution. The pump records a pending call and returns immediately;
//! the result arrives later through `submit_tool_result` and is matched back
//! by call id.

use std::collections::HashMap;

use crate::{Error, Result};

/// A model-initiated request to run a named tool. Arguments are opaque JSON
/// text; the engine does not interpret them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub call_id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Default)]
pub struct ToolBridge {
    pending: HashMap<String, ToolInvocation>,
}

impl ToolBridge {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending call. A duplicate call id is an invariant violation
    /// and is rejected, never overwritten.
    #[allow(clippy::result_large_err)]
    pub fn begin(&mut self, call: ToolInvocation) -> Result<()> {
        if self.pending.contains_key(&call.call_id) {
            return Err(Error::ToolBridge(format!(
                "duplicate tool call id: {}",
                call.call_id
            )));
        }
        self.pending.insert(call.call_id.clone(), call);
        Ok(())
    }

    /// Consume a pending call exactly once. Stale or unknown ids are
    /// rejected so a late result is never delivered twice.
    #[allow(clippy::result_large_err)]
    pub fn complete(&mut self, call_id: &str) -> Result<ToolInvocation> {
        self.pending.remove(call_id).ok_or_else(|| {
            Error::ToolBridge(format!("no pending tool call with id: {call_id}"))
        })
    }

    /// Drop everything still pending; called when the session ends.
    pub fn discard_all(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolInvocation {
        ToolInvocation {
            call_id: id.to_string(),
            name: "get_time".to_string(),
            arguments: "{}".to_string(),
        }
    }

    #[test]
    fn consume_exactly_once() {
        let mut bridge = ToolBridge::new();
        bridge.begin(call("abc")).unwrap();
        assert_eq!(bridge.pending_count(), 1);

        let taken = bridge.complete("abc").unwrap();
        assert_eq!(taken.call_id, "abc");
        assert_eq!(bridge.pending_count(), 0);

        assert!(matches!(bridge.complete("abc"), Err(Error::ToolBridge(_))));
    }

    #[test]
    fn duplicate_begin_is_rejected() {
        let mut bridge = ToolBridge::new();
        bridge.begin(call("abc")).unwrap();
        assert!(matches!(bridge.begin(call("abc")), Err(Error::ToolBridge(_))));
        // The original record survives the rejected duplicate.
        assert_eq!(bridge.pending_count(), 1);
    }

    #[test]
    fn stale_submission_is_rejected() {
        let mut bridge = ToolBridge::new();
        assert!(matches!(bridge.complete("zzz"), Err(Error::ToolBridge(_))));
    }

    #[test]
    fn discard_clears_everything() {
        let mut bridge = ToolBridge::new();
        bridge.begin(call("a")).unwrap();
        bridge.begin(call("b")).unwrap();
        assert_eq!(bridge.discard_all(), 2);
        assert_eq!(bridge.pending_count(), 0);
    }
}
