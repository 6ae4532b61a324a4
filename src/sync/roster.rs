use crate::api::{ExecutionId, ExecutionSummary};

/// The list of known executions, independent of which one is observed in
/// detail. Refreshed on its own periodic tick; replaced wholesale on each
/// successful fetch, retained across failed ones.
#[derive(Debug, Default)]
pub struct RosterState {
    entries: Vec<ExecutionSummary>,
}

impl RosterState {
    pub fn apply(&mut self, entries: Vec<ExecutionSummary>) {
        self.entries = entries;
    }

    pub fn entries(&self) -> &[ExecutionSummary] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn find(&self, id: &ExecutionId) -> Option<&ExecutionSummary> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn position(&self, id: &ExecutionId) -> Option<usize> {
        self.entries.iter().position(|entry| &entry.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ExecutionStatus;
    use std::collections::BTreeMap;

    fn summary(id: &str, status: ExecutionStatus) -> ExecutionSummary {
        ExecutionSummary {
            id: ExecutionId::parse(id).unwrap(),
            status,
            created_at: String::new(),
            updated_at: String::new(),
            checkpoint_id: String::new(),
            input: BTreeMap::new(),
        }
    }

    #[test]
    fn apply_replaces_entries_and_keeps_server_order() {
        let mut roster = RosterState::default();
        roster.apply(vec![
            summary("exec-2", ExecutionStatus::Running),
            summary("exec-1", ExecutionStatus::Completed),
        ]);
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.entries()[0].id.as_str(), "exec-2");

        let id = ExecutionId::parse("exec-1").unwrap();
        assert_eq!(roster.position(&id), Some(1));
        assert_eq!(
            roster.find(&id).map(|entry| entry.status),
            Some(ExecutionStatus::Completed)
        );
    }
}
