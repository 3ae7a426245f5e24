use crate::Task;

/// Tracks which task the detail pane is showing across refresh cycles.
///
/// The list auto-follows the newest task: whenever a refresh brings a task id
/// to the front that was not at the front of the previously applied refresh,
/// selection jumps to it. Any other refresh leaves the operator's selection
/// alone, including a manual selection further down the list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskSelection {
    selected: Option<String>,
    newest_seen: Option<String>,
}

impl TaskSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Manual override. Persists across refreshes until the newest id changes.
    pub fn select(&mut self, id: impl Into<String>) {
        self.selected = Some(id.into());
    }

    /// Reconcile against a freshly fetched, newest-first task list.
    ///
    /// An empty list changes nothing: the current selection may then refer to
    /// a task that is no longer present, which callers must tolerate.
    pub fn apply_fetch(&mut self, tasks: &[Task]) {
        let Some(newest) = tasks.first() else {
            return;
        };
        let newest_changed = self.newest_seen.as_deref() != Some(newest.id.as_str());
        if self.selected.is_none() || newest_changed {
            self.selected = Some(newest.id.clone());
        }
        self.newest_seen = Some(newest.id.clone());
    }
}
