//! Application state for Axum handlers.

use crflow_core::ChangeRequestWorkflow;

/// Application state shared across all HTTP handlers.
///
/// Cloning is cheap: the workflow holds its ports behind `Arc`.
///
/// # Examples
///
/// ```ignore
/// use crflow_web::{AppState, change_request_router};
///
/// let workflow = ChangeRequestWorkflow::new(repository, events);
/// let app = change_request_router(AppState::new(workflow));
/// ```
#[derive(Clone, Debug)]
pub struct AppState {
    /// The change request workflow engine.
    pub workflow: ChangeRequestWorkflow,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub const fn new(workflow: ChangeRequestWorkflow) -> Self {
        Self { workflow }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_is_clone() {
        // Ensure AppState implements Clone (required for Axum)
        fn assert_clone<T: Clone + Send + Sync + 'static>() {}
        assert_clone::<AppState>();
    }
}
