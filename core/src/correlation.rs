//! Request correlation ids.
//!
//! The HTTP layer runs each request inside [`scope`]; anything awaited within it can
//! read the id with [`current`]. [`BusEvents`](crate::events::BusEvents) copies it into
//! the `correlation_id` field of each published event's metadata.

use std::future::Future;
use uuid::Uuid;

tokio::task_local! {
    static CORRELATION_ID: Uuid;
}

/// Run `future` with `id` as the current correlation id.
pub async fn scope<F: Future>(id: Uuid, future: F) -> F::Output {
    CORRELATION_ID.scope(id, future).await
}

/// The correlation id of the enclosing [`scope`], if any.
#[must_use]
pub fn current() -> Option<Uuid> {
    CORRELATION_ID.try_with(|id| *id).ok()
}

/// Event metadata carrying the current correlation id, if any.
#[must_use]
pub fn metadata() -> Option<serde_json::Value> {
    current().map(|id| serde_json::json!({ "correlation_id": id.to_string() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn no_id_outside_a_scope() {
        assert_eq!(current(), None);
        assert_eq!(metadata(), None);
    }

    #[tokio::test]
    async fn scoped_futures_see_the_id() {
        let id = Uuid::new_v4();

        let seen = scope(id, async { (current(), metadata()) }).await;

        assert_eq!(seen.0, Some(id));
        assert_eq!(seen.1, Some(serde_json::json!({ "correlation_id": id.to_string() })));
        assert_eq!(current(), None);
    }
}
