use crate::error::FeedError;
use crate::gateway::Gateway;
use crate::model::{Fact, FactPatch, VoteCounter};

/// Add one vote to `counter` of `fact`, as seen in the caller's copy.
///
/// The new value is computed from `snapshot` and written as an absolute
/// number, so two clients voting from the same snapshot both write `n + 1`
/// and one vote is lost. Last write wins.
pub async fn cast_vote(
    gateway: &dyn Gateway,
    snapshot: &Fact,
    counter: VoteCounter,
) -> Result<Fact, FeedError> {
    let next = snapshot.votes(counter).saturating_add(1);
    tracing::debug!(id = %snapshot.id, counter = counter.name(), next, "Casting vote");

    gateway
        .update_fact(snapshot.id, &FactPatch::vote(counter, next))
        .await
        .map_err(|e| {
            tracing::error!(id = %snapshot.id, error = %e, "Vote update failed");
            FeedError::Write(e)
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::FlakyGateway;
    use crate::gateway::GatewayError;
    use crate::model::{Category, FactId, NewFact};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_two_sequential_votes_add_two() {
        let gateway = FlakyGateway::new().await;
        let fact = gateway
            .inner
            .insert_fact(&NewFact::new("t", "https://e.com", Category::News))
            .await
            .unwrap();

        let once = cast_vote(&*gateway, &fact, VoteCounter::Interesting).await.unwrap();
        let twice = cast_vote(&*gateway, &once, VoteCounter::Interesting).await.unwrap();
        assert_eq!(twice.votes_interesting, 2);
        assert_eq!(twice.votes_false, 0);
    }

    #[tokio::test]
    async fn test_stale_snapshot_loses_update() {
        let gateway = FlakyGateway::new().await;
        let fact = gateway
            .inner
            .insert_fact(&NewFact::new("t", "https://e.com", Category::News))
            .await
            .unwrap();

        // Two voters holding the same snapshot
        cast_vote(&*gateway, &fact, VoteCounter::Mindblowing).await.unwrap();
        let second = cast_vote(&*gateway, &fact, VoteCounter::Mindblowing).await.unwrap();
        assert_eq!(second.votes_mindblowing, 1);
    }

    #[tokio::test]
    async fn test_failed_update_is_write_error() {
        let gateway = FlakyGateway::new().await;
        let fact = gateway
            .inner
            .insert_fact(&NewFact::new("t", "https://e.com", Category::News))
            .await
            .unwrap();
        gateway.fail_updates.store(true, Ordering::SeqCst);

        let result = cast_vote(&*gateway, &fact, VoteCounter::False).await;
        assert!(matches!(result, Err(FeedError::Write(_))));
    }

    #[tokio::test]
    async fn test_deleted_row_is_write_error() {
        let gateway = FlakyGateway::new().await;
        let mut ghost = gateway
            .inner
            .insert_fact(&NewFact::new("t", "https://e.com", Category::News))
            .await
            .unwrap();
        ghost.id = FactId(999);

        let result = cast_vote(&*gateway, &ghost, VoteCounter::False).await;
        assert!(matches!(
            result,
            Err(FeedError::Write(GatewayError::NotFound(FactId(999))))
        ));
    }
}
