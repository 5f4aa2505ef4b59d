//! # Multi-Instance
//!
//! Two server instances sharing one store. Each instance has its own bus,
//! so broadcasts stay local, but every instance reads and writes the same
//! session records.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use session_runtime::gateway::ServerMessage;
    use shared_types::{ConnectionId, SessionId};
    use turn_coordinator::TurnCoordinatorApi;

    use crate::integration::{join_queue, Backend, Client, TURN_BUDGET};

    fn jam() -> SessionId {
        SessionId::from("jam")
    }

    #[tokio::test]
    async fn test_queue_spans_instances() {
        let backend = Backend::new();
        let east = backend.instance();
        let west = backend.instance();
        let mut east_observer = east.connect("east-observer");
        east_observer.join_session("jam").await;
        east_observer.drain().await;

        let alice = east.connect("alice");
        let bob = west.connect("bob");
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;

        // Only the east-side join is announced on the east bus.
        let updates = east_observer.drain().await;
        assert_eq!(updates.len(), 1);

        for instance in [&east, &west] {
            let state = instance.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
            let order: Vec<&str> = state
                .queue()
                .iter()
                .map(|p| p.connection_id.as_str())
                .collect();
            assert_eq!(order, vec!["alice", "bob"]);
            assert!(state.is_turn_of(alice.id()));
        }
    }

    #[tokio::test]
    async fn test_remote_supervisor_advances_local_holder() {
        let backend = Backend::new();
        let east = backend.instance();
        let west = backend.instance();
        let alice = east.connect("alice");
        let bob = west.connect("bob");
        let mut west_observer = west.connect("west-observer");
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;
        west_observer.join_session("jam").await;
        west_observer.drain().await;

        backend.clock.advance(TURN_BUDGET);
        let report = west.supervisor().scan_once().await.unwrap();
        assert_eq!(report.advanced, vec![jam()]);

        assert!(matches!(
            west_observer.next().await,
            ServerMessage::QueueUpdate { current_turn: Some(ref holder), .. } if holder.as_str() == "bob"
        ));
        let state = east.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert!(state.is_turn_of(bob.id()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_supervisors_advance_once() {
        let backend = Backend::new();
        let east = backend.instance();
        let west = backend.instance();
        for (i, instance) in [&east, &west, &east].into_iter().enumerate() {
            instance.connect(&format!("p{i}")).join_queue("jam", "P").await;
        }

        backend.clock.advance(TURN_BUDGET);
        let east_supervisor = east.supervisor();
        let west_supervisor = west.supervisor();
        let (east_report, west_report) =
            tokio::join!(east_supervisor.scan_once(), west_supervisor.scan_once());

        let advanced = east_report.unwrap().advanced.len() + west_report.unwrap().advanced.len();
        assert_eq!(advanced, 1);

        let state = west.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert_eq!(state.current_turn().map(ConnectionId::as_str), Some("p1"));
        state.check_invariants().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_across_instances() {
        let backend = Backend::new();
        let instances = [backend.instance(), backend.instance()];
        let clients: Vec<Client> = (0..30)
            .map(|i| instances[i % 2].connect(&format!("c{i}")))
            .collect();

        let joins = clients.iter().map(|client| {
            let handler = Arc::clone(&client.handler);
            tokio::spawn(async move { handler.handle(join_queue("jam", "player")).await })
        });
        for result in join_all(joins).await {
            result.unwrap();
        }

        let state = instances[0]
            .adapter
            .coordinator()
            .peek(&jam())
            .await
            .unwrap()
            .unwrap();
        state.check_invariants().unwrap();
        assert_eq!(state.queue().len(), 30);
        assert!(clients.iter().all(|c| state.contains(c.id())));
    }

    #[tokio::test]
    async fn test_disconnect_on_one_instance_is_seen_by_the_other() {
        let backend = Backend::new();
        let east = backend.instance();
        let west = backend.instance();
        let alice = east.connect("alice");
        let bob = west.connect("bob");
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;

        alice.disconnect().await;

        let state = west.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert!(!state.contains(&ConnectionId::from("alice")));
        assert!(state.is_turn_of(bob.id()));
    }
}
