//! # Concurrency
//!
//! Many connections hitting one session at once. Whatever the interleaving,
//! the persisted state must stay consistent and every queue member must be
//! a connection that joined and has not left.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use futures::future::join_all;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use session_runtime::gateway::ClientMessage;
    use shared_types::{BeatGrid, ConnectionId, SessionId};
    use turn_coordinator::TurnCoordinatorApi;

    use crate::integration::{finish_turn, join_queue, Backend, Client};

    fn jam() -> SessionId {
        SessionId::from("jam")
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_joins_keep_every_participant_once() {
        let backend = Backend::new();
        let server = backend.instance();
        let clients: Vec<Client> = (0..40).map(|i| server.connect(&format!("c{i}"))).collect();

        let joins = clients.iter().map(|client| {
            let handler = Arc::clone(&client.handler);
            tokio::spawn(async move {
                handler.handle(join_queue("jam", "player")).await;
                // A duplicate racing with the first must be a no-op.
                handler.handle(join_queue("jam", "player")).await;
            })
        });
        for result in join_all(joins).await {
            result.unwrap();
        }

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        state.check_invariants().unwrap();
        assert_eq!(state.queue().len(), 40);
        let unique: HashSet<&ConnectionId> =
            state.queue().iter().map(|p| &p.connection_id).collect();
        assert_eq!(unique.len(), 40);
        assert_eq!(state.current_turn(), Some(&state.queue()[0].connection_id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_finishes_advance_once() {
        let backend = Backend::new();
        let server = backend.instance();
        let clients: Vec<Client> = (0..3).map(|i| server.connect(&format!("c{i}"))).collect();
        for client in &clients {
            client.join_queue("jam", "player").await;
        }

        // Only the first finish still holds the turn when it runs.
        let finishes = (0..8).map(|_| {
            let holder = Arc::clone(&clients[0].handler);
            tokio::spawn(async move { holder.handle(finish_turn("jam")).await })
        });
        for result in join_all(finishes).await {
            result.unwrap();
        }

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert_eq!(state.current_turn().map(ConnectionId::as_str), Some("c1"));
        let order: Vec<&str> = state
            .queue()
            .iter()
            .map(|p| p.connection_id.as_str())
            .collect();
        assert_eq!(order, vec!["c1", "c2", "c0"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_random_interleavings_preserve_invariants() {
        let backend = Backend::new();
        let server = backend.instance();
        let clients: Vec<Client> = (0..12).map(|i| server.connect(&format!("c{i}"))).collect();

        let tasks = clients.iter().enumerate().map(|(i, client)| {
            let handler = Arc::clone(&client.handler);
            let clock = Arc::clone(&backend.clock);
            tokio::spawn(async move {
                let mut rng = StdRng::seed_from_u64(i as u64);
                for _ in 0..40 {
                    let message = match rng.gen_range(0..6) {
                        0 | 1 => join_queue("jam", "player"),
                        2 => ClientMessage::LeaveQueue { session_id: jam() },
                        3 => finish_turn("jam"),
                        4 => ClientMessage::BeatUpdate {
                            session_id: jam(),
                            grid: BeatGrid::from_rows(vec![vec![rng.gen::<bool>(); 8]; 4]),
                        },
                        _ => {
                            clock.advance(std::time::Duration::from_millis(rng.gen_range(0..500)));
                            ClientMessage::TurnStatus { session_id: jam() }
                        }
                    };
                    handler.handle(message).await;
                }
            })
        });
        for result in join_all(tasks).await {
            result.unwrap();
        }

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        state.check_invariants().unwrap();
        let known: HashSet<&ConnectionId> = clients.iter().map(Client::id).collect();
        assert!(state
            .queue()
            .iter()
            .all(|p| known.contains(&p.connection_id)));

        let active = server.adapter.coordinator().active_sessions().await.unwrap();
        assert_eq!(active.contains(&jam()), state.current_turn().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sessions_do_not_block_each_other() {
        let backend = Backend::new();
        let server = Arc::new(backend.instance());

        let tasks = (0..16).map(|i| {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let session = format!("room-{i}");
                let a = server.connect(&format!("{session}-a"));
                let b = server.connect(&format!("{session}-b"));
                a.join_queue(&session, "A").await;
                b.join_queue(&session, "B").await;
                a.finish_turn(&session).await;
            })
        });
        for result in join_all(tasks).await {
            result.unwrap();
        }

        for i in 0..16 {
            let session = SessionId::from(format!("room-{i}"));
            let state = server.adapter.coordinator().peek(&session).await.unwrap().unwrap();
            let expected = format!("room-{i}-b");
            assert_eq!(
                state.current_turn().map(ConnectionId::as_str),
                Some(expected.as_str())
            );
        }
        assert_eq!(
            server.adapter.coordinator().active_sessions().await.unwrap().len(),
            16
        );
    }
}
