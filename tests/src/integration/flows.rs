//! # Session Flows
//!
//! What a set of browser clients observes for the core scenarios: joining,
//! round-robin turns, the grid guard, timeouts and disconnects.

#[cfg(test)]
mod tests {
    use session_runtime::gateway::{ClientMessage, RejectReason, ServerMessage};
    use shared_types::{BeatGrid, ConnectionId, Participant, SessionId};
    use turn_coordinator::TurnCoordinatorApi;

    use crate::integration::{Backend, TURN_BUDGET};

    fn jam() -> SessionId {
        SessionId::from("jam")
    }

    fn grid_with(row: usize, column: usize) -> BeatGrid {
        let mut rows = vec![vec![false; 8]; 4];
        rows[row][column] = true;
        BeatGrid::from_rows(rows)
    }

    // =============================================================================
    // JOINING
    // =============================================================================

    #[tokio::test]
    async fn test_first_joiner_gets_turn_and_everyone_sees_it() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut observer = server.connect("observer");
        let mut alice = server.connect("alice");

        observer.join_session("jam").await;
        let snapshot = observer.drain().await;
        assert_eq!(snapshot.len(), 2);
        assert!(matches!(snapshot[0], ServerMessage::BeatUpdate { .. }));
        assert!(matches!(
            &snapshot[1],
            ServerMessage::QueueUpdate { queue, current_turn: None, .. } if queue.is_empty()
        ));

        alice.join_queue("jam", "Alice").await;
        let expected = ServerMessage::QueueUpdate {
            session_id: jam(),
            queue: vec![Participant::new(ConnectionId::from("alice"), "Alice", "")],
            current_turn: Some(ConnectionId::from("alice")),
        };
        assert_eq!(observer.next().await, expected);
        assert_eq!(alice.drain().await.last(), Some(&expected));
    }

    #[tokio::test]
    async fn test_second_join_queue_is_silent() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut observer = server.connect("observer");
        let alice = server.connect("alice");
        observer.join_session("jam").await;
        alice.join_queue("jam", "Alice").await;
        observer.drain().await;

        alice.join_queue("jam", "Alice again").await;
        assert!(observer.drain().await.is_empty());

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert_eq!(state.queue().len(), 1);
        assert_eq!(state.queue()[0].display_name, "Alice");
    }

    #[tokio::test]
    async fn test_late_joiner_sees_current_grid() {
        let backend = Backend::new();
        let server = backend.instance();
        let alice = server.connect("alice");
        let mut late = server.connect("late");
        alice.join_queue("jam", "Alice").await;
        alice
            .send(ClientMessage::BeatUpdate {
                session_id: jam(),
                grid: grid_with(1, 3),
            })
            .await;

        late.join_session("jam").await;
        assert_eq!(
            late.next().await,
            ServerMessage::BeatUpdate {
                session_id: jam(),
                grid: grid_with(1, 3),
            }
        );
        assert!(matches!(
            late.next().await,
            ServerMessage::QueueUpdate { current_turn: Some(holder), .. } if holder.as_str() == "alice"
        ));
    }

    // =============================================================================
    // TURNS
    // =============================================================================

    #[tokio::test]
    async fn test_round_robin_over_three_players() {
        let backend = Backend::new();
        let server = backend.instance();
        let clients = [
            server.connect("a"),
            server.connect("b"),
            server.connect("c"),
        ];
        let mut observer = server.connect("observer");
        observer.join_session("jam").await;
        for (client, name) in clients.iter().zip(["A", "B", "C"]) {
            client.join_queue("jam", name).await;
        }
        observer.drain().await;

        let mut holders = Vec::new();
        for _ in 0..6 {
            let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
            let holder = state.current_turn().unwrap().clone();
            let client = clients.iter().find(|c| c.id() == &holder).unwrap();
            client.finish_turn("jam").await;
            holders.push(observer.last_turn().await.flatten().unwrap());
        }

        let names: Vec<&str> = holders.iter().map(ConnectionId::as_str).collect();
        assert_eq!(names, vec!["b", "c", "a", "b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_non_holder_cannot_finish_or_edit() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut alice = server.connect("alice");
        let mut bob = server.connect("bob");
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;
        alice.drain().await;
        bob.drain().await;

        bob.finish_turn("jam").await;
        assert!(matches!(
            bob.next().await,
            ServerMessage::Rejected { reason: RejectReason::NotTurnHolder, ref action, .. } if action == "finish-turn"
        ));
        bob.send(ClientMessage::BeatUpdate {
            session_id: jam(),
            grid: grid_with(0, 0),
        })
        .await;
        assert!(matches!(
            bob.next().await,
            ServerMessage::Rejected { reason: RejectReason::NotTurnHolder, ref action, .. } if action == "beat-update"
        ));
        assert!(alice.drain().await.is_empty());

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert!(state.is_turn_of(alice.id()));
        assert_eq!(state.artifact().active_cells(), 0);
    }

    #[tokio::test]
    async fn test_holder_edit_reaches_others_only() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut alice = server.connect("alice");
        let mut bob = server.connect("bob");
        let mut carol = server.connect("carol");
        alice.join_queue("jam", "Alice").await;
        bob.join_session("jam").await;
        carol.join_session("jam").await;
        for client in [&mut alice, &mut bob, &mut carol] {
            client.drain().await;
        }

        alice
            .send(ClientMessage::BeatUpdate {
                session_id: jam(),
                grid: grid_with(2, 5),
            })
            .await;

        let expected = ServerMessage::BeatUpdate {
            session_id: jam(),
            grid: grid_with(2, 5),
        };
        assert_eq!(bob.next().await, expected);
        assert_eq!(carol.next().await, expected);
        assert!(alice.drain().await.is_empty());
    }

    #[tokio::test]
    async fn test_turn_status_counts_down() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut alice = server.connect("alice");
        alice.join_queue("jam", "Alice").await;
        alice.drain().await;

        backend.clock.advance(std::time::Duration::from_millis(12_400));
        alice
            .send(ClientMessage::TurnStatus { session_id: jam() })
            .await;
        assert_eq!(
            alice.next().await,
            ServerMessage::TurnTimer {
                session_id: jam(),
                remaining_secs: 18,
            }
        );
    }

    // =============================================================================
    // TIMEOUTS
    // =============================================================================

    #[tokio::test]
    async fn test_expired_turn_is_advanced_and_broadcast() {
        let backend = Backend::new();
        let server = backend.instance();
        let alice = server.connect("alice");
        let bob = server.connect("bob");
        let mut observer = server.connect("observer");
        observer.join_session("jam").await;
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;
        observer.drain().await;

        let supervisor = server.supervisor();
        backend.clock.advance(TURN_BUDGET - std::time::Duration::from_millis(1));
        assert!(supervisor.scan_once().await.unwrap().advanced.is_empty());
        assert!(observer.drain().await.is_empty());

        backend.clock.advance(std::time::Duration::from_millis(1));
        let report = supervisor.scan_once().await.unwrap();
        assert_eq!(report.advanced, vec![jam()]);
        assert_eq!(
            observer.next().await,
            ServerMessage::QueueUpdate {
                session_id: jam(),
                queue: vec![
                    Participant::new(ConnectionId::from("bob"), "Bob", ""),
                    Participant::new(ConnectionId::from("alice"), "Alice", ""),
                ],
                current_turn: Some(ConnectionId::from("bob")),
            }
        );
    }

    #[tokio::test]
    async fn test_running_supervisor_advances_expired_turns() {
        let backend = Backend::new();
        let server = backend.instance();
        let alice = server.connect("alice");
        let bob = server.connect("bob");
        let mut observer = server.connect("observer");
        observer.join_session("jam").await;
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;
        observer.drain().await;

        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
        let task = tokio::spawn(server.supervisor().run(shutdown_rx));
        backend.clock.advance(TURN_BUDGET);

        let mut holder = None;
        for _ in 0..20 {
            if let Some(turn) = observer.last_turn().await {
                holder = turn;
                break;
            }
        }
        assert_eq!(holder.as_ref().map(ConnectionId::as_str), Some("bob"));

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    // =============================================================================
    // DISCONNECTS
    // =============================================================================

    #[tokio::test]
    async fn test_disconnect_of_holder_passes_turn() {
        let backend = Backend::new();
        let server = backend.instance();
        let alice = server.connect("alice");
        let mut bob = server.connect("bob");
        alice.join_queue("jam", "Alice").await;
        bob.join_queue("jam", "Bob").await;
        bob.drain().await;

        alice.disconnect().await;

        assert_eq!(
            bob.next().await,
            ServerMessage::QueueUpdate {
                session_id: jam(),
                queue: vec![Participant::new(ConnectionId::from("bob"), "Bob", "")],
                current_turn: Some(ConnectionId::from("bob")),
            }
        );
        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        state.check_invariants().unwrap();
    }

    #[tokio::test]
    async fn test_last_disconnect_leaves_empty_session() {
        let backend = Backend::new();
        let server = backend.instance();
        let alice = server.connect("alice");
        alice.join_queue("jam", "Alice").await;

        alice.disconnect().await;

        let state = server.adapter.coordinator().peek(&jam()).await.unwrap().unwrap();
        assert!(state.is_empty());
        assert!(state.current_turn().is_none());
        assert!(server
            .adapter
            .coordinator()
            .active_sessions()
            .await
            .unwrap()
            .is_empty());
        assert_eq!(server.adapter.publisher().room_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_frames_do_not_break_the_connection() {
        let backend = Backend::new();
        let server = backend.instance();
        let mut alice = server.connect("alice");

        alice.send_raw("not json").await;
        alice.send_raw(r#"{"type":"join-queue"}"#).await;
        let errors = alice.drain().await;
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|m| matches!(m, ServerMessage::Error { retryable: false, .. })));

        alice
            .send_raw(r#"{"type":"join-queue","sessionId":"jam","name":"Alice","avatar":"x"}"#)
            .await;
        assert!(matches!(
            alice.drain().await.last(),
            Some(ServerMessage::QueueUpdate { current_turn: Some(_), .. })
        ));
    }
}
