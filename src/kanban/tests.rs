use super::*;
use TaskStatus::*;

fn board() -> KanbanBoard {
    KanbanBoard::new(["a", "b", "c"])
}

#[test]
fn test_new_board_puts_everything_in_todo() {
    let board = board();
    assert_eq!(board.tasks_in(Todo), ["a", "b", "c"]);
    assert_eq!(board.counts()[&Todo], 3);
    assert!(board.is_partition(["a", "b", "c"]));
}

#[test]
fn test_move_records_log_entry() {
    let mut board = board();
    assert!(board.move_task("a", Todo, InProgress, Some("backend")));

    assert_eq!(board.column("a"), Some(InProgress));
    let entry = &board.moves()[0];
    assert_eq!(entry.task_id, "a");
    assert_eq!((entry.from, entry.to), (Todo, InProgress));
    assert_eq!(entry.agent_id.as_deref(), Some("backend"));
}

#[test]
fn test_move_from_wrong_column_is_noop() {
    let mut board = board();
    assert!(!board.move_task("a", InProgress, Review, None));
    assert_eq!(board.column("a"), Some(Todo));
    assert!(board.moves().is_empty());
}

#[test]
fn test_move_unknown_task_is_noop() {
    let mut board = board();
    assert!(!board.move_task("ghost", Todo, InProgress, None));
    assert!(board.is_partition(["a", "b", "c"]));
}

#[test]
fn test_illegal_transition_is_noop() {
    let mut board = board();
    assert!(!board.move_task("a", Todo, Completed, None));
    assert_eq!(board.column("a"), Some(Todo));
}

#[test]
fn test_partition_holds_across_full_lifecycle() {
    let mut board = board();
    let path = [
        (Todo, InProgress),
        (InProgress, Review),
        (Review, Revision),
        (Revision, InProgress),
        (InProgress, Review),
        (Review, Blocked),
        (Blocked, Todo),
    ];
    for (from, to) in path {
        assert!(board.move_task("b", from, to, None));
        assert!(board.is_partition(["a", "b", "c"]));
    }
    assert_eq!(board.moves().len(), path.len());
}

#[test]
fn test_release_only_moves_blocked_tasks() {
    let mut board = board();
    assert!(!board.release("a"));

    board.move_task("a", Todo, InProgress, None);
    board.move_task("a", InProgress, Blocked, None);
    assert!(board.release("a"));
    assert_eq!(board.column("a"), Some(Todo));
}

#[test]
fn test_add_task_rejects_duplicate() {
    let mut board = board();
    assert!(!board.add_task("a"));
    assert_eq!(board.tasks_in(Todo).len(), 3);
}

#[test]
fn test_place_keeps_partition() {
    let mut board = board();
    board.place("c", Completed);
    assert_eq!(board.column("c"), Some(Completed));
    assert!(board.is_partition(["a", "b", "c"]));
    assert!(!board.is_partition(["a", "b"]));
}

#[test]
fn test_board_round_trips_through_json() {
    let mut board = board();
    board.move_task("a", Todo, InProgress, Some("x"));
    let json = serde_json::to_string(&board).unwrap();
    let back: KanbanBoard = serde_json::from_str(&json).unwrap();
    assert_eq!(back, board);
}
