//! Rank ordering over sibling entities and the pairwise move rule.

use crate::error::{ValidationError, ValidationResult};

/// Rank given to entities created without an explicit one.
pub const DEFAULT_RANK: i64 = 500;

/// Something ordered by rank with a stable secondary key.
pub trait Ranked {
    /// Secondary key assigned at creation.
    type TieBreak: Ord;

    /// Entity kind named in rank errors.
    const ENTITY: &'static str;

    /// Primary key, lower sorts first.
    fn rank(&self) -> i64;

    /// Replace the rank.
    fn set_rank(&mut self, rank: i64);

    /// Key used when ranks are equal.
    fn tie_break(&self) -> Self::TieBreak;
}

/// Sorts by rank ascending, then by tie-break key.
pub fn sort_by_rank<T: Ranked>(items: &mut [T]) {
    items.sort_by(|a, b| {
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.tie_break().cmp(&b.tie_break()))
    });
}

/// Direction of a one-position manual move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveDirection {
    /// Towards the front of the list
    Up,
    /// Towards the back of the list
    Down,
}

/// New ranks for the moving element and its neighbour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankChange {
    /// Rank of the element being moved
    pub moving: i64,
    /// Rank of the adjacent element it trades places with
    pub neighbor: i64,
}

/// Applies the move rule to two adjacent ranks.
///
/// Equal ranks are separated by nudging the moving element one unit in the
/// direction of travel; different ranks are swapped. `None` when the nudge
/// would leave the `i64` range.
pub fn plan_move(moving: i64, neighbor: i64, direction: MoveDirection) -> Option<RankChange> {
    if moving == neighbor {
        let moving = match direction {
            MoveDirection::Down => moving.checked_add(1)?,
            MoveDirection::Up => moving.checked_sub(1)?,
        };
        Some(RankChange { moving, neighbor })
    } else {
        Some(RankChange {
            moving: neighbor,
            neighbor: moving,
        })
    }
}

/// Index of the element adjacent to `index` in `direction`, if any.
pub fn neighbor_index(len: usize, index: usize, direction: MoveDirection) -> Option<usize> {
    match direction {
        MoveDirection::Up => index.checked_sub(1),
        MoveDirection::Down if index + 1 < len => Some(index + 1),
        MoveDirection::Down => None,
    }
}

/// Plans moving `siblings[index]` one position.
///
/// `siblings` must already be in rank order. Returns the re-ranked moving
/// element and neighbour, or `None` at the list boundary. Nothing is planned
/// when the new rank would overflow.
pub fn reorder_pair<T: Ranked + Clone>(
    siblings: &[T],
    index: usize,
    direction: MoveDirection,
) -> ValidationResult<Option<(T, T)>> {
    let (Some(neighbor_at), Some(moving)) = (
        neighbor_index(siblings.len(), index, direction),
        siblings.get(index),
    ) else {
        return Ok(None);
    };
    let mut moving = moving.clone();
    let mut neighbor = siblings[neighbor_at].clone();

    let change = plan_move(moving.rank(), neighbor.rank(), direction).ok_or(
        ValidationError::RankOutOfRange {
            entity: T::ENTITY,
            rank: moving.rank(),
            allowed: match direction {
                MoveDirection::Down => "< i64::MAX to move down",
                MoveDirection::Up => "> i64::MIN to move up",
            },
        },
    )?;
    moving.set_rank(change.moving);
    neighbor.set_rank(change.neighbor);
    Ok(Some((moving, neighbor)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Item {
        name: &'static str,
        rank: i64,
        seq: u32,
    }

    impl Ranked for Item {
        type TieBreak = u32;
        const ENTITY: &'static str = "item";

        fn rank(&self) -> i64 {
            self.rank
        }

        fn set_rank(&mut self, rank: i64) {
            self.rank = rank;
        }

        fn tie_break(&self) -> u32 {
            self.seq
        }
    }

    fn item(name: &'static str, rank: i64, seq: u32) -> Item {
        Item { name, rank, seq }
    }

    fn names(items: &[Item]) -> Vec<&'static str> {
        items.iter().map(|i| i.name).collect()
    }

    fn apply(items: &mut Vec<Item>, name: &str, direction: MoveDirection) -> bool {
        sort_by_rank(items);
        let index = items.iter().position(|i| i.name == name).unwrap();
        match reorder_pair(items, index, direction).unwrap() {
            Some((moving, neighbor)) => {
                for updated in [moving, neighbor] {
                    let slot = items.iter_mut().find(|i| i.name == updated.name).unwrap();
                    *slot = updated;
                }
                sort_by_rank(items);
                true
            }
            None => false,
        }
    }

    #[test]
    fn test_ties_sorted_by_secondary_key() {
        let mut items = vec![item("c", 500, 3), item("a", 500, 1), item("z", 10, 9), item("b", 500, 2)];
        sort_by_rank(&mut items);
        assert_eq!(names(&items), vec!["z", "a", "b", "c"]);

        let mut again = items.clone();
        again.reverse();
        sort_by_rank(&mut again);
        assert_eq!(again, items);
    }

    #[test]
    fn test_plan_move_equal_ranks_nudges_moving_element() {
        assert_eq!(
            plan_move(500, 500, MoveDirection::Down),
            Some(RankChange { moving: 501, neighbor: 500 })
        );
        assert_eq!(
            plan_move(500, 500, MoveDirection::Up),
            Some(RankChange { moving: 499, neighbor: 500 })
        );
    }

    #[test]
    fn test_plan_move_different_ranks_swaps() {
        assert_eq!(
            plan_move(3, 7, MoveDirection::Down),
            Some(RankChange { moving: 7, neighbor: 3 })
        );
        assert_eq!(
            plan_move(7, 3, MoveDirection::Up),
            Some(RankChange { moving: 3, neighbor: 7 })
        );
    }

    #[test]
    fn test_nudge_at_the_ends_of_the_range_is_refused() {
        assert_eq!(plan_move(i64::MAX, i64::MAX, MoveDirection::Down), None);
        assert_eq!(plan_move(i64::MIN, i64::MIN, MoveDirection::Up), None);
        assert_eq!(
            plan_move(i64::MAX, 0, MoveDirection::Up),
            Some(RankChange { moving: 0, neighbor: i64::MAX })
        );

        let items = vec![item("a", i64::MAX, 1), item("b", i64::MAX, 2)];
        assert!(matches!(
            reorder_pair(&items, 0, MoveDirection::Down),
            Err(ValidationError::RankOutOfRange { entity: "item", rank: i64::MAX, .. })
        ));
        assert_eq!(reorder_pair(&items, 1, MoveDirection::Down).unwrap(), None);
    }

    #[test]
    fn test_neighbor_index_boundaries() {
        assert_eq!(neighbor_index(3, 0, MoveDirection::Up), None);
        assert_eq!(neighbor_index(3, 0, MoveDirection::Down), Some(1));
        assert_eq!(neighbor_index(3, 2, MoveDirection::Down), None);
        assert_eq!(neighbor_index(3, 2, MoveDirection::Up), Some(1));
    }

    #[test]
    fn test_move_first_down_twice_with_tied_ranks() {
        let mut items = vec![item("iter1", 500, 1), item("iter2", 500, 2), item("iter3", 500, 3)];

        assert!(apply(&mut items, "iter1", MoveDirection::Down));
        assert_eq!(names(&items), vec!["iter2", "iter3", "iter1"]);

        assert!(!apply(&mut items, "iter1", MoveDirection::Down));
        assert_eq!(names(&items), vec!["iter2", "iter3", "iter1"]);
        assert_eq!(items[2].rank, 501);
    }

    #[test]
    fn test_down_then_up_restores_order() {
        for ranks in [[500, 500, 500], [1, 2, 3], [5, 5, 9]] {
            let mut items = vec![item("a", ranks[0], 1), item("b", ranks[1], 2), item("c", ranks[2], 3)];
            sort_by_rank(&mut items);
            let before = names(&items);

            assert!(apply(&mut items, "a", MoveDirection::Down));
            assert!(apply(&mut items, "a", MoveDirection::Up));
            assert_eq!(names(&items), before, "ranks {ranks:?}");
        }
    }
}
