// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model-based properties: each queue variant agrees with a reference model
//! after every operation.

use super::test_support::task;
use super::*;
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Push { priority: i32 },
    Pop,
    Remove { nth: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-10i32..10).prop_map(|priority| Op::Push { priority }),
        Just(Op::Pop),
        (0usize..8).prop_map(|nth| Op::Remove { nth }),
    ]
}

proptest! {
    #[test]
    fn fifo_matches_a_vecdeque_model(ops in proptest::collection::vec(op_strategy(), 1..64)) {
        let mut q = FifoQueue::new();
        let mut model: std::collections::VecDeque<u64> = Default::default();
        let mut next_id = 0u64;

        for op in ops {
            match op {
                Op::Push { priority } => {
                    q.push(task(next_id, priority)).unwrap();
                    model.push_back(next_id);
                    next_id += 1;
                }
                Op::Pop => {
                    prop_assert_eq!(q.pop().map(|t| t.request.as_u64()), model.pop_front());
                }
                Op::Remove { nth } => {
                    let target = model.iter().copied().nth(nth);
                    if let Some(id) = target {
                        model.retain(|m| *m != id);
                        prop_assert_eq!(q.remove(RequestId(id)).map(|t| t.request.as_u64()), Some(id));
                    }
                }
            }
            prop_assert_eq!(q.len(), model.len());
            for id in 0..next_id {
                prop_assert_eq!(q.contains(RequestId(id)), model.contains(&id));
            }
        }
    }

    #[test]
    fn priority_pops_a_stable_descending_sort(
        priorities in proptest::collection::vec(-5i32..5, 1..32)
    ) {
        let mut q = PriorityQueue::new();
        for (id, priority) in priorities.iter().enumerate() {
            q.push(task(id as u64, *priority)).unwrap();
        }

        // reference: stable sort by priority descending keeps insertion order
        let mut expected: Vec<(usize, i32)> = priorities.iter().copied().enumerate().collect();
        expected.sort_by_key(|(_, priority)| std::cmp::Reverse(*priority));
        let expected: Vec<u64> = expected.into_iter().map(|(id, _)| id as u64).collect();

        let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.request.as_u64()).collect();
        prop_assert_eq!(order, expected);
    }

    #[test]
    fn lifo_reverses_any_push_sequence(count in 1usize..40) {
        let mut q = LifoQueue::new();
        for id in 0..count as u64 {
            q.push(task(id, 0)).unwrap();
        }
        let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.request.as_u64()).collect();
        let expected: Vec<u64> = (0..count as u64).rev().collect();
        prop_assert_eq!(order, expected);
    }
}
