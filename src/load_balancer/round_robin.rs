// src/load_balancer/round_robin.rs

/// Shared routing cursor. Callers hold the pool lock while calling `next`,
/// so the candidate snapshot and the cursor advance are one step.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next<'a, T>(&mut self, candidates: &'a [T]) -> Option<&'a T> {
        if candidates.is_empty() {
            return None;
        }

        let index = self.cursor % candidates.len();
        self.cursor = self.cursor.wrapping_add(1);
        candidates.get(index)
    }

    pub fn position(&self) -> usize {
        self.cursor
    }
}
