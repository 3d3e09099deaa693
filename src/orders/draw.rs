use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks candidate ticket numbers.
pub trait TicketDraw: Send + Sync {
    /// Returns a number in `1..=upper`.
    fn draw(&self, upper: i64) -> i64;
}

/// Uniform draws from the thread-local generator.
#[derive(Debug, Default)]
pub struct RandomDraw;

impl TicketDraw for RandomDraw {
    fn draw(&self, upper: i64) -> i64 {
        rand::thread_rng().gen_range(1..=upper)
    }
}

/// Reproducible draws for tests and simulations.
pub struct SeededDraw {
    rng: Mutex<StdRng>,
}

impl SeededDraw {
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl TicketDraw for SeededDraw {
    fn draw(&self, upper: i64) -> i64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(1..=upper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draws_stay_in_range() {
        let draw = SeededDraw::new(7);
        for _ in 0..500 {
            let n = draw.draw(10);
            assert!((1..=10).contains(&n));
        }
        assert_eq!(RandomDraw.draw(1), 1);
    }
}
