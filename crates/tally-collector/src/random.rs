use crate::{Collector, Sample};
use anyhow::Result;
use rand::Rng;

/// A uniformly random gauge in `[0, 1)`, redrawn on every poll.
pub struct RandomCollector;

impl Collector for RandomCollector {
    fn name(&self) -> &str {
        "random"
    }

    fn collect(&mut self) -> Result<Vec<Sample>> {
        let value: f64 = rand::thread_rng().gen();
        Ok(vec![Sample::new("RandomValue", value)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_is_in_unit_range() {
        for _ in 0..100 {
            let samples = RandomCollector.collect().unwrap();
            assert_eq!(samples.len(), 1);
            assert!((0.0..1.0).contains(&samples[0].value));
        }
    }
}
