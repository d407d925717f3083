use std::collections::VecDeque;

/// Ring of accumulated point generations shared by heat maps and plots.
///
/// New points land in the current generation. Rotating advances the ring:
/// the oldest generation is emptied and becomes current, so after `len()`
/// rotations without input every generation is empty.
#[derive(Debug)]
pub(crate) struct DensityRing<T> {
    generations: Vec<Vec<T>>,
    current: usize,
    counts: VecDeque<usize>,
    window: usize,
    last_count: usize,
    displayed: usize,
}

impl<T> DensityRing<T> {
    pub fn new(history: usize, refresh_period_ms: u64) -> Self {
        let history = history.max(1);
        let window = ((refresh_period_ms as f64) / 1_000.0).round().max(1.0) as usize;
        Self {
            generations: (0..history).map(|_| Vec::new()).collect(),
            current: 0,
            counts: VecDeque::with_capacity(window),
            window,
            last_count: 0,
            displayed: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.generations.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn push(&mut self, point: T) {
        self.generations[self.current].push(point);
    }

    pub fn active(&self) -> &[T] {
        &self.generations[self.current]
    }

    pub fn previous(&self) -> &[T] {
        let n = self.generations.len();
        &self.generations[(self.current + n - 1) % n]
    }

    pub fn generation(&self, index: usize) -> &[T] {
        &self.generations[index]
    }

    /// Advance the ring and return the new current index.
    pub fn rotate(&mut self) -> usize {
        self.current = (self.current + 1) % self.generations.len();
        self.generations[self.current].clear();
        self.current
    }

    /// Record this tick's arrivals and return the windowed activity count.
    ///
    /// Arrivals are the growth of the active generation since the last tick.
    /// When the ring rotated in between, the active generation is smaller than
    /// the last observation and the previous generation's size is added back.
    /// The result is a display metric; bursts larger than a whole generation
    /// are not recovered.
    pub fn tally(&mut self) -> usize {
        let active = self.active().len();
        let arrivals = if self.last_count <= active {
            active - self.last_count
        } else {
            (self.previous().len() + active).saturating_sub(self.last_count)
        };
        if self.counts.len() >= self.window {
            self.counts.pop_front();
        }
        self.counts.push_back(arrivals);
        self.last_count = active;
        self.displayed = self.counts.iter().sum();
        self.displayed
    }

    pub fn displayed(&self) -> usize {
        self.displayed
    }

    pub fn is_empty(&self) -> bool {
        self.generations.iter().all(Vec::is_empty)
    }
}
