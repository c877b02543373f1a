use crate::config::BufferConfig;
use crate::record::StateVector;

/// Ordered records waiting for the next flush.
#[derive(Debug)]
pub struct BatchBuffer {
    records: Vec<StateVector>,
    flush_threshold: usize,
    max_records: usize,
}

impl BatchBuffer {
    pub fn new(flush_threshold: usize, max_records: usize) -> Self {
        Self {
            records: Vec::with_capacity(flush_threshold),
            flush_threshold,
            max_records: max_records.max(flush_threshold),
        }
    }

    pub fn from_config(config: &BufferConfig) -> Self {
        Self::new(config.flush_threshold, config.max_records())
    }

    pub fn push(&mut self, record: StateVector) {
        self.records.push(record);
    }

    /// Threshold reached.
    pub fn should_flush(&self) -> bool {
        self.records.len() >= self.flush_threshold
    }

    /// Hard cap reached; consumption must pause.
    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max_records
    }

    pub fn records(&self) -> &[StateVector] {
        &self.records
    }

    /// Drop everything. Call only after the batch is durable.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flush_threshold(&self) -> usize {
        self.flush_threshold
    }

    /// Smallest and largest `last_contact` in the batch.
    pub fn contact_range(&self) -> Option<(i64, i64)> {
        let mut contacts = self.records.iter().map(|r| r.last_contact);
        let first = contacts.next()?;
        Some(contacts.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::tests::sample;

    #[test]
    fn test_threshold_and_cap() {
        let mut buffer = BatchBuffer::new(3, 5);
        assert!(buffer.is_empty());

        for i in 0..2 {
            buffer.push(sample("a1b2c3", i));
        }
        assert!(!buffer.should_flush());

        buffer.push(sample("a1b2c3", 2));
        assert!(buffer.should_flush());
        assert!(!buffer.is_full());

        buffer.push(sample("a1b2c3", 3));
        buffer.push(sample("a1b2c3", 4));
        assert!(buffer.is_full());
    }

    #[test]
    fn test_cap_never_below_threshold() {
        let mut buffer = BatchBuffer::new(10, 2);
        for i in 0..9 {
            buffer.push(sample("a1b2c3", i));
        }
        assert!(!buffer.is_full());
        buffer.push(sample("a1b2c3", 9));
        assert!(buffer.is_full());
    }

    #[test]
    fn test_contact_range_and_clear() {
        let mut buffer = BatchBuffer::new(10, 40);
        assert_eq!(buffer.contact_range(), None);

        buffer.push(sample("a1b2c3", 50));
        buffer.push(sample("d4e5f6", 20));
        buffer.push(sample("a1b2c3", 70));
        assert_eq!(buffer.contact_range(), Some((20, 70)));

        assert_eq!(buffer.len(), 3);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.contact_range(), None);
    }

    #[test]
    fn test_records_keep_arrival_order() {
        let mut buffer = BatchBuffer::from_config(&BufferConfig::default());
        buffer.push(sample("a1b2c3", 2));
        buffer.push(sample("a1b2c3", 1));
        let contacts: Vec<_> = buffer.records().iter().map(|r| r.last_contact).collect();
        assert_eq!(contacts, vec![2, 1]);
    }
}
