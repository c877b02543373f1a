//! In-memory batch of consumed state vectors awaiting a bulk write.
//!
//! The buffer is flushed whole or not at all: it is cleared only after the
//! store reports the batch durable. Consumed offsets live alongside it in the
//! consumer's [`OffsetTracker`](crate::kafka::OffsetTracker).

mod batch_buffer;

pub use batch_buffer::BatchBuffer;
