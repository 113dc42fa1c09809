mod receive_queue;
mod send_queue;
mod write_queue;

pub use receive_queue::ReceiveQueue;
pub use send_queue::{SendQueue, SendQueueEntry};
pub use write_queue::WriteQueue;
